//! Mapping between wire payload type numbers and what a session does with them.
//!
//! Two tables exist: a constant table of the RFC 3551 well-known assignments, and a
//! per-session table negotiated by signaling. The session table overrides the static one;
//! lookups fall back to static when the dynamic slot is empty.

use once_cell::sync::Lazy;

use crate::format::Codec;

use super::Pt;

const TABLE_LEN: usize = 128;

/// What a payload type maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadMapping {
    /// A codec payload the session hands on as voice/video.
    Media(Codec),
    /// A non-codec event payload the session consumes itself.
    Signal(SignalKind),
}

/// Non-codec payload types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// RFC2833/RFC4733 telephone-event.
    TelephoneEvent,
    /// Legacy proprietary in-band DTMF events.
    CiscoDtmf,
    /// RFC3389 comfort noise.
    ComfortNoise,
}

impl PayloadMapping {
    /// Whether this maps to a native codec format rather than a signaling payload.
    pub fn is_media(&self) -> bool {
        matches!(self, PayloadMapping::Media(_))
    }
}

/// The RFC 3551 static assignments we care about, indexed by payload type.
static STATIC_TABLE: Lazy<[Option<PayloadMapping>; TABLE_LEN]> = Lazy::new(|| {
    let mut t = [None; TABLE_LEN];
    t[0] = Some(PayloadMapping::Media(Codec::Pcmu));
    t[2] = Some(PayloadMapping::Media(Codec::G726));
    t[3] = Some(PayloadMapping::Media(Codec::Gsm));
    t[8] = Some(PayloadMapping::Media(Codec::Pcma));
    t[9] = Some(PayloadMapping::Media(Codec::G722));
    t[10] = Some(PayloadMapping::Media(Codec::Slin));
    t[13] = Some(PayloadMapping::Signal(SignalKind::ComfortNoise));
    t[18] = Some(PayloadMapping::Media(Codec::G729));
    t[19] = Some(PayloadMapping::Signal(SignalKind::ComfortNoise)); // pre-RFC assignment
    t[31] = Some(PayloadMapping::Media(Codec::H261));
    t[34] = Some(PayloadMapping::Media(Codec::H263));
    // Common dynamic conventions, used until signaling overrides them.
    t[97] = Some(PayloadMapping::Media(Codec::Ilbc));
    t[99] = Some(PayloadMapping::Media(Codec::H264));
    t[101] = Some(PayloadMapping::Signal(SignalKind::TelephoneEvent));
    t[121] = Some(PayloadMapping::Signal(SignalKind::CiscoDtmf));
    t
});

/// Per-session payload type registry.
#[derive(Debug, Clone)]
pub struct PayloadRegistry {
    dynamic: [Option<PayloadMapping>; TABLE_LEN],
    // One entry cache for the reverse lookup, to avoid rescanning both
    // tables on the hot send path.
    cache: Option<(PayloadMapping, Option<Pt>)>,
}

impl PayloadRegistry {
    /// A registry with no negotiated overrides.
    pub fn new() -> Self {
        PayloadRegistry {
            dynamic: [None; TABLE_LEN],
            cache: None,
        }
    }

    /// Install the well-known mapping for a payload type an offer named without
    /// an explicit rtpmap.
    pub fn set_static(&mut self, pt: Pt) {
        let Some(idx) = index(pt) else {
            return;
        };
        self.dynamic[idx] = STATIC_TABLE[idx];
        self.cache = None;
    }

    /// Install a session-specific mapping resolved from a MIME type/subtype pair.
    ///
    /// Unknown subtypes leave the slot untouched.
    pub fn set_dynamic(&mut self, pt: Pt, mime_type: &str, mime_subtype: &str) {
        let Some(idx) = index(pt) else {
            return;
        };
        let Some(mapping) = resolve_mime(mime_type, mime_subtype) else {
            debug!("No mapping for {}/{}", mime_type, mime_subtype);
            return;
        };
        self.dynamic[idx] = Some(mapping);
        self.cache = None;
    }

    /// Remove a negotiated mapping, reverting the slot to the static table.
    pub fn clear_dynamic(&mut self, pt: Pt) {
        let Some(idx) = index(pt) else {
            return;
        };
        self.dynamic[idx] = None;
        self.cache = None;
    }

    /// Resolve a received payload type. Dynamic if present, else static, else nothing.
    pub fn lookup_by_pt(&self, pt: Pt) -> Option<PayloadMapping> {
        let idx = index(pt)?;
        self.dynamic[idx].or(STATIC_TABLE[idx])
    }

    /// Reverse lookup: which payload type to send a mapping as.
    ///
    /// Scans the dynamic table first, then the static. The last query/answer pair is cached
    /// and invalidated whenever the query changes or a table mutates.
    pub fn lookup_pt(&mut self, mapping: PayloadMapping) -> Option<Pt> {
        if let Some((cached_q, cached_a)) = self.cache {
            if cached_q == mapping {
                return cached_a;
            }
        }

        let found = scan(&self.dynamic, mapping).or_else(|| scan(&*STATIC_TABLE, mapping));

        self.cache = Some((mapping, found));
        found
    }
}

fn index(pt: Pt) -> Option<usize> {
    if !pt.is_valid() {
        return None;
    }
    Some(*pt as usize)
}

fn scan(table: &[Option<PayloadMapping>; TABLE_LEN], mapping: PayloadMapping) -> Option<Pt> {
    table
        .iter()
        .position(|m| *m == Some(mapping))
        .map(|i| Pt::from(i as u8))
}

fn resolve_mime(mime_type: &str, mime_subtype: &str) -> Option<PayloadMapping> {
    let audio = mime_type.eq_ignore_ascii_case("audio");
    let video = mime_type.eq_ignore_ascii_case("video");

    if audio && mime_subtype.eq_ignore_ascii_case("telephone-event") {
        return Some(PayloadMapping::Signal(SignalKind::TelephoneEvent));
    }
    if audio && mime_subtype.eq_ignore_ascii_case("cisco-telephone-event") {
        return Some(PayloadMapping::Signal(SignalKind::CiscoDtmf));
    }
    if audio && mime_subtype.eq_ignore_ascii_case("CN") {
        return Some(PayloadMapping::Signal(SignalKind::ComfortNoise));
    }

    let codec = Codec::from(mime_subtype);
    if codec == Codec::Unknown {
        return None;
    }
    if (audio && codec.is_audio()) || (video && codec.is_video()) {
        return Some(PayloadMapping::Media(codec));
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn static_fallback() {
        let reg = PayloadRegistry::new();
        assert_eq!(
            reg.lookup_by_pt(0.into()),
            Some(PayloadMapping::Media(Codec::Pcmu))
        );
        assert_eq!(reg.lookup_by_pt(1.into()), None);
    }

    #[test]
    fn dynamic_overrides_static() {
        let mut reg = PayloadRegistry::new();
        reg.set_dynamic(18.into(), "audio", "PCMA");
        assert_eq!(
            reg.lookup_by_pt(18.into()),
            Some(PayloadMapping::Media(Codec::Pcma))
        );
        reg.clear_dynamic(18.into());
        assert_eq!(
            reg.lookup_by_pt(18.into()),
            Some(PayloadMapping::Media(Codec::G729))
        );
    }

    #[test]
    fn out_of_range_pt_is_no_mapping() {
        let mut reg = PayloadRegistry::new();
        assert_eq!(reg.lookup_by_pt(200.into()), None);
        reg.set_dynamic(200.into(), "audio", "PCMU");
        assert_eq!(reg.lookup_pt(PayloadMapping::Media(Codec::Pcmu)), Some(0.into()));
    }

    #[test]
    fn reverse_lookup_prefers_dynamic() {
        let mut reg = PayloadRegistry::new();
        reg.set_dynamic(96.into(), "audio", "PCMU");
        assert_eq!(reg.lookup_pt(PayloadMapping::Media(Codec::Pcmu)), Some(96.into()));
    }

    #[test]
    fn reverse_cache_is_never_stale() {
        let mut reg = PayloadRegistry::new();
        let q = PayloadMapping::Media(Codec::Pcmu);

        assert_eq!(reg.lookup_pt(q), Some(0.into()));
        // Repeat hits the cache.
        assert_eq!(reg.lookup_pt(q), Some(0.into()));

        // A different query must not see the old answer.
        assert_eq!(
            reg.lookup_pt(PayloadMapping::Media(Codec::Pcma)),
            Some(8.into())
        );

        // A mutation invalidates the cached pair.
        reg.set_dynamic(96.into(), "audio", "PCMU");
        assert_eq!(reg.lookup_pt(q), Some(96.into()));
    }

    #[test]
    fn mime_resolution() {
        assert_eq!(
            resolve_mime("audio", "telephone-event"),
            Some(PayloadMapping::Signal(SignalKind::TelephoneEvent))
        );
        assert_eq!(
            resolve_mime("video", "H264"),
            Some(PayloadMapping::Media(Codec::H264))
        );
        assert_eq!(resolve_mime("video", "PCMU"), None);
        assert_eq!(resolve_mime("audio", "nonesuch"), None);
    }
}
