//! The three UDPTL resilience schemes and the packet history they work over.
//!
//! Redundancy re-sends recent primaries verbatim; FEC sends XOR combinations of strided
//! windows over the send history so a single missing packet per window can be rebuilt.

use super::per::{encode_length, encode_open_type};
use super::per::{decode_length, decode_open_type, LengthEncoded};

/// Slots in the tx/rx packet history. Indexed by `seq & 0xf`.
pub(crate) const RING_LEN: usize = 16;

/// Upper bound for FEC span; the rx slot FEC records are sized for this.
pub const MAX_FEC_SPAN: usize = 5;

/// Upper bound for FEC entries per packet.
pub const MAX_FEC_ENTRIES: usize = 5;

/// Most secondary packets we accept in one redundancy trailer.
const MAX_SECONDARY: usize = 16;

/// The error correction scheme of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCorrection {
    /// Primary payload only.
    None,
    /// Re-send the last `entries` primaries with every packet.
    Redundancy {
        /// How many previous packets each packet carries.
        entries: usize,
    },
    /// XOR based forward error correction.
    Fec {
        /// Window depth: how many packets each FEC entry covers.
        span: usize,
        /// FEC payloads per packet, also the window stride.
        entries: usize,
    },
}

/// Send history. Raw primary payloads, kept to build redundancy/FEC trailers.
#[derive(Debug)]
pub(crate) struct TxRing {
    slots: Vec<Option<(u64, Vec<u8>)>>,
}

impl TxRing {
    pub fn new() -> Self {
        TxRing {
            slots: (0..RING_LEN).map(|_| None).collect(),
        }
    }

    pub fn store(&mut self, seq: u64, data: Vec<u8>) {
        self.slots[(seq as usize) & (RING_LEN - 1)] = Some((seq, data));
    }

    pub fn get(&self, seq: u64) -> Option<&[u8]> {
        match &self.slots[(seq as usize) & (RING_LEN - 1)] {
            Some((s, data)) if *s == seq => Some(data),
            _ => None,
        }
    }
}

/// Receive history slot: the primary (once seen or repaired) plus any FEC data the
/// packet carried.
#[derive(Debug)]
pub(crate) struct RxSlot {
    seq: u64,
    ifp: Option<Vec<u8>>,
    fec_span: usize,
    fec_entries: usize,
    fec: Vec<Vec<u8>>,
}

impl RxSlot {
    fn new(seq: u64) -> Self {
        RxSlot {
            seq,
            ifp: None,
            fec_span: 0,
            fec_entries: 0,
            fec: Vec::new(),
        }
    }
}

/// Receive history.
#[derive(Debug)]
pub(crate) struct RxRing {
    slots: Vec<Option<RxSlot>>,
}

impl RxRing {
    pub fn new() -> Self {
        RxRing {
            slots: (0..RING_LEN).map(|_| None).collect(),
        }
    }

    pub fn ifp(&self, seq: u64) -> Option<&[u8]> {
        match &self.slots[(seq as usize) & (RING_LEN - 1)] {
            Some(slot) if slot.seq == seq => slot.ifp.as_deref(),
            _ => None,
        }
    }

    fn entry(&mut self, seq: u64) -> &mut RxSlot {
        let idx = (seq as usize) & (RING_LEN - 1);
        let stale = !matches!(&self.slots[idx], Some(slot) if slot.seq == seq);
        if stale {
            self.slots[idx] = Some(RxSlot::new(seq));
        }
        self.slots[idx].as_mut().expect("slot just filled")
    }

    pub fn store_primary(&mut self, seq: u64, ifp: Vec<u8>) {
        self.entry(seq).ifp = Some(ifp);
    }

    pub fn store_fec(&mut self, seq: u64, span: usize, entries: usize, payloads: Vec<Vec<u8>>) {
        let slot = self.entry(seq);
        slot.fec_span = span;
        slot.fec_entries = entries;
        slot.fec = payloads;
    }

    fn fec_of(&self, seq: u64) -> Option<(usize, usize, &[Vec<u8>])> {
        match &self.slots[(seq as usize) & (RING_LEN - 1)] {
            Some(slot) if slot.seq == seq && !slot.fec.is_empty() => {
                Some((slot.fec_span, slot.fec_entries, &slot.fec))
            }
            _ => None,
        }
    }
}

impl ErrorCorrection {
    /// Append the scheme's trailer for packet `seq` to `out`.
    ///
    /// The first trailer byte doubles as the PER choice bit: high bit set means FEC,
    /// clear means the byte starts the secondary count (zero for no correction).
    pub(crate) fn encode_trailer(&self, out: &mut Vec<u8>, tx: &TxRing, seq: u64) {
        match *self {
            ErrorCorrection::None => {
                encode_length(out, 0);
            }
            ErrorCorrection::Redundancy { entries } => {
                let count = entries.min(seq as usize);
                encode_length(out, count);
                // Oldest first.
                for s in (seq - count as u64)..seq {
                    let data = tx.get(s).unwrap_or(&[]);
                    encode_open_type(out, data);
                }
            }
            ErrorCorrection::Fec { span, entries } => {
                let (span, entries) = ramp(span, entries, seq);

                out.push(0x80);
                // Span is an unconstrained integer on the wire: 1 length byte, then the value.
                out.push(0x01);
                out.push(span as u8);
                out.push(entries as u8);

                for m in 0..entries {
                    let mut fec: Vec<u8> = Vec::new();
                    for k in 1..=span {
                        let Some(s) = (seq + m as u64).checked_sub((entries * k) as u64) else {
                            continue;
                        };
                        let Some(data) = tx.get(s) else {
                            continue;
                        };
                        xor_into(&mut fec, data);
                    }
                    encode_open_type(out, &fec);
                }
            }
        }
    }
}

/// Wind the FEC up smoothly while the send history is still filling, so trailers
/// never reference packets that were never sent.
fn ramp(span: usize, entries: usize, seq: u64) -> (usize, usize) {
    if (seq as usize) < span * entries {
        let e = seq as usize / span;
        let s = if (seq as usize) < span { 0 } else { span };
        (s, e)
    } else {
        (span, entries)
    }
}

fn xor_into(acc: &mut Vec<u8>, data: &[u8]) {
    if acc.len() < data.len() {
        acc.resize(data.len(), 0);
    }
    for (a, b) in acc.iter_mut().zip(data) {
        *a ^= *b;
    }
}

/// A parsed error correction trailer.
#[derive(Debug)]
pub(crate) enum Trailer {
    /// Zero or more re-sent primaries, oldest first.
    Secondary(Vec<Vec<u8>>),
    /// FEC record for the carrying packet.
    Fec {
        span: usize,
        entries: usize,
        payloads: Vec<Vec<u8>>,
    },
}

/// Parse the trailer at `*pos`. `None` means the packet is dropped.
pub(crate) fn parse_trailer(buf: &[u8], pos: &mut usize, limit: usize) -> Option<Trailer> {
    let first = *buf.get(*pos)?;

    if first & 0x80 == 0 {
        let count = match decode_length(buf, pos)? {
            LengthEncoded::Complete(n) => n,
            LengthEncoded::Fragment(_) => {
                trace!("UDPTL fragmented secondary count");
                return None;
            }
        };
        if count > MAX_SECONDARY {
            warn!("UDPTL secondary count {} exceeds capacity", count);
            return None;
        }
        let mut payloads = Vec::with_capacity(count);
        for _ in 0..count {
            payloads.push(decode_open_type(buf, pos, limit)?);
        }
        return Some(Trailer::Secondary(payloads));
    }

    // FEC: tag byte, 1-byte integer marker, span, entries, then the payloads.
    *pos += 1;
    if *buf.get(*pos)? != 0x01 {
        trace!("UDPTL FEC span is not a 1 byte integer");
        return None;
    }
    let span = *buf.get(*pos + 1)? as usize;
    let entries = *buf.get(*pos + 2)? as usize;
    *pos += 3;

    if span > MAX_FEC_SPAN || entries > MAX_FEC_ENTRIES {
        warn!("UDPTL FEC span {}/entries {} exceed capacity", span, entries);
        return None;
    }

    let mut payloads = Vec::with_capacity(entries);
    for _ in 0..entries {
        payloads.push(decode_open_type(buf, pos, limit)?);
    }
    Some(Trailer::Fec {
        span,
        entries,
        payloads,
    })
}

/// Try to rebuild missing primaries from the FEC records in the rx history.
///
/// For every FEC output, scan its strided window; if exactly one slot in the window is
/// missing, it is the XOR of the FEC payload with every present slot. Returns the newly
/// repaired sequence numbers in ascending order. Two losses inside one window stay lost;
/// that is the scheme's documented limit, not a bug.
pub(crate) fn fec_repair(rx: &mut RxRing, seq: u64) -> Vec<u64> {
    let mut repaired = Vec::new();
    let low = seq.saturating_sub((RING_LEN - 1) as u64);

    let mut progress = true;
    while progress {
        progress = false;

        for l in (low..=seq).rev() {
            let Some((span, entries, payloads)) = rx.fec_of(l) else {
                continue;
            };
            let payloads = payloads.to_vec();

            for m in 0..entries {
                let Some(window) = window_seqs(l, m, span, entries, low) else {
                    continue;
                };

                let mut missing = window.iter().filter(|s| rx.ifp(**s).is_none());
                let (Some(&target), None) = (missing.next(), missing.next()) else {
                    continue;
                };

                let mut data = payloads[m].clone();
                for &s in &window {
                    if s == target {
                        continue;
                    }
                    let other = rx.ifp(s).expect("present slot");
                    for (j, byte) in data.iter_mut().enumerate() {
                        *byte ^= other.get(j).copied().unwrap_or(0);
                    }
                }

                rx.store_primary(target, data);
                repaired.push(target);
                progress = true;
            }
        }
    }

    repaired.sort_unstable();
    repaired
}

/// The sequence numbers covered by FEC output `m` of packet `l`: `span` packets strided
/// by `entries`, ending one stride before `l + m`. `None` if the window reaches before
/// the start of the stream or outside the retained history.
fn window_seqs(l: u64, m: usize, span: usize, entries: usize, low: u64) -> Option<Vec<u64>> {
    if span == 0 || entries == 0 {
        return None;
    }
    let mut seqs = Vec::with_capacity(span);
    for k in 1..=span {
        let s = (l + m as u64).checked_sub((entries * k) as u64)?;
        if s < low {
            return None;
        }
        seqs.push(s);
    }
    Some(seqs)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn none_trailer_is_single_zero() {
        let tx = TxRing::new();
        let mut out = Vec::new();
        ErrorCorrection::None.encode_trailer(&mut out, &tx, 5);
        assert_eq!(out, vec![0]);

        let mut pos = 0;
        let t = parse_trailer(&out, &mut pos, 1024).unwrap();
        assert!(matches!(t, Trailer::Secondary(p) if p.is_empty()));
    }

    #[test]
    fn redundancy_carries_recent_oldest_first() {
        let mut tx = TxRing::new();
        tx.store(0, vec![0x10]);
        tx.store(1, vec![0x11]);
        tx.store(2, vec![0x12]);

        let ec = ErrorCorrection::Redundancy { entries: 2 };
        let mut out = Vec::new();
        ec.encode_trailer(&mut out, &tx, 3);

        let mut pos = 0;
        let Trailer::Secondary(p) = parse_trailer(&out, &mut pos, 1024).unwrap() else {
            panic!("expected secondary");
        };
        assert_eq!(p, vec![vec![0x11], vec![0x12]]);
    }

    #[test]
    fn redundancy_clamps_at_stream_start() {
        let mut tx = TxRing::new();
        tx.store(0, vec![0x10]);
        let ec = ErrorCorrection::Redundancy { entries: 3 };
        let mut out = Vec::new();
        ec.encode_trailer(&mut out, &tx, 1);

        let mut pos = 0;
        let Trailer::Secondary(p) = parse_trailer(&out, &mut pos, 1024).unwrap() else {
            panic!("expected secondary");
        };
        assert_eq!(p, vec![vec![0x10]]);
    }

    #[test]
    fn fec_ramp_up() {
        assert_eq!(ramp(3, 3, 0), (0, 0));
        assert_eq!(ramp(3, 3, 2), (0, 0));
        assert_eq!(ramp(3, 3, 3), (3, 1));
        assert_eq!(ramp(3, 3, 8), (3, 2));
        assert_eq!(ramp(3, 3, 9), (3, 3));
        assert_eq!(ramp(3, 3, 100), (3, 3));
    }

    #[test]
    fn fec_trailer_roundtrip() {
        let mut tx = TxRing::new();
        for s in 0..12 {
            tx.store(s, vec![s as u8; 4]);
        }
        let ec = ErrorCorrection::Fec { span: 3, entries: 3 };
        let mut out = Vec::new();
        ec.encode_trailer(&mut out, &tx, 12);

        let mut pos = 0;
        let Trailer::Fec { span, entries, payloads } = parse_trailer(&out, &mut pos, 1024).unwrap()
        else {
            panic!("expected fec");
        };
        assert_eq!(span, 3);
        assert_eq!(entries, 3);
        assert_eq!(payloads.len(), 3);
        // Window for m=0 at seq 12: packets 3, 6, 9.
        assert_eq!(payloads[0], vec![3 ^ 6 ^ 9; 4]);
    }

    #[test]
    fn fec_over_capacity_dropped() {
        let buf = [0x80, 0x01, 6, 3, 0, 0, 0];
        let mut pos = 0;
        assert!(parse_trailer(&buf, &mut pos, 1024).is_none());
    }

    #[test]
    fn single_loss_repaired() {
        let mut rx = RxRing::new();
        // Receiver saw 3, 6 and 9 but the FEC-carrying packet 12 covers them; drop 6.
        rx.store_primary(3, vec![3; 4]);
        rx.store_primary(9, vec![9; 4]);
        rx.store_fec(12, 3, 3, vec![vec![3 ^ 6 ^ 9; 4], vec![0; 4], vec![0; 4]]);
        // The other two windows reference packets we never stored; only m=0 can act,
        // and slots 4,5,7,8,10,11 missing makes their windows ambiguous. Fill them.
        for s in [4, 5, 7, 8, 10, 11] {
            rx.store_primary(s, vec![0; 4]);
        }

        let repaired = fec_repair(&mut rx, 12);
        assert_eq!(repaired, vec![6]);
        assert_eq!(rx.ifp(6).unwrap(), &[6; 4]);
    }

    #[test]
    fn double_loss_in_window_not_repaired() {
        let mut rx = RxRing::new();
        rx.store_primary(9, vec![9; 4]);
        rx.store_fec(12, 3, 3, vec![vec![3 ^ 6 ^ 9; 4], vec![0; 4], vec![0; 4]]);
        for s in [4, 5, 7, 8, 10, 11] {
            rx.store_primary(s, vec![0; 4]);
        }

        // Both 3 and 6 missing from the same window: nothing to do.
        let repaired = fec_repair(&mut rx, 12);
        assert!(repaired.is_empty());
    }
}
