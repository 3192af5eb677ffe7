//! Per-leg RTP session state and the encode/decode hot paths.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::crypto::SrtpProtect;
use crate::format::Codec;
use crate::frame::{Frame, FrameKind};
use crate::trace::PacketTrace;
use crate::util::NonCryptographicRng;

use super::{extend_u16, DtmfReassembler, PayloadMapping, PayloadRegistry, SignalKind};
use super::{RtpError, RtpHeader, SeqNo, Smoother, Ssrc, HEADER_LEN};

/// Timestamp skew tolerance, in wall clock terms. Predictions within this of the
/// elapsed-time timestamp are kept; larger drift snaps to wall clock.
const SKEW_MS: u64 = 80;

/// Most placeholders we synthesize for one sequence gap. Bigger gaps are a stream
/// restart or an attack, not loss.
const MAX_MISSED: u64 = 16;

/// Where the session is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, no peer address yet.
    Idle,
    /// Peer address set, media can flow.
    Active,
    /// Peer cleared. Timestamps and sequence state persist for re-activation.
    Stopped,
}

/// One leg's RTP engine.
///
/// Owned exclusively by the call leg that created it; all methods take `&mut self` and the
/// caller provides `now`. The session never touches a socket.
pub struct RtpSession {
    state: SessionState,
    remote: Option<SocketAddr>,
    ssrc: Ssrc,
    registry: PayloadRegistry,
    dtmf: DtmfReassembler,
    smoother: Option<Smoother>,
    protect: Option<Box<dyn SrtpProtect>>,
    trace: PacketTrace,

    // Send direction.
    seq: SeqNo,
    /// Wall clock and RTP timestamp at the start of the send direction, used to
    /// convert elapsed time into timestamp units.
    tx_anchor: Option<(Instant, u32)>,
    last_tx_ts: u32,
    sent_first: bool,
    tx_buf: Vec<u8>,

    // Receive direction.
    remote_ssrc: Option<Ssrc>,
    rx_anchor: Option<(Instant, u32)>,
    last_rx_seq: Option<SeqNo>,
    cn_warned: bool,
}

impl RtpSession {
    /// A fresh session with a random SSRC and sequence start.
    pub fn new() -> Self {
        RtpSession {
            state: SessionState::Idle,
            remote: None,
            ssrc: Ssrc::new(),
            registry: PayloadRegistry::new(),
            dtmf: DtmfReassembler::new(),
            smoother: None,
            protect: None,
            trace: PacketTrace::off(),
            seq: (NonCryptographicRng::u16() as u64).into(),
            tx_anchor: None,
            last_tx_ts: NonCryptographicRng::u32(),
            sent_first: false,
            tx_buf: Vec::new(),
            remote_ssrc: None,
            rx_anchor: None,
            last_rx_seq: None,
            cn_warned: false,
        }
    }

    /// Our sender source identifier.
    pub fn ssrc(&self) -> Ssrc {
        self.ssrc
    }

    /// Current life cycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peer we are sending to.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Point the session at a peer (or clear it). First set activates the session;
    /// clearing stops it without resetting counters.
    pub fn set_remote(&mut self, remote: Option<SocketAddr>) {
        self.remote = remote;
        self.state = if remote.is_some() {
            SessionState::Active
        } else {
            SessionState::Stopped
        };
    }

    /// The payload type registry for this session, for signaling to populate.
    pub fn registry_mut(&mut self) -> &mut PayloadRegistry {
        &mut self.registry
    }

    /// Attach a smoother so `encode` repacketizes voice input to a fixed size.
    ///
    /// With one attached, `encode` feeds the voice frame in and drains the next full
    /// frame out, returning an empty packet while the buffer is still filling. Configure
    /// the smoother (short-frame mode, byte swap) before attaching.
    pub fn set_smoother(&mut self, smoother: Smoother) {
        self.smoother = Some(smoother);
    }

    /// The attached smoother, if any.
    pub fn smoother_mut(&mut self) -> Option<&mut Smoother> {
        self.smoother.as_mut()
    }

    /// Attach an SRTP capability. Key material and policy live with the caller.
    pub fn set_srtp(&mut self, protect: Box<dyn SrtpProtect>) {
        self.protect = Some(protect);
    }

    /// Packet trace filter for this session's debug logging.
    pub fn set_trace(&mut self, trace: PacketTrace) {
        self.trace = trace;
    }

    /// Explicitly reset timestamp/sequence state, as after a masquerade.
    pub fn reset(&mut self) {
        self.seq = (NonCryptographicRng::u16() as u64).into();
        self.tx_anchor = None;
        self.sent_first = false;
        self.rx_anchor = None;
        self.last_rx_seq = None;
        self.remote_ssrc = None;
        self.dtmf.reset();
    }

    /// Build the wire packet for one voice/video frame.
    ///
    /// The returned slice borrows an internal buffer that is reused by the next call; the
    /// 12 byte header is written into a reserved region in front of the payload. With a
    /// smoother attached, voice frames pass through it first and the result is empty
    /// while the smoother is still short of a full frame.
    pub fn encode(&mut self, frame: &Frame, now: Instant) -> Result<&[u8], RtpError> {
        let codec = match frame.kind {
            FrameKind::Voice(c) | FrameKind::Video(c) => c,
            _ => return Err(RtpError::UnsendableFrame),
        };

        let smoothed;
        let frame = match (&mut self.smoother, &frame.kind) {
            (Some(sm), FrameKind::Voice(_)) => {
                sm.feed(frame)?;
                match sm.read() {
                    Some(f) => {
                        smoothed = f;
                        &smoothed
                    }
                    None => {
                        self.tx_buf.clear();
                        return Ok(&self.tx_buf);
                    }
                }
            }
            _ => frame,
        };

        let pt = self
            .registry
            .lookup_pt(PayloadMapping::Media(codec))
            .ok_or(RtpError::NoPayloadType(codec))?;

        let rate = codec.clock_rate() as u64;
        let skew = (rate * SKEW_MS / 1000) as u32;

        let (anchor_inst, anchor_ts) = *self.tx_anchor.get_or_insert((now, self.last_tx_ts));
        let elapsed_ts = anchor_ts
            .wrapping_add((now.duration_since(anchor_inst).as_millis() as u64 * rate / 1000) as u32);

        let predicted = self.last_tx_ts.wrapping_add(frame.samples);

        let mut marker = frame.marker;
        let ts = if !self.sent_first {
            anchor_ts
        } else if predicted.wrapping_sub(elapsed_ts).wrapping_add(skew) <= 2 * skew {
            predicted
        } else {
            // Drifted past the skew threshold: snap to wall clock, but never behind
            // what we already sent. Timestamps are non-decreasing outside an explicit
            // reset; a burst of frames outrunning wall clock holds at the last value.
            let forward = elapsed_ts.wrapping_sub(self.last_tx_ts) < u32::MAX / 2;
            let snapped = if forward { elapsed_ts } else { self.last_tx_ts };
            // Audio flags a forward jump as a new talkspurt; video keeps the marker
            // for frame boundaries only.
            if forward && codec.is_audio() {
                marker = true;
            }
            self.tx_anchor = Some((now, snapped));
            snapped
        };

        let header = RtpHeader {
            marker,
            payload_type: pt,
            sequence_number: self.seq.as_u16(),
            timestamp: ts,
            ssrc: self.ssrc,
            ..Default::default()
        };

        self.tx_buf.clear();
        self.tx_buf.resize(HEADER_LEN, 0);
        header.write_to(&mut self.tx_buf[..]);
        self.tx_buf.extend_from_slice(&frame.payload);

        if let Some(p) = &mut self.protect {
            p.protect(&mut self.tx_buf)?;
        }

        if self.trace.active(self.remote) {
            debug!(
                "Sent RTP packet to {:?} (type {}, seq {}, ts {}, len {})",
                self.remote,
                pt,
                self.seq.as_u16(),
                ts,
                frame.payload.len()
            );
        }

        self.seq = self.seq.next();
        self.last_tx_ts = ts;
        self.sent_first = true;

        Ok(&self.tx_buf)
    }

    /// Parse one datagram into zero or more frames.
    ///
    /// Malformed input is dropped with a log, never an error. On a sequence gap the skipped
    /// numbers come back as [`FrameKind::Null`] placeholders before the real frame, so
    /// downstream consumers see a contiguous sequence space.
    pub fn decode(&mut self, buf: &[u8], now: Instant) -> Vec<Frame> {
        let mut data = buf.to_vec();

        if let Some(p) = &mut self.protect {
            if let Err(e) = p.unprotect(&mut data) {
                warn!("SRTP unprotect failed: {}", e);
                return Vec::new();
            }
        }

        let Some(header) = RtpHeader::parse(&data) else {
            return Vec::new();
        };

        let mut payload = data[header.header_len..].to_vec();
        if header.has_padding && !RtpHeader::unpad_payload(&mut payload) {
            trace!("RTP padding length larger than payload");
            return Vec::new();
        }

        if self.trace.active(self.remote) {
            debug!(
                "Got RTP packet from {:?} (type {}, seq {}, ts {}, len {})",
                self.remote,
                header.payload_type,
                header.sequence_number,
                header.timestamp,
                payload.len()
            );
        }

        // A changed SSRC is a new stream (masquerade, re-invite). Re-anchor rather
        // than treating it as a giant sequence jump.
        if self.remote_ssrc.is_some() && self.remote_ssrc != Some(header.ssrc) {
            debug!("SSRC changed {:?} -> {}", self.remote_ssrc, header.ssrc);
            self.rx_anchor = None;
            self.last_rx_seq = None;
            self.dtmf.reset();
        }
        self.remote_ssrc = Some(header.ssrc);

        let Some(mapping) = self.registry.lookup_by_pt(header.payload_type) else {
            warn!("Unknown RTP payload type {}", header.payload_type);
            return Vec::new();
        };

        let seq: SeqNo = extend_u16(self.last_rx_seq.map(|s| *s), header.sequence_number).into();

        let mut frames = Vec::new();

        if let Some(prev) = self.last_rx_seq {
            if *seq > *prev + 1 {
                let gap = *seq - *prev - 1;
                if gap <= MAX_MISSED {
                    for missing in (*prev + 1)..*seq {
                        frames.push(Frame::missed(missing.into()));
                    }
                } else {
                    debug!("Sequence jumped by {}, not synthesizing placeholders", gap);
                }
            }
        }

        if self.last_rx_seq.map(|p| *p < *seq).unwrap_or(true) {
            self.last_rx_seq = Some(seq);
        }

        match mapping {
            PayloadMapping::Signal(SignalKind::TelephoneEvent) => {
                if let Some(f) = self.dtmf.rfc2833(&payload, seq) {
                    frames.push(f);
                }
            }
            PayloadMapping::Signal(SignalKind::CiscoDtmf) => {
                if let Some(f) = self.dtmf.legacy(&payload, seq) {
                    frames.push(f);
                }
            }
            PayloadMapping::Signal(SignalKind::ComfortNoise) => {
                if !self.cn_warned {
                    warn!("RFC3389 comfort noise support is incomplete, level only");
                    self.cn_warned = true;
                }
                let level = payload.first().map(|b| b & 0x7f).unwrap_or(0);
                frames.push(Frame {
                    kind: FrameKind::ComfortNoise(level),
                    payload,
                    samples: 0,
                    timestamp: Some(now),
                    seq: Some(seq),
                    marker: header.marker,
                });
            }
            PayloadMapping::Media(codec) => {
                let kind = if codec.is_video() {
                    FrameKind::Video(codec)
                } else {
                    FrameKind::Voice(codec)
                };
                let samples = codec.samples_from_len(payload.len());
                let delivery = self.rx_delivery_time(header.timestamp, header.marker, codec, now);

                frames.push(Frame {
                    kind,
                    payload,
                    samples,
                    timestamp: Some(delivery),
                    seq: Some(seq),
                    marker: header.marker,
                });
            }
        }

        frames
    }

    /// Convert an RTP timestamp into a wall clock delivery time.
    ///
    /// The first seen (or marker flagged) packet anchors its RTP timestamp to `now`; later
    /// packets extrapolate linearly from that anchor.
    fn rx_delivery_time(&mut self, ts: u32, marker: bool, codec: Codec, now: Instant) -> Instant {
        let anchor = match self.rx_anchor {
            Some(a) if !marker => a,
            _ => {
                let a = (now, ts);
                self.rx_anchor = Some(a);
                a
            }
        };

        let (anchor_inst, anchor_ts) = anchor;
        let delta = ts.wrapping_sub(anchor_ts) as i32;
        if delta < 0 {
            // Out of order packet from before the anchor.
            return now;
        }

        let rate = codec.clock_rate() as u64;
        let micros = delta as u64 * 1_000_000 / rate;
        anchor_inst + Duration::from_micros(micros)
    }
}
