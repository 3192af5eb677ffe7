//! Per-leg UDPTL sequence bookkeeping and packet build/parse.

use std::net::SocketAddr;
use std::time::Instant;

use crate::frame::Frame;
use crate::rtp::{extend_u16, SeqNo};
use crate::trace::PacketTrace;

use super::ec::{fec_repair, parse_trailer, ErrorCorrection, RxRing, Trailer, TxRing};
use super::ec::{MAX_FEC_ENTRIES, MAX_FEC_SPAN};
use super::per::{decode_open_type, encode_open_type};
use super::UdptlError;

/// Largest IFP we are willing to reassemble from the wire, whatever the peer claims.
const LOCAL_MAX_DATAGRAM: usize = 1400;

/// Default far end datagram limit until signaling tells us better.
const DEFAULT_FAR_MAX_DATAGRAM: usize = 400;

/// One leg's UDPTL engine.
///
/// Owned by the call leg that created it. Holds two 16-slot circular histories: sent
/// primaries (to build redundancy/FEC trailers) and received packets plus their FEC
/// records (to repair losses).
pub struct UdptlSession {
    ec: ErrorCorrection,
    remote: Option<SocketAddr>,
    trace: PacketTrace,

    tx_seq: u64,
    tx: TxRing,
    far_max_datagram: usize,

    /// Next sequence number we have not yet delivered upward.
    rx_seq_no: u64,
    /// Highest extended sequence seen, for wraparound extension of the next one.
    last_rx: Option<SeqNo>,
    rx: RxRing,
}

impl UdptlSession {
    /// A session using the given error correction scheme.
    ///
    /// Fails if an FEC configuration exceeds the fixed history capacity.
    pub fn new(ec: ErrorCorrection) -> Result<Self, UdptlError> {
        if let ErrorCorrection::Fec { span, entries } = ec {
            if span > MAX_FEC_SPAN || entries > MAX_FEC_ENTRIES || span == 0 || entries == 0 {
                return Err(UdptlError::FecConfig { span, entries });
            }
        }
        Ok(UdptlSession {
            ec,
            remote: None,
            trace: PacketTrace::off(),
            tx_seq: 0,
            tx: TxRing::new(),
            far_max_datagram: DEFAULT_FAR_MAX_DATAGRAM,
            rx_seq_no: 0,
            last_rx: None,
            rx: RxRing::new(),
        })
    }

    /// The scheme in use.
    pub fn error_correction(&self) -> ErrorCorrection {
        self.ec
    }

    /// The peer we are sending to.
    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    /// Point the session at a peer (or clear it).
    pub fn set_remote(&mut self, remote: Option<SocketAddr>) {
        self.remote = remote;
    }

    /// Set the far end's max datagram size from signaling.
    pub fn set_far_max_datagram(&mut self, max: usize) {
        self.far_max_datagram = max.min(LOCAL_MAX_DATAGRAM);
    }

    /// Packet trace filter for this session's debug logging.
    pub fn set_trace(&mut self, trace: PacketTrace) {
        self.trace = trace;
    }

    /// Build the wire packet carrying one IFP payload.
    ///
    /// An oversize result is rejected whole: nothing is stored, the sequence does not
    /// advance, and the caller drops the IFP.
    pub fn build_packet(&mut self, ifp: &[u8]) -> Result<Vec<u8>, UdptlError> {
        let seq = self.tx_seq;

        let mut out = Vec::with_capacity(ifp.len() + 16);
        out.extend_from_slice(&SeqNo::from(seq).as_u16().to_be_bytes());
        encode_open_type(&mut out, ifp);
        self.ec.encode_trailer(&mut out, &self.tx, seq);

        if out.len() > self.far_max_datagram {
            warn!(
                "UDPTL packet seq {} is {} bytes, over far max datagram {}",
                seq,
                out.len(),
                self.far_max_datagram
            );
            return Err(UdptlError::Oversize {
                len: out.len(),
                max: self.far_max_datagram,
            });
        }

        if self.trace.active(self.remote) {
            debug!(
                "Sent UDPTL packet to {:?} (seq {}, len {})",
                self.remote,
                SeqNo::from(seq).as_u16(),
                out.len()
            );
        }

        self.tx.store(seq, ifp.to_vec());
        self.tx_seq += 1;
        Ok(out)
    }

    /// Parse one datagram into zero or more fax frames, in sequence order.
    ///
    /// Recovered packets (redundancy replays, FEC repairs) come before the packet's own
    /// primary. A stale packet that brings nothing new is an accepted no-op. Malformed
    /// input is dropped with a log.
    pub fn rx_packet(&mut self, buf: &[u8], now: Instant) -> Vec<Frame> {
        if buf.len() < 3 {
            trace!("UDPTL packet too short: {}", buf.len());
            return Vec::new();
        }

        let wire_seq = u16::from_be_bytes([buf[0], buf[1]]);
        let seq = extend_u16(self.last_rx.map(|s| *s), wire_seq);
        let mut pos = 2;

        let Some(primary) = decode_open_type(buf, &mut pos, LOCAL_MAX_DATAGRAM) else {
            return Vec::new();
        };

        let Some(trailer) = parse_trailer(buf, &mut pos, LOCAL_MAX_DATAGRAM) else {
            return Vec::new();
        };

        if self.trace.active(self.remote) {
            debug!(
                "Got UDPTL packet from {:?} (seq {}, len {})",
                self.remote,
                wire_seq,
                buf.len()
            );
        }

        let mut frames = Vec::new();
        let mut run_repair = false;

        match trailer {
            Trailer::Secondary(payloads) => {
                let count = payloads.len() as u64;
                // Entry i re-sends sequence seq - count + i (oldest first). Replay
                // anything not yet delivered.
                for (i, p) in payloads.into_iter().enumerate() {
                    let Some(s) = (seq + i as u64).checked_sub(count) else {
                        continue;
                    };
                    if s >= self.rx_seq_no && self.rx.ifp(s).is_none() {
                        self.rx.store_primary(s, p.clone());
                        frames.push(self.mk_fax(p, s, now));
                    }
                }
            }
            Trailer::Fec {
                span,
                entries,
                payloads,
            } => {
                self.rx.store_fec(seq, span, entries, payloads);
                run_repair = true;
            }
        }

        self.rx.store_primary(seq, primary.clone());

        if run_repair {
            for s in fec_repair(&mut self.rx, seq) {
                if let Some(data) = self.rx.ifp(s).map(|d| d.to_vec()) {
                    frames.push(self.mk_fax(data, s, now));
                }
            }
        }

        if seq >= self.rx_seq_no {
            frames.push(self.mk_fax(primary, seq, now));
        } else {
            trace!("UDPTL seq {} already seen, no-op", wire_seq);
        }

        if self.last_rx.map(|s| *s < seq).unwrap_or(true) {
            self.last_rx = Some(seq.into());
        }
        self.rx_seq_no = self.rx_seq_no.max(seq + 1);

        frames
    }

    fn mk_fax(&self, payload: Vec<u8>, seq: u64, now: Instant) -> Frame {
        let mut f = Frame::fax(payload);
        f.seq = Some(seq.into());
        f.timestamp = Some(now);
        f
    }
}
