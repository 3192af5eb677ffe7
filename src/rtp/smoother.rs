//! Repacks arbitrarily sized codec frames into the fixed size a transport wants.
//!
//! Channel drivers hand us whatever the far side of the bridge produced; the wire side of an
//! RTP session usually wants a fixed packetization (160 samples of u-law per 20 ms packet).

use crate::format::Codec;
use crate::frame::Frame;

use super::RtpError;

/// Internal buffer capacity. A frame can never grow the buffer past this.
const CAPACITY: usize = 8192;

/// How many passthrough near-misses before we give up on the zero-copy path.
const OPT_TRIES: u32 = 3;

/// Accepts frames of arbitrary length for one codec and emits frames of exactly
/// the configured size.
#[derive(Debug)]
pub struct Smoother {
    codec: Codec,
    size: usize,
    buf: Vec<u8>,
    /// Codec mode that drops trailing sub-frame fragments on flush instead of
    /// emitting a truncated voice frame.
    short_frame: bool,
    /// Byte-swap 16-bit words while copying in, for big-endian wire formats.
    swap: bool,
    /// A frame held for zero-copy passthrough, handed out by the next `read`.
    deferred: Option<Frame>,
    opt_misses: u32,
}

impl Smoother {
    /// A smoother emitting `size`-byte frames of `codec`.
    pub fn new(codec: Codec, size: usize) -> Self {
        assert!(size > 0 && size <= CAPACITY);
        Smoother {
            codec,
            size,
            buf: Vec::with_capacity(CAPACITY),
            short_frame: false,
            swap: false,
            deferred: None,
            opt_misses: 0,
        }
    }

    /// Enable dropping of trailing fragments shorter than a full frame.
    pub fn set_short_frame(&mut self, v: bool) {
        self.short_frame = v;
    }

    /// Enable 16-bit byte swapping (big-endian linear on the wire).
    pub fn set_swap(&mut self, v: bool) {
        self.swap = v;
    }

    /// Feed one frame in. Frames that would overflow the internal buffer are an error
    /// and leave the smoother unchanged.
    pub fn feed(&mut self, frame: &Frame) -> Result<(), RtpError> {
        let payload = &frame.payload;

        if self.buf.len() + payload.len() > CAPACITY {
            return Err(RtpError::SmootherFull);
        }

        // Optimizable passthrough: an exact-size frame landing on an empty buffer is
        // forwarded without copying. Streams that keep almost lining up pay for the
        // bookkeeping without the win, so the path is abandoned after a few misses.
        if self.opt_misses < OPT_TRIES && !self.swap && self.deferred.is_none() {
            if payload.len() == self.size && self.buf.is_empty() {
                self.deferred = Some(frame.clone());
                return Ok(());
            }
            if payload.len() == self.size {
                self.opt_misses += 1;
                if self.opt_misses == OPT_TRIES {
                    trace!("Smoother passthrough abandoned after {} misses", OPT_TRIES);
                }
            }
        }

        if self.swap {
            let mut it = payload.chunks_exact(2);
            for pair in &mut it {
                self.buf.push(pair[1]);
                self.buf.push(pair[0]);
            }
            self.buf.extend_from_slice(it.remainder());
        } else {
            self.buf.extend_from_slice(payload);
        }

        Ok(())
    }

    /// Slice off the next full frame, if one is ready.
    pub fn read(&mut self) -> Option<Frame> {
        if let Some(f) = self.deferred.take() {
            return Some(f);
        }

        if self.buf.len() < self.size {
            return None;
        }

        let rest = self.buf.split_off(self.size);
        let payload = std::mem::replace(&mut self.buf, rest);
        Some(self.mk_frame(payload))
    }

    /// Emit whatever remains, for end of stream.
    ///
    /// In short-frame mode a trailing fragment is dropped rather than sent as a
    /// truncated voice frame.
    pub fn flush(&mut self) -> Option<Frame> {
        if let Some(f) = self.deferred.take() {
            return Some(f);
        }
        if self.buf.is_empty() {
            return None;
        }
        if self.short_frame && self.buf.len() < self.size {
            trace!("Dropping {} byte trailing fragment", self.buf.len());
            self.buf.clear();
            return None;
        }
        let payload = std::mem::take(&mut self.buf);
        Some(self.mk_frame(payload))
    }

    fn mk_frame(&self, payload: Vec<u8>) -> Frame {
        let samples = self.codec.samples_from_len(payload.len());
        Frame::voice(self.codec, payload, samples)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn voice(len: usize) -> Frame {
        Frame::voice(Codec::Pcmu, vec![0x55; len], len as u32)
    }

    #[test]
    fn exact_size_passes_through() {
        let mut s = Smoother::new(Codec::Pcmu, 160);
        s.feed(&voice(160)).unwrap();
        let out = s.read().unwrap();
        assert_eq!(out.payload.len(), 160);
        assert_eq!(out.samples, 160);
        assert!(s.read().is_none());
    }

    #[test]
    fn regroups_odd_sizes() {
        let mut s = Smoother::new(Codec::Pcmu, 160);
        s.feed(&voice(100)).unwrap();
        assert!(s.read().is_none());
        s.feed(&voice(100)).unwrap();
        let out = s.read().unwrap();
        assert_eq!(out.payload.len(), 160);
        assert!(s.read().is_none());
        s.feed(&voice(120)).unwrap();
        let out = s.read().unwrap();
        assert_eq!(out.payload.len(), 160);
    }

    #[test]
    fn passthrough_abandoned_after_misses() {
        let mut s = Smoother::new(Codec::Pcmu, 160);
        // Leave 40 bytes in the buffer so exact-size frames are near-misses.
        s.feed(&voice(40)).unwrap();
        for _ in 0..OPT_TRIES {
            s.feed(&voice(160)).unwrap();
            while s.read().is_some() {}
        }
        // Round out the leftover so the buffer is empty again.
        s.feed(&voice(120)).unwrap();
        assert_eq!(s.read().unwrap().payload.len(), 160);
        assert!(s.read().is_none());

        // Even on an empty buffer the fast path stays off now.
        s.feed(&voice(160)).unwrap();
        assert!(s.deferred.is_none());
        assert_eq!(s.read().unwrap().payload.len(), 160);
    }

    #[test]
    fn overflow_is_error() {
        let mut s = Smoother::new(Codec::Pcmu, 160);
        s.feed(&voice(8000)).unwrap();
        assert!(matches!(s.feed(&voice(8000)), Err(RtpError::SmootherFull)));
    }

    #[test]
    fn swap_flips_pairs() {
        let mut s = Smoother::new(Codec::Slin, 4);
        s.set_swap(true);
        let f = Frame::voice(Codec::Slin, vec![1, 2, 3, 4], 2);
        s.feed(&f).unwrap();
        assert_eq!(s.read().unwrap().payload, vec![2, 1, 4, 3]);
    }

    #[test]
    fn short_frame_drops_fragment() {
        let mut s = Smoother::new(Codec::G729, 20);
        s.set_short_frame(true);
        s.feed(&Frame::voice(Codec::G729, vec![0; 25], 200)).unwrap();
        assert_eq!(s.read().unwrap().payload.len(), 20);
        assert!(s.flush().is_none());
    }

    #[test]
    fn flush_emits_remainder() {
        let mut s = Smoother::new(Codec::Pcmu, 160);
        s.feed(&voice(100)).unwrap();
        assert_eq!(s.flush().unwrap().payload.len(), 100);
    }
}
