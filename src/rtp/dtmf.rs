//! Turns in-band event packets into discrete digit frames.
//!
//! Two wire formats arrive here: RFC2833/RFC4733 telephone-event payloads, and a legacy
//! proprietary format that crams a 5 bit event code into a 32 bit word. Both are refreshed by
//! repeated packets while a key is held, and UDP duplicates the final packet often enough that
//! the whole point of this module is emitting each digit exactly once.

use crate::frame::Frame;

use super::SeqNo;

/// How many refreshes of the same legacy event before we trust it as a digit.
const LEGACY_REFRESHES: u32 = 3;

/// Event codes 0-15 per RFC4733, 16 as the vendor hook flash convention.
fn event_to_char(event: u8) -> Option<char> {
    match event {
        0..=9 => Some((b'0' + event) as char),
        10 => Some('*'),
        11 => Some('#'),
        12..=15 => Some((b'A' + event - 12) as char),
        16 => Some('!'), // hook flash
        _ => None,
    }
}

/// Reassembly state for one direction of one session.
#[derive(Debug, Default)]
pub struct DtmfReassembler {
    /// The digit currently being held down, not yet emitted.
    pending: Option<char>,
    /// Countdown of legacy refreshes before `pending` is emitted.
    countdown: u32,
    /// Sequence number of the last event packet we looked at.
    last_seq: Option<SeqNo>,
    /// Sequence number at which we emitted on an end bit, for dedup of retransmits.
    last_end_seq: Option<SeqNo>,
    /// Duration field of the last packet for the pending digit.
    last_duration: u16,
}

impl DtmfReassembler {
    /// A fresh reassembler with no pending event.
    pub fn new() -> Self {
        DtmfReassembler::default()
    }

    /// Process an RFC2833 telephone-event payload.
    ///
    /// Emits a digit frame when the event completes: on the first end-bit packet for a given
    /// sequence number, when a different digit begins while one is pending, or when the
    /// duration runs backwards (the out-of-order tail of an event that already ended).
    pub fn rfc2833(&mut self, payload: &[u8], seq: SeqNo) -> Option<Frame> {
        if payload.len() < 4 {
            trace!("telephone-event payload too short: {}", payload.len());
            return None;
        }

        let event = payload[0];
        let end = payload[1] & 0x80 > 0;
        let duration = u16::from_be_bytes([payload[2], payload[3]]);

        let Some(digit) = event_to_char(event) else {
            trace!("Ignoring unknown telephone-event {}", event);
            return None;
        };

        let mut emitted = None;

        match self.pending {
            Some(p) if p != digit => {
                // A new digit began before we saw the end of the old one.
                emitted = Some(Frame::digit(p));
                self.begin(digit, duration, seq);
            }
            Some(_) => {
                if end {
                    if self.last_end_seq != Some(seq) {
                        self.last_end_seq = Some(seq);
                        emitted = self.pending.take().map(Frame::digit);
                    }
                } else if duration < self.last_duration {
                    // Duration shrank: the final packet already arrived out of order,
                    // this is a stale refresh. Close the event out.
                    emitted = self.pending.take().map(Frame::digit);
                    self.last_end_seq = Some(seq);
                }
                self.last_duration = duration;
            }
            None => {
                if end {
                    // End for an event we already emitted (duplicate or late packet).
                    if self.last_end_seq != Some(seq) && self.last_seq.is_none() {
                        // An end bit with no begin at all still counts as the digit.
                        self.last_end_seq = Some(seq);
                        emitted = Some(Frame::digit(digit));
                    }
                } else {
                    self.begin(digit, duration, seq);
                }
            }
        }

        self.last_seq = Some(seq);
        emitted
    }

    /// Process a legacy proprietary event payload.
    ///
    /// The format has no end bit. A digit is emitted after a few consecutive refreshes, or
    /// immediately if a different digit supersedes a pending one.
    pub fn legacy(&mut self, payload: &[u8], seq: SeqNo) -> Option<Frame> {
        if payload.len() < 4 {
            trace!("legacy dtmf payload too short: {}", payload.len());
            return None;
        }

        let word = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        let event = (word & 0x1f) as u8;

        let Some(digit) = event_to_char(event) else {
            trace!("Ignoring unknown legacy dtmf event {}", event);
            return None;
        };

        self.last_seq = Some(seq);

        match self.pending {
            Some(p) if p != digit => {
                self.pending = Some(digit);
                self.countdown = LEGACY_REFRESHES;
                Some(Frame::digit(p))
            }
            Some(p) => {
                if self.countdown > 0 {
                    self.countdown -= 1;
                    if self.countdown == 0 {
                        self.pending = None;
                        return Some(Frame::digit(p));
                    }
                }
                None
            }
            None => {
                self.pending = Some(digit);
                self.countdown = LEGACY_REFRESHES;
                None
            }
        }
    }

    /// Forget everything, for a session reset or SSRC change.
    pub fn reset(&mut self) {
        *self = DtmfReassembler::default();
    }

    fn begin(&mut self, digit: char, duration: u16, seq: SeqNo) {
        self.pending = Some(digit);
        self.last_duration = duration;
        self.last_seq = Some(seq);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ev(event: u8, end: bool, duration: u16) -> Vec<u8> {
        let d = duration.to_be_bytes();
        vec![event, if end { 0x8a } else { 0x0a }, d[0], d[1]]
    }

    fn seq(n: u64) -> SeqNo {
        n.into()
    }

    #[test]
    fn digit_on_end_bit() {
        let mut r = DtmfReassembler::new();
        assert!(r.rfc2833(&ev(5, false, 160), seq(1)).is_none());
        assert!(r.rfc2833(&ev(5, false, 320), seq(2)).is_none());
        let f = r.rfc2833(&ev(5, true, 480), seq(3)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('5'));
    }

    #[test]
    fn duplicate_end_packets_emit_once() {
        let mut r = DtmfReassembler::new();
        r.rfc2833(&ev(11, false, 160), seq(1));
        let mut emitted = 0;
        // Five duplicates of the same end packet at one sequence number.
        for _ in 0..5 {
            if r.rfc2833(&ev(11, true, 480), seq(2)).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 1);
    }

    #[test]
    fn new_digit_flushes_pending() {
        let mut r = DtmfReassembler::new();
        r.rfc2833(&ev(1, false, 160), seq(1));
        let f = r.rfc2833(&ev(2, false, 160), seq(2)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('1'));
        let f = r.rfc2833(&ev(2, true, 320), seq(3)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('2'));
    }

    #[test]
    fn shrinking_duration_closes_event() {
        let mut r = DtmfReassembler::new();
        r.rfc2833(&ev(7, false, 480), seq(1));
        // The end packet (seq 3) was reordered before this refresh (seq 2).
        let f = r.rfc2833(&ev(7, false, 160), seq(2)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('7'));
    }

    #[test]
    fn star_hash_letters_flash() {
        assert_eq!(event_to_char(10), Some('*'));
        assert_eq!(event_to_char(11), Some('#'));
        assert_eq!(event_to_char(12), Some('A'));
        assert_eq!(event_to_char(15), Some('D'));
        assert_eq!(event_to_char(16), Some('!'));
        assert_eq!(event_to_char(17), None);
    }

    #[test]
    fn unknown_event_ignored() {
        let mut r = DtmfReassembler::new();
        assert!(r.rfc2833(&ev(99, true, 160), seq(1)).is_none());
    }

    #[test]
    fn legacy_emits_after_refreshes() {
        let mut r = DtmfReassembler::new();
        let p = |event: u8| vec![0, 0, 0, event];
        assert!(r.legacy(&p(3), seq(1)).is_none());
        assert!(r.legacy(&p(3), seq(2)).is_none());
        assert!(r.legacy(&p(3), seq(3)).is_none());
        let f = r.legacy(&p(3), seq(4)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('3'));
        // Further refreshes of the same event are quiet.
        assert!(r.legacy(&p(3), seq(5)).is_none());
    }

    #[test]
    fn legacy_supersede_flushes() {
        let mut r = DtmfReassembler::new();
        let p = |event: u8| vec![0, 0, 0, event];
        r.legacy(&p(4), seq(1));
        let f = r.legacy(&p(5), seq(2)).unwrap();
        assert_eq!(f.kind, crate::frame::FrameKind::Digit('4'));
    }
}
