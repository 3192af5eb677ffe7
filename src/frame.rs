//! Frames are the unit of media exchanged between a session and its owning call leg.

use std::time::Instant;

use crate::format::Codec;
use crate::rtp::SeqNo;

/// What a [`Frame`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Audio payload in the given codec.
    Voice(Codec),
    /// Video payload in the given codec.
    Video(Codec),
    /// A fully reassembled DTMF digit (`0`-`9`, `*`, `#`, `A`-`D`) or `!` for hook flash.
    Digit(char),
    /// RFC3389 comfort noise with the reported level in -dBov.
    ComfortNoise(u8),
    /// A T.38 IFP payload moved by UDPTL.
    Fax,
    /// Out of band call control, forwarded between bridged legs.
    Control(ControlOp),
    /// Placeholder for a packet that never arrived. Payload is empty.
    Null,
}

/// Control operations a frame can carry between call legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    /// Remote put the call on hold.
    Hold,
    /// Remote resumed the call.
    Unhold,
    /// Request a full video frame from the sender.
    VideoUpdate,
    /// The media source changed (timestamps may jump).
    SrcChange,
}

/// A single unit of media.
///
/// One wire packet can decode into more than one frame (sequence gap placeholders, UDPTL
/// repairs); those come back as a `Vec<Frame>` in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload is.
    pub kind: FrameKind,
    /// The raw payload bytes. Empty for [`FrameKind::Null`] and control frames.
    pub payload: Vec<u8>,
    /// Number of samples the payload represents, in the codec clock rate.
    pub samples: u32,
    /// Wall clock delivery time, anchored by the receiving session.
    pub timestamp: Option<Instant>,
    /// Extended sequence number, when the frame came off (or goes onto) the wire.
    pub seq: Option<SeqNo>,
    /// Marker: end of a video frame, or start of an audio talkspurt.
    pub marker: bool,
}

impl Frame {
    /// An audio frame ready for [`RtpSession::encode`][crate::RtpSession::encode].
    pub fn voice(codec: Codec, payload: Vec<u8>, samples: u32) -> Frame {
        Frame {
            kind: FrameKind::Voice(codec),
            payload,
            samples,
            timestamp: None,
            seq: None,
            marker: false,
        }
    }

    /// A video frame. `marker` flags the last packet of a picture.
    pub fn video(codec: Codec, payload: Vec<u8>, marker: bool) -> Frame {
        Frame {
            kind: FrameKind::Video(codec),
            payload,
            samples: 0,
            timestamp: None,
            seq: None,
            marker,
        }
    }

    /// A T.38 IFP payload for [`UdptlSession::build_packet`][crate::UdptlSession::build_packet].
    pub fn fax(payload: Vec<u8>) -> Frame {
        Frame {
            kind: FrameKind::Fax,
            payload,
            samples: 0,
            timestamp: None,
            seq: None,
            marker: false,
        }
    }

    /// A reassembled DTMF digit.
    pub fn digit(digit: char) -> Frame {
        Frame {
            kind: FrameKind::Digit(digit),
            payload: Vec::new(),
            samples: 0,
            timestamp: None,
            seq: None,
            marker: false,
        }
    }

    /// A control frame.
    pub fn control(op: ControlOp) -> Frame {
        Frame {
            kind: FrameKind::Control(op),
            payload: Vec::new(),
            samples: 0,
            timestamp: None,
            seq: None,
            marker: false,
        }
    }

    /// The placeholder emitted for a sequence number that was skipped on the wire.
    pub fn missed(seq: SeqNo) -> Frame {
        Frame {
            kind: FrameKind::Null,
            payload: Vec::new(),
            samples: 0,
            timestamp: None,
            seq: Some(seq),
            marker: false,
        }
    }

    /// The codec, for voice and video frames.
    pub fn codec(&self) -> Option<Codec> {
        match self.kind {
            FrameKind::Voice(c) | FrameKind::Video(c) => Some(c),
            _ => None,
        }
    }
}
