//! Codec identifiers and the per-codec arithmetic the transport needs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Codecs the transport can carry.
///
/// The transport does no transcoding. The only codec knowledge it needs is the RTP clock rate
/// and how to derive a sample count from a payload length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum Codec {
    Pcmu,
    Pcma,
    Gsm,
    G722,
    G726,
    G729,
    /// 16-bit signed linear.
    Slin,
    Ilbc,
    H261,
    H263,
    H264,
    Unknown,
}

impl Codec {
    /// Tells if codec is audio.
    pub fn is_audio(&self) -> bool {
        use Codec::*;
        matches!(self, Pcmu | Pcma | Gsm | G722 | G726 | G729 | Slin | Ilbc)
    }

    /// Tells if codec is video.
    pub fn is_video(&self) -> bool {
        use Codec::*;
        matches!(self, H261 | H263 | H264)
    }

    /// RTP clock rate in Hz.
    ///
    /// G722 keeps the historical 8 kHz wire clock from RFC 3551 even though it samples at
    /// 16 kHz; peers expect timestamps to advance at 8000/s.
    pub fn clock_rate(&self) -> u32 {
        if self.is_video() {
            90_000
        } else {
            8_000
        }
    }

    /// Number of samples represented by `len` payload bytes.
    ///
    /// For video this is not derivable from the length; the sample count comes from timestamp
    /// deltas instead, so this returns 0.
    pub fn samples_from_len(&self, len: usize) -> u32 {
        use Codec::*;
        let n = match self {
            Pcmu | Pcma | G722 => len,
            Slin => len / 2,
            G726 => len * 2,
            Gsm => len / 33 * 160,
            G729 => len / 10 * 80,
            Ilbc => len / 50 * 240,
            H261 | H263 | H264 | Unknown => 0,
        };
        n as u32
    }
}

impl<'a> From<&'a str> for Codec {
    fn from(v: &'a str) -> Self {
        let lc = v.to_ascii_lowercase();
        match &lc[..] {
            "pcmu" | "g711u" => Codec::Pcmu,
            "pcma" | "g711a" => Codec::Pcma,
            "gsm" => Codec::Gsm,
            "g722" => Codec::G722,
            "g726" | "g726-32" => Codec::G726,
            "g729" | "g729a" => Codec::G729,
            "l16" | "slin" => Codec::Slin,
            "ilbc" => Codec::Ilbc,
            "h261" => Codec::H261,
            "h263" => Codec::H263,
            "h264" => Codec::H264,
            _ => Codec::Unknown,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Pcmu => write!(f, "PCMU"),
            Codec::Pcma => write!(f, "PCMA"),
            Codec::Gsm => write!(f, "GSM"),
            Codec::G722 => write!(f, "G722"),
            Codec::G726 => write!(f, "G726-32"),
            Codec::G729 => write!(f, "G729"),
            Codec::Slin => write!(f, "L16"),
            Codec::Ilbc => write!(f, "iLBC"),
            Codec::H261 => write!(f, "H261"),
            Codec::H263 => write!(f, "H263"),
            Codec::H264 => write!(f, "H264"),
            Codec::Unknown => write!(f, "unknown"),
        }
    }
}
