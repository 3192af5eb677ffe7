//! RTP packet building and parsing, with per-session timestamp/sequence state.

use thiserror::Error;

mod id;
pub use id::{extend_u16, Pt, SeqNo, Ssrc};

mod header;
pub use header::RtpHeader;
pub(crate) use header::HEADER_LEN;

mod payload;
pub use payload::{PayloadMapping, PayloadRegistry, SignalKind};

mod smoother;
pub use smoother::Smoother;

mod dtmf;
pub use dtmf::DtmfReassembler;

mod session;
pub use session::{RtpSession, SessionState};

use crate::crypto::CryptoError;

/// Errors that can arise in RTP.
///
/// Malformed network input is not among them: decode drops bad packets and returns no frames.
#[derive(Debug, Error)]
pub enum RtpError {
    /// The frame's codec has no negotiated or well-known payload type.
    #[error("no payload type mapped for {0}")]
    NoPayloadType(crate::format::Codec),

    /// A frame kind `encode` cannot put on the wire.
    #[error("frame kind cannot be sent as RTP")]
    UnsendableFrame,

    /// A fed frame would overflow the smoother's fixed buffer.
    #[error("smoother buffer overflow")]
    SmootherFull,

    /// Error arising in the SRTP capability.
    #[error("{0}")]
    Crypto(#[from] CryptoError),
}
