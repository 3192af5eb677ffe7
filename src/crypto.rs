//! The seam where an SRTP implementation plugs in.
//!
//! The crate itself ships no cipher. A session holds a `Box<dyn SrtpProtect>` supplied
//! by the embedding engine (which knows what it negotiated and against which library),
//! and calls it on every packet in both directions.

use std::fmt;

use thiserror::Error;

/// In-place SRTP protection for one session's packets.
///
/// Implementations transform the full RTP packet (header plus payload) in place,
/// growing the buffer for the auth tag on protect and shrinking it on unprotect.
pub trait SrtpProtect: Send {
    /// Encrypt and authenticate an outgoing packet.
    fn protect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError>;

    /// Verify and decrypt an incoming packet.
    fn unprotect(&mut self, packet: &mut Vec<u8>) -> Result<(), CryptoError>;
}

impl fmt::Debug for dyn SrtpProtect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SrtpProtect")
    }
}

/// Errors surfaced by an [`SrtpProtect`] implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// The packet failed authentication.
    #[error("srtp auth failed")]
    AuthFail,

    /// A replayed or reordered packet outside the replay window.
    #[error("srtp replay check failed")]
    Replay,

    /// Anything else the underlying library reports.
    #[error("srtp: {0}")]
    Other(String),
}
