//! UDPTL: the T.38 fax transport over UDP.
//!
//! Loss is mitigated, not eliminated. There is no retransmission at this layer; the
//! redundancy/FEC trailers are the substitute.

use thiserror::Error;

mod per;
pub use per::{decode_length, decode_open_type, encode_length, encode_open_type, LengthEncoded};

mod ec;
pub use ec::{ErrorCorrection, MAX_FEC_ENTRIES, MAX_FEC_SPAN};

mod session;
pub use session::UdptlSession;

/// Errors that can arise building UDPTL packets.
///
/// Like RTP, malformed network input is not an error: `rx_packet` drops and logs.
#[derive(Debug, Error)]
pub enum UdptlError {
    /// The built packet would exceed the far end's max datagram size.
    #[error("packet of {len} bytes exceeds far max datagram {max}")]
    Oversize {
        /// Size the packet came out at.
        len: usize,
        /// The negotiated far end limit.
        max: usize,
    },

    /// FEC configuration outside the fixed buffer capacity.
    #[error("FEC span {span}/entries {entries} exceed capacity")]
    FecConfig {
        /// Configured span.
        span: usize,
        /// Configured entries.
        entries: usize,
    },
}
