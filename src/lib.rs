//! A Sans I/O RTP/UDPTL media transport core for telephony engines.
//!
//! This is a [Sans I/O][sansio] implementation meaning the sessions themselves are not doing any
//! network talking. Furthermore there are no internal threads or async tasks. All operations are
//! happening from the calls of the public API.
//!
//! tr0nk is the packet-level half of a PBX media path: a signaling layer (SIP or otherwise) has
//! already agreed on endpoints and codecs, and this crate moves the audio/video/fax payload on
//! and off the wire.
//!
//! * [`RtpSession`] builds and parses RTP packets: payload type negotiation, timestamp and
//!   sequence bookkeeping, RFC2833 DTMF reassembly and comfort noise.
//! * [`UdptlSession`] is the T.38 fax transport over UDP, with PER-style open type framing and
//!   two interchangeable error correction schemes (redundancy and FEC).
//! * [`bridge::NativeBridge`] points two call legs' transports directly at each other so media
//!   bypasses the channel layer's own read/write loop.
//!
//! # Driving the sessions
//!
//! The owning call leg reads its own socket (directly or via an external reactor registered
//! against [`UdpTransport`][net::UdpTransport]'s fd) and feeds datagrams to the session:
//!
//! ```no_run
//! use std::time::Instant;
//! use tr0nk::format::Codec;
//! use tr0nk::frame::Frame;
//! use tr0nk::rtp::RtpSession;
//!
//! let mut session = RtpSession::new();
//! session.set_remote(Some("198.51.100.7:14000".parse().unwrap()));
//!
//! // Outbound: a codec frame from the channel becomes a wire packet.
//! let frame = Frame::voice(Codec::Pcmu, vec![0x7f; 160], 160);
//! let packet = session.encode(&frame, Instant::now()).unwrap().to_vec();
//! // ... send packet over UDP ...
//!
//! // Inbound: a datagram becomes zero or more frames.
//! # let datagram: &[u8] = &[];
//! for frame in session.decode(datagram, Instant::now()) {
//!     // hand to the channel layer
//! }
//! ```
//!
//! Malformed network input is never an `Err`: decode paths drop the packet, log, and return no
//! frames. Errors are reserved for construction failures and local misuse (oversized frames,
//! unmapped payload types).
//!
//! [sansio]: https://sans-io.readthedocs.io
#![deny(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

use std::io;

use thiserror::Error;

pub mod format;

pub mod frame;

pub mod rtp;
use rtp::RtpError;
#[doc(inline)]
pub use rtp::RtpSession;

pub mod udptl;
use udptl::UdptlError;
#[doc(inline)]
pub use udptl::UdptlSession;

pub mod bridge;
use bridge::BridgeError;

pub mod net;
use net::NetError;

mod config;
pub use config::{EcMode, TransportConfig};

mod trace;
pub use trace::PacketTrace;

pub mod crypto;
use crypto::CryptoError;

mod util;

/// Errors for the whole crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// RTP session errors.
    #[error("{0}")]
    Rtp(#[from] RtpError),

    /// UDPTL session errors.
    #[error("{0}")]
    Udptl(#[from] UdptlError),

    /// Native bridging errors.
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    /// Socket and transport errors.
    #[error("{0}")]
    Net(#[from] NetError),

    /// SRTP capability errors.
    #[error("{0}")]
    Crypto(#[from] CryptoError),

    /// Other io error.
    #[error("{0}")]
    Io(#[from] io::Error),
}
