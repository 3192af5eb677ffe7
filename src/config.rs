//! Engine-level transport configuration.
//!
//! The embedding engine deserializes this from its own config file and hands it to the
//! pieces that need it: port ranges to socket binding, the error correction block to new
//! UDPTL sessions.

use serde::{Deserialize, Serialize};

use crate::udptl::{ErrorCorrection, MAX_FEC_ENTRIES, MAX_FEC_SPAN};

/// Error correction scheme selector, as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EcMode {
    /// No trailer, primary payload only.
    None,
    /// Re-send recent primaries with every packet.
    #[default]
    Redundancy,
    /// XOR forward error correction.
    Fec,
}

/// Configuration for the media transports of one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Lowest RTP port to bind (inclusive).
    pub rtp_start: u16,
    /// Highest RTP port to bind (inclusive).
    pub rtp_end: u16,
    /// Whether UDP checksums are computed on media sockets.
    pub checksums: bool,

    /// Lowest UDPTL port to bind (inclusive).
    pub udptl_start: u16,
    /// Highest UDPTL port to bind (inclusive).
    pub udptl_end: u16,
    /// Error correction scheme for fax sessions.
    pub error_correction: EcMode,
    /// Far end max datagram assumed until signaling updates it.
    pub max_datagram: usize,
    /// FEC payloads per packet.
    pub fec_entries: usize,
    /// Packets covered by each FEC window.
    pub fec_span: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            rtp_start: 5000,
            rtp_end: 31000,
            checksums: true,
            udptl_start: 4500,
            udptl_end: 4999,
            error_correction: EcMode::default(),
            max_datagram: 400,
            fec_entries: 3,
            fec_span: 3,
        }
    }
}

impl TransportConfig {
    /// Configuration with the defaults an unconfigured engine runs with.
    pub fn new() -> Self {
        TransportConfig::default()
    }

    /// Set the RTP port range.
    pub fn set_rtp_ports(mut self, start: u16, end: u16) -> Self {
        self.rtp_start = start.min(end);
        self.rtp_end = end.max(start);
        self
    }

    /// Set the UDPTL port range.
    pub fn set_udptl_ports(mut self, start: u16, end: u16) -> Self {
        self.udptl_start = start.min(end);
        self.udptl_end = end.max(start);
        self
    }

    /// Enable or disable UDP checksums on media sockets.
    pub fn set_checksums(mut self, enabled: bool) -> Self {
        self.checksums = enabled;
        self
    }

    /// Set the fax error correction scheme.
    pub fn set_error_correction(mut self, mode: EcMode) -> Self {
        self.error_correction = mode;
        self
    }

    /// Set FEC parameters. Values are clamped to what the packet history can serve.
    pub fn set_fec(mut self, span: usize, entries: usize) -> Self {
        self.fec_span = span.clamp(1, MAX_FEC_SPAN);
        self.fec_entries = entries.clamp(1, MAX_FEC_ENTRIES);
        self
    }

    /// The [`ErrorCorrection`] a new fax session should start with.
    pub fn error_correction_scheme(&self) -> ErrorCorrection {
        match self.error_correction {
            EcMode::None => ErrorCorrection::None,
            EcMode::Redundancy => ErrorCorrection::Redundancy { entries: 3 },
            EcMode::Fec => ErrorCorrection::Fec {
                span: self.fec_span.clamp(1, MAX_FEC_SPAN),
                entries: self.fec_entries.clamp(1, MAX_FEC_ENTRIES),
            },
        }
    }
}
