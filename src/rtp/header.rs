#![allow(clippy::unusual_byte_groupings)]

use super::{Pt, Ssrc};

/// Length of the fixed part of the RTP header.
pub const HEADER_LEN: usize = 12;

/// Parsed header from an RTP packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Always 2.
    pub version: u8,
    /// Whether the RTP packet has padding to be an equal of 4 bytes.
    pub has_padding: bool,
    /// RTP packet has "RTP header extensions".
    pub has_extension: bool,
    /// For video, this marker signifies the end of a series of packets that
    /// together form a single video frame.
    /// For audio, it marks the beginning of a talkspurt, which is a burst of
    /// audio packets.
    pub marker: bool,
    /// Type of payload being carried. What this correlates to is negotiated by signaling.
    pub payload_type: Pt,
    /// Sequence number increasing by 1 for each RTP packet.
    pub sequence_number: u16,
    /// Timestamp in media time for the RTP packet. What the media time base is depends
    /// on the codec.
    pub timestamp: u32,
    /// Sender source identifier.
    pub ssrc: Ssrc,
    /// Length of header, including csrc list and extensions.
    pub header_len: usize,
}

impl RtpHeader {
    /// Write the fixed 12 byte header into the reserved region at the front of `buf`.
    ///
    /// The caller reserves [`HEADER_LEN`] bytes before the payload so no payload copy is
    /// needed. We never emit csrc or header extensions.
    pub(crate) fn write_to(&self, buf: &mut [u8]) -> usize {
        buf[0] = 0b10_0_0_0000 | if self.has_padding { 1 << 5 } else { 0 };

        assert!(*self.payload_type <= 127);
        buf[1] = *self.payload_type & 0b0111_1111 | if self.marker { 1 << 7 } else { 0 };

        buf[2..4].copy_from_slice(&self.sequence_number.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        HEADER_LEN
    }

    /// Strip the trailing padding bytes indicated by the padding bit.
    ///
    /// The last byte is the pad count, including itself.
    pub(crate) fn unpad_payload(buf: &mut Vec<u8>) -> bool {
        if buf.is_empty() {
            return true;
        }
        let pad_len = buf[buf.len() - 1] as usize;
        let Some(unpadded_len) = buf.len().checked_sub(pad_len) else {
            return false;
        };
        buf.truncate(unpadded_len);
        true
    }

    /// Parse the header of an RTP packet. `None` when the buffer does not start with a
    /// valid version 2 header.
    pub fn parse(buf: &[u8]) -> Option<RtpHeader> {
        let orig_len = buf.len();
        if buf.len() < HEADER_LEN {
            trace!("RTP header too short < 12: {}", buf.len());
            return None;
        }

        let version = (buf[0] & 0b1100_0000) >> 6;
        if version != 2 {
            trace!("RTP version is not 2");
            return None;
        }
        let has_padding = buf[0] & 0b0010_0000 > 0;
        let has_extension = buf[0] & 0b0001_0000 > 0;
        let csrc_count = (buf[0] & 0b0000_1111) as usize;
        let marker = buf[1] & 0b1000_0000 > 0;
        let payload_type = (buf[1] & 0b0111_1111).into();
        let sequence_number = u16::from_be_bytes([buf[2], buf[3]]);

        let timestamp = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);

        let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);

        let buf: &[u8] = &buf[HEADER_LEN..];

        let csrc_len = 4 * csrc_count;
        if buf.len() < csrc_len {
            trace!("RTP header invalid, not enough csrc");
            return None;
        }

        let buf: &[u8] = &buf[csrc_len..];

        // A variable length extension header we skip over. The contents are profile
        // specific and nothing a PBX media path consumes.
        let rest = if !has_extension {
            buf
        } else {
            if buf.len() < 4 {
                trace!("RTP bad header extension");
                return None;
            }

            let ext_words = u16::from_be_bytes([buf[2], buf[3]]);
            let ext_len = ext_words as usize * 4;

            let buf: &[u8] = &buf[4..];

            if buf.len() < ext_len {
                trace!("RTP ext len larger than header {} > {}", ext_len, buf.len());
                return None;
            }

            &buf[ext_len..]
        };

        let header_len = orig_len - rest.len();

        let ret = RtpHeader {
            version,
            has_padding,
            has_extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc: ssrc.into(),
            header_len,
        };

        Some(ret)
    }
}

impl Default for RtpHeader {
    fn default() -> Self {
        Self {
            version: 2,
            has_padding: false,
            has_extension: false,
            marker: false,
            payload_type: 0.into(),
            sequence_number: 0,
            timestamp: 0,
            ssrc: 0.into(),
            header_len: HEADER_LEN,
        }
    }
}
