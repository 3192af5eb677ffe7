//! Per-packet debug tracing, gated so the hot path stays quiet by default.

use std::net::SocketAddr;

/// Filter deciding whether a session logs each packet it sends or receives.
///
/// Tracing can be enabled globally or narrowed to one peer address, which is the useful
/// mode on a busy box.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketTrace {
    on: bool,
    peer: Option<SocketAddr>,
}

impl PacketTrace {
    /// No packet logging. The default for every new session.
    pub fn off() -> Self {
        PacketTrace::default()
    }

    /// Log every packet.
    pub fn all() -> Self {
        PacketTrace {
            on: true,
            peer: None,
        }
    }

    /// Log only packets to/from one peer.
    pub fn peer(addr: SocketAddr) -> Self {
        PacketTrace {
            on: true,
            peer: Some(addr),
        }
    }

    /// Whether a packet exchanged with `remote` should be logged.
    pub fn active(&self, remote: Option<SocketAddr>) -> bool {
        if !self.on {
            return false;
        }
        match self.peer {
            Some(p) => remote == Some(p),
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filters_by_peer() {
        let a: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:5000".parse().unwrap();

        assert!(!PacketTrace::off().active(Some(a)));
        assert!(PacketTrace::all().active(Some(a)));
        assert!(PacketTrace::all().active(None));

        let t = PacketTrace::peer(a);
        assert!(t.active(Some(a)));
        assert!(!t.active(Some(b)));
        assert!(!t.active(None));
    }
}
