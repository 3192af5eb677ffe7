//! UDP sockets for media legs.
//!
//! The transport is deliberately thin: sessions never touch it, the owning call leg
//! does. It binds within a configured port range, runs nonblocking, and treats send
//! failures as packet loss rather than call failure.

use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};

use thiserror::Error;

use crate::util::NonCryptographicRng;

/// Largest datagram we read off a media socket.
pub const DATAGRAM_MAX_PACKET_SIZE: usize = 2000;

/// Errors from socket setup.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NetError {
    /// No port in the configured range could be bound.
    #[error("no free port in {start}..={end} on {ip}")]
    NoFreePort {
        /// Address the bind was attempted on.
        ip: IpAddr,
        /// Low end of the range.
        start: u16,
        /// High end of the range.
        end: u16,
    },

    /// An io error outside the bind loop.
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// A bound, nonblocking UDP socket for one media leg.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
}

impl UdpTransport {
    /// Bind somewhere in `start..=end` on `ip`.
    ///
    /// The starting port is randomized so concurrent calls spread over the range. With
    /// `even_only` set, odd ports are skipped (RTP convention, leaving odd ports free
    /// for a companion RTCP socket). An inverted range is treated as its ordered form.
    pub fn bind_in_range(
        ip: IpAddr,
        start: u16,
        end: u16,
        even_only: bool,
    ) -> Result<Self, NetError> {
        let (start, end) = if start <= end { (start, end) } else { (end, start) };
        let span = (end - start) as u32 + 1;
        let offset = NonCryptographicRng::u16() as u32 % span;

        for i in 0..span {
            let port = start + ((offset + i) % span) as u16;
            if even_only && port % 2 != 0 {
                continue;
            }
            match UdpSocket::bind(SocketAddr::new(ip, port)) {
                Ok(socket) => {
                    socket.set_nonblocking(true)?;
                    let local = socket.local_addr()?;
                    debug!("Bound media socket {}", local);
                    return Ok(UdpTransport { socket, local });
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(NetError::NoFreePort { ip, start, end })
    }

    /// The bound local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Send one datagram. Failure is logged and swallowed; UDP media is lossy anyway
    /// and one bad send must not tear down the call.
    pub fn send(&self, buf: &[u8], to: SocketAddr) {
        if let Err(e) = self.socket.send_to(buf, to) {
            if e.kind() != io::ErrorKind::WouldBlock {
                debug!("UDP send to {} failed: {}", to, e);
            }
        }
    }

    /// Receive one datagram, if any is ready.
    ///
    /// `Ok(None)` when the socket has nothing. A dead fd means socket state is corrupt
    /// beyond recovery and the process aborts rather than spinning on it.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, NetError> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => {
                #[cfg(unix)]
                if e.raw_os_error() == Some(libc::EBADF) {
                    error!("Media socket fd went bad: {}", e);
                    std::process::abort();
                }
                Err(e.into())
            }
        }
    }

    /// Enable or disable UDP checksum generation on this socket.
    ///
    /// Only effective on Linux (SO_NO_CHECK). Elsewhere this is a no-op and the kernel
    /// default stands.
    #[cfg(target_os = "linux")]
    #[allow(unsafe_code)]
    pub fn set_checksums(&self, enabled: bool) -> Result<(), NetError> {
        let ret = unsafe {
            let no_check: libc::c_int = if enabled { 0 } else { 1 };
            libc::setsockopt(
                self.socket.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_NO_CHECK,
                &no_check as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret != 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// See the Linux variant. No-op here.
    #[cfg(not(target_os = "linux"))]
    pub fn set_checksums(&self, _enabled: bool) -> Result<(), NetError> {
        Ok(())
    }
}

#[cfg(unix)]
impl AsRawFd for UdpTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn binds_in_range() {
        let t = UdpTransport::bind_in_range(LOCALHOST, 39000, 39099, false).unwrap();
        let port = t.local_addr().port();
        assert!(port >= 39000 && port <= 39099);
    }

    #[test]
    fn even_only_skips_odd_ports() {
        for _ in 0..8 {
            let t = UdpTransport::bind_in_range(LOCALHOST, 39100, 39199, true).unwrap();
            assert_eq!(t.local_addr().port() % 2, 0);
        }
    }

    #[test]
    fn inverted_range_is_reordered() {
        let t = UdpTransport::bind_in_range(LOCALHOST, 39499, 39400, false).unwrap();
        let port = t.local_addr().port();
        assert!(port >= 39400 && port <= 39499);
    }

    #[test]
    fn exhausted_range_errors() {
        // A single odd port with even_only can never bind.
        let err = UdpTransport::bind_in_range(LOCALHOST, 39201, 39201, true).unwrap_err();
        assert!(matches!(err, NetError::NoFreePort { .. }));
    }

    #[test]
    fn datagram_roundtrip() {
        let a = UdpTransport::bind_in_range(LOCALHOST, 39300, 39399, false).unwrap();
        let b = UdpTransport::bind_in_range(LOCALHOST, 39300, 39399, false).unwrap();

        a.send(b"hello", b.local_addr());

        let mut buf = [0u8; DATAGRAM_MAX_PACKET_SIZE];
        // Nonblocking: poll briefly for the kernel to deliver.
        let mut got = None;
        for _ in 0..100 {
            if let Some(r) = b.recv(&mut buf).unwrap() {
                got = Some(r);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        let (n, from) = got.expect("datagram arrived");
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from, a.local_addr());
    }
}
