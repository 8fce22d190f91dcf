//! Input carriers: multicast UDP and line-framed log replay.
//!
//! Both yield raw Ethernet-like frames to the CLI front end's ingestion
//! loop; which one runs is a CLI choice (`-k/--kiss` selects the replay
//! carrier, otherwise the multicast carrier runs).

use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;
use crate::kiss::LineDeframer;

/// Default multicast group used when the bind host is IPv4. IPv6 transport
/// is bound without joining an explicit group (see [`MulticastCarrier::bind`]).
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 1, 2, 3);

/// A bound, joined multicast UDP socket yielding one frame per datagram.
pub struct MulticastCarrier {
    socket: UdpSocket,
}

impl MulticastCarrier {
    /// Bind `host:port` and, for an IPv4 host, join [`DEFAULT_MULTICAST_GROUP`].
    ///
    /// IPv6 binding (the `::` default) is supported but does not join any
    /// particular multicast group: the specification leaves the IPv6
    /// multicast scope/group as a deployment choice, so an unspecified
    /// IPv6 bind here just listens on the given port without a `join`.
    pub fn bind(host: IpAddr, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind((host, port))?;
        // Periodic wakeups let the ingestion loop notice Ctrl+C between
        // datagrams instead of blocking on recv() indefinitely.
        socket.set_read_timeout(Some(Duration::from_millis(500)))?;
        match host {
            IpAddr::V4(_) => {
                socket.join_multicast_v4(&DEFAULT_MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)?;
                log::info!("joined multicast group {DEFAULT_MULTICAST_GROUP} on port {port}");
            }
            IpAddr::V6(_) => {
                log::info!(
                    "bound {host}:{port} (IPv6); no multicast group joined, see design notes"
                );
            }
        }
        Ok(Self { socket })
    }

    /// Wait for the next datagram, writing it into `buf` and returning its
    /// length, or `None` if the read timed out with nothing received.
    pub fn recv_frame(&self, buf: &mut [u8]) -> Result<Option<usize>> {
        match self.socket.recv(buf) {
            Ok(n) => Ok(Some(n)),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Read a line-framed (KISS-style) log file in full and deframe it into the
/// sequence of zero-nibble frames it contains, identical in shape to what
/// the multicast carrier would have yielded live.
pub fn replay_kiss_log(path: &Path) -> Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path)?;
    let mut deframer = LineDeframer::new();
    Ok(deframer.push(&bytes))
}
