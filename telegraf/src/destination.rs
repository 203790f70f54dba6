use std::{
    fmt,
    io::{self, Write as _},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, TcpStream, ToSocketAddrs as _, UdpSocket},
    path::{Path, PathBuf},
    str::FromStr,
};

#[cfg(unix)]
use std::os::unix::net::{UnixDatagram, UnixStream};

use url::{Host, ParseError, Url};

use crate::error::Error;

/// Destination used when none is configured: a Telegraf `socket_listener` on the local host, over UDP.
pub const DEFAULT_DESTINATION: &str = "udp://localhost:8094";

/// Address family a network destination is restricted to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    /// Either IPv4 or IPv6.
    Any,

    /// IPv4 only.
    V4,

    /// IPv6 only.
    V6,
}

impl Family {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            Family::Any => true,
            Family::V4 => addr.is_ipv4(),
            Family::V6 => addr.is_ipv6(),
        }
    }
}

/// Transport used to reach a destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Unix domain socket in `SOCK_STREAM` mode.
    UnixStream,

    /// Unix domain socket in `SOCK_DGRAM` mode.
    UnixDatagram,

    /// TCP.
    Tcp(Family),

    /// Connected UDP socket.
    Udp(Family),
}

impl TransportKind {
    /// Returns the transport ID.
    ///
    /// This is a simple acronym related to the transport, such as `udp` for UDP, and so on.
    pub const fn transport_id(self) -> &'static str {
        match self {
            TransportKind::UnixStream => "uds-stream",
            TransportKind::UnixDatagram => "uds",
            TransportKind::Tcp(_) => "tcp",
            TransportKind::Udp(_) => "udp",
        }
    }
}

/// A parsed destination descriptor.
///
/// Destinations are written as URIs: `unix:///path/to.sock` or `unixgram:///path/to.sock` for Unix domain sockets, and
/// `tcp://host:port` or `udp://host:port` for network sockets. The `tcp4`/`tcp6` and `udp4`/`udp6` schemes restrict
/// name resolution to a single address family. The short form `unix:/path/to.sock` is also accepted.
///
/// Only the syntax is checked when parsing. An unknown scheme is kept as-is and reported when a write is attempted.
/// Query strings and fragments are accepted and ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    raw: String,
    scheme: String,
    host: Option<String>,
    port: Option<u16>,
    path: PathBuf,
}

impl Destination {
    /// Scheme of the destination, in lowercase.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host of the destination, if any.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Port of the destination, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Filesystem path of the destination.
    ///
    /// Empty for network destinations.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the transport for this destination.
    ///
    /// # Errors
    ///
    /// If the scheme does not map to any transport, [`Error::UnsupportedScheme`] is returned.
    pub fn transport_kind(&self) -> Result<TransportKind, Error> {
        match self.scheme.as_str() {
            "unix" => Ok(TransportKind::UnixStream),
            "unixgram" => Ok(TransportKind::UnixDatagram),
            "tcp" => Ok(TransportKind::Tcp(Family::Any)),
            "tcp4" => Ok(TransportKind::Tcp(Family::V4)),
            "tcp6" => Ok(TransportKind::Tcp(Family::V6)),
            "udp" => Ok(TransportKind::Udp(Family::Any)),
            "udp4" => Ok(TransportKind::Udp(Family::V4)),
            "udp6" => Ok(TransportKind::Udp(Family::V6)),
            _ => Err(Error::UnsupportedScheme { scheme: self.scheme.clone() }),
        }
    }

    fn socket_addrs(&self, family: Family) -> io::Result<Vec<SocketAddr>> {
        let (host, port) = match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) => (host, port),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "network destinations require both a host and a port",
                ))
            }
        };

        let addrs = (host, port)
            .to_socket_addrs()?
            .filter(|addr| family.matches(addr))
            .collect::<Vec<_>>();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {:?} address found for '{}'", family, host),
            ));
        }

        Ok(addrs)
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination {
            raw: DEFAULT_DESTINATION.to_string(),
            scheme: "udp".to_string(),
            host: Some("localhost".to_string()),
            port: Some(8094),
            path: PathBuf::new(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Destination {
    type Err = ParseError;

    fn from_str(addr: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(addr)?;

        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => Some(domain.to_string()),
            Some(Host::Ipv4(ip)) => Some(ip.to_string()),
            Some(Host::Ipv6(ip)) => Some(ip.to_string()),
            _ => None,
        };

        Ok(Destination {
            raw: addr.to_string(),
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            path: PathBuf::from(url.path()),
        })
    }
}

impl<'a> TryFrom<&'a str> for Destination {
    type Error = ParseError;

    fn try_from(addr: &'a str) -> Result<Self, Self::Error> {
        addr.parse()
    }
}

/// A short-lived connection to a destination.
///
/// The underlying socket is closed when the connection is dropped.
pub(crate) enum Connection {
    Tcp(TcpStream),

    Udp(UdpSocket),

    #[cfg(unix)]
    Unix(UnixStream),

    #[cfg(unix)]
    Unixgram(UnixDatagram),
}

impl Connection {
    /// Opens a connection to the given destination, over the transport resolved for it.
    pub fn open(destination: &Destination, transport: TransportKind) -> Result<Self, Error> {
        let result = match transport {
            TransportKind::Tcp(family) => destination
                .socket_addrs(family)
                .and_then(|addrs| TcpStream::connect(&addrs[..]))
                .map(Connection::Tcp),

            TransportKind::Udp(family) => {
                destination.socket_addrs(family).and_then(connect_udp).map(Connection::Udp)
            }

            #[cfg(unix)]
            TransportKind::UnixStream => UnixStream::connect(destination.path()).map(Connection::Unix),

            #[cfg(unix)]
            TransportKind::UnixDatagram => UnixDatagram::unbound().and_then(|socket| {
                socket.connect(destination.path())?;
                Ok(Connection::Unixgram(socket))
            }),

            #[cfg(not(unix))]
            TransportKind::UnixStream | TransportKind::UnixDatagram => {
                return Err(Error::UnsupportedScheme { scheme: destination.scheme().to_string() })
            }
        };

        result.map_err(|e| Error::transport(destination, e))
    }

    /// Writes the whole payload.
    ///
    /// Datagram transports send the payload as a single datagram.
    pub fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Connection::Tcp(socket) => socket.write_all(buf),
            Connection::Udp(socket) => check_datagram(socket.send(buf), buf.len()),

            #[cfg(unix)]
            Connection::Unix(socket) => socket.write_all(buf),

            #[cfg(unix)]
            Connection::Unixgram(socket) => check_datagram(socket.send(buf), buf.len()),
        }
    }
}

fn connect_udp(mut addrs: Vec<SocketAddr>) -> io::Result<UdpSocket> {
    // IPv4 first when both families resolve.
    addrs.sort_by_key(SocketAddr::is_ipv6);

    let mut last_err = None;
    for addr in addrs {
        let local = if addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        match UdpSocket::bind(local).and_then(|socket| socket.connect(addr).map(|()| socket)) {
            Ok(socket) => return Ok(socket),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to connect to")
    }))
}

fn check_datagram(result: io::Result<usize>, len: usize) -> io::Result<()> {
    let sent = result?;
    if sent < len {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("datagram truncated after {} of {} bytes", sent, len),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{Destination, Family, TransportKind, DEFAULT_DESTINATION};
    use crate::error::Error;

    #[test]
    fn known_cases() {
        // Cases are defined as: input, scheme, host, port, path, transport.
        let cases = [
            ("unix:///tmp/telegraf.sock", "unix", None, None, "/tmp/telegraf.sock", TransportKind::UnixStream),
            ("unix:/tmp/telegraf.sock", "unix", None, None, "/tmp/telegraf.sock", TransportKind::UnixStream),
            ("unixgram:///tmp/telegraf.sock", "unixgram", None, None, "/tmp/telegraf.sock", TransportKind::UnixDatagram),
            ("tcp://localhost:8094", "tcp", Some("localhost"), Some(8094), "", TransportKind::Tcp(Family::Any)),
            ("tcp4://127.0.0.1:8094", "tcp4", Some("127.0.0.1"), Some(8094), "", TransportKind::Tcp(Family::V4)),
            ("tcp6://[::1]:8094", "tcp6", Some("::1"), Some(8094), "", TransportKind::Tcp(Family::V6)),
            ("udp://localhost:8094", "udp", Some("localhost"), Some(8094), "", TransportKind::Udp(Family::Any)),
            ("udp4://10.0.0.1:8094/", "udp4", Some("10.0.0.1"), Some(8094), "/", TransportKind::Udp(Family::V4)),
            ("UDP6://[::1]:8094", "udp6", Some("::1"), Some(8094), "", TransportKind::Udp(Family::V6)),
            ("udp://user@collector:8094", "udp", Some("collector"), Some(8094), "", TransportKind::Udp(Family::Any)),
            ("tcp://localhost:8094?x=1", "tcp", Some("localhost"), Some(8094), "", TransportKind::Tcp(Family::Any)),
            ("udp://localhost:8094#f", "udp", Some("localhost"), Some(8094), "", TransportKind::Udp(Family::Any)),
        ];

        for (input, scheme, host, port, path, transport) in cases {
            let destination = input.parse::<Destination>().unwrap();
            assert_eq!(destination.scheme(), scheme, "{}", input);
            assert_eq!(destination.host(), host, "{}", input);
            assert_eq!(destination.port(), port, "{}", input);
            assert_eq!(destination.path(), Path::new(path), "{}", input);
            assert_eq!(destination.transport_kind().unwrap(), transport, "{}", input);
            assert_eq!(destination.to_string(), input);
        }
    }

    #[test]
    fn invalid_syntax() {
        let cases = [
            "",
            "/tmp/telegraf.sock",
            "1udp://localhost:8094",
            "udp://localhost:99999",
            "udp://localhost:+8094",
            "udp://localhost:http",
            "udp://[::1:8094",
            "udp://[::1]8094",
        ];

        for input in cases {
            assert!(input.parse::<Destination>().is_err(), "{}", input);
        }
    }

    #[test]
    fn unknown_scheme_fails_on_resolution() {
        let destination = "http://localhost:8094".parse::<Destination>().unwrap();
        match destination.transport_kind() {
            Err(Error::UnsupportedScheme { scheme }) => assert_eq!(scheme, "http"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn default_matches_default_destination() {
        let parsed = DEFAULT_DESTINATION.parse::<Destination>().unwrap();
        assert_eq!(parsed, Destination::default());
    }

    #[test]
    fn transport_ids() {
        assert_eq!(TransportKind::UnixStream.transport_id(), "uds-stream");
        assert_eq!(TransportKind::UnixDatagram.transport_id(), "uds");
        assert_eq!(TransportKind::Tcp(Family::V4).transport_id(), "tcp");
        assert_eq!(TransportKind::Udp(Family::Any).transport_id(), "udp");
    }
}
