//! # Network stack
//!
//! The gateway talks to the network through [NetworkStack] and [LinkSocket]. [StdStack] implements
//! both on top of `std::net` and is what the Linux binary uses. Name resolution goes through the
//! [Dns] trait of [embedded_nal], implemented by [StdDns].
//!
//! ## Example
//!
//! ````no_run
//! # use core::net::SocketAddrV4;
//! # use core::str::FromStr;
//! # use core::time::Duration;
//! # use at_host::net::{ConnectionType, LinkSocket, NetworkStack, StdStack};
//! let stack = StdStack::new();
//!
//! let remote = SocketAddrV4::from_str("10.0.0.1:9000").unwrap();
//! let socket = stack.open(ConnectionType::TcpClient, remote, Duration::from_millis(500)).unwrap();
//! socket.send(b"hello").unwrap();
//! socket.close();
//! ````
use core::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use embedded_nal::{AddrType, Dns};
use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs, UdpSocket};

/// Identifier of an OS level socket, unique for the lifetime of the stack
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SocketHandle(pub usize);

/// Connection type requested by CIPSTART
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectionType {
    TcpServer,
    TcpClient,
    SslClient,
    UdpBroadcast,
    UdpUnicast,
}

impl ConnectionType {
    const ALL: [ConnectionType; 5] = [
        ConnectionType::TcpServer,
        ConnectionType::TcpClient,
        ConnectionType::SslClient,
        ConnectionType::UdpBroadcast,
        ConnectionType::UdpUnicast,
    ];

    /// Wire name, as used in the CIPSTART argument list
    pub fn name(self) -> &'static str {
        match self {
            ConnectionType::TcpServer => "tcp_server",
            ConnectionType::TcpClient => "tcp_client",
            ConnectionType::SslClient => "ssl_client",
            ConnectionType::UdpBroadcast => "udp_broadcast",
            ConnectionType::UdpUnicast => "udp_unicast",
        }
    }

    /// Looks up the connection type by its exact wire name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|conn_type| conn_type.name() == name)
    }
}

/// Network related errors
#[derive(Clone, Debug, PartialEq)]
pub enum NetworkError {
    /// OS level socket error
    Io(ErrorKind),

    /// Connection type is not supported by the stack
    Unsupported,

    /// Name resolution returned no usable address
    NotFound,

    /// Socket is not able to send without an explicit remote address
    InvalidAddress,
}

impl From<std::io::Error> for NetworkError {
    fn from(error: std::io::Error) -> Self {
        NetworkError::Io(error.kind())
    }
}

/// Result of a single socket read
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Received {
    /// Number of bytes written to the buffer. Zero signals a closed connection.
    pub length: usize,

    /// Sender address, just known for datagram sockets
    pub remote: Option<SocketAddrV4>,
}

/// An open socket bound to a link
pub trait LinkSocket: Send + Sync + 'static {
    /// Stable handle identifying the socket
    fn handle(&self) -> SocketHandle;

    /// Sends to the connected remote, returns the number of bytes sent
    fn send(&self, data: &[u8]) -> Result<usize, NetworkError>;

    /// Sends to an explicit remote (datagram sockets)
    fn send_to(&self, data: &[u8], remote: SocketAddrV4) -> Result<usize, NetworkError>;

    /// Blocking read. Returns [nb::Error::WouldBlock] when the read timeout elapsed without data.
    fn receive(&self, buffer: &mut [u8]) -> nb::Result<Received, NetworkError>;

    /// Address of the connected remote
    fn peer_addr(&self) -> Option<SocketAddrV4>;

    /// Shuts the socket down. Wakes up pending reads where supported by the OS.
    fn close(&self);
}

/// Factory for sockets and name resolution
pub trait NetworkStack: Send + Sync + 'static {
    type Socket: LinkSocket;

    /// Creates a socket of the given type and connects/binds it for the given remote.
    /// `read_timeout` bounds the blocking time of [LinkSocket::receive].
    fn open(
        &self,
        conn_type: ConnectionType,
        remote: SocketAddrV4,
        read_timeout: Duration,
    ) -> Result<Self::Socket, NetworkError>;

    /// Resolves the domain to its first IPv4 address
    fn resolve(&self, domain: &str) -> Result<Ipv4Addr, NetworkError>;
}

/// Network stack backed by the OS sockets of `std::net`
#[derive(Default)]
pub struct StdStack {
    next_handle: AtomicUsize,
}

impl StdStack {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicUsize::new(0),
        }
    }

    fn allocate_handle(&self) -> SocketHandle {
        SocketHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    fn open_udp(&self, conn_type: ConnectionType, remote: SocketAddrV4) -> Result<UdpSocket, NetworkError> {
        if conn_type == ConnectionType::UdpBroadcast {
            let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, remote.port()))?;
            socket.set_broadcast(true)?;
            return Ok(socket);
        }

        let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect(remote)?;
        Ok(socket)
    }
}

impl NetworkStack for StdStack {
    type Socket = StdSocket;

    fn open(
        &self,
        conn_type: ConnectionType,
        remote: SocketAddrV4,
        read_timeout: Duration,
    ) -> Result<StdSocket, NetworkError> {
        let read_timeout = if read_timeout.is_zero() { None } else { Some(read_timeout) };

        let inner = match conn_type {
            ConnectionType::TcpClient => {
                let stream = TcpStream::connect(remote).map_err(|error| {
                    log::error!("TCP connect to {} failed: {}", remote, error);
                    NetworkError::from(error)
                })?;
                stream.set_read_timeout(read_timeout)?;
                StdSocketInner::Tcp(stream)
            }
            ConnectionType::UdpBroadcast | ConnectionType::UdpUnicast => {
                let socket = self.open_udp(conn_type, remote).map_err(|error| {
                    log::error!("UDP socket for {} failed: {:?}", remote, error);
                    error
                })?;
                socket.set_read_timeout(read_timeout)?;
                StdSocketInner::Udp(socket)
            }
            ConnectionType::TcpServer | ConnectionType::SslClient => {
                log::warn!("Connection type {} not supported", conn_type.name());
                return Err(NetworkError::Unsupported);
            }
        };

        Ok(StdSocket {
            handle: self.allocate_handle(),
            inner,
        })
    }

    fn resolve(&self, domain: &str) -> Result<Ipv4Addr, NetworkError> {
        match nb::block!(StdDns.get_host_by_name(domain, AddrType::IPv4))? {
            IpAddr::V4(address) => Ok(address),
            IpAddr::V6(_) => Err(NetworkError::NotFound),
        }
    }
}

/// Socket created by [StdStack]
pub struct StdSocket {
    handle: SocketHandle,
    inner: StdSocketInner,
}

enum StdSocketInner {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

impl LinkSocket for StdSocket {
    fn handle(&self) -> SocketHandle {
        self.handle
    }

    fn send(&self, data: &[u8]) -> Result<usize, NetworkError> {
        let sent = match &self.inner {
            StdSocketInner::Tcp(stream) => {
                let mut stream = stream;
                stream.write_all(data)?;
                data.len()
            }
            StdSocketInner::Udp(socket) => socket.send(data)?,
        };

        Ok(sent)
    }

    fn send_to(&self, data: &[u8], remote: SocketAddrV4) -> Result<usize, NetworkError> {
        match &self.inner {
            StdSocketInner::Tcp(_) => Err(NetworkError::InvalidAddress),
            StdSocketInner::Udp(socket) => Ok(socket.send_to(data, remote)?),
        }
    }

    fn receive(&self, buffer: &mut [u8]) -> nb::Result<Received, NetworkError> {
        let result = match &self.inner {
            StdSocketInner::Tcp(stream) => {
                let mut stream = stream;
                stream.read(buffer).map(|length| Received { length, remote: None })
            }
            StdSocketInner::Udp(socket) => socket.recv_from(buffer).map(|(length, remote)| Received {
                length,
                remote: match remote {
                    SocketAddr::V4(remote) => Some(remote),
                    SocketAddr::V6(_) => None,
                },
            }),
        };

        result.map_err(|error| match error.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => nb::Error::WouldBlock,
            kind => nb::Error::Other(NetworkError::Io(kind)),
        })
    }

    fn peer_addr(&self) -> Option<SocketAddrV4> {
        let address = match &self.inner {
            StdSocketInner::Tcp(stream) => stream.peer_addr(),
            StdSocketInner::Udp(socket) => socket.peer_addr(),
        };

        match address {
            Ok(SocketAddr::V4(address)) => Some(address),
            _ => None,
        }
    }

    fn close(&self) {
        // UDP sockets have no shutdown, the receive task notices the removal on its next read timeout
        if let StdSocketInner::Tcp(stream) = &self.inner {
            if let Err(error) = stream.shutdown(Shutdown::Both) {
                log::debug!("Shutdown of socket {:?} failed: {}", self.handle, error);
            }
        }
    }
}

/// DNS resolver using the resolver of the OS
pub struct StdDns;

impl Dns for StdDns {
    type Error = NetworkError;

    fn get_host_by_name(&mut self, hostname: &str, addr_type: AddrType) -> nb::Result<IpAddr, NetworkError> {
        let addresses = (hostname, 0).to_socket_addrs().map_err(|error| {
            log::error!("Resolving {} failed: {}", hostname, error);
            NetworkError::from(error)
        })?;

        for address in addresses {
            match (address, &addr_type) {
                (SocketAddr::V4(address), AddrType::IPv4 | AddrType::Either) => return Ok(IpAddr::V4(*address.ip())),
                (SocketAddr::V6(address), AddrType::IPv6 | AddrType::Either) => return Ok(IpAddr::V6(*address.ip())),
                _ => {}
            }
        }

        Err(nb::Error::Other(NetworkError::NotFound))
    }

    fn get_host_by_address(&mut self, _addr: IpAddr, _result: &mut [u8]) -> nb::Result<usize, NetworkError> {
        Err(nb::Error::Other(NetworkError::Unsupported))
    }
}
