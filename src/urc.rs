//! # Unsolicited result codes and replies
//!
//! Encoders for every frame the gateway sends to the AT host. Each encoder renders into a
//! fixed-capacity [Frame] and either produces the complete frame or fails with
//! [EncodeError::Overflow] without anything being queued. Integers are rendered by [numtoa].
//!
//! The [Notifier] combines the encoders with the serial pipeline.
//!
//! Frames:
//! * `\r\nOK\r\n`, `\r\nERROR\r\n`
//! * `\r\n+CIPEVENT:<id>,SERVER,CONNECTED\r\n`, `\r\n+CIPEVENT:CLIENT,CLOSED,<ip>,<port>\r\n`, ...
//! * `\r\n+CIPEVENT:SOCKET,<id>,<len>,<data>`, `\r\n+CIPEVENT:UDP_BROADCAST,<ip>,<port>,<id>,<len>,<data>`
//! * `\r\n+WEVENT:STATION_UP\r\n`, ...
//! * `\r\nAT+CIPDOMAIN:0\r\n<ip>\r\nOK\r\n`
//! * `\r\nAT+WJAPIP:<ip>,<mask>,<gateway>,<dns>\rOK\r\n`
//! * `\r\nAT+WMAC:<mac>\rOK\r\n`
//! * `+YEVENT:<rssi>,<len>,<data>`
use crate::net::ConnectionType;
use crate::pipeline::serial::SerialPipeline;
use crate::pipeline::QueueError;
use crate::wifi::{IpStatus, WifiEvent};
use core::net::{Ipv4Addr, SocketAddrV4};
use heapless::Vec;
use numtoa::NumToA;

pub const RECV_PREFIX: &[u8] = b"\r\n";
pub const SUCCESS_POSTFIX: &[u8] = b"OK\r\n";
pub const FAIL_POSTFIX: &[u8] = b"ERROR\r\n";

const PREFIX_CIPEVENT: &[u8] = b"+CIPEVENT:";
const PREFIX_CIPDOMAIN: &[u8] = b"AT+CIPDOMAIN:";
const PREFIX_WEVENT: &[u8] = b"+WEVENT:";
const PREFIX_WJAPIP: &[u8] = b"AT+WJAPIP:";
const PREFIX_WMAC: &[u8] = b"AT+WMAC:";
const PREFIX_YEVENT: &[u8] = b"+YEVENT:";

/// Complete success acknowledgement
pub const OK_FRAME: &[u8] = b"\r\nOK\r\n";

/// Complete failure acknowledgement
pub const ERROR_FRAME: &[u8] = b"\r\nERROR\r\n";

pub const MONITOR_UP_FRAME: &[u8] = b"\r\n+YEVENT:MONITOR_UP\r\n";
pub const MONITOR_DOWN_FRAME: &[u8] = b"\r\n+YEVENT:MONITOR_DOWN\r\n";

pub const ACK_CAPACITY: usize = 20;
pub const CONNECTION_STATUS_CAPACITY: usize = 80;
pub const DATA_HEADER_CAPACITY: usize = 60;
pub const WIFI_STATUS_CAPACITY: usize = 30;
pub const DOMAIN_CAPACITY: usize = 80;
pub const IP_INFO_CAPACITY: usize = 90;
pub const MAC_CAPACITY: usize = 40;
pub const MONITOR_HEADER_CAPACITY: usize = 32;

/// Captured frames above this length are dropped
pub const MONITOR_MAX_FRAME_LEN: usize = 2000;

/// Encoding errors
#[derive(Clone, Debug, PartialEq)]
pub enum EncodeError {
    /// Frame does not fit in its buffer
    Overflow,

    /// Event requires a remote address which is unknown
    MissingPeer,
}

/// Errors when notifying the AT host
#[derive(Clone, Debug, PartialEq)]
pub enum NotifyError {
    Encode(EncodeError),
    Queue(QueueError),

    /// Monitor frame exceeds [MONITOR_MAX_FRAME_LEN]
    Oversized,
}

impl From<EncodeError> for NotifyError {
    fn from(error: EncodeError) -> Self {
        NotifyError::Encode(error)
    }
}

impl From<QueueError> for NotifyError {
    fn from(error: QueueError) -> Self {
        NotifyError::Queue(error)
    }
}

/// Frame under construction with a fixed capacity of N bytes
#[derive(Clone, Debug, Default)]
pub struct Frame<const N: usize> {
    buffer: Vec<u8, N>,
}

impl<const N: usize> Frame<N> {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends the bytes if they fit completely, leaves the frame untouched otherwise
    pub fn append(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if data.len() > self.buffer_space() {
            return Err(EncodeError::Overflow);
        }

        self.buffer.extend_from_slice(data).map_err(|_| EncodeError::Overflow)
    }

    /// Appends the decimal representation
    pub fn append_decimal(&mut self, value: i64) -> Result<(), EncodeError> {
        let mut digits = [0x0; 20];
        self.append(value.numtoa(10, &mut digits))
    }

    /// Appends the address in dotted decimal notation
    pub fn append_ipv4(&mut self, address: Ipv4Addr) -> Result<(), EncodeError> {
        for (index, octet) in address.octets().iter().enumerate() {
            if index > 0 {
                self.append(b".")?;
            }
            self.append_decimal(i64::from(*octet))?;
        }

        Ok(())
    }

    /// Appends the MAC as 12 lowercase hex digits
    pub fn append_mac(&mut self, mac: &[u8; 6]) -> Result<(), EncodeError> {
        let mut hex = [0x0; 12];
        let length = base16::encode_config_slice(mac, base16::EncodeLower, &mut hex);
        self.append(&hex[..length])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Remaining free space
    fn buffer_space(&self) -> usize {
        N - self.buffer.len()
    }
}

/// Completion state of a command
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AckStatus {
    Success,
    Failure,
}

/// Reported link state
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Closed,
}

impl LinkState {
    fn name(self) -> &'static [u8] {
        match self {
            LinkState::Connected => b"CONNECTED",
            LinkState::Closed => b"CLOSED",
        }
    }
}

/// `\r\nOK\r\n` or `\r\nERROR\r\n`
pub fn encode_ack(status: AckStatus) -> Result<Frame<ACK_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(match status {
        AckStatus::Success => SUCCESS_POSTFIX,
        AckStatus::Failure => FAIL_POSTFIX,
    })?;
    Ok(frame)
}

/// Connection state change of a link
///
/// The link id is omitted for [ConnectionType::TcpServer], which reports the client peer
/// address instead.
pub fn encode_connection_status(
    link_id: usize,
    conn_type: ConnectionType,
    state: LinkState,
    peer: Option<SocketAddrV4>,
) -> Result<Frame<CONNECTION_STATUS_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(PREFIX_CIPEVENT)?;

    if conn_type != ConnectionType::TcpServer {
        frame.append_decimal(link_id as i64)?;
        frame.append(b",")?;
    }

    frame.append(match conn_type {
        ConnectionType::TcpClient | ConnectionType::SslClient => b"SERVER".as_slice(),
        ConnectionType::TcpServer => b"CLIENT",
        ConnectionType::UdpBroadcast | ConnectionType::UdpUnicast => b"UDP",
    })?;
    frame.append(b",")?;
    frame.append(state.name())?;

    if conn_type == ConnectionType::TcpServer {
        let peer = peer.ok_or(EncodeError::MissingPeer)?;
        frame.append(b",")?;
        frame.append_ipv4(*peer.ip())?;
        frame.append(b",")?;
        frame.append_decimal(i64::from(peer.port()))?;
    }

    frame.append(b"\r\n")?;
    Ok(frame)
}

/// Header preceding received socket data, the raw data follows without any escaping
pub fn encode_data_header(
    link_id: usize,
    conn_type: ConnectionType,
    remote: Option<SocketAddrV4>,
    length: usize,
) -> Result<Frame<DATA_HEADER_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(PREFIX_CIPEVENT)?;

    if conn_type == ConnectionType::UdpBroadcast {
        let remote = remote.ok_or(EncodeError::MissingPeer)?;
        frame.append(b"UDP_BROADCAST,")?;
        frame.append_ipv4(*remote.ip())?;
        frame.append(b",")?;
        frame.append_decimal(i64::from(remote.port()))?;
        frame.append(b",")?;
    } else {
        frame.append(b"SOCKET,")?;
    }

    frame.append_decimal(link_id as i64)?;
    frame.append(b",")?;
    frame.append_decimal(length as i64)?;
    frame.append(b",")?;
    Ok(frame)
}

/// Station or access point state change
pub fn encode_wifi_status(event: WifiEvent) -> Result<Frame<WIFI_STATUS_CAPACITY>, EncodeError> {
    let (interface, state): (&[u8], &[u8]) = match event {
        WifiEvent::IpObtained | WifiEvent::StationUp => (b"STATION_", b"UP"),
        WifiEvent::StationDown => (b"STATION_", b"DOWN"),
        WifiEvent::ApUp => (b"AP_", b"UP"),
        WifiEvent::ApDown => (b"AP_", b"DOWN"),
    };

    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(PREFIX_WEVENT)?;
    frame.append(interface)?;
    frame.append(state)?;
    frame.append(b"\r\n")?;
    Ok(frame)
}

/// Reply of CIPDOMAIN, just the first resolved address is reported
pub fn encode_domain(address: Ipv4Addr) -> Result<Frame<DOMAIN_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(PREFIX_CIPDOMAIN)?;
    frame.append_decimal(0)?;
    frame.append(RECV_PREFIX)?;
    frame.append_ipv4(address)?;
    frame.append(RECV_PREFIX)?;
    frame.append(SUCCESS_POSTFIX)?;
    Ok(frame)
}

/// Reply of WJAPIP
pub fn encode_ip_info(status: &IpStatus) -> Result<Frame<IP_INFO_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(PREFIX_WJAPIP)?;
    frame.append_ipv4(status.ip)?;
    frame.append(b",")?;
    frame.append_ipv4(status.mask)?;
    frame.append(b",")?;
    frame.append_ipv4(status.gateway)?;
    frame.append(b",")?;
    frame.append_ipv4(status.dns)?;
    frame.append(b"\r")?;
    frame.append(SUCCESS_POSTFIX)?;
    Ok(frame)
}

/// Reply of WMAC
pub fn encode_mac(mac: &[u8; 6]) -> Result<Frame<MAC_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(RECV_PREFIX)?;
    frame.append(PREFIX_WMAC)?;
    frame.append_mac(mac)?;
    frame.append(b"\r")?;
    frame.append(SUCCESS_POSTFIX)?;
    Ok(frame)
}

/// Header preceding a frame captured in monitor mode
pub fn encode_monitor_header(rssi: i8, length: usize) -> Result<Frame<MONITOR_HEADER_CAPACITY>, EncodeError> {
    let mut frame = Frame::new();
    frame.append(PREFIX_YEVENT)?;
    frame.append_decimal(i64::from(rssi))?;
    frame.append(b",")?;
    frame.append_decimal(length as i64)?;
    frame.append(b",")?;
    Ok(frame)
}

/// Encodes notifications and replies and submits them to the serial pipeline
#[derive(Clone)]
pub struct Notifier {
    serial: SerialPipeline,
}

impl Notifier {
    pub fn new(serial: SerialPipeline) -> Self {
        Self { serial }
    }

    /// Command acknowledgement
    pub fn ack(&self, status: AckStatus) -> Result<(), NotifyError> {
        let frame = encode_ack(status).inspect_err(|error| log::error!("Ack frame failed: {:?}", error))?;
        self.enqueue(frame.as_bytes(), None)
    }

    pub fn connection_status(
        &self,
        link_id: usize,
        conn_type: ConnectionType,
        state: LinkState,
        peer: Option<SocketAddrV4>,
    ) -> Result<(), NotifyError> {
        let frame = encode_connection_status(link_id, conn_type, state, peer).inspect_err(|error| {
            log::error!("Status frame of link {} failed: {:?}", link_id, error)
        })?;
        self.enqueue(frame.as_bytes(), None)
    }

    /// Forwards received socket data
    pub fn data_arrival(
        &self,
        link_id: usize,
        conn_type: ConnectionType,
        remote: Option<SocketAddrV4>,
        data: &[u8],
    ) -> Result<(), NotifyError> {
        let header = encode_data_header(link_id, conn_type, remote, data.len()).inspect_err(|error| {
            log::error!("Data header of link {} failed: {:?}", link_id, error)
        })?;
        self.enqueue(header.as_bytes(), Some(data))
    }

    pub fn wifi_status(&self, event: WifiEvent) -> Result<(), NotifyError> {
        let frame = encode_wifi_status(event).inspect_err(|error| log::error!("Wi-Fi frame failed: {:?}", error))?;
        self.enqueue(frame.as_bytes(), None)
    }

    pub fn domain(&self, address: Ipv4Addr) -> Result<(), NotifyError> {
        let frame = encode_domain(address).inspect_err(|error| log::error!("Domain frame failed: {:?}", error))?;
        self.enqueue(frame.as_bytes(), None)
    }

    pub fn ip_info(&self, status: &IpStatus) -> Result<(), NotifyError> {
        let frame = encode_ip_info(status).inspect_err(|error| log::error!("IP info frame failed: {:?}", error))?;
        self.enqueue(frame.as_bytes(), None)
    }

    pub fn mac(&self, mac: &[u8; 6]) -> Result<(), NotifyError> {
        let frame = encode_mac(mac).inspect_err(|error| log::error!("MAC frame failed: {:?}", error))?;
        self.enqueue(frame.as_bytes(), None)
    }

    /// Forwards a frame captured in monitor mode, oversized frames are dropped
    pub fn monitor_frame(&self, rssi: i8, data: &[u8]) -> Result<(), NotifyError> {
        if data.len() > MONITOR_MAX_FRAME_LEN {
            log::info!(
                "Packet length ({}) exceeds limit ({}), dropping it",
                data.len(),
                MONITOR_MAX_FRAME_LEN
            );
            return Err(NotifyError::Oversized);
        }

        let header = encode_monitor_header(rssi, data.len())?;
        let payload = if data.is_empty() { None } else { Some(data) };
        self.immediate(header.as_bytes(), payload)
    }

    /// Sends the bytes as they are, may overtake queued frames
    pub fn raw_immediate(&self, frame: &[u8]) -> Result<(), NotifyError> {
        self.immediate(frame, None)
    }

    pub fn serial(&self) -> &SerialPipeline {
        &self.serial
    }

    fn enqueue(&self, command: &[u8], payload: Option<&[u8]>) -> Result<(), NotifyError> {
        Ok(self.serial.enqueue(command, payload)?)
    }

    fn immediate(&self, command: &[u8], payload: Option<&[u8]>) -> Result<(), NotifyError> {
        Ok(self.serial.send_immediate(command, payload)?)
    }
}
