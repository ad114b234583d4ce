//! # AT commands
//!
//! Command table and the family sub-dispatchers.
//!
//! [Command::resolve] is called right after the `AT+` prefix. It reads the command name byte by
//! byte, each family resolver reading just as many bytes as needed to tell its members apart.
//! Nothing is ever pushed back: on a mismatch the bytes read so far are gone and the dispatcher
//! continues with whatever follows in the stream.
//!
//! The resolved [Command] then reads its own arguments from the same stream.
use crate::gateway::Gateway;
use crate::net::{NetworkError, NetworkStack};
use crate::pipeline::QueueError;
use crate::registry::RegistryError;
use crate::transport::{AtReader, ReadError};
use crate::urc::NotifyError;
use crate::wifi::{WifiError, WifiHal};
use embedded_io::Read;

pub mod cip;
pub mod uart;
pub mod wifi;
pub mod ywss;

/// Errors of command handlers. Every error is answered with a failure frame.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandError {
    /// Reading from the serial input failed
    Read(ReadError),

    /// Byte following the command name is not the expected one
    UnexpectedInput(u8),

    /// Argument has a valid format but an unsupported value
    InvalidArgument,

    /// Link id is not in `0..MAX_LINKS`
    InvalidLinkId(usize),

    /// Link id is already in use
    LinkInUse(usize),

    /// No open link with the given id
    LinkNotFound(usize),

    /// CIPSEND length is zero or exceeds the configured maximum
    InvalidLength(usize),

    Registry(RegistryError),
    Network(NetworkError),
    Queue(QueueError),
    Notify(NotifyError),
    Wifi(WifiError),

    /// Receive task could not be started
    Spawn(std::io::ErrorKind),
}

impl From<ReadError> for CommandError {
    fn from(error: ReadError) -> Self {
        CommandError::Read(error)
    }
}

impl From<RegistryError> for CommandError {
    fn from(error: RegistryError) -> Self {
        CommandError::Registry(error)
    }
}

impl From<NetworkError> for CommandError {
    fn from(error: NetworkError) -> Self {
        CommandError::Network(error)
    }
}

impl From<QueueError> for CommandError {
    fn from(error: QueueError) -> Self {
        CommandError::Queue(error)
    }
}

impl From<NotifyError> for CommandError {
    fn from(error: NotifyError) -> Self {
        CommandError::Notify(error)
    }
}

impl From<WifiError> for CommandError {
    fn from(error: WifiError) -> Self {
        CommandError::Wifi(error)
    }
}

/// Supported commands
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `AT+CIPSTART=<link_id>,<conn_type>,<ip>,<port>\r`
    CipStart,

    /// `AT+CIPSEND=<link_id>[,<remote_port>],<length>\r<data>`
    CipSend,

    /// `AT+CIPSTOP=<link_id>\r`
    CipStop,

    /// `AT+CIPAUTOCONN=<link_id>,<0|1>`
    CipAutoConn,

    /// `AT+CIPDOMAIN=<domain>\r`
    CipDomain,

    /// `AT+WJAP=<ssid>,<key>\r`
    WifiJoin,

    /// `AT+WJAPIP?`
    WifiIpInfo,

    /// `AT+WMAC?`
    WifiMac,

    /// `AT+UARTE=<ON|OFF>\r`
    UartEcho,

    YwssStartMonitor,
    YwssStopMonitor,
    YwssSetChannel,
    YwssSuspendStation,
}

impl Command {
    /// Command name without the `AT+` prefix
    pub fn name(self) -> &'static str {
        match self {
            Command::CipStart => "CIPSTART",
            Command::CipSend => "CIPSEND",
            Command::CipStop => "CIPSTOP",
            Command::CipAutoConn => "CIPAUTOCONN",
            Command::CipDomain => "CIPDOMAIN",
            Command::WifiJoin => "WJAP",
            Command::WifiIpInfo => "WJAPIP",
            Command::WifiMac => "WMAC",
            Command::UartEcho => "UARTE",
            Command::YwssStartMonitor => "YWSSSTARTMONITOR",
            Command::YwssStopMonitor => "YWSSSTOPMONITOR",
            Command::YwssSetChannel => "YWSSSETCHANNEL",
            Command::YwssSuspendStation => "YWSSSUSPENDSTATION",
        }
    }

    /// True for commands answered on the immediate serial path
    pub fn is_onboarding(self) -> bool {
        matches!(
            self,
            Command::YwssStartMonitor | Command::YwssStopMonitor | Command::YwssSetChannel | Command::YwssSuspendStation
        )
    }

    /// Reads the command name following `AT+`. Returns None for unknown commands.
    pub fn resolve<R: Read>(reader: &mut AtReader<R>) -> Result<Option<Command>, ReadError> {
        let family = reader.read_byte()?;

        let command = match family {
            b'C' => resolve_cip(reader)?,
            b'U' => resolve_uart(reader)?,
            b'W' => resolve_wifi(reader)?,
            b'Y' => resolve_ywss(reader)?,
            _ => None,
        };

        if command.is_none() {
            log::error!("Unknown command, family {:?}", family as char);
        }

        Ok(command)
    }

    /// Reads the arguments and executes the command
    pub fn execute<S, W, R>(self, gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
    where
        S: NetworkStack,
        W: WifiHal,
        R: Read,
    {
        log::debug!("Executing {}", self.name());

        match self {
            Command::CipStart => cip::start(gateway, reader),
            Command::CipSend => cip::send(gateway, reader),
            Command::CipStop => cip::stop(gateway, reader),
            Command::CipAutoConn => cip::auto_connect(gateway, reader),
            Command::CipDomain => cip::domain(gateway, reader),
            Command::WifiJoin => wifi::join(gateway, reader),
            Command::WifiIpInfo => wifi::ip_info(gateway),
            Command::WifiMac => wifi::mac(gateway),
            Command::UartEcho => uart::set_echo(gateway, reader),
            Command::YwssStartMonitor => ywss::start_monitor(gateway),
            Command::YwssStopMonitor => ywss::stop_monitor(gateway),
            Command::YwssSetChannel => ywss::set_channel(gateway, reader),
            Command::YwssSuspendStation => ywss::suspend_station(gateway),
        }
    }
}

/// `CIP` + `START`/`STOP`/`SEND`/`DOMAIN`/`AUTOCONN`
fn resolve_cip<R: Read>(reader: &mut AtReader<R>) -> Result<Option<Command>, ReadError> {
    if !reader.expect_literal(b"IP")? {
        return Ok(None);
    }

    let command = match reader.read_byte()? {
        b'S' => {
            let mut suffix = [0x0; 3];
            reader.read_exact(&mut suffix)?;

            match &suffix {
                b"TAR" => reader.expect_literal(b"T")?.then_some(Command::CipStart),
                b"TOP" => Some(Command::CipStop),
                b"END" => Some(Command::CipSend),
                _ => None,
            }
        }
        b'D' => reader.expect_literal(b"OMAIN")?.then_some(Command::CipDomain),
        b'A' => reader.expect_literal(b"UTOCONN")?.then_some(Command::CipAutoConn),
        _ => None,
    };

    Ok(command)
}

/// `UARTE`
fn resolve_uart<R: Read>(reader: &mut AtReader<R>) -> Result<Option<Command>, ReadError> {
    if !reader.expect_literal(b"ART")? {
        return Ok(None);
    }

    Ok(reader.expect_literal(b"E")?.then_some(Command::UartEcho))
}

/// `WJAP=`, `WJAPIP?` and `WMAC?`
fn resolve_wifi<R: Read>(reader: &mut AtReader<R>) -> Result<Option<Command>, ReadError> {
    let command = match reader.read_byte()? {
        b'J' => {
            if !reader.expect_literal(b"AP")? {
                return Ok(None);
            }

            match reader.read_byte()? {
                b'=' => Some(Command::WifiJoin),
                b'I' => reader.expect_literal(b"P?")?.then_some(Command::WifiIpInfo),
                _ => None,
            }
        }
        b'M' => reader.expect_literal(b"AC?")?.then_some(Command::WifiMac),
        _ => None,
    };

    Ok(command)
}

/// `YWSS` + `STARTMONITOR`/`STOPMONITOR`/`SETCHANNEL,`/`SUSPENDSTATION`
fn resolve_ywss<R: Read>(reader: &mut AtReader<R>) -> Result<Option<Command>, ReadError> {
    if !reader.expect_literal(b"WSS")? || !reader.expect_literal(b"S")? {
        return Ok(None);
    }

    let mut selector = [0x0; 3];
    reader.read_exact(&mut selector)?;

    let command = match &selector {
        b"TOP" => reader.expect_literal(b"MONITOR\r")?.then_some(Command::YwssStopMonitor),
        b"TAR" => reader.expect_literal(b"TMONITOR\r")?.then_some(Command::YwssStartMonitor),
        b"ETC" => reader.expect_literal(b"HANNEL,")?.then_some(Command::YwssSetChannel),
        b"USP" => reader.expect_literal(b"ENDSTATION\r")?.then_some(Command::YwssSuspendStation),
        _ => None,
    };

    Ok(command)
}
