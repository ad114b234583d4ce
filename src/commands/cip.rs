//! # CIP command family
//!
//! Link lifecycle and data transfer: CIPSTART, CIPSEND, CIPSTOP, CIPAUTOCONN and CIPDOMAIN.
//!
//! Handlers consume their arguments directly from the serial input. On success they queue the
//! acknowledgement themselves, errors are answered by the dispatcher.
use crate::commands::CommandError;
use crate::config::{SocketDelivery, MAX_LINKS};
use crate::gateway::Gateway;
use crate::net::{ConnectionType, LinkSocket, NetworkStack};
use crate::pipeline::socket::send_over_socket;
use crate::receiver::ReceiveTask;
use crate::registry::Link;
use crate::transport::{AtReader, Charset, Delimiter};
use crate::urc::{AckStatus, LinkState};
use crate::wifi::WifiHal;
use core::net::{Ipv4Addr, SocketAddrV4};
use embedded_io::Read;
use std::sync::Arc;

/// Buffer size of numeric and connection type fields
const SHORT_FIELD_LEN: usize = 16;

/// Buffer size of the CIPDOMAIN argument
const DOMAIN_FIELD_LEN: usize = 50;

/// `=<link_id>,<conn_type>,<ip>,<port>\r`
pub fn start<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    expect_assignment(reader)?;
    let link_id = read_link_id(reader, Delimiter::Separator)?;

    if gateway.registry.find_by_link_id(link_id).is_some() {
        log::error!("Link id {} already in use", link_id);
        return Err(CommandError::LinkInUse(link_id));
    }

    let conn_type = reader
        .read_field::<SHORT_FIELD_LEN>(Charset::ConnType)?
        .expect(Delimiter::Separator)?;
    let conn_type = ConnectionType::from_name(conn_type.as_str()?).ok_or_else(|| {
        log::error!("Invalid connection type {:?}", conn_type.value);
        CommandError::InvalidArgument
    })?;

    let ip: Ipv4Addr = reader
        .read_field::<SHORT_FIELD_LEN>(Charset::IpAddress)?
        .expect(Delimiter::Separator)?
        .parse()?;
    let port = read_port(reader, Delimiter::Terminator)?;
    let remote = SocketAddrV4::new(ip, port);

    log::info!("Opening link {} ({}) to {}", link_id, conn_type.name(), remote);
    let socket = Arc::new(gateway.stack.open(conn_type, remote, gateway.config.recv_poll_interval)?);

    let link = Link {
        link_id,
        conn_type,
        remote,
        socket: socket.clone(),
    };

    if let Err(error) = gateway.registry.insert(link.clone()) {
        socket.close();
        return Err(error.into());
    }

    let task = ReceiveTask::new(
        link,
        gateway.registry.clone(),
        gateway.notifier.clone(),
        gateway.config.recv_chunk_size,
    );

    if let Err(error) = task.spawn() {
        log::error!("Receive task of link {} not started: {}", link_id, error);
        let _ = gateway.registry.remove_by_socket(socket.handle());
        socket.close();
        return Err(CommandError::Spawn(error.kind()));
    }

    gateway.notifier.ack(AckStatus::Success)?;
    gateway
        .notifier
        .connection_status(link_id, conn_type, LinkState::Connected, None)?;
    Ok(())
}

/// `=<link_id>[,<remote_port>],<length>\r<data>`
///
/// The remote port just applies to UDP broadcast links, it replaces the port given by CIPSTART.
pub fn send<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    expect_assignment(reader)?;
    let link_id = read_link_id(reader, Delimiter::Separator)?;

    let second = reader.read_field::<SHORT_FIELD_LEN>(Charset::Digits)?;
    let (remote_port, length) = if second.has_more() {
        let length = reader
            .read_field::<SHORT_FIELD_LEN>(Charset::Digits)?
            .expect(Delimiter::Terminator)?;
        (Some(non_zero_port(second.parse()?)?), length.parse::<usize>()?)
    } else {
        (None, second.parse::<usize>()?)
    };

    if length == 0 || length > gateway.config.max_send_length {
        log::error!("Invalid send length {}, max. {}", length, gateway.config.max_send_length);
        return Err(CommandError::InvalidLength(length));
    }

    let mut payload = vec![0x0; length];
    reader.read_exact(&mut payload)?;

    let link = gateway.registry.link(link_id).ok_or_else(|| {
        log::error!("CIPSEND on unknown link {}", link_id);
        CommandError::LinkNotFound(link_id)
    })?;

    let remote = match link.conn_type {
        ConnectionType::UdpBroadcast => Some(SocketAddrV4::new(
            *link.remote.ip(),
            remote_port.unwrap_or(link.remote.port()),
        )),
        _ => None,
    };

    gateway.sockets.enqueue(&link.socket, remote, &payload)?;

    if gateway.sockets.delivery() == SocketDelivery::Inline {
        send_over_socket(link.socket.as_ref(), remote, &payload).inspect_err(|error| {
            log::error!("Sending {} bytes on link {} failed: {:?}", length, link_id, error);
        })?;
    }

    gateway.notifier.ack(AckStatus::Success)?;
    Ok(())
}

/// `=<link_id>\r`
pub fn stop<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    expect_assignment(reader)?;
    let link_id = read_link_id(reader, Delimiter::Terminator)?;

    close_link(gateway, link_id)
}

/// `=<link_id>,<0|1>`
///
/// Disabling closes the link right away. Enabling is acknowledged, but not persisted.
pub fn auto_connect<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    expect_assignment(reader)?;
    let link_id = read_link_id(reader, Delimiter::Separator)?;
    let mode = reader.read_byte()?;

    if gateway.registry.find_by_link_id(link_id).is_none() {
        log::error!("CIPAUTOCONN on unknown link {}", link_id);
        return Err(CommandError::LinkNotFound(link_id));
    }

    match mode {
        b'0' => close_link(gateway, link_id),
        b'1' => {
            log::info!("Auto connect of link {} is not persisted", link_id);
            gateway.notifier.ack(AckStatus::Success)?;
            Ok(())
        }
        other => {
            log::error!("Invalid auto connect mode {:#04x}", other);
            Err(CommandError::InvalidArgument)
        }
    }
}

/// `=<domain>\r`
pub fn domain<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    expect_assignment(reader)?;

    let domain = reader
        .read_field::<DOMAIN_FIELD_LEN>(Charset::Any)?
        .expect(Delimiter::Terminator)?;
    let domain = domain.as_str()?;

    let address = gateway.stack.resolve(domain)?;
    log::info!("Resolved {} to {}", domain, address);

    gateway.notifier.domain(address)?;
    Ok(())
}

/// Removes the link, reports CLOSED and closes the socket
fn close_link<S: NetworkStack, W: WifiHal>(gateway: &Gateway<S, W>, link_id: usize) -> Result<(), CommandError> {
    let handle = gateway
        .registry
        .find_by_link_id(link_id)
        .ok_or(CommandError::LinkNotFound(link_id))?;

    // Whoever removes the entry reports the closing, the receive task may be faster
    let link = gateway
        .registry
        .remove_by_socket(handle)
        .map_err(|_| CommandError::LinkNotFound(link_id))?;
    log::info!("Closing link {}", link_id);

    let result = gateway.notifier.ack(AckStatus::Success).and_then(|_| {
        gateway
            .notifier
            .connection_status(link.link_id, link.conn_type, LinkState::Closed, None)
    });

    link.socket.close();
    Ok(result?)
}

fn expect_assignment<R: Read>(reader: &mut AtReader<R>) -> Result<(), CommandError> {
    match reader.read_byte()? {
        b'=' => Ok(()),
        other => {
            log::error!("Expected '=', got {:#04x}", other);
            Err(CommandError::UnexpectedInput(other))
        }
    }
}

fn read_link_id<R: Read>(reader: &mut AtReader<R>, delimiter: Delimiter) -> Result<usize, CommandError> {
    let link_id: usize = reader
        .read_field::<SHORT_FIELD_LEN>(Charset::Digits)?
        .expect(delimiter)?
        .parse()?;

    if link_id >= MAX_LINKS {
        log::error!("Link id {} out of range", link_id);
        return Err(CommandError::InvalidLinkId(link_id));
    }

    Ok(link_id)
}

fn read_port<R: Read>(reader: &mut AtReader<R>, delimiter: Delimiter) -> Result<u16, CommandError> {
    let port = reader
        .read_field::<SHORT_FIELD_LEN>(Charset::Digits)?
        .expect(delimiter)?
        .parse()?;

    non_zero_port(port)
}

fn non_zero_port(port: u16) -> Result<u16, CommandError> {
    if port == 0 {
        log::error!("Port 0 is not valid");
        return Err(CommandError::InvalidArgument);
    }

    Ok(port)
}
