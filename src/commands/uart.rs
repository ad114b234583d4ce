//! # UART echo
//!
//! `AT+UARTE=ON\r` switches the gateway into echo mode. While enabled, the text of each command
//! up to `\r` is acknowledged and sent back to the AT host instead of being executed. Just
//! `AT+UARTE=OFF\r` leaves echo mode.
use crate::commands::CommandError;
use crate::gateway::Gateway;
use crate::net::NetworkStack;
use crate::transport::{AtReader, Charset, Delimiter, TERMINATOR};
use crate::urc::AckStatus;
use crate::wifi::WifiHal;
use embedded_io::Read;

const MODE_FIELD_LEN: usize = 10;

/// Line leaving echo mode
const ECHO_OFF_LINE: &[u8] = b"UARTE=OFF";

/// Echo of lines exceeding the line capacity
const TOO_LONG_ECHO: &[u8] = b"AT+MSG too long";

/// `=<ON|OFF>\r`
pub fn set_echo<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    match reader.read_byte()? {
        b'=' => {}
        other => return Err(CommandError::UnexpectedInput(other)),
    }

    let mode = reader
        .read_field::<MODE_FIELD_LEN>(Charset::Any)?
        .expect(Delimiter::Terminator)?;

    gateway.echo = match mode.value.as_slice() {
        b"ON" => true,
        b"OFF" => false,
        _ => {
            log::error!("Invalid echo mode {:?}", mode.value);
            return Err(CommandError::InvalidArgument);
        }
    };

    log::info!("UART echo {}", if gateway.echo { "enabled" } else { "disabled" });
    gateway.notifier.ack(AckStatus::Success)?;
    Ok(())
}

/// Reads the remaining line of a command received in echo mode and sends it back
pub fn echo_line<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    let capacity = gateway.config.echo_line_capacity;
    let mut line = Vec::with_capacity(capacity.min(128));
    let mut too_long = false;

    loop {
        let byte = reader.read_byte()?;
        if byte == TERMINATOR {
            break;
        }

        if line.len() < capacity {
            line.push(byte);
        } else {
            too_long = true;
        }
    }

    gateway.notifier.ack(AckStatus::Success)?;

    if !too_long && line == ECHO_OFF_LINE {
        log::info!("UART echo disabled");
        gateway.echo = false;
        return Ok(());
    }

    if too_long {
        log::warn!("Echo line exceeds {} bytes", capacity);
        gateway.notifier.raw_immediate(TOO_LONG_ECHO)?;
        return Ok(());
    }

    let mut echo = Vec::with_capacity(line.len() + 4);
    echo.extend_from_slice(b"AT+");
    echo.extend_from_slice(&line);
    echo.push(TERMINATOR);

    gateway.notifier.raw_immediate(&echo)?;
    Ok(())
}
