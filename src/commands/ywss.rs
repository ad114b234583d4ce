//! # Onboarding commands
//!
//! Monitor mode and station control used during Wi-Fi onboarding. All replies use the immediate
//! serial path.
use crate::commands::CommandError;
use crate::gateway::Gateway;
use crate::net::NetworkStack;
use crate::transport::{AtReader, Charset, Delimiter};
use crate::urc::{MONITOR_DOWN_FRAME, MONITOR_UP_FRAME, OK_FRAME};
use crate::wifi::WifiHal;
use embedded_io::Read;
use std::thread;

const CHANNEL_FIELD_LEN: usize = 4;

pub fn start_monitor<S: NetworkStack, W: WifiHal>(gateway: &mut Gateway<S, W>) -> Result<(), CommandError> {
    gateway.notifier.raw_immediate(OK_FRAME)?;
    gateway.notifier.raw_immediate(MONITOR_UP_FRAME)?;

    thread::sleep(gateway.config.monitor_settle);

    log::info!("Starting monitor mode");
    gateway.wifi.start_monitor(gateway.notifier.clone())?;
    Ok(())
}

pub fn stop_monitor<S: NetworkStack, W: WifiHal>(gateway: &mut Gateway<S, W>) -> Result<(), CommandError> {
    log::info!("Stopping monitor mode");
    gateway.wifi.stop_monitor()?;

    gateway.notifier.raw_immediate(OK_FRAME)?;
    gateway.notifier.raw_immediate(MONITOR_DOWN_FRAME)?;
    Ok(())
}

/// `<channel>\r`, the `,` is consumed by the dispatcher already
pub fn set_channel<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    let channel: u8 = reader
        .read_field::<CHANNEL_FIELD_LEN>(Charset::Digits)?
        .expect(Delimiter::Terminator)?
        .parse()?;

    log::debug!("Switching to channel {}", channel);
    gateway.wifi.set_channel(channel)?;

    gateway.notifier.raw_immediate(OK_FRAME)?;
    Ok(())
}

pub fn suspend_station<S: NetworkStack, W: WifiHal>(gateway: &mut Gateway<S, W>) -> Result<(), CommandError> {
    log::info!("Suspending station");
    gateway.wifi.suspend_station()?;

    gateway.notifier.raw_immediate(OK_FRAME)?;
    Ok(())
}
