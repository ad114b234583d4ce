//! # Wi-Fi commands
//!
//! WJAP, WJAPIP and WMAC, all delegated to the [WifiHal].
use crate::commands::CommandError;
use crate::gateway::Gateway;
use crate::net::NetworkStack;
use crate::transport::{AtReader, Charset, Delimiter};
use crate::urc::AckStatus;
use crate::wifi::{Credentials, WifiEvents, WifiHal, MAX_KEY_LEN, MAX_SSID_LEN};
use embedded_io::Read;

/// `<ssid>,<key>\r`, the `=` is consumed by the dispatcher already
pub fn join<S, W, R>(gateway: &mut Gateway<S, W>, reader: &mut AtReader<R>) -> Result<(), CommandError>
where
    S: NetworkStack,
    W: WifiHal,
    R: Read,
{
    let ssid = reader
        .read_field::<{ MAX_SSID_LEN + 1 }>(Charset::Any)?
        .expect(Delimiter::Separator)?;
    let key = reader
        .read_field::<{ MAX_KEY_LEN + 1 }>(Charset::Any)?
        .expect(Delimiter::Terminator)?;

    let credentials = Credentials::new(ssid.as_str()?, key.as_str()?)?;
    log::info!("Joining access point {}", credentials.ssid);

    let events = WifiEvents::new(gateway.notifier.clone(), gateway.ip_ready.clone());
    gateway.wifi.start_station(&credentials, events)?;

    gateway.notifier.ack(AckStatus::Success)?;
    Ok(())
}

pub fn ip_info<S: NetworkStack, W: WifiHal>(gateway: &mut Gateway<S, W>) -> Result<(), CommandError> {
    let status = gateway.wifi.ip_status()?;
    gateway.notifier.ip_info(&status)?;
    Ok(())
}

pub fn mac<S: NetworkStack, W: WifiHal>(gateway: &mut Gateway<S, W>) -> Result<(), CommandError> {
    let status = gateway.wifi.ip_status()?;
    gateway.notifier.mac(&status.mac)?;
    Ok(())
}
