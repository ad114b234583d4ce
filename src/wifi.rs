//! # Wi-Fi control
//!
//! The radio itself is driven by a platform HAL behind [WifiHal]. The gateway hands the HAL a
//! [WifiEvents] handle when joining a network; station and access point state changes reported
//! through it are forwarded to the AT host as `+WEVENT` frames.
use crate::urc::Notifier;
use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};
use heapless::String;
use std::sync::Arc;

/// Max. SSID length in bytes
pub const MAX_SSID_LEN: usize = 32;

/// Max. key length in bytes
pub const MAX_KEY_LEN: usize = 64;

/// Errors reported by the Wi-Fi HAL
#[derive(Clone, Debug, PartialEq)]
pub enum WifiError {
    /// HAL call failed with the given status code
    Hal(i32),

    /// Operation not available on this platform
    Unsupported,

    /// Given SSID is longer then [MAX_SSID_LEN]
    InvalidSsidLength,

    /// Given key is longer then [MAX_KEY_LEN]
    InvalidKeyLength,
}

/// Station credentials
#[derive(Clone, Debug, PartialEq)]
pub struct Credentials {
    pub ssid: String<MAX_SSID_LEN>,
    pub key: String<MAX_KEY_LEN>,
}

impl Credentials {
    pub fn new(ssid: &str, key: &str) -> Result<Self, WifiError> {
        let mut credentials = Self {
            ssid: String::new(),
            key: String::new(),
        };

        credentials
            .ssid
            .push_str(ssid)
            .map_err(|_| WifiError::InvalidSsidLength)?;
        credentials.key.push_str(key).map_err(|_| WifiError::InvalidKeyLength)?;

        Ok(credentials)
    }
}

/// Address information of the station interface
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IpStatus {
    pub ip: Ipv4Addr,
    pub mask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub mac: [u8; 6],
}

/// State changes reported by the HAL
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WifiEvent {
    /// Station got an IP address
    IpObtained,
    StationUp,
    StationDown,
    ApUp,
    ApDown,
}

/// Platform Wi-Fi driver
pub trait WifiHal: Send + Sync + 'static {
    /// Starts joining the access point in station mode with DHCP.
    /// State changes are reported through `events` afterwards.
    fn start_station(&self, credentials: &Credentials, events: WifiEvents) -> Result<(), WifiError>;

    /// Returns the address information of the station interface
    fn ip_status(&self) -> Result<IpStatus, WifiError>;

    /// Starts capturing frames in monitor mode, each frame is passed to `frames`
    fn start_monitor(&self, frames: Notifier) -> Result<(), WifiError>;

    fn stop_monitor(&self) -> Result<(), WifiError>;

    fn set_channel(&self, channel: u8) -> Result<(), WifiError>;

    fn suspend_station(&self) -> Result<(), WifiError>;
}

/// Sink for [WifiEvent]s handed to the HAL
#[derive(Clone)]
pub struct WifiEvents {
    notifier: Notifier,

    /// True once the station obtained an IP
    ip_ready: Arc<AtomicBool>,
}

impl WifiEvents {
    pub fn new(notifier: Notifier, ip_ready: Arc<AtomicBool>) -> Self {
        Self { notifier, ip_ready }
    }

    /// Updates the station state and notifies the AT host
    pub fn notify(&self, event: WifiEvent) {
        match event {
            WifiEvent::IpObtained | WifiEvent::StationUp => self.ip_ready.store(true, Ordering::Release),
            WifiEvent::StationDown => self.ip_ready.store(false, Ordering::Release),
            WifiEvent::ApUp | WifiEvent::ApDown => {}
        }

        if let Err(error) = self.notifier.wifi_status(event) {
            log::error!("Wi-Fi event {:?} not delivered: {:?}", event, error);
        }
    }

    pub fn is_ip_ready(&self) -> bool {
        self.ip_ready.load(Ordering::Acquire)
    }
}
