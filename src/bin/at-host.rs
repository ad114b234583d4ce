//! Runs the gateway on Linux using a serial-USB-adapter.
//!
//! Wi-Fi control is not available on Linux hosts, the network is the one of the host itself.
use at_host::config::Config;
use at_host::gateway::Gateway;
use at_host::net::StdStack;
use at_host::urc::Notifier;
use at_host::wifi::{Credentials, IpStatus, WifiError, WifiEvents, WifiHal};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::{env, io, time::Duration};

fn main() {
    env_logger::init();

    // Parse args
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        println!("Usage: {} <path-to-serial> <baudrate>", args[0]);
        println!("Example: {} /dev/ttyUSB0 115200", args[0]);
        println!("\nNote: To run with debug logging, run it like this:");
        println!("\n  RUST_LOG=debug {} /dev/ttyUSB0 115200", args[0]);
        std::process::exit(1);
    }
    let dev = &args[1];
    let baud_rate: u32 = match args[2].parse() {
        Ok(baud_rate) => baud_rate,
        Err(_) => {
            println!("Invalid baud rate {}", args[2]);
            std::process::exit(1);
        }
    };

    println!("Starting (dev={}, baud={:?})...", dev, baud_rate);

    // Open serial port
    let serial_tx = serialport::new(dev, baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(500))
        .open()
        .expect("Could not open serial port");
    let mut serial_rx = serial_tx.try_clone().expect("Could not clone serial port");

    // Flush serial RX buffer, to ensure that there isn't any remaining left
    // form previous sessions.
    flush_serial(&mut serial_rx);

    let config = Config::default();
    let heartbeat_interval = config.heartbeat_interval;

    let mut gateway = Gateway::new(config, StdStack::new(), NoWifi, SerialOut(serial_tx)).expect("Could not start gateway");
    gateway
        .heartbeat()
        .spawn(heartbeat_interval)
        .expect("Could not start heartbeat");

    println!("Ready");
    if let Err(error) = gateway.serve(SerialIn(serial_rx)) {
        log::error!("Gateway stopped: {:?}", error);
        std::process::exit(2);
    }
}

/// Flush the serial port receive buffer.
fn flush_serial(serial_rx: &mut Box<dyn SerialPort>) {
    let mut buf = [0; 32];
    loop {
        match io::Read::read(serial_rx, &mut buf[..]) {
            Ok(0) => break,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => break,
            Ok(_) => continue,
            Err(e) => panic!("Error while flushing serial: {}", e),
        }
    }
}

/// Blocking serial input, read timeouts are retried
struct SerialIn(Box<dyn SerialPort>);

impl embedded_io::ErrorType for SerialIn {
    type Error = io::Error;
}

impl embedded_io::Read for SerialIn {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        loop {
            match io::Read::read(&mut self.0, buf) {
                Err(e) => match e.kind() {
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => continue,
                    _ => return Err(e),
                },
                result => return result,
            }
        }
    }
}

struct SerialOut(Box<dyn SerialPort>);

impl embedded_io::ErrorType for SerialOut {
    type Error = io::Error;
}

impl embedded_io::Write for SerialOut {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        io::Write::write(&mut self.0, buf)
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        io::Write::flush(&mut self.0)
    }
}

/// Wi-Fi HAL of hosts without radio control
struct NoWifi;

impl WifiHal for NoWifi {
    fn start_station(&self, credentials: &Credentials, _events: WifiEvents) -> Result<(), WifiError> {
        log::warn!("Joining {} not supported on this host", credentials.ssid);
        Err(WifiError::Unsupported)
    }

    fn ip_status(&self) -> Result<IpStatus, WifiError> {
        Err(WifiError::Unsupported)
    }

    fn start_monitor(&self, _frames: Notifier) -> Result<(), WifiError> {
        Err(WifiError::Unsupported)
    }

    fn stop_monitor(&self) -> Result<(), WifiError> {
        Err(WifiError::Unsupported)
    }

    fn set_channel(&self, _channel: u8) -> Result<(), WifiError> {
        Err(WifiError::Unsupported)
    }

    fn suspend_station(&self) -> Result<(), WifiError> {
        Err(WifiError::Unsupported)
    }
}
