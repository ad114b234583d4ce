//! # Gateway
//!
//! The service instance. [Gateway] owns the link registry, both send pipelines, the network stack
//! and the Wi-Fi HAL, and runs the dispatcher loop on the serial input.
//!
//! ## Example
//!
//! ````no_run
//! # use at_host::config::Config;
//! # use at_host::gateway::Gateway;
//! # use at_host::net::StdStack;
//! # use at_host::wifi::{Credentials, IpStatus, WifiError, WifiEvents, WifiHal};
//! # use at_host::urc::Notifier;
//! # struct Hal;
//! # impl WifiHal for Hal {
//! #     fn start_station(&self, _: &Credentials, _: WifiEvents) -> Result<(), WifiError> { Ok(()) }
//! #     fn ip_status(&self) -> Result<IpStatus, WifiError> { Err(WifiError::Unsupported) }
//! #     fn start_monitor(&self, _: Notifier) -> Result<(), WifiError> { Ok(()) }
//! #     fn stop_monitor(&self) -> Result<(), WifiError> { Ok(()) }
//! #     fn set_channel(&self, _: u8) -> Result<(), WifiError> { Ok(()) }
//! #     fn suspend_station(&self) -> Result<(), WifiError> { Ok(()) }
//! # }
//! # let serial_in: &[u8] = b"AT+CIPSTART=0,tcp_client,10.0.0.1,9000\r";
//! # let serial_out: Vec<u8> = Vec::new();
//! let mut gateway = Gateway::new(Config::default(), StdStack::new(), Hal, serial_out).unwrap();
//!
//! // Blocks until the serial input is closed
//! gateway.serve(serial_in).unwrap();
//! ````
use crate::commands::uart;
use crate::commands::{Command, CommandError};
use crate::config::Config;
use crate::net::{LinkSocket, NetworkStack};
use crate::pipeline::serial::SerialPipeline;
use crate::pipeline::socket::SocketPipeline;
use crate::pipeline::StatsSnapshot;
use crate::registry::LinkRegistry;
use crate::transport::{AtReader, ReadError};
use crate::urc::{AckStatus, Notifier, ERROR_FRAME};
use crate::wifi::WifiHal;
use core::sync::atomic::{AtomicBool, Ordering};
use embedded_io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Prefix starting every command
pub const COMMAND_PREFIX: &[u8] = b"AT+";

/// Statistics of both send pipelines
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub serial: StatsSnapshot,
    pub socket: StatsSnapshot,
}

/// AT command gateway
pub struct Gateway<S: NetworkStack, W: WifiHal> {
    pub(crate) config: Config,
    pub(crate) stack: S,
    pub(crate) wifi: W,
    pub(crate) registry: Arc<LinkRegistry<S::Socket>>,
    pub(crate) notifier: Notifier,
    pub(crate) sockets: SocketPipeline<S::Socket>,

    /// Station got an IP
    pub(crate) ip_ready: Arc<AtomicBool>,

    /// UART echo mode enabled
    pub(crate) echo: bool,

    /// Drain threads of the serial and the socket pipeline
    workers: [JoinHandle<()>; 2],
}

impl<S: NetworkStack, W: WifiHal> Gateway<S, W> {
    /// Starts both send pipelines. Everything sent to the AT host is written to `serial_out`.
    pub fn new<O: Write + Send + 'static>(config: Config, stack: S, wifi: W, serial_out: O) -> Result<Self, std::io::Error> {
        let (serial, serial_worker) = SerialPipeline::start(serial_out, config.send_queue_capacity)?;
        let (sockets, socket_worker) = SocketPipeline::start(config.socket_delivery, config.send_queue_capacity)?;

        log::info!(
            "Gateway started, queue capacity {}, socket delivery {:?}",
            config.send_queue_capacity,
            config.socket_delivery
        );

        Ok(Self {
            config,
            stack,
            wifi,
            registry: Arc::new(LinkRegistry::new()),
            notifier: Notifier::new(serial),
            sockets,
            ip_ready: Arc::new(AtomicBool::new(false)),
            echo: false,
            workers: [serial_worker, socket_worker],
        })
    }

    /// Dispatcher loop. Waits for `AT+` and handles the command following it.
    /// Returns once the serial input is closed.
    pub fn serve<R: Read>(&mut self, serial_in: R) -> Result<(), ReadError> {
        let mut reader = AtReader::new(serial_in);

        loop {
            let result = await_prefix(&mut reader).and_then(|_| self.handle_command(&mut reader));

            match result {
                Ok(()) => {}
                Err(ReadError::Eof) => {
                    log::info!("Serial input closed after {} bytes", reader.consumed());
                    return Ok(());
                }
                Err(error) => {
                    log::error!("Serial input failed: {:?}", error);
                    return Err(error);
                }
            }
        }
    }

    /// Handles a single command, the `AT+` prefix is already consumed.
    ///
    /// Command errors are answered with a failure frame. Just errors of the serial input itself
    /// are returned.
    pub fn handle_command<R: Read>(&mut self, reader: &mut AtReader<R>) -> Result<(), ReadError> {
        if self.echo {
            return match uart::echo_line(self, reader) {
                Err(CommandError::Read(error @ (ReadError::Eof | ReadError::Transport(_)))) => Err(error),
                Err(error) => {
                    log::error!("Echo failed: {:?}", error);
                    Ok(())
                }
                Ok(()) => Ok(()),
            };
        }

        let command = match Command::resolve(reader)? {
            Some(command) => command,
            None => {
                self.reply_failure(false);
                return Ok(());
            }
        };

        match command.execute(self, reader) {
            Ok(()) => Ok(()),
            Err(CommandError::Read(error @ (ReadError::Eof | ReadError::Transport(_)))) => Err(error),
            Err(error) => {
                log::error!("{} failed: {:?}", command.name(), error);
                self.reply_failure(command.is_onboarding());
                Ok(())
            }
        }
    }

    pub fn registry(&self) -> &Arc<LinkRegistry<S::Socket>> {
        &self.registry
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            serial: self.notifier.serial().stats(),
            socket: self.sockets.stats(),
        }
    }

    /// True once the station obtained an IP
    pub fn is_ip_ready(&self) -> bool {
        self.ip_ready.load(Ordering::Acquire)
    }

    pub fn is_echo_enabled(&self) -> bool {
        self.echo
    }

    /// True while both pipeline workers are running
    pub fn is_running(&self) -> bool {
        self.workers.iter().all(|worker| !worker.is_finished())
    }

    /// Returns a handle logging the pipeline statistics periodically
    pub fn heartbeat(&self) -> Heartbeat<S::Socket> {
        Heartbeat {
            serial: self.notifier.serial().clone(),
            sockets: self.sockets.clone(),
        }
    }

    fn reply_failure(&self, immediate: bool) {
        let result = if immediate {
            self.notifier.raw_immediate(ERROR_FRAME)
        } else {
            self.notifier.ack(AckStatus::Failure)
        };

        if let Err(error) = result {
            log::error!("Failure reply not sent: {:?}", error);
        }
    }
}

/// Consumes bytes until `AT+` was read
fn await_prefix<R: Read>(reader: &mut AtReader<R>) -> Result<(), ReadError> {
    let mut matched = 0;

    while matched < COMMAND_PREFIX.len() {
        let byte = reader.read_byte()?;

        matched = if byte == COMMAND_PREFIX[matched] {
            matched + 1
        } else if byte == COMMAND_PREFIX[0] {
            1
        } else {
            0
        };
    }

    Ok(())
}

/// Periodic "alive" log line with pipeline statistics
pub struct Heartbeat<T: LinkSocket> {
    serial: SerialPipeline,
    sockets: SocketPipeline<T>,
}

impl<T: LinkSocket> Heartbeat<T> {
    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            serial: self.serial.stats(),
            socket: self.sockets.stats(),
        }
    }

    /// Logs the statistics every `interval` on a new thread
    pub fn spawn(self, interval: Duration) -> Result<JoinHandle<()>, std::io::Error> {
        thread::Builder::new().name("heartbeat".into()).spawn(move || loop {
            thread::sleep(interval);

            let stats = self.stats();
            log::info!("alive, serial {:?}, socket {:?}", stats.serial, stats.socket);
        })
    }
}
