//! # Service configuration
//!
//! All limits of the gateway are collected here. The defaults match the behaviour of the
//! AT host firmware, so `Config::default()` is what production uses.
//!
//! ## Example
//!
//! ````
//! # use core::time::Duration;
//! # use at_host::config::{Config, SocketDelivery};
//! let config = Config::default()
//!     .with_recv_poll_interval(Duration::from_millis(100))
//!     .with_socket_delivery(SocketDelivery::Queued);
//!
//! assert_eq!(50, config.send_queue_capacity);
//! assert_eq!(SocketDelivery::Queued, config.socket_delivery);
//! ````
use core::time::Duration;

/// Max. number of concurrently open links, valid link ids are `0..MAX_LINKS`
pub const MAX_LINKS: usize = 5;

/// Default item capacity of both send pipelines
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 50;

/// Default max. bytes read from a socket in one go
pub const DEFAULT_RECV_CHUNK_SIZE: usize = 1500;

/// Upper limit for the `data_length` field of CIPSEND
pub const DEFAULT_MAX_SEND_LENGTH: usize = 8192;

/// Default max. line length while UART echo is enabled
pub const DEFAULT_ECHO_LINE_CAPACITY: usize = 1024;

/// Which sink transmits CIPSEND payloads
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SocketDelivery {
    /// CIPSEND sends synchronously. The socket pipeline only keeps the byte accounting.
    Inline,

    /// CIPSEND only enqueues. The socket pipeline worker transmits.
    Queued,
}

/// Gateway configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Item capacity of the serial and the socket pipeline
    pub send_queue_capacity: usize,

    /// Max. bytes read per socket read in a receive task
    pub recv_chunk_size: usize,

    /// Socket read timeout, after which a receive task checks whether its link still exists
    pub recv_poll_interval: Duration,

    /// Max. accepted CIPSEND payload length
    pub max_send_length: usize,

    /// Max. line length in UART echo mode
    pub echo_line_capacity: usize,

    /// Delivery path of CIPSEND payloads
    pub socket_delivery: SocketDelivery,

    /// Delay between announcing MONITOR_UP and starting the capture
    pub monitor_settle: Duration,

    /// Interval of the "alive" log line
    pub heartbeat_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            recv_chunk_size: DEFAULT_RECV_CHUNK_SIZE,
            recv_poll_interval: Duration::from_millis(500),
            max_send_length: DEFAULT_MAX_SEND_LENGTH,
            echo_line_capacity: DEFAULT_ECHO_LINE_CAPACITY,
            socket_delivery: SocketDelivery::Inline,
            monitor_settle: Duration::from_millis(200),
            heartbeat_interval: Duration::from_secs(50),
        }
    }
}

impl Config {
    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity;
        self
    }

    pub fn with_recv_chunk_size(mut self, size: usize) -> Self {
        self.recv_chunk_size = size;
        self
    }

    pub fn with_recv_poll_interval(mut self, interval: Duration) -> Self {
        self.recv_poll_interval = interval;
        self
    }

    pub fn with_max_send_length(mut self, length: usize) -> Self {
        self.max_send_length = length;
        self
    }

    pub fn with_echo_line_capacity(mut self, capacity: usize) -> Self {
        self.echo_line_capacity = capacity;
        self
    }

    pub fn with_socket_delivery(mut self, delivery: SocketDelivery) -> Self {
        self.socket_delivery = delivery;
        self
    }

    pub fn with_monitor_settle(mut self, delay: Duration) -> Self {
        self.monitor_settle = delay;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
