//! # Serial send pipeline
//!
//! Every byte sent to the AT host passes this pipeline. Items of the regular queue are written
//! strictly in enqueue order. Items submitted by [SerialPipeline::send_immediate] bypass that
//! order: the worker prefers them whenever both queues hold data.
use crate::pipeline::{PipelineStats, QueueError, StatsSnapshot};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use embedded_io::{Error as IoError, ErrorKind, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Frame queued for the AT host
#[derive(Clone, Debug, PartialEq)]
pub struct SerialItem {
    /// Command or frame header
    command: Vec<u8>,

    /// Raw data written directly after the command
    payload: Option<Vec<u8>>,
}

impl SerialItem {
    /// Copies the given buffers into a new item
    pub fn new(command: &[u8], payload: Option<&[u8]>) -> Result<Self, QueueError> {
        let item = Self {
            command: command.to_vec(),
            payload: payload.map(<[u8]>::to_vec),
        };

        if !item.is_valid() {
            return Err(QueueError::InvalidItem);
        }

        Ok(item)
    }

    /// Total number of bytes to transmit
    pub fn len(&self) -> usize {
        self.command.len() + self.payload.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Command must not be empty, a payload if present neither
    fn is_valid(&self) -> bool {
        !self.command.is_empty() && self.payload.as_ref().map_or(true, |payload| !payload.is_empty())
    }
}

/// Writes the bytes as they are
pub fn write_no_response<W: Write>(writer: &mut W, command: &[u8]) -> Result<usize, ErrorKind> {
    writer.write_all(command).map_err(|error| error.kind())?;
    writer.flush().map_err(|error| error.kind())?;
    Ok(command.len())
}

/// Writes a header directly followed by raw payload bytes
pub fn write_framed<W: Write>(writer: &mut W, header: &[u8], payload: &[u8]) -> Result<usize, ErrorKind> {
    writer.write_all(header).map_err(|error| error.kind())?;
    writer.write_all(payload).map_err(|error| error.kind())?;
    writer.flush().map_err(|error| error.kind())?;
    Ok(header.len() + payload.len())
}

/// Producer side of the serial pipeline, cheap to clone
#[derive(Clone)]
pub struct SerialPipeline {
    queue: Sender<SerialItem>,
    immediate: Sender<SerialItem>,
    stats: Arc<PipelineStats>,
}

impl SerialPipeline {
    /// Spawns the worker draining both queues into the given writer
    pub fn start<W: Write + Send + 'static>(
        writer: W,
        capacity: usize,
    ) -> Result<(Self, JoinHandle<()>), std::io::Error> {
        let (queue, queue_rx) = bounded(capacity);
        let (immediate, immediate_rx) = bounded(capacity);
        let stats = Arc::new(PipelineStats::default());

        let worker = SerialWorker {
            writer,
            queue: queue_rx,
            immediate: immediate_rx,
            stats: stats.clone(),
        };

        let handle = thread::Builder::new()
            .name("serial_send".into())
            .spawn(move || worker.run())?;

        Ok((Self { queue, immediate, stats }, handle))
    }

    /// Queues a frame, fails without blocking if the queue is full
    pub fn enqueue(&self, command: &[u8], payload: Option<&[u8]>) -> Result<(), QueueError> {
        self.submit(&self.queue, command, payload)
    }

    /// Submits a frame which may overtake queued frames
    pub fn send_immediate(&self, command: &[u8], payload: Option<&[u8]>) -> Result<(), QueueError> {
        self.submit(&self.immediate, command, payload)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn submit(&self, sender: &Sender<SerialItem>, command: &[u8], payload: Option<&[u8]>) -> Result<(), QueueError> {
        let item = SerialItem::new(command, payload)?;
        let length = item.len();

        // Accounted before the worker can see the item
        let queued = self.stats.add_queued(length);

        if let Err(error) = sender.try_send(item) {
            self.stats.release_queued(length);
            let total = self.stats.enqueue_failed();
            log::error!("Serial queue rejected {} bytes, total failures {}", length, total);
            return Err(error.into());
        }

        log::debug!("Serial queue +{} bytes, {} queued", length, queued);
        Ok(())
    }
}

struct SerialWorker<W: Write> {
    writer: W,
    queue: Receiver<SerialItem>,
    immediate: Receiver<SerialItem>,
    stats: Arc<PipelineStats>,
}

impl<W: Write> SerialWorker<W> {
    fn run(mut self) {
        log::info!("Serial send worker started");

        while let Some(item) = self.next_item() {
            let length = item.len();

            if !item.is_valid() {
                let total = self.stats.dequeue_failed();
                log::error!("Dropping invalid serial item, total {}", total);
            } else if let Err(error) = self.transmit(&item) {
                let total = self.stats.transmit_failed();
                log::error!("Serial send of {} bytes failed: {:?}, total {}", length, error, total);
            }

            let queued = self.stats.release_queued(length);
            log::debug!("Serial queue -{} bytes, {} queued", length, queued);
        }

        log::info!("Serial send worker exits");
    }

    /// Blocks for the next item, immediate ones first. Returns None once all producers are gone.
    fn next_item(&self) -> Option<SerialItem> {
        if let Ok(item) = self.immediate.try_recv() {
            return Some(item);
        }

        select! {
            recv(self.immediate) -> item => item.ok().or_else(|| self.queue.recv().ok()),
            recv(self.queue) -> item => item.ok().or_else(|| self.immediate.recv().ok()),
        }
    }

    fn transmit(&mut self, item: &SerialItem) -> Result<usize, ErrorKind> {
        match &item.payload {
            None => write_no_response(&mut self.writer, &item.command),
            Some(payload) => write_framed(&mut self.writer, &item.command, payload),
        }
    }
}
