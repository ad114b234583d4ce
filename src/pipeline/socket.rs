//! # Socket send pipeline
//!
//! Queue of outbound payloads per socket. Depending on [SocketDelivery] the worker either
//! transmits the payloads or, when CIPSEND already sent them inline, only drains them for the
//! byte accounting. There is exactly one transmitting sink per payload.
use crate::config::SocketDelivery;
use crate::net::{LinkSocket, NetworkError, SocketHandle};
use crate::pipeline::{PipelineStats, QueueError, StatsSnapshot};
use core::net::SocketAddrV4;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Payload queued for a socket
pub struct SocketItem<S: LinkSocket> {
    socket: Arc<S>,

    /// Explicit destination of datagram sockets
    remote: Option<SocketAddrV4>,

    payload: Vec<u8>,
}

impl<S: LinkSocket> SocketItem<S> {
    pub fn handle(&self) -> SocketHandle {
        self.socket.handle()
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Producer side of the socket pipeline
pub struct SocketPipeline<S: LinkSocket> {
    queue: Sender<SocketItem<S>>,
    stats: Arc<PipelineStats>,
    delivery: SocketDelivery,
}

impl<S: LinkSocket> Clone for SocketPipeline<S> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            stats: self.stats.clone(),
            delivery: self.delivery,
        }
    }
}

impl<S: LinkSocket> SocketPipeline<S> {
    /// Spawns the worker
    pub fn start(delivery: SocketDelivery, capacity: usize) -> Result<(Self, JoinHandle<()>), std::io::Error> {
        let (queue, queue_rx) = bounded(capacity);
        let stats = Arc::new(PipelineStats::default());

        let worker = SocketWorker {
            queue: queue_rx,
            stats: stats.clone(),
            delivery,
        };

        let handle = thread::Builder::new()
            .name("socket_send".into())
            .spawn(move || worker.run())?;

        Ok((Self { queue, stats, delivery }, handle))
    }

    /// Copies and queues the payload, fails without blocking if the queue is full
    pub fn enqueue(&self, socket: &Arc<S>, remote: Option<SocketAddrV4>, payload: &[u8]) -> Result<(), QueueError> {
        if payload.is_empty() {
            return Err(QueueError::InvalidItem);
        }

        let item = SocketItem {
            socket: socket.clone(),
            remote,
            payload: payload.to_vec(),
        };
        let length = item.len();
        let queued = self.stats.add_queued(length);

        if let Err(error) = self.queue.try_send(item) {
            self.stats.release_queued(length);
            let total = self.stats.enqueue_failed();
            log::error!("Socket queue rejected {} bytes, total failures {}", length, total);
            return Err(error.into());
        }

        log::debug!("Socket queue +{} bytes, {} queued", length, queued);
        Ok(())
    }

    pub fn delivery(&self) -> SocketDelivery {
        self.delivery
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Sends the payload on the socket, to the explicit remote if given
pub fn send_over_socket<S: LinkSocket>(
    socket: &S,
    remote: Option<SocketAddrV4>,
    payload: &[u8],
) -> Result<usize, NetworkError> {
    let sent = match remote {
        Some(remote) => socket.send_to(payload, remote)?,
        None => socket.send(payload)?,
    };

    if sent != payload.len() {
        log::error!("Socket {:?} sent {} of {} bytes", socket.handle(), sent, payload.len());
    }

    Ok(sent)
}

struct SocketWorker<S: LinkSocket> {
    queue: Receiver<SocketItem<S>>,
    stats: Arc<PipelineStats>,
    delivery: SocketDelivery,
}

impl<S: LinkSocket> SocketWorker<S> {
    fn run(self) {
        log::info!("Socket send worker started ({:?})", self.delivery);

        while let Ok(item) = self.queue.recv() {
            let length = item.len();

            if item.is_empty() {
                let total = self.stats.dequeue_failed();
                log::error!("Dropping empty socket item, total {}", total);
            } else if self.delivery == SocketDelivery::Queued {
                log::debug!("Socket {:?} going to send {} bytes", item.handle(), length);

                if let Err(error) = send_over_socket(item.socket.as_ref(), item.remote, &item.payload) {
                    let total = self.stats.transmit_failed();
                    log::error!("Socket {:?} send failed: {:?}, total {}", item.handle(), error, total);
                }
            }

            let queued = self.stats.release_queued(length);
            log::debug!("Socket queue -{} bytes, {} queued", length, queued);
        }

        log::info!("Socket send worker exits");
    }
}
