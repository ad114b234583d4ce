//! # Receive tasks
//!
//! One thread per open link reads from the socket and forwards the data to the AT host.
//!
//! The task ends when the peer closes the connection, a read fails or the link got removed by
//! CIPSTOP. The latter is noticed by checking the registry before and after each blocking read,
//! so the read timeout of the socket bounds the time a stopped link keeps its thread.
use crate::net::{LinkSocket, Received};
use crate::registry::{Link, LinkRegistry};
use crate::urc::{LinkState, Notifier};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Forwards received data of a single link
pub struct ReceiveTask<S: LinkSocket> {
    link: Link<S>,
    registry: Arc<LinkRegistry<S>>,
    notifier: Notifier,

    /// Max. bytes per read
    chunk_size: usize,
}

impl<S: LinkSocket> ReceiveTask<S> {
    pub fn new(link: Link<S>, registry: Arc<LinkRegistry<S>>, notifier: Notifier, chunk_size: usize) -> Self {
        Self {
            link,
            registry,
            notifier,
            chunk_size,
        }
    }

    /// Runs the task on a new thread
    pub fn spawn(self) -> Result<JoinHandle<()>, std::io::Error> {
        thread::Builder::new()
            .name(format!("recv_task_{}", self.link.link_id))
            .spawn(move || self.run())
    }

    /// Receive loop, returns once the link is closed
    pub fn run(self) {
        let handle = self.link.handle();
        let mut buffer = vec![0x0; self.chunk_size.max(1)];
        log::info!("Receive task of link {} ({:?}) started", self.link.link_id, handle);

        loop {
            if !self.registry.contains_socket(handle) {
                log::info!("Link {} removed, receive task exits", self.link.link_id);
                return;
            }

            match self.link.socket.receive(&mut buffer) {
                Err(nb::Error::WouldBlock) => continue,
                Err(nb::Error::Other(error)) => {
                    log::error!("Receive on link {} failed: {:?}", self.link.link_id, error);
                    self.close();
                    return;
                }
                Ok(Received { length: 0, .. }) => {
                    log::info!("Link {} closed by peer", self.link.link_id);
                    self.close();
                    return;
                }
                Ok(received) => {
                    if !self.registry.contains_socket(handle) {
                        log::info!("Link {} removed, dropping {} bytes", self.link.link_id, received.length);
                        return;
                    }

                    self.forward(&buffer[..received.length], received);
                }
            }
        }
    }

    fn forward(&self, data: &[u8], received: Received) {
        let remote = received.remote.or(Some(self.link.remote));
        log::debug!("Link {} received {} bytes", self.link.link_id, data.len());

        if let Err(error) = self
            .notifier
            .data_arrival(self.link.link_id, self.link.conn_type, remote, data)
        {
            log::error!("Dropped {} bytes of link {}: {:?}", data.len(), self.link.link_id, error);
        }
    }

    /// Releases the link unless CIPSTOP did so already
    fn close(&self) {
        let link = match self.registry.remove_by_socket(self.link.handle()) {
            Ok(link) => link,
            Err(_) => return,
        };

        let peer = link.socket.peer_addr();
        if let Err(error) = self
            .notifier
            .connection_status(link.link_id, link.conn_type, LinkState::Closed, peer)
        {
            log::error!("CLOSED event of link {} not sent: {:?}", link.link_id, error);
        }

        link.socket.close();
    }
}
