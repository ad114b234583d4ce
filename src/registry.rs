//! # Link registry
//!
//! Fixed table binding the link ids chosen by the AT host to open sockets. Shared by the
//! dispatcher and all receive tasks, every access happens inside a short critical section.
//!
//! Uniqueness of link ids is checked by the callers before [LinkRegistry::insert]. A slot is
//! either empty or holds a complete [Link].
use crate::config::MAX_LINKS;
use crate::net::{ConnectionType, LinkSocket, SocketHandle};
use core::cell::RefCell;
use core::fmt;
use core::net::SocketAddrV4;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use std::sync::Arc;

/// Registry errors
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryError {
    /// All slots are occupied
    Full,

    /// No link exists for the given socket
    NotFound,
}

/// A registered link
pub struct Link<S: LinkSocket> {
    /// Id chosen by the AT host
    pub link_id: usize,

    /// Requested connection type
    pub conn_type: ConnectionType,

    /// Remote address given by CIPSTART
    pub remote: SocketAddrV4,

    /// Open socket
    pub socket: Arc<S>,
}

impl<S: LinkSocket> Link<S> {
    pub fn handle(&self) -> SocketHandle {
        self.socket.handle()
    }
}

impl<S: LinkSocket> fmt::Debug for Link<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("link_id", &self.link_id)
            .field("conn_type", &self.conn_type)
            .field("remote", &self.remote)
            .field("handle", &self.handle())
            .finish()
    }
}

impl<S: LinkSocket> Clone for Link<S> {
    fn clone(&self) -> Self {
        Self {
            link_id: self.link_id,
            conn_type: self.conn_type,
            remote: self.remote,
            socket: self.socket.clone(),
        }
    }
}

/// Table of open links, capacity [MAX_LINKS]
pub struct LinkRegistry<S: LinkSocket> {
    slots: Mutex<CriticalSectionRawMutex, RefCell<[Option<Link<S>>; MAX_LINKS]>>,
}

impl<S: LinkSocket> Default for LinkRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LinkSocket> LinkRegistry<S> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new(Default::default())),
        }
    }

    /// Returns the link id bound to the given socket
    pub fn find_by_socket(&self, handle: SocketHandle) -> Option<usize> {
        self.with_link_by_socket(handle, |link| link.link_id)
    }

    /// Returns the socket handle bound to the given link id
    pub fn find_by_link_id(&self, link_id: usize) -> Option<SocketHandle> {
        self.link(link_id).map(|link| link.handle())
    }

    /// Returns the connection type of the given socket
    pub fn conn_type_of(&self, handle: SocketHandle) -> Option<ConnectionType> {
        self.with_link_by_socket(handle, |link| link.conn_type)
    }

    /// Returns a copy of the link registered for the given link id
    pub fn link(&self, link_id: usize) -> Option<Link<S>> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .flatten()
                .find(|link| link.link_id == link_id)
                .cloned()
        })
    }

    /// Returns a copy of the link registered for the given socket
    pub fn link_by_socket(&self, handle: SocketHandle) -> Option<Link<S>> {
        self.with_link_by_socket(handle, Link::clone)
    }

    /// True if a link for the given socket exists
    pub fn contains_socket(&self, handle: SocketHandle) -> bool {
        self.find_by_socket(handle).is_some()
    }

    /// Stores the link in the first empty slot
    pub fn insert(&self, link: Link<S>) -> Result<(), RegistryError> {
        let link_id = link.link_id;

        let result = self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();

            match slots.iter_mut().find(|slot| slot.is_none()) {
                Some(slot) => {
                    *slot = Some(link);
                    Ok(())
                }
                None => Err(RegistryError::Full),
            }
        });

        if result.is_err() {
            log::error!("No free slot for link id {}", link_id);
        }

        result
    }

    /// Removes the link bound to the given socket and returns it
    pub fn remove_by_socket(&self, handle: SocketHandle) -> Result<Link<S>, RegistryError> {
        self.slots.lock(|slots| {
            let mut slots = slots.borrow_mut();

            slots
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|link| link.handle() == handle))
                .and_then(Option::take)
                .ok_or(RegistryError::NotFound)
        })
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.lock(|slots| slots.borrow().iter().flatten().count())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_link_by_socket<T>(&self, handle: SocketHandle, f: impl FnOnce(&Link<S>) -> T) -> Option<T> {
        self.slots.lock(|slots| {
            slots
                .borrow()
                .iter()
                .flatten()
                .find(|link| link.handle() == handle)
                .map(f)
        })
    }
}
