use crate::config::MAX_LINKS;
use crate::net::{ConnectionType, SocketHandle};
use crate::registry::{Link, LinkRegistry, RegistryError};
use crate::tests::mock::FakeSocket;
use core::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::thread;

fn link(link_id: usize, handle: usize, conn_type: ConnectionType) -> Link<FakeSocket> {
    let remote = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 9000 + link_id as u16);
    let (socket, _) = FakeSocket::new(handle, conn_type, remote);

    Link {
        link_id,
        conn_type,
        remote,
        socket: Arc::new(socket),
    }
}

#[test]
fn test_insert_and_lookup() {
    let registry = LinkRegistry::new();
    assert!(registry.is_empty());

    registry.insert(link(2, 40, ConnectionType::TcpClient)).unwrap();
    registry.insert(link(0, 41, ConnectionType::UdpUnicast)).unwrap();

    assert_eq!(2, registry.len());
    assert_eq!(Some(2), registry.find_by_socket(SocketHandle(40)));
    assert_eq!(Some(0), registry.find_by_socket(SocketHandle(41)));
    assert_eq!(Some(SocketHandle(40)), registry.find_by_link_id(2));
    assert_eq!(Some(SocketHandle(41)), registry.find_by_link_id(0));
    assert_eq!(Some(ConnectionType::UdpUnicast), registry.conn_type_of(SocketHandle(41)));
    assert!(registry.contains_socket(SocketHandle(40)));

    let stored = registry.link(2).unwrap();
    assert_eq!(9002, stored.remote.port());
    assert_eq!(SocketHandle(40), stored.handle());
    assert_eq!(2, registry.link_by_socket(SocketHandle(40)).unwrap().link_id);
}

#[test]
fn test_lookup_not_found() {
    let registry: LinkRegistry<FakeSocket> = LinkRegistry::new();

    assert_eq!(None, registry.find_by_socket(SocketHandle(1)));
    assert_eq!(None, registry.find_by_link_id(1));
    assert_eq!(None, registry.conn_type_of(SocketHandle(1)));
    assert!(registry.link(1).is_none());
    assert!(!registry.contains_socket(SocketHandle(1)));
}

#[test]
fn test_insert_full() {
    let registry = LinkRegistry::new();

    for link_id in 0..MAX_LINKS {
        registry.insert(link(link_id, 10 + link_id, ConnectionType::TcpClient)).unwrap();
    }

    let result = registry.insert(link(0, 99, ConnectionType::TcpClient));
    assert_eq!(RegistryError::Full, result.unwrap_err());

    // Existing entries are untouched
    assert_eq!(MAX_LINKS, registry.len());
    for link_id in 0..MAX_LINKS {
        assert_eq!(Some(SocketHandle(10 + link_id)), registry.find_by_link_id(link_id));
    }
    assert!(!registry.contains_socket(SocketHandle(99)));
}

#[test]
fn test_remove_frees_slot() {
    let registry = LinkRegistry::new();

    for link_id in 0..MAX_LINKS {
        registry.insert(link(link_id, 10 + link_id, ConnectionType::TcpClient)).unwrap();
    }

    let removed = registry.remove_by_socket(SocketHandle(12)).unwrap();
    assert_eq!(2, removed.link_id);
    assert_eq!(None, registry.find_by_link_id(2));
    assert_eq!(MAX_LINKS - 1, registry.len());

    registry.insert(link(2, 20, ConnectionType::UdpBroadcast)).unwrap();
    assert_eq!(Some(SocketHandle(20)), registry.find_by_link_id(2));
    assert_eq!(Some(ConnectionType::UdpBroadcast), registry.conn_type_of(SocketHandle(20)));
}

#[test]
fn test_remove_not_found() {
    let registry = LinkRegistry::new();
    registry.insert(link(1, 10, ConnectionType::TcpClient)).unwrap();

    assert_eq!(RegistryError::NotFound, registry.remove_by_socket(SocketHandle(11)).unwrap_err());
    registry.remove_by_socket(SocketHandle(10)).unwrap();
    assert_eq!(RegistryError::NotFound, registry.remove_by_socket(SocketHandle(10)).unwrap_err());
    assert!(registry.is_empty());
}

#[test]
fn test_concurrent_remove_claims_once() {
    let registry = Arc::new(LinkRegistry::new());
    registry.insert(link(3, 30, ConnectionType::TcpClient)).unwrap();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.remove_by_socket(SocketHandle(30)).is_ok())
        })
        .collect();

    let claimed = workers
        .into_iter()
        .map(|worker| worker.join().unwrap())
        .filter(|removed| *removed)
        .count();
    assert_eq!(1, claimed);
    assert!(registry.is_empty());
}
