//! Tests for the pending request registry.

use super::*;
use crate::buffer::{AllocationStrategy, IoBuffer};
use crate::operation::{Descriptor, OperationKind};
use std::os::fd::{AsRawFd, OwnedFd};

fn owned_read_request(len: usize) -> AsyncFileRequest {
    let fd = OwnedFd::from(tempfile::tempfile().unwrap());
    let buffer = IoBuffer::allocate(len, AllocationStrategy::Heap).unwrap();
    AsyncFileRequest::read(fd.into(), buffer, 0, "owned", None)
}

fn borrowed_write_request(fd: RawFd, payload: &[u8]) -> AsyncFileRequest {
    let buffer = IoBuffer::copy_from(payload, AllocationStrategy::for_writes()).unwrap();
    AsyncFileRequest::write(Descriptor::Borrowed(fd), buffer, 0, "borrowed", None)
}

mod basic_functionality {
    use super::*;

    #[test]
    fn new_registry_is_empty() {
        let registry = PendingRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn default_registry_is_empty() {
        let registry = PendingRegistry::default();
        assert!(registry.is_empty());
        assert!(PendingRegistry::with_capacity(8).is_empty());
    }

    #[test]
    fn insert_then_contains() {
        let mut registry = PendingRegistry::new();
        let request = owned_read_request(32);
        let fd = request.fd();

        registry.insert(request).unwrap();

        assert!(registry.contains(fd));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(fd).unwrap().kind(), OperationKind::Read);
        assert_eq!(registry.descriptors().collect::<Vec<_>>(), vec![fd]);
    }
}

mod duplicate_descriptors {
    use super::*;

    #[test]
    fn second_insert_is_rejected() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        let mut registry = PendingRegistry::new();

        registry.insert(borrowed_write_request(fd, b"first")).unwrap();
        let err = registry
            .insert(borrowed_write_request(fd, b"second"))
            .unwrap_err();

        assert_eq!(err, DuplicateKey { fd });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn live_request_survives_rejection() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        let mut registry = PendingRegistry::new();

        registry.insert(borrowed_write_request(fd, b"first")).unwrap();
        let _ = registry.insert(borrowed_write_request(fd, b"second!"));

        let live = registry.take(fd).unwrap();
        assert_eq!(live.buffer().as_slice(), b"first");
    }

    #[test]
    fn key_is_reusable_after_take() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        let mut registry = PendingRegistry::new();

        registry.insert(borrowed_write_request(fd, b"a")).unwrap();
        registry.take(fd).unwrap();
        registry.insert(borrowed_write_request(fd, b"b")).unwrap();

        assert_eq!(registry.len(), 1);
    }
}

mod removal {
    use super::*;

    #[test]
    fn take_is_idempotent() {
        let mut registry = PendingRegistry::new();
        let request = owned_read_request(8);
        let fd = request.fd();
        registry.insert(request).unwrap();

        assert!(registry.take(fd).is_some());
        assert!(registry.take(fd).is_none());
        assert!(!registry.contains(fd));
    }

    #[test]
    fn take_unknown_descriptor() {
        let mut registry = PendingRegistry::new();
        assert!(registry.take(12345).is_none());
    }

    #[test]
    fn take_leaves_other_requests() {
        let mut registry = PendingRegistry::new();
        let first = owned_read_request(8);
        let second = owned_read_request(8);
        let (a, b) = (first.fd(), second.fd());
        registry.insert(first).unwrap();
        registry.insert(second).unwrap();

        registry.take(a).unwrap();

        assert!(registry.contains(b));
        assert_eq!(registry.len(), 1);
    }
}
