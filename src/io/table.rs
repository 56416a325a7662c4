use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::{
    common::errors::{BridgeError, BridgeResult},
    io::session::{Endpoint, Handle, IoSession},
};

pub type SharedSession = Arc<Mutex<IoSession>>;

#[derive(Default)]
struct Slot {
    session: Option<SharedSession>,
    generation: u32,
    open: bool,
}

impl Slot {
    fn is_free(&self) -> bool {
        !self.open
    }

    fn open_session(&self) -> Option<SharedSession> {
        self.session.clone().filter(|_| self.open)
    }
}

struct Slots {
    slots: Vec<Slot>,
    live: usize,
}

/// Fixed-capacity registry of I/O sessions addressed by small integer
/// handles.
///
/// Allocation, release and lookup all go through one lock. Each session
/// also has its own lock, held while bytes move, so a close waits for an
/// in-flight transfer on the same session to finish. Lookups never hold the
/// table lock while a transfer runs.
pub struct SessionTable {
    inner: Mutex<Slots>,
    capacity: usize,
}

/// A handle paired with the slot generation it was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKey {
    pub handle: Handle,
    pub generation: u32,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        let slots = std::iter::repeat_with(Slot::default).take(capacity).collect();
        Self {
            inner: Mutex::new(Slots { slots, live: 0 }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of sessions currently open.
    pub fn live_count(&self) -> usize {
        self.inner.lock().live
    }

    /// Registers a new session in the first empty or closed slot.
    pub fn allocate(&self, endpoint: Endpoint, transfer_size: usize) -> BridgeResult<SessionKey> {
        let mut inner = self.inner.lock();

        let Some(index) = inner.slots.iter().position(Slot::is_free) else {
            return Err(BridgeError::CapacityExceeded {
                in_use: inner.live,
                capacity: self.capacity,
            });
        };

        let handle = index as Handle;
        let kind = endpoint.kind();
        let slot = &mut inner.slots[index];
        if slot.session.is_some() {
            debug!("reclaiming closed I/O session slot id={handle}");
        }
        slot.generation = slot.generation.wrapping_add(1);
        slot.open = true;
        slot.session = Some(Arc::new(Mutex::new(IoSession::new(
            handle,
            endpoint,
            transfer_size,
        ))));
        let generation = slot.generation;
        inner.live += 1;

        debug!(
            "opened {kind} I/O session id={handle} ({} of {} in use)",
            inner.live, self.capacity
        );
        Ok(SessionKey { handle, generation })
    }

    /// Closes the session behind `handle`. Releasing an unknown or already
    /// closed handle does nothing.
    ///
    /// The table lock is held until the session has closed, so the slot
    /// cannot be handed out again while the old stream is still shutting down.
    pub fn release(&self, handle: Handle) -> bool {
        let mut inner = self.inner.lock();
        let Some(index) = slot_index(&inner.slots, handle) else {
            return false;
        };

        let slot = &mut inner.slots[index];
        let Some(session) = slot.open_session() else {
            return false;
        };
        slot.open = false;
        inner.live = inner.live.saturating_sub(1);

        session.lock().close();
        true
    }

    /// Looks up an open session by handle alone.
    pub fn resolve(&self, handle: Handle) -> BridgeResult<SharedSession> {
        let inner = self.inner.lock();
        slot_of(&inner.slots, handle)
            .and_then(Slot::open_session)
            .ok_or(BridgeError::InvalidHandle { handle })
    }

    /// Looks up an open session and rejects handles issued for an earlier
    /// occupant of the slot.
    pub fn resolve_key(&self, key: SessionKey) -> BridgeResult<SharedSession> {
        let inner = self.inner.lock();
        slot_of(&inner.slots, key.handle)
            .filter(|slot| slot.generation == key.generation)
            .and_then(Slot::open_session)
            .ok_or(BridgeError::InvalidHandle { handle: key.handle })
    }
}

fn slot_index(slots: &[Slot], handle: Handle) -> Option<usize> {
    usize::try_from(handle).ok().filter(|&i| i < slots.len())
}

fn slot_of(slots: &[Slot], handle: Handle) -> Option<&Slot> {
    slot_index(slots, handle).map(|i| &slots[i])
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, io::Cursor};

    use super::*;

    fn source() -> Endpoint {
        Endpoint::Source(Box::new(Cursor::new(vec![0u8; 4])))
    }

    #[test]
    fn handles_are_unique_up_to_capacity() {
        let table = SessionTable::new(128);
        let handles: HashSet<Handle> = (0..128)
            .map(|_| table.allocate(source(), 64).unwrap().handle)
            .collect();
        assert_eq!(handles.len(), 128);
        assert_eq!(table.live_count(), 128);

        match table.allocate(source(), 64) {
            Err(BridgeError::CapacityExceeded { in_use, capacity }) => {
                assert_eq!((in_use, capacity), (128, 128));
            }
            other => panic!("expected capacity error, got {other:?}"),
        }

        assert!(table.release(57));
        let reused = table.allocate(source(), 64).unwrap();
        assert_eq!(reused.handle, 57);
        assert_eq!(table.live_count(), 128);
    }

    #[test]
    fn released_handles_stop_resolving() {
        let table = SessionTable::new(4);
        let key = table.allocate(source(), 64).unwrap();
        assert!(table.resolve(key.handle).is_ok());

        assert!(table.release(key.handle));
        assert!(matches!(
            table.resolve(key.handle),
            Err(BridgeError::InvalidHandle { handle }) if handle == key.handle
        ));
    }

    #[test]
    fn double_release_counts_once() {
        let table = SessionTable::new(4);
        let a = table.allocate(source(), 64).unwrap();
        table.allocate(source(), 64).unwrap();

        assert!(table.release(a.handle));
        assert!(!table.release(a.handle));
        assert_eq!(table.live_count(), 1);
    }

    #[test]
    fn stale_keys_fail_after_reuse() {
        let table = SessionTable::new(1);
        let first = table.allocate(source(), 64).unwrap();
        table.release(first.handle);

        let second = table.allocate(source(), 64).unwrap();
        assert_eq!(first.handle, second.handle);
        assert!(table.resolve_key(first).is_err());
        assert!(table.resolve_key(second).is_ok());
    }

    #[test]
    fn out_of_range_handles_are_rejected() {
        let table = SessionTable::new(2);
        assert!(table.resolve(-1).is_err());
        assert!(table.resolve(2).is_err());
        assert!(!table.release(7));
    }
}
