//! Pooled decode sessions.
//!
//! A session owns the buffers a decode needs (frame arena, presence bits, deferred slots, map key
//! positions). Pooling them keeps steady-state decoding free of allocations.

use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::*;

use crate::deferred::DeferredStore;
use crate::descriptor::SchemaDescriptor;
use crate::shape::ShapeId;
use crate::stack::DecodeStack;

#[derive(Debug)]
pub(crate) struct Session {
    pub stack: DecodeStack,
    pub store: DeferredStore,
    /// Scratch worklist of the subtree presence scan.
    pub scan: Vec<(u32, u32, u32)>,
    /// Descriptors already fetched from the cache by this session.
    pub descriptors: FxHashMap<ShapeId, Arc<SchemaDescriptor>>,
}

impl Session {
    pub fn new(max_depth: usize, max_slots: usize) -> Self {
        Session {
            stack: DecodeStack::new(max_depth),
            store: DeferredStore::new(max_slots),
            scan: Vec::new(),
            descriptors: FxHashMap::default(),
        }
    }

    /// Leaves every frame and drops every deferred position.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.store.clear();
        self.scan.clear();
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(0, 0)
    }
}

/// A bounded stack of idle sessions for one codec.
#[derive(Debug)]
pub struct SessionPool {
    idle: Mutex<Vec<Session>>,
    capacity: usize,
    max_depth: usize,
    max_slots: usize,
}

impl SessionPool {
    pub fn new(capacity: usize, max_depth: usize, max_slots: usize) -> Self {
        SessionPool {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            max_depth,
            max_slots,
        }
    }

    pub(crate) fn acquire(&self) -> Session {
        if let Some(session) = self.idle.lock().pop() {
            return session;
        }
        debug!("allocating decode session");
        Session::new(self.max_depth, self.max_slots)
    }

    pub(crate) fn release(&self, mut session: Session) {
        session.reset();
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(session);
        }
    }

    /// Number of sessions waiting to be reused.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_are_reused_up_to_capacity() {
        let pool = SessionPool::new(1, 8, 64);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle(), 1);
        let again = pool.acquire();
        assert!(again.stack.is_empty());
        assert!(again.store.top().is_none());
        assert_eq!(pool.idle(), 0);
    }
}
