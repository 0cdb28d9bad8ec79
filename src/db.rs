//! Key/value storage contract for persistent node state.
//!
//! Higher layers persist opaque byte-keyed records through [`Db`] without
//! caring which engine sits underneath. The contract is deliberately thin:
//! last-write-wins puts, point gets, single-key deletes. No multi-key
//! atomicity is promised, and `get` cannot tell an absent key from an
//! empty value, so callers needing that distinction must not store empty
//! values.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

/// Thread-safe key/value store.
///
/// `get`/`put`/`delete` may be called concurrently. `close` is idempotent
/// from the caller's side; an engine may refuse operations afterwards.
pub trait Db: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    /// Returns whether the write was accepted.
    fn put(&self, key: &[u8], value: &[u8]) -> bool;

    /// The value stored under `key`, or `None` when absent.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Removes `key`. Returns whether the delete was accepted.
    fn delete(&self, key: &[u8]) -> bool;

    /// Releases the engine's resources.
    fn close(&self) -> io::Result<()>;

    /// The engine behind the contract, for engine-specific maintenance
    /// (compaction, snapshots). Callers downcast to the concrete type.
    fn underlying(&self) -> &dyn Any;
}

/// In-process [`Db`] engine backed by a hash map.
///
/// Used for tests and ephemeral state; a node holding real history plugs
/// a persistent engine in behind the same trait.
#[derive(Default)]
pub struct MemoryDb {
    map: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Db for MemoryDb {
    fn put(&self, key: &[u8], value: &[u8]) -> bool {
        if self.is_closed() {
            return false;
        }
        self.map.write().insert(key.to_vec(), value.to_vec());
        true
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        if self.is_closed() {
            return None;
        }
        self.map.read().get(key).cloned()
    }

    fn delete(&self, key: &[u8]) -> bool {
        if self.is_closed() {
            return false;
        }
        self.map.write().remove(key);
        true
    }

    fn close(&self) -> io::Result<()> {
        self.closed.store(true, Ordering::Release);
        self.map.write().clear();
        Ok(())
    }

    fn underlying(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn put_then_get_returns_the_value() {
        let db = MemoryDb::new();
        assert!(db.put(b"height", b"42"));
        assert_eq!(db.get(b"height"), Some(b"42".to_vec()));
    }

    #[test]
    fn put_is_last_write_wins() {
        let db = MemoryDb::new();
        db.put(b"k", b"one");
        db.put(b"k", b"two");
        assert_eq!(db.get(b"k"), Some(b"two".to_vec()));
    }

    #[test]
    fn get_of_missing_key_is_none() {
        let db = MemoryDb::new();
        assert_eq!(db.get(b"missing"), None);
    }

    #[test]
    fn delete_removes_the_key() {
        let db = MemoryDb::new();
        db.put(b"k", b"v");
        assert!(db.delete(b"k"));
        assert_eq!(db.get(b"k"), None);
    }

    #[test]
    fn empty_value_is_indistinguishable_from_absent_only_by_presence() {
        let db = MemoryDb::new();
        db.put(b"k", b"");
        // Present, but empty: the contract warns callers about this shape.
        assert_eq!(db.get(b"k"), Some(vec![]));
    }

    #[test]
    fn close_is_idempotent_and_refuses_later_writes() {
        let db = MemoryDb::new();
        db.put(b"k", b"v");
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.put(b"k", b"v2"));
        assert!(!db.delete(b"k"));
        assert_eq!(db.get(b"k"), None);
    }

    #[test]
    fn concurrent_writers_do_not_lose_their_own_keys() {
        let db = Arc::new(MemoryDb::new());
        let handles: Vec<_> = (0u8..8)
            .map(|i| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for j in 0u8..50 {
                        db.put(&[i, j], &[j]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        for i in 0u8..8 {
            for j in 0u8..50 {
                assert_eq!(db.get(&[i, j]), Some(vec![j]));
            }
        }
    }

    #[test]
    fn underlying_downcasts_to_the_engine() {
        let db = MemoryDb::new();
        assert!(db.underlying().downcast_ref::<MemoryDb>().is_some());
    }
}
