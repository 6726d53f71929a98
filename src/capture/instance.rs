//! Per-instance side-table
//!
//! Client and connection objects are never reshaped to carry capture state.
//! Each instrumentable instance embeds an [`InstanceHandle`]; state lives in an
//! [`InstanceTable`] keyed by the handle's id. The table only keeps weak
//! references, so it never extends the lifetime of an instance and entries
//! for dropped instances are swept away.

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Token;

/// Identity of one client or connection instance.
#[derive(Debug)]
pub struct InstanceHandle {
    id: InstanceId,
    token: Arc<Token>,
}

impl InstanceHandle {
    pub fn new() -> Self {
        Self {
            id: InstanceId(NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed)),
            token: Arc::new(Token),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }
}

impl Default for InstanceHandle {
    fn default() -> Self {
        Self::new()
    }
}

struct Entry<V> {
    owner: Weak<Token>,
    value: V,
}

/// Instance-keyed state with weak back-references to the owners.
pub struct InstanceTable<V> {
    entries: DashMap<InstanceId, Entry<V>>,
}

impl<V> Default for InstanceTable<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> InstanceTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the state for a live instance, creating it on first touch.
    pub fn entry_or_insert_with<F>(&self, handle: &InstanceHandle, init: F) -> StateRef<'_, V>
    where
        F: FnOnce() -> V,
    {
        if !self.entries.contains_key(&handle.id) {
            self.sweep();
        }
        let entry = self.entries.entry(handle.id).or_insert_with(|| Entry {
            owner: Arc::downgrade(&handle.token),
            value: init(),
        });
        StateRef { inner: entry }
    }

    /// Mutable access to existing state; `None` if the instance was never
    /// touched or has been dropped.
    pub fn get_mut(&self, id: InstanceId) -> Option<StateRef<'_, V>> {
        let entry = self.entries.get_mut(&id)?;
        if entry.owner.strong_count() == 0 {
            drop(entry);
            self.entries.remove(&id);
            return None;
        }
        Some(StateRef { inner: entry })
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.entries
            .get(&id)
            .map(|entry| entry.owner.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn remove(&self, id: InstanceId) -> Option<V> {
        self.entries.remove(&id).map(|(_, entry)| entry.value)
    }

    /// Drop entries whose owning instance no longer exists.
    pub fn sweep(&self) {
        self.entries.retain(|_, entry| entry.owner.strong_count() > 0);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Guard over one table entry. Do not hold across calls back into the table.
pub struct StateRef<'a, V> {
    inner: RefMut<'a, InstanceId, Entry<V>>,
}

impl<V> std::ops::Deref for StateRef<'_, V> {
    type Target = V;

    fn deref(&self) -> &V {
        &self.inner.value
    }
}

impl<V> std::ops::DerefMut for StateRef<'_, V> {
    fn deref_mut(&mut self) -> &mut V {
        &mut self.inner.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_get_distinct_ids() {
        let a = InstanceHandle::new();
        let b = InstanceHandle::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn state_is_created_once_and_mutated_in_place() {
        let table: InstanceTable<Vec<u8>> = InstanceTable::new();
        let handle = InstanceHandle::new();

        table.entry_or_insert_with(&handle, Vec::new).push(1);
        table.entry_or_insert_with(&handle, || vec![9, 9]).push(2);

        assert_eq!(*table.get_mut(handle.id()).unwrap(), vec![1, 2]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_does_not_keep_instances_alive() {
        let table: InstanceTable<bool> = InstanceTable::new();
        let handle = InstanceHandle::new();
        let id = handle.id();
        table.entry_or_insert_with(&handle, || true);
        assert!(table.contains(id));

        drop(handle);
        assert!(!table.contains(id));
        assert!(table.get_mut(id).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn inserting_sweeps_dead_entries() {
        let table: InstanceTable<u32> = InstanceTable::new();
        for _ in 0..3 {
            let short_lived = InstanceHandle::new();
            table.entry_or_insert_with(&short_lived, || 0);
        }
        let live = InstanceHandle::new();
        table.entry_or_insert_with(&live, || 1);
        assert_eq!(table.len(), 1);
    }
}
