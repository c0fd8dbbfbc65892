//! Ordered in-memory service registry (C2).

use std::cmp::Ordering;

/// A published service as stored internally: identical to the wire
/// `ServiceDef` plus the owning session's `connId`, which is never
/// serialised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEntry {
    pub group: String,
    pub host: String,
    pub port: u16,
    pub custom_data: Vec<u8>,
    pub conn_id: u32,
}

impl ServiceEntry {
    /// Total order over `(group, host, port)`, ignoring `customData` and
    /// `connId`. Used to walk the registry and to decide where an entry
    /// belongs.
    fn compare_identity(&self, other: &Self) -> Ordering {
        self.group
            .cmp(&other.group)
            .then_with(|| self.host.cmp(&other.host))
            .then_with(|| self.port.cmp(&other.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    Replaced,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    NotFound,
}

/// The coordinator's single source of truth for live services, kept in
/// total order over `(group, host, port)`. Only the event loop ever calls
/// its mutating methods.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    entries: Vec<ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn seek(&self, s: &ServiceEntry) -> Result<usize, usize> {
        self.entries
            .binary_search_by(|e| e.compare_identity(s))
    }

    /// Inserts or updates `s`, walking the ordered entries for the first
    /// one whose identity compares `>= 0` against `s` (spec §4.1).
    ///
    /// # Test
    ///
    /// ```
    /// use discovery_service::registry::{AddOutcome, ServiceEntry, ServiceRegistry};
    ///
    /// let mut registry = ServiceRegistry::new();
    /// let entry = ServiceEntry {
    ///     group: "web".into(),
    ///     host: "10.0.0.1".into(),
    ///     port: 80,
    ///     custom_data: Vec::new(),
    ///     conn_id: 1,
    /// };
    /// assert_eq!(registry.add(entry.clone()), AddOutcome::Added);
    /// assert_eq!(registry.add(entry), AddOutcome::Replaced);
    /// ```
    pub fn add(&mut self, s: ServiceEntry) -> AddOutcome {
        match self.seek(&s) {
            Ok(idx) => {
                if self.entries[idx].conn_id == s.conn_id {
                    self.entries[idx] = s;
                    AddOutcome::Replaced
                } else {
                    AddOutcome::Rejected
                }
            }
            Err(idx) => {
                self.entries.insert(idx, s);
                AddOutcome::Added
            }
        }
    }

    /// Removes `s` if an identical-identity entry owned by the same
    /// `connId` exists.
    pub fn remove(&mut self, s: &ServiceEntry) -> RemoveOutcome {
        match self.seek(s) {
            Ok(idx) if self.entries[idx].conn_id == s.conn_id => {
                self.entries.remove(idx);
                RemoveOutcome::Removed
            }
            _ => RemoveOutcome::NotFound,
        }
    }

    /// Yields every entry whose `group` equals `group`, in registry order.
    ///
    /// # Test
    ///
    /// ```
    /// use discovery_service::registry::{ServiceEntry, ServiceRegistry};
    ///
    /// let mut registry = ServiceRegistry::new();
    /// registry.add(ServiceEntry { group: "web".into(), host: "a".into(), port: 1, custom_data: vec![], conn_id: 1 });
    /// registry.add(ServiceEntry { group: "db".into(), host: "b".into(), port: 2, custom_data: vec![], conn_id: 2 });
    /// let snapshot: Vec<_> = registry.iterate_group("web").collect();
    /// assert_eq!(snapshot.len(), 1);
    /// ```
    pub fn iterate_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a ServiceEntry> {
        // Binary-seek to the first entry of the group, then walk linearly:
        // the walk itself is the only cost proportional to group size, as
        // spec §4.1 calls for.
        let start = self
            .entries
            .partition_point(|e| e.group.as_str() < group);
        self.entries[start..]
            .iter()
            .take_while(move |e| e.group.as_str() == group)
    }

    /// Removes every entry owned by `conn_id`, returning them in registry
    /// order so the caller can fan out Leave notifications per entry.
    /// Used by teardown (spec §4.6).
    pub fn remove_by_conn(&mut self, conn_id: u32) -> Vec<ServiceEntry> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.conn_id == conn_id {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.entries.iter()
    }
}
