//! Per-group watcher table (C3).

use std::sync::Arc;

use ahash::{HashMap, HashMapExt};

use crate::callback::CallbackClient;

/// Opaque handle identifying one session's registration in the watcher
/// table. In this implementation it is simply the session's `connId`,
/// since a session lazily owns at most one outbound callback client.
pub type Handle = u32;

/// Maps group name to the set of watchers subscribed to it. The inner map
/// is removed once empty, and the group key along with it.
#[derive(Default)]
pub struct WatcherTable {
    groups: HashMap<String, HashMap<Handle, Arc<dyn CallbackClient>>>,
}

impl WatcherTable {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Registers `handle` as a watcher of `group`, creating the group's
    /// inner set on demand.
    pub fn watch(&mut self, group: &str, handle: Handle, client: Arc<dyn CallbackClient>) {
        self.groups
            .entry(group.to_string())
            .or_insert_with(HashMap::new)
            .insert(handle, client);
    }

    /// Removes `handle` from `group`, pruning the group if it becomes
    /// empty.
    pub fn ignore(&mut self, group: &str, handle: Handle) {
        if let Some(set) = self.groups.get_mut(group) {
            set.remove(&handle);
            if set.is_empty() {
                self.groups.remove(group);
            }
        }
    }

    /// Removes `handle` from every group, pruning groups left empty.
    /// Called during session teardown (spec §4.6).
    pub fn remove_handle(&mut self, handle: Handle) {
        self.groups.retain(|_, set| {
            set.remove(&handle);
            !set.is_empty()
        });
    }

    /// Returns the callback clients currently watching `group`, cloned out
    /// so the caller can fan out notifications without holding a borrow on
    /// the table.
    pub fn clients_for(&self, group: &str) -> Vec<Arc<dyn CallbackClient>> {
        self.groups
            .get(group)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn watcher_count(&self, group: &str) -> usize {
        self.groups.get(group).map(|set| set.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::RecordingCallbackClient;

    #[test]
    fn watching_and_ignoring_prunes_empty_groups() {
        let mut table = WatcherTable::new();
        let client: Arc<dyn CallbackClient> = Arc::new(RecordingCallbackClient::default());
        table.watch("web", 1, client);
        assert_eq!(table.watcher_count("web"), 1);

        table.ignore("web", 1);
        assert_eq!(table.watcher_count("web"), 0);
    }

    #[test]
    fn remove_handle_clears_all_groups() {
        let mut table = WatcherTable::new();
        let client: Arc<dyn CallbackClient> = Arc::new(RecordingCallbackClient::default());
        table.watch("web", 1, client.clone());
        table.watch("db", 1, client);

        table.remove_handle(1);
        assert_eq!(table.watcher_count("web"), 0);
        assert_eq!(table.watcher_count("db"), 0);
    }

    #[test]
    fn watching_an_empty_group_is_legal() {
        let table = WatcherTable::new();
        assert_eq!(table.watcher_count("nothing-here"), 0);
        assert!(table.clients_for("nothing-here").is_empty());
    }
}
