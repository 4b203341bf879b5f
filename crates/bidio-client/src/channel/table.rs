//! Ordered subscription table evaluated on every inbound stream packet.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::action::{ActionFilter, ActionKind};
use crate::entity::EntityId;

/// Callback invoked with a matching packet's payload and action.
pub type Watcher = Arc<dyn Fn(&Value, &ActionKind) + Send + Sync>;

/// Wraps a closure as a [`Watcher`].
///
/// Keep the returned handle to remove exactly this watcher later with
/// [`crate::Channel::unwatch`].
#[must_use]
pub fn watcher<F>(callback: F) -> Watcher
where
    F: Fn(&Value, &ActionKind) + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Which bid a subscription is keyed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    /// Every bid, including packets without a usable id.
    Any,
    /// One bid.
    Id(EntityId),
}

impl Key {
    fn admits(&self, target: Option<&EntityId>) -> bool {
        match self {
            Self::Any => true,
            Self::Id(id) => target == Some(id),
        }
    }
}

/// Action half of one table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActionMatch {
    Any,
    Only(ActionKind),
}

impl ActionMatch {
    fn admits(&self, kind: &ActionKind) -> bool {
        match self {
            Self::Any => true,
            Self::Only(only) => only == kind,
        }
    }

    fn covered_by(&self, filter: &ActionFilter) -> bool {
        match (filter, self) {
            (ActionFilter::Any, _) => true,
            (ActionFilter::Only(kinds), Self::Only(kind)) => kinds.contains(kind),
            (ActionFilter::Only(_), Self::Any) => false,
        }
    }
}

struct Subscription {
    key: Key,
    action: ActionMatch,
    watcher: Watcher,
}

/// Registered watchers in registration order.
#[derive(Default)]
pub(crate) struct SubscriptionTable {
    entries: Vec<Subscription>,
}

impl SubscriptionTable {
    /// Registers `watcher` for `key` and every action `filter` admits.
    ///
    /// A filter listing several actions produces one entry per action; an
    /// empty filter registers nothing. Returns the number of entries added.
    pub(crate) fn insert(&mut self, key: &Key, filter: &ActionFilter, watcher: Watcher) -> usize {
        match filter {
            ActionFilter::Any => {
                self.entries.push(Subscription {
                    key: key.clone(),
                    action: ActionMatch::Any,
                    watcher,
                });
                1
            }
            ActionFilter::Only(kinds) => {
                for kind in kinds {
                    self.entries.push(Subscription {
                        key: key.clone(),
                        action: ActionMatch::Only(kind.clone()),
                        watcher: Arc::clone(&watcher),
                    });
                }
                kinds.len()
            }
        }
    }

    /// Removes entries registered under `key` whose action `filter` covers.
    ///
    /// With `watcher` only entries holding that exact watcher go; without it
    /// every covered entry goes. Returns the number of entries removed.
    pub(crate) fn remove(
        &mut self,
        key: &Key,
        filter: &ActionFilter,
        watcher: Option<&Watcher>,
    ) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let doomed = entry.key == *key
                && entry.action.covered_by(filter)
                && watcher.is_none_or(|candidate| Arc::ptr_eq(candidate, &entry.watcher));
            !doomed
        });
        before - self.entries.len()
    }

    /// Watchers matching a packet, in registration order.
    pub(crate) fn matching(&self, target: Option<&EntityId>, kind: &ActionKind) -> Vec<Watcher> {
        self.entries
            .iter()
            .filter(|entry| entry.key.admits(target) && entry.action.admits(kind))
            .map(|entry| Arc::clone(&entry.watcher))
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Debug for SubscriptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionTable")
            .field("entries", &self.entries.len())
            .finish()
    }
}
