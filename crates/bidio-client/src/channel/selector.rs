//! Watch selectors: which bids and actions a watcher targets.
//!
//! Callers describe a subscription with one value that is resolved once at
//! the call boundary. A plain string is read the way users write it: the
//! wildcard token or an empty string selects everything, a whitelisted action
//! name or a space-separated list selects actions on every bid, and anything
//! else names a bid. The string is classified as given, so any space makes
//! it an action list: `" 42"` names no action and selects nothing.

use crate::action::{ActionFilter, ActionKind};
use crate::entity::{EntityId, WILDCARD};

use super::table::Key;

/// Target of a watch or unwatch call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Every action on every bid.
    #[default]
    Wildcard,
    /// Selected actions on every bid.
    ByActions(ActionFilter),
    /// Selected actions on one bid.
    ById {
        /// The bid.
        id: EntityId,
        /// Actions of interest; [`ActionFilter::Any`] for all.
        actions: ActionFilter,
    },
}

impl Selector {
    /// Selects every action on bid `id`.
    ///
    /// Blank ids (`0`, `""`, `"*"`) select every bid instead.
    #[must_use]
    pub fn id(id: impl Into<EntityId>) -> Self {
        let entity = id.into();
        if entity.is_unspecified() {
            Self::Wildcard
        } else {
            Self::ById {
                id: entity,
                actions: ActionFilter::Any,
            }
        }
    }

    /// Narrows the selector to `actions`.
    ///
    /// Applies to the bid or wildcard form; a selector that already names
    /// actions keeps its own list.
    #[must_use]
    pub fn with_actions(self, actions: impl Into<ActionFilter>) -> Self {
        match self {
            Self::Wildcard => Self::from(actions.into()),
            Self::ById { id, .. } => Self::ById {
                id,
                actions: actions.into(),
            },
            by_actions @ Self::ByActions(_) => by_actions,
        }
    }

    /// Splits the selector into a table key and action filter.
    #[must_use]
    pub fn resolve(self) -> (Key, ActionFilter) {
        match self {
            Self::Wildcard => (Key::Any, ActionFilter::Any),
            Self::ByActions(actions) => (Key::Any, actions),
            Self::ById { id, actions } => (Key::Id(id), actions),
        }
    }
}

impl From<&str> for Selector {
    fn from(spec: &str) -> Self {
        if spec.is_empty() || spec == WILDCARD {
            Self::Wildcard
        } else if ActionKind::whitelisted(spec).is_some() || spec.contains(' ') {
            Self::ByActions(ActionFilter::from_names(spec.split_whitespace()))
        } else {
            Self::id(spec)
        }
    }
}

impl From<String> for Selector {
    fn from(spec: String) -> Self {
        Self::from(spec.as_str())
    }
}

impl From<i64> for Selector {
    fn from(id: i64) -> Self {
        Self::id(id)
    }
}

impl From<i32> for Selector {
    fn from(id: i32) -> Self {
        Self::id(id)
    }
}

impl From<u32> for Selector {
    fn from(id: u32) -> Self {
        Self::id(id)
    }
}

impl From<EntityId> for Selector {
    fn from(id: EntityId) -> Self {
        Self::id(id)
    }
}

impl From<ActionKind> for Selector {
    fn from(kind: ActionKind) -> Self {
        Self::ByActions(ActionFilter::from(kind))
    }
}

impl From<Vec<ActionKind>> for Selector {
    fn from(kinds: Vec<ActionKind>) -> Self {
        Self::ByActions(ActionFilter::from(kinds))
    }
}

impl From<ActionFilter> for Selector {
    fn from(actions: ActionFilter) -> Self {
        match actions {
            ActionFilter::Any => Self::Wildcard,
            only @ ActionFilter::Only(_) => Self::ByActions(only),
        }
    }
}
