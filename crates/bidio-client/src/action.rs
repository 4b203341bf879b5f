//! Action kinds and the filters watchers use to select them.
//!
//! The server understands a fixed set of verbs. Watch filters only ever
//! contain whitelisted kinds: unknown names are skipped silently when a filter
//! is built. Requests, on the other hand, may carry any kind, so
//! [`ActionKind::Other`] keeps non-whitelisted names representable on the
//! wire.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::WILDCARD;

/// The verb carried in a packet's `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionKind {
    /// Read one bid.
    Fetch,
    /// Search bids by criteria.
    Query,
    /// Open (lock) a bid for an owner.
    Lock,
    /// Cancel (unlock) a bid.
    Unlock,
    /// Mark a bid as pending.
    Pending,
    /// Complete (close) a bid.
    Complete,
    /// Claim a bid.
    Claim,
    /// Unlock a bid regardless of its owner.
    ForceUnlock,
    /// Change bid fields.
    Update,
    /// Server-reported failure.
    Error,
    /// Any name outside the whitelist.
    Other(String),
}

impl ActionKind {
    /// Every whitelisted kind, in wire order.
    pub const WHITELIST: &'static [Self] = &[
        Self::Fetch,
        Self::Query,
        Self::Lock,
        Self::Unlock,
        Self::Pending,
        Self::Complete,
        Self::Claim,
        Self::ForceUnlock,
        Self::Update,
        Self::Error,
    ];

    /// Looks up a whitelisted kind by its exact wire name.
    #[must_use]
    pub fn whitelisted(name: &str) -> Option<Self> {
        let kind = match name {
            "fetch" => Self::Fetch,
            "query" => Self::Query,
            "lock" => Self::Lock,
            "unlock" => Self::Unlock,
            "pending" => Self::Pending,
            "complete" => Self::Complete,
            "claim" => Self::Claim,
            "forceunlock" => Self::ForceUnlock,
            "update" => Self::Update,
            "error" => Self::Error,
            _ => return None,
        };
        Some(kind)
    }

    /// Parses a wire name, keeping unknown names as [`ActionKind::Other`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        Self::whitelisted(name).unwrap_or_else(|| Self::Other(name.to_owned()))
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Fetch => "fetch",
            Self::Query => "query",
            Self::Lock => "lock",
            Self::Unlock => "unlock",
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Claim => "claim",
            Self::ForceUnlock => "forceunlock",
            Self::Update => "update",
            Self::Error => "error",
            Self::Other(name) => name.as_str(),
        }
    }

    /// Returns `true` unless the kind is [`ActionKind::Other`].
    #[must_use]
    pub const fn is_whitelisted(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ActionKind {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        Self::whitelisted(&name).unwrap_or_else(|| Self::Other(name))
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

/// Which actions a watcher is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActionFilter {
    /// Every action, known or not.
    #[default]
    Any,
    /// Only the listed whitelisted actions. An empty list selects nothing.
    Only(Vec<ActionKind>),
}

impl ActionFilter {
    /// Parses a space-separated list of action names.
    ///
    /// An empty string or the wildcard token selects every action. Names
    /// outside the whitelist are skipped.
    ///
    /// ```
    /// use bidio_client::{ActionFilter, ActionKind};
    ///
    /// let filter = ActionFilter::parse("lock bogus unlock");
    /// assert_eq!(
    ///     filter,
    ///     ActionFilter::Only(vec![ActionKind::Lock, ActionKind::Unlock])
    /// );
    /// assert_eq!(ActionFilter::parse("*"), ActionFilter::Any);
    /// ```
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let trimmed = spec.trim();
        if trimmed.is_empty() || trimmed == WILDCARD {
            return Self::Any;
        }
        Self::from_names(trimmed.split_whitespace())
    }

    /// Builds a filter from individual names, skipping unknown ones.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kinds: Vec<ActionKind> = Vec::new();
        for kind in names
            .into_iter()
            .filter_map(|name| ActionKind::whitelisted(name.as_ref()))
        {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Self::Only(kinds)
    }

    /// Returns `true` when `kind` passes the filter.
    #[must_use]
    pub fn admits(&self, kind: &ActionKind) -> bool {
        match self {
            Self::Any => true,
            Self::Only(kinds) => kinds.contains(kind),
        }
    }

    /// Returns `true` when the filter can never match.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Only(kinds) if kinds.is_empty())
    }
}

impl From<&str> for ActionFilter {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl From<ActionKind> for ActionFilter {
    fn from(kind: ActionKind) -> Self {
        Self::from(vec![kind])
    }
}

impl From<Vec<ActionKind>> for ActionFilter {
    fn from(kinds: Vec<ActionKind>) -> Self {
        Self::from_names(kinds.iter().map(ActionKind::as_str))
    }
}
