//! Recipient address to RT queue routing.
//!
//! A configured target is either a full address (`help@example.com`) or a
//! local part (`help`). A recipient matches a target exactly (new
//! correspondence) or through the target's `-comment` variant
//! (`help-comment@example.com`, `help-comment`), which files a comment on an
//! existing ticket.

use std::fmt;

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use tracing::warn;

/// How RT should file the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Correspond,
    Comment,
}

impl Action {
    /// The RT mail-gateway `action` form value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Correspond => "correspond",
            Action::Comment => "comment",
        }
    }
}

/// Result of routing one address.
///
/// An empty `queue` means the address is not routable; callers must treat
/// that as its own outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResult {
    pub queue: String,
    pub action: Action,
}

impl RouteResult {
    fn found(queue: &str, action: Action) -> Self {
        Self {
            queue: queue.to_string(),
            action,
        }
    }

    fn unroutable() -> Self {
        Self {
            queue: String::new(),
            action: Action::Correspond,
        }
    }

    pub fn is_unroutable(&self) -> bool {
        self.queue.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TableEntry {
    target: String,
    comment_target: String,
    queue: String,
}

/// Ordered target → queue table, immutable once loaded.
///
/// Entries keep their declaration order; when several targets could match
/// the same address the first declared one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressQueueTable {
    entries: Vec<TableEntry>,
}

impl AddressQueueTable {
    /// Build a table from `(target, queue)` pairs. Empty queue names are
    /// rejected.
    pub fn new<I, T, Q>(pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (T, Q)>,
        T: Into<String>,
        Q: Into<String>,
    {
        let mut entries = Vec::new();
        for (target, queue) in pairs {
            let (target, queue) = (target.into(), queue.into());
            if queue.is_empty() {
                return Err(format!("queue for target {target:?} is empty"));
            }
            entries.push(TableEntry {
                comment_target: comment_variant(&target),
                target,
                queue,
            });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pairs of targets where one is the other's `-comment` variant, so an
    /// address could match both.
    pub fn overlapping_targets(&self) -> Vec<(&str, &str)> {
        let mut overlaps = Vec::new();
        for a in &self.entries {
            for b in &self.entries {
                if a.target == b.comment_target {
                    overlaps.push((a.target.as_str(), b.target.as_str()));
                }
            }
        }
        overlaps
    }
}

impl<'de> Deserialize<'de> for AddressQueueTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = AddressQueueTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of address targets to queue names")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pairs = Vec::new();
                while let Some(pair) = map.next_entry::<String, String>()? {
                    pairs.push(pair);
                }
                AddressQueueTable::new(pairs).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// `help` → `help-comment`, `help@example.com` → `help-comment@example.com`.
fn comment_variant(target: &str) -> String {
    match target.find('@') {
        Some(idx) if idx > 0 => format!("{}-comment{}", &target[..idx], &target[idx..]),
        _ => format!("{target}-comment"),
    }
}

/// Resolves recipient addresses against an [`AddressQueueTable`].
#[derive(Debug, Clone)]
pub struct AddressRouter {
    table: AddressQueueTable,
}

impl AddressRouter {
    /// Wrap `table`, logging targets that can never match or that overlap.
    pub fn new(table: AddressQueueTable) -> Self {
        for entry in &table.entries {
            if entry.target.chars().any(|c| c.is_uppercase()) {
                warn!(queue_target = %entry.target, "rt_queue_target_not_lowercase");
            }
        }
        for (target, other) in table.overlapping_targets() {
            warn!(
                queue_target = %target,
                comment_of = %other,
                "rt_queue_targets_overlap"
            );
        }
        Self { table }
    }

    /// Resolve `address` to a queue and action.
    ///
    /// The full lowercased address is tried against every target before the
    /// local part is. Addresses without a local part are unroutable.
    pub fn resolve(&self, address: &str) -> RouteResult {
        let address = address.to_lowercase();

        let idx = match address.find('@') {
            Some(idx) if idx >= 1 => idx,
            _ => return RouteResult::unroutable(),
        };
        let local = &address[..idx];

        for candidate in [address.as_str(), local] {
            for entry in &self.table.entries {
                if candidate == entry.target {
                    return RouteResult::found(&entry.queue, Action::Correspond);
                }
                if candidate == entry.comment_target {
                    return RouteResult::found(&entry.queue, Action::Comment);
                }
            }
        }

        RouteResult::unroutable()
    }
}
