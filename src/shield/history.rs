//! Daily shield history in the durable store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{ItemKind, ShieldRecord};
use crate::error::Result;
use crate::id::iso_date;
use crate::storage::{Filter, HasId, Storage};

pub const HISTORY_COLLECTION: &str = "shield_history";

/// Scope key used for knowledge-base-wide entries
pub const KB_SCOPE: &str = "kb";

/// One shield value for a (scope, type, day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldEntry {
    /// `{scope}:{kind}:{date}`
    pub id: String,
    pub scope: String,
    pub kind: ItemKind,
    /// `YYYY-MM-DD`
    pub date: String,
    pub record: ShieldRecord,
    pub recorded_at: i64,
}

impl ShieldEntry {
    pub fn new(scope: &str, kind: ItemKind, record: ShieldRecord, now: i64) -> Self {
        let date = iso_date(now);
        Self {
            id: format!("{}:{}:{}", scope, kind, date),
            scope: scope.to_string(),
            kind,
            date,
            record,
            recorded_at: now,
        }
    }
}

impl HasId for ShieldEntry {
    fn id(&self) -> &str {
        &self.id
    }
}

pub struct ShieldHistory<S: Storage> {
    store: Arc<S>,
}

impl<S: Storage> ShieldHistory<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Record today's value, replacing an earlier one from the same day.
    pub fn snapshot(&self, scope: &str, kind: ItemKind, record: ShieldRecord, now: i64) -> Result<ShieldEntry> {
        let entry = ShieldEntry::new(scope, kind, record, now);
        self.store.upsert(HISTORY_COLLECTION, &entry)?;
        log::debug!("Shield snapshot {}", entry.id);
        Ok(entry)
    }

    /// All entries for a scope and type, oldest first.
    pub fn history(&self, scope: &str, kind: ItemKind) -> Result<Vec<ShieldEntry>> {
        let mut entries: Vec<ShieldEntry> = self.store.query(
            HISTORY_COLLECTION,
            &[Filter::eq("scope", scope), Filter::eq("kind", kind)],
        )?;
        entries.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(entries)
    }

    /// Scopes that have any recorded history.
    pub fn scopes(&self) -> Result<Vec<String>> {
        let entries: Vec<ShieldEntry> = self.store.list(HISTORY_COLLECTION)?;
        let mut scopes: Vec<String> = entries.into_iter().map(|e| e.scope).collect();
        scopes.sort();
        scopes.dedup();
        Ok(scopes)
    }
}
