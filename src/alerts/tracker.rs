use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::monitors::Severity;

/// Deduplication key: one record per target and alerting severity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    pub target_id: String,
    pub severity: Severity,
}

impl AlertKey {
    pub fn new(target_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            target_id: target_id.into(),
            severity,
        }
    }

    /// `"<targetId>_<severity>"`, the key format of the persisted document.
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.target_id, self.severity)
    }

    /// Inverse of [`AlertKey::storage_key`]. Target ids may contain `_`, the
    /// severity never does.
    pub fn parse(raw: &str) -> Option<Self> {
        let (target_id, severity) = raw.rsplit_once('_')?;
        let severity = Severity::parse(severity).filter(|severity| severity.is_alerting())?;
        (!target_id.is_empty()).then(|| Self::new(target_id, severity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Last time this key was notified
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub resolved: bool,
}

/// Persisted form of the tracker, keyed by [`AlertKey::storage_key`].
pub type AlertStateDocument = BTreeMap<String, AlertRecord>;

#[derive(Debug, Clone)]
pub struct AlertStateTracker {
    records: BTreeMap<AlertKey, AlertRecord>,
    renotify_after: Duration,
    changed: bool,
}

impl Default for AlertStateTracker {
    fn default() -> Self {
        Self::new(Duration::hours(1))
    }
}

impl AlertStateTracker {
    pub fn new(renotify_after: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            renotify_after,
            changed: false,
        }
    }

    /// Restore from a persisted document. Keys that do not parse are skipped.
    pub fn from_document(document: AlertStateDocument, renotify_after: Duration) -> Self {
        let records = document
            .into_iter()
            .filter_map(|(raw, record)| match AlertKey::parse(&raw) {
                Some(key) => Some((key, record)),
                None => {
                    warn!("skipping unparseable alert state key '{raw}'");
                    None
                }
            })
            .collect();

        Self {
            records,
            renotify_after,
            changed: false,
        }
    }

    pub fn to_document(&self) -> AlertStateDocument {
        self.records
            .iter()
            .map(|(key, record)| (key.storage_key(), *record))
            .collect()
    }

    pub fn get(&self, key: &AlertKey) -> Option<&AlertRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Decide whether `severity` for `target_id` warrants a notification now.
    ///
    /// A healthy severity resolves every record of the target and never
    /// notifies. Any other severity notifies on its first occurrence, after a
    /// resolution, or once the re-notification window has elapsed.
    pub fn evaluate(&mut self, target_id: &str, severity: Severity, now: DateTime<Utc>) -> bool {
        if !severity.is_alerting() {
            self.resolve_all(target_id);
            return false;
        }

        let key = AlertKey::new(target_id, severity);
        let should_notify = match self.records.get(&key) {
            None => true,
            Some(record) if record.resolved => true,
            Some(record) => now - record.timestamp >= self.renotify_after,
        };

        if should_notify {
            debug!("recording notification for {}", key.storage_key());
            self.records.insert(
                key,
                AlertRecord {
                    timestamp: now,
                    resolved: false,
                },
            );
            self.changed = true;
        }

        should_notify
    }

    /// Mark every unresolved record of the target as resolved, returning how
    /// many changed.
    pub fn resolve_all(&mut self, target_id: &str) -> usize {
        let mut resolved = 0;
        for (_, record) in self
            .records
            .iter_mut()
            .filter(|(key, record)| key.target_id == target_id && !record.resolved)
        {
            record.resolved = true;
            resolved += 1;
        }

        if resolved > 0 {
            debug!("resolved {resolved} alert(s) for target {target_id}");
            self.changed = true;
        }
        resolved
    }

    /// Drop resolved records last notified before `now - older_than`.
    /// Nothing is dropped if that instant is not representable.
    pub fn prune_resolved(&mut self, older_than: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(older_than) else {
            return 0;
        };
        let before = self.records.len();
        self.records
            .retain(|_, record| !(record.resolved && record.timestamp < cutoff));

        let pruned = before - self.records.len();
        if pruned > 0 {
            self.changed = true;
        }
        pruned
    }

    /// Whether anything changed since the last call.
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }
}
