use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::database::models::LastAlert;

/// Key: (target, rule name)
type CooldownKey = (String, String);

/// A won cooldown slot and the value it replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub claimed_at: DateTime<Utc>,
    pub previous: Option<DateTime<Utc>>,
}

/// Last-fired time per (target, rule), shared by every target task
#[derive(Debug, Default)]
pub struct CooldownTracker {
    last_fired: Mutex<HashMap<CooldownKey, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load last-fired times, keeping whichever is newer on conflict
    pub fn seed(&self, entries: impl IntoIterator<Item = LastAlert>) -> usize {
        let mut last_fired = self.lock();
        let mut count = 0;
        for entry in entries {
            let slot = last_fired.entry((entry.target, entry.rule_name)).or_insert(entry.timestamp);
            if entry.timestamp > *slot {
                *slot = entry.timestamp;
            }
            count += 1;
        }
        count
    }

    /// Claim the (target, rule) slot at `now`.
    ///
    /// Returns `None` while the previous alert is within `cooldown`. The check
    /// and the update happen under one lock, so two callers racing on the
    /// same key cannot both succeed.
    pub fn try_claim(&self, target: &str, rule: &str, cooldown: Duration, now: DateTime<Utc>) -> Option<Claim> {
        let mut last_fired = self.lock();
        let key = (target.to_string(), rule.to_string());

        let previous = last_fired.get(&key).copied();
        if let Some(previous) = previous {
            if now - previous < cooldown {
                return None;
            }
        }

        last_fired.insert(key, now);
        Some(Claim { claimed_at: now, previous })
    }

    /// Undo `claim` when the alert it was taken for never got stored.
    ///
    /// A newer claim on the same key is left alone.
    pub fn release(&self, target: &str, rule: &str, claim: Claim) {
        let mut last_fired = self.lock();
        let key = (target.to_string(), rule.to_string());

        if last_fired.get(&key) != Some(&claim.claimed_at) {
            return;
        }
        match claim.previous {
            Some(previous) => {
                last_fired.insert(key, previous);
            }
            None => {
                last_fired.remove(&key);
            }
        }
    }

    pub fn last_fired(&self, target: &str, rule: &str) -> Option<DateTime<Utc>> {
        self.lock().get(&(target.to_string(), rule.to_string())).copied()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CooldownKey, DateTime<Utc>>> {
        // The map holds plain timestamps; a panic mid-update cannot leave it inconsistent
        self.last_fired.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
