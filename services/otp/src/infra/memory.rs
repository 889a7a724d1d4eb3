use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use agri_domain::challenge::ChallengeStatus;
use agri_domain::purpose::Purpose;

use crate::domain::repository::{AttemptLog, ChallengeStore, RateLimitStore};
use crate::domain::types::{
    AttemptRecord, Challenge, RateLimitCounter, Reservation, StatusCount, WindowRule,
};
use crate::error::OtpServiceError;

/// Lock, ignoring poisoning.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Challenge store ───────────────────────────────────────────────────────────

type PairKey = (String, Purpose);
type Slot = Arc<Mutex<Vec<Challenge>>>;

/// Single-instance challenge store. Each `(recipient, purpose)` pair has its
/// own mutex; the outer map lock is held only long enough to find the slot.
/// A slot keeps its challenges in insertion order, newest last.
#[derive(Clone, Default)]
pub struct MemoryOtpStore {
    slots: Arc<Mutex<HashMap<PairKey, Slot>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
}

impl MemoryOtpStore {
    fn slot(&self, recipient: &str, purpose: Purpose) -> Slot {
        let mut slots = lock(&self.slots);
        Arc::clone(
            slots
                .entry((recipient.to_owned(), purpose))
                .or_default(),
        )
    }

    /// Slot lookup for reads; never creates an entry.
    fn existing_slot(&self, recipient: &str, purpose: Purpose) -> Option<Slot> {
        lock(&self.slots)
            .get(&(recipient.to_owned(), purpose))
            .cloned()
    }

    fn all_slots(&self) -> Vec<Slot> {
        lock(&self.slots).values().cloned().collect()
    }

    /// Every stored challenge, for inspection in tests.
    pub fn challenges(&self) -> Vec<Challenge> {
        self.all_slots()
            .iter()
            .flat_map(|slot| lock(slot).clone())
            .collect()
    }

    /// Number of `(recipient, purpose)` pairs with a slot.
    pub fn tracked_pairs(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Every stored attempt record, oldest first.
    pub fn attempt_records(&self) -> Vec<AttemptRecord> {
        lock(&self.attempts).clone()
    }
}

impl ChallengeStore for MemoryOtpStore {
    async fn replace_pending(&self, challenge: &Challenge) -> Result<u64, OtpServiceError> {
        let slot = self.slot(&challenge.recipient, challenge.purpose);
        let mut challenges = lock(&slot);
        let mut superseded = 0;
        for existing in challenges
            .iter_mut()
            .filter(|c| c.status == ChallengeStatus::Pending)
        {
            existing.status = ChallengeStatus::Expired;
            superseded += 1;
        }
        challenges.push(challenge.clone());
        Ok(superseded)
    }

    async fn find_latest(
        &self,
        recipient: &str,
        purpose: Purpose,
    ) -> Result<Option<Challenge>, OtpServiceError> {
        let Some(slot) = self.existing_slot(recipient, purpose) else {
            return Ok(None);
        };
        let challenges = lock(&slot);
        Ok(challenges.last().cloned())
    }

    async fn mark_delivery_failed(&self, challenge: &Challenge) -> Result<(), OtpServiceError> {
        let Some(slot) = self.existing_slot(&challenge.recipient, challenge.purpose) else {
            return Ok(());
        };
        let mut challenges = lock(&slot);
        if let Some(stored) = challenges
            .iter_mut()
            .find(|c| c.id == challenge.id && c.status == ChallengeStatus::Pending)
        {
            stored.status = ChallengeStatus::Failed;
        }
        Ok(())
    }

    async fn update_latest<F, T>(
        &self,
        recipient: &str,
        purpose: Purpose,
        f: F,
    ) -> Result<T, OtpServiceError>
    where
        F: FnOnce(Option<&mut Challenge>) -> T + Send,
        T: Send,
    {
        let Some(slot) = self.existing_slot(recipient, purpose) else {
            return Ok(f(None));
        };
        let mut challenges = lock(&slot);
        Ok(f(challenges.last_mut()))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let mut expired = 0;
        for slot in self.all_slots() {
            for c in lock(&slot).iter_mut() {
                if c.status == ChallengeStatus::Pending && c.is_expired_at(now) {
                    c.status = ChallengeStatus::Expired;
                    expired += 1;
                }
            }
        }
        Ok(expired)
    }

    async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let mut deleted = 0;
        for slot in self.all_slots() {
            let mut challenges = lock(&slot);
            let before = challenges.len();
            challenges.retain(|c| c.created_at >= cutoff);
            deleted += (before - challenges.len()) as u64;
        }
        // A slot nobody else holds cannot be picked up again until the map
        // lock is released.
        lock(&self.slots)
            .retain(|_, slot| Arc::strong_count(slot) > 1 || !lock(slot).is_empty());
        Ok(deleted)
    }

    async fn status_counts_since(
        &self,
        since: DateTime<Utc>,
        recipient: Option<&str>,
    ) -> Result<Vec<StatusCount>, OtpServiceError> {
        let mut counts: HashMap<(Purpose, ChallengeStatus), u64> = HashMap::new();
        for slot in self.all_slots() {
            for c in lock(&slot)
                .iter()
                .filter(|c| c.created_at >= since)
                .filter(|c| recipient.is_none_or(|r| c.recipient == r))
            {
                *counts.entry((c.purpose, c.status)).or_default() += 1;
            }
        }
        let mut rows: Vec<StatusCount> = counts
            .into_iter()
            .map(|((purpose, status), count)| StatusCount {
                purpose,
                status,
                count,
            })
            .collect();
        rows.sort_by_key(|r| (r.purpose, r.status));
        Ok(rows)
    }
}

impl AttemptLog for MemoryOtpStore {
    async fn append(&self, record: &AttemptRecord) -> Result<(), OtpServiceError> {
        lock(&self.attempts).push(record.clone());
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let mut attempts = lock(&self.attempts);
        let before = attempts.len();
        attempts.retain(|a| a.attempted_at >= cutoff);
        Ok((before - attempts.len()) as u64)
    }
}

// ── Rate-limit store ──────────────────────────────────────────────────────────

/// Single-instance counter store. Keys touched by one reservation are locked
/// in sorted order, so overlapping reservations cannot deadlock.
#[derive(Clone, Default)]
pub struct MemoryRateLimitStore {
    counters: Arc<Mutex<HashMap<String, Arc<Mutex<RateLimitCounter>>>>>,
}

impl MemoryRateLimitStore {
    fn counter(&self, key: &str) -> Arc<Mutex<RateLimitCounter>> {
        let mut counters = lock(&self.counters);
        Arc::clone(counters.entry(key.to_owned()).or_default())
    }

    /// Current count for `key`, for inspection in tests.
    pub fn count(&self, key: &str) -> u32 {
        let counters = lock(&self.counters);
        counters.get(key).map_or(0, |counter| lock(counter).count)
    }

    /// Number of keys currently held.
    pub fn tracked_keys(&self) -> usize {
        lock(&self.counters).len()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    async fn check_and_reserve(
        &self,
        block_key: &str,
        rules: &[WindowRule],
        now: DateTime<Utc>,
    ) -> Result<Reservation, OtpServiceError> {
        let mut keys: Vec<&str> = rules
            .iter()
            .map(|r| r.key.as_str())
            .chain(std::iter::once(block_key))
            .collect();
        keys.sort_unstable();
        keys.dedup();

        let slots: Vec<Arc<Mutex<RateLimitCounter>>> =
            keys.iter().map(|key| self.counter(key)).collect();
        let mut guards: Vec<MutexGuard<'_, RateLimitCounter>> =
            slots.iter().map(|slot| lock(slot)).collect();
        let position = |key: &str| keys.binary_search(&key).unwrap_or_default();

        if let Some(until) = guards[position(block_key)].blocked_at(now) {
            return Ok(Reservation::Blocked { until });
        }
        for rule in rules {
            let counter = &mut guards[position(&rule.key)];
            counter.roll(now, rule.window);
            if counter.count >= rule.limit {
                return Ok(Reservation::Exceeded {
                    reason: rule.reason,
                });
            }
        }
        for rule in rules {
            guards[position(&rule.key)].count += 1;
        }
        Ok(Reservation::Granted)
    }

    async fn block(
        &self,
        block_key: &str,
        until: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<(), OtpServiceError> {
        lock(&self.counter(block_key)).blocked_until = Some(until);
        Ok(())
    }

    async fn unblock(&self, block_key: &str) -> Result<(), OtpServiceError> {
        if let Some(counter) = lock(&self.counters).get(block_key) {
            lock(counter).blocked_until = None;
        }
        Ok(())
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<u64, OtpServiceError> {
        let mut counters = lock(&self.counters);
        let before = counters.len();
        // Counters held by an in-flight reservation are kept until the next sweep.
        counters.retain(|_, counter| {
            Arc::strong_count(counter) > 1 || !lock(counter).is_idle_at(now)
        });
        Ok((before - counters.len()) as u64)
    }
}
