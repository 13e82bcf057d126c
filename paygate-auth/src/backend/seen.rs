//! Seen-transaction tracking for replay prevention.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::transaction::Transaction;

/// Record of transactions the backend has already consumed.
///
/// # Thread Safety
///
/// Uses `&self` to allow concurrent access. Implementations should use
/// interior mutability (e.g., `Mutex`, `DashMap`).
///
/// # Atomicity
///
/// `check_and_insert` **MUST be atomic**: two concurrent calls with equal
/// transactions must not both return `true`. Hold a lock across the check
/// and the insert, or use an entry API.
pub trait SeenTransactions: Send + Sync {
    /// Record `transaction` if it is new.
    ///
    /// Returns `true` if the transaction was new and has been recorded.
    /// Returns `false` if it was already seen.
    fn check_and_insert(&self, transaction: &Transaction) -> bool;

    /// Number of transactions currently remembered.
    fn len(&self) -> usize;

    /// Whether nothing is remembered.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only seen set. Never forgets, so a transaction is accepted at
/// most once for the lifetime of the process.
#[derive(Debug, Default)]
pub struct UnboundedSeenSet {
    seen: Mutex<HashSet<Transaction>>,
}

impl UnboundedSeenSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SeenTransactions for UnboundedSeenSet {
    fn check_and_insert(&self, transaction: &Transaction) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(transaction.clone())
    }

    fn len(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Memory-bounded seen set with a time-to-live.
///
/// # Replay Window
///
/// A transaction first seen more than `ttl` ago, or evicted at capacity,
/// is forgotten and would be accepted again. Pair it with a client nonce
/// space large enough and a `ttl` longer than any plausible replay delay.
///
/// # Performance
///
/// - O(1) check and insert (amortized)
/// - Lock-free concurrent access via DashMap
/// - Expired entries swept every 1000 inserts
pub struct LruSeenSet {
    /// transaction -> first seen
    seen: DashMap<Transaction, Instant>,
    ttl: Duration,
    max_entries: usize,
    insert_counter: AtomicU64,
}

impl LruSeenSet {
    /// Create a set that remembers transactions for `ttl`, holding at most
    /// `max_entries`.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: DashMap::with_capacity(max_entries / 4),
            ttl,
            max_entries: max_entries.max(1),
            insert_counter: AtomicU64::new(0),
        }
    }

    /// Drop entries older than the TTL.
    ///
    /// Not required for correctness; expired entries are ignored on lookup.
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.seen.retain(|_, first_seen| now.duration_since(*first_seen) < self.ttl);
    }

    /// Remove the entry seen longest ago.
    fn evict_oldest(&self) {
        let oldest = self
            .seen
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| entry.key().clone());
        if let Some(transaction) = oldest {
            self.seen.remove(&transaction);
        }
    }
}

impl SeenTransactions for LruSeenSet {
    fn check_and_insert(&self, transaction: &Transaction) -> bool {
        let now = Instant::now();

        let inserted = match self.seen.entry(transaction.clone()) {
            Entry::Occupied(mut entry) => {
                if now.duration_since(*entry.get()) < self.ttl {
                    false
                } else {
                    entry.insert(now);
                    true
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        };

        // Housekeeping runs after the entry guard is released.
        if inserted {
            let count = self.insert_counter.fetch_add(1, Ordering::Relaxed);
            if count % 1000 == 0 {
                self.cleanup_expired();
            }
            if self.seen.len() > self.max_entries {
                self.evict_oldest();
            }
        }

        inserted
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}
