// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admission key stores.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::Clock;

/// Size below which expired keys are never swept.
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("idempotency store unavailable: {0}")]
    Unavailable(String),
}

/// Shared key-value store with an atomic insert-if-absent.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Insert `key` with a time to live. `Ok(false)` when a live entry
    /// already exists.
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
}

#[derive(Debug)]
struct Entries {
    keys: HashMap<String, DateTime<Utc>>,
    /// Next size at which expired keys are swept. Doubles from the number of
    /// live keys left by the previous sweep.
    sweep_at: usize,
}

/// Process-local store. A single mutex critical section per insert; the
/// mutex is never held across an await.
#[derive(Debug)]
pub struct InMemoryIdempotencyStore {
    entries: Mutex<Entries>,
    sweep_floor: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryIdempotencyStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_sweep_threshold(clock, SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(clock: Arc<dyn Clock>, threshold: usize) -> Self {
        let sweep_floor = threshold.max(1);
        Self {
            entries: Mutex::new(Entries {
                keys: HashMap::new(),
                sweep_at: sweep_floor,
            }),
            sweep_floor,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn insert_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| StoreError::Unavailable(format!("ttl out of range: {ttl:?}")))?;

        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.keys.len() >= entries.sweep_at {
            entries.keys.retain(|_, expires_at| *expires_at > now);
            entries.sweep_at = self.sweep_floor.max(entries.keys.len().saturating_mul(2));
        }

        match entries.keys.get(key) {
            Some(live_until) if *live_until > now => Ok(false),
            _ => {
                entries.keys.insert(key.to_string(), expires_at);
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn second_insert_within_ttl_rejected() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryIdempotencyStore::new(clock.clone());
        let ttl = Duration::from_secs(600);

        assert!(store.insert_if_absent("k", ttl).await.unwrap());
        assert!(!store.insert_if_absent("k", ttl).await.unwrap());
        assert!(store.insert_if_absent("other", ttl).await.unwrap());

        clock.advance(chrono::Duration::seconds(599));
        assert!(!store.insert_if_absent("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn accepted_again_after_expiry() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryIdempotencyStore::new(clock.clone());
        let ttl = Duration::from_secs(600);

        assert!(store.insert_if_absent("k", ttl).await.unwrap());
        clock.advance(chrono::Duration::seconds(600));
        assert!(store.insert_if_absent("k", ttl).await.unwrap());
        assert!(!store.insert_if_absent("k", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn out_of_range_ttl_is_an_error() {
        let store = InMemoryIdempotencyStore::new(Arc::new(ManualClock::default()));
        // accepted by chrono::Duration, but lands past the last representable date
        let million_years = Duration::from_secs(1_000_000 * 365 * 86_400);
        assert!(matches!(
            store.insert_if_absent("k", million_years).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_keys_swept_only_when_size_doubles() {
        let clock = Arc::new(ManualClock::default());
        let store = InMemoryIdempotencyStore::with_sweep_threshold(clock.clone(), 4);
        let ttl = Duration::from_secs(10);
        let insert = |key: &'static str| {
            let store = &store;
            async move { assert!(store.insert_if_absent(key, ttl).await.unwrap()) }
        };

        insert("a").await;
        insert("b").await;
        insert("c").await;
        clock.advance(chrono::Duration::seconds(11));
        insert("d").await;
        assert_eq!(store.len(), 4);
        // size 4 reached: a, b and c go
        insert("e").await;
        assert_eq!(store.len(), 2);

        insert("f").await;
        insert("g").await;
        // nothing expired; the next sweep waits until 8 keys
        insert("h").await;
        assert_eq!(store.len(), 5);

        clock.advance(chrono::Duration::seconds(11));
        insert("i").await;
        insert("j").await;
        insert("k").await;
        assert_eq!(store.len(), 8);
        // only i, j and k survive, then l lands
        insert("l").await;
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn concurrent_inserts_admit_exactly_one() {
        let store = Arc::new(InMemoryIdempotencyStore::new(Arc::new(ManualClock::default())));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .insert_if_absent("same", Duration::from_secs(60))
                    .await
                    .unwrap()
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(store.len(), 1);
    }
}
