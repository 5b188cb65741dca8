// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-store behavior-insights cache.
//!
//! Holds the small set of durable operating rules rendered on every
//! turn. The cache is keyed by store instance (owned by the
//! assembler, not global), TTL-bounded, and single-flighted:
//! concurrent misses share one underlying fetch instead of issuing N
//! redundant reads.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use mnemos_store::queries::lessons;
use mnemos_store::MemoryStore;
use tokio::sync::Mutex;
use tracing::warn;

/// Cache contents: deduped lesson rule texts, capped.
type Insights = Vec<String>;

/// The three cache states, as a tagged union.
enum CacheState {
    /// Nothing fetched yet.
    Empty,
    /// A fetch is in flight; late callers await the same future.
    Pending {
        started_at_ms: i64,
        fetch: Shared<BoxFuture<'static, Insights>>,
    },
    /// A value is ready; fresh while `0 <= now - cached_at < ttl`.
    Ready { value: Insights, cached_at_ms: i64 },
}

/// TTL-bounded, single-flight insights cache.
pub struct InsightsCache {
    state: Mutex<CacheState>,
    ttl_ms: i64,
    cap: usize,
}

impl InsightsCache {
    pub fn new(ttl_ms: i64, cap: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::Empty),
            ttl_ms,
            cap,
        }
    }

    /// Get the insights, fetching through the store at most once per
    /// TTL window. Fetch failures degrade to an empty list.
    pub async fn get(&self, store: Arc<MemoryStore>, now_ms: i64) -> Insights {
        let fetch = {
            let mut state = self.state.lock().await;
            match &*state {
                CacheState::Ready { value, cached_at_ms }
                    if self.is_fresh(now_ms, *cached_at_ms) =>
                {
                    return value.clone();
                }
                CacheState::Pending { started_at_ms, fetch }
                    if self.is_fresh(now_ms, *started_at_ms) =>
                {
                    fetch.clone()
                }
                _ => {
                    let cap = self.cap;
                    let fetch = fetch_insights(store, cap).boxed().shared();
                    *state = CacheState::Pending {
                        started_at_ms: now_ms,
                        fetch: fetch.clone(),
                    };
                    fetch
                }
            }
        };

        let value = fetch.clone().await;

        let mut state = self.state.lock().await;
        // A newer fetch may have replaced this one; only promote our
        // result if the pending entry still matches.
        if let CacheState::Pending { fetch: current, .. } = &*state {
            if current.ptr_eq(&fetch) {
                *state = CacheState::Ready {
                    value: value.clone(),
                    cached_at_ms: now_ms,
                };
            }
        }
        value
    }

    /// Freshness requires a non-negative age under the TTL, so a
    /// clock regression never serves stale-looking-fresh data.
    fn is_fresh(&self, now_ms: i64, at_ms: i64) -> bool {
        now_ms >= at_ms && now_ms - at_ms < self.ttl_ms
    }
}

/// The underlying fetch: global lessons, deduped by rule text, capped.
fn fetch_insights(
    store: Arc<MemoryStore>,
    cap: usize,
) -> impl std::future::Future<Output = Insights> + Send + 'static {
    async move {
        match lessons::list_global(store.db(), cap * 2).await {
            Ok(found) => {
                let mut seen = std::collections::HashSet::new();
                found
                    .into_iter()
                    .filter(|l| seen.insert(l.rule.trim().to_lowercase()))
                    .take(cap)
                    .map(|l| l.rule)
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "insights fetch failed, degrading to none");
                Vec::new()
            }
        }
    }
}
