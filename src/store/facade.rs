//! Store facade (§4.4): a single read API over the overlay plus the
//! ordered list of persistent row-stores.
//!
//! Priority is fixed at process start (§3): the overlay ranks above every
//! persistent instance; among persistent instances, "custom" outranks
//! "base" which outranks "branch". The ordering is held as an immutable
//! `Vec` for the process lifetime — no query planning over the overlay
//! set (§1 non-goals).

use crate::codec::CodecError;
use crate::key::Token;
use crate::store::overlay::OverlayCache;
use crate::store::rowstore::{read_rows, RowSet, RowStoreClient, RowStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InstanceKind {
    Custom,
    Base,
    Branch,
}

pub struct RowStoreInstance {
    pub name: String,
    pub kind: InstanceKind,
    pub client: Arc<dyn RowStoreClient>,
}

/// One fan-out result per source, highest priority first: overlay, then
/// persistent instances in their configured order (§4.4).
pub struct FanOutResult<R> {
    pub overlay: HashMap<Token, R>,
    pub persistent: Vec<(String, HashMap<Token, R>)>,
}

impl<R> FanOutResult<R> {
    /// All sources, overlay first, for callers that just want priority
    /// order without caring which layer a result came from.
    pub fn in_priority_order(&self) -> impl Iterator<Item = &HashMap<Token, R>> {
        std::iter::once(&self.overlay).chain(self.persistent.iter().map(|(_, m)| m))
    }
}

pub struct StoreFacade {
    overlay: Arc<OverlayCache>,
    /// Ordered list, immutable for the process lifetime: custom, then
    /// base, then branch (§3).
    persistent: Vec<RowStoreInstance>,
}

impl StoreFacade {
    pub fn new(overlay: Arc<OverlayCache>, mut persistent: Vec<RowStoreInstance>) -> Self {
        persistent.sort_by_key(|i| i.kind);
        Self { overlay, persistent }
    }

    pub fn persistent_instances(&self) -> &[RowStoreInstance] {
        &self.persistent
    }

    /// Fan out a single logical read across the overlay and every
    /// persistent instance concurrently (§4.4, §5). A fatal fetch error
    /// on any persistent instance aborts the call; the overlay itself has
    /// no fatal path (§4.3).
    pub async fn fan_out<R, D, T>(
        &self,
        row_set: RowSet,
        decode: D,
        token_fn: T,
    ) -> Result<FanOutResult<R>, RowStoreError>
    where
        R: Send + 'static,
        D: Fn(&str, &[u8]) -> Result<R, CodecError> + Send + Sync + 'static,
        T: Fn(&str) -> Token + Send + Sync + 'static,
    {
        let decode = Arc::new(decode);
        let token_fn = Arc::new(token_fn);

        let overlay_fut = {
            let overlay = Arc::clone(&self.overlay);
            let row_set = row_set.clone();
            let decode = Arc::clone(&decode);
            let token_fn = Arc::clone(&token_fn);
            async move {
                overlay
                    .read_parallel(
                        &row_set,
                        move |k, b| decode(k, b),
                        move |k| token_fn(k),
                    )
                    .await
            }
        };

        let mut persistent_futs = Vec::with_capacity(self.persistent.len());
        for instance in &self.persistent {
            let client = Arc::clone(&instance.client);
            let row_set = row_set.clone();
            let decode = Arc::clone(&decode);
            let token_fn = Arc::clone(&token_fn);
            let name = instance.name.clone();
            persistent_futs.push(async move {
                let result = read_rows(
                    client,
                    row_set,
                    move |k, b| decode(k, b),
                    move |k| token_fn(k),
                )
                .await;
                (name, result)
            });
        }

        let (overlay_result, persistent_joined) =
            futures::future::join(overlay_fut, futures::future::join_all(persistent_futs)).await;

        let mut persistent = Vec::with_capacity(persistent_joined.len());
        for (name, result) in persistent_joined {
            match result {
                Ok(map) => persistent.push((name, map)),
                Err(e) => {
                    warn!(instance = %name, error = %e, "persistent row-store fetch failed");
                    return Err(e);
                }
            }
        }

        Ok(FanOutResult {
            overlay: overlay_result,
            persistent,
        })
    }

    /// For any token present in any source, take the value from the
    /// highest-priority source that has it (§4.4).
    pub fn merge_pick_first<R: Clone>(result: &FanOutResult<R>) -> HashMap<Token, R> {
        let mut merged = HashMap::new();
        for source in result.in_priority_order() {
            for (token, record) in source {
                merged.entry(token.clone()).or_insert_with(|| record.clone());
            }
        }
        merged
    }

    /// Like [`merge_pick_first`] but restricted to the persistent instances,
    /// ignoring the overlay — for handlers documented as "persistent only"
    /// (§4.8).
    pub fn merge_pick_first_persistent<R: Clone>(result: &FanOutResult<R>) -> HashMap<Token, R> {
        let mut merged = HashMap::new();
        for (_, source) in &result.persistent {
            for (token, record) in source {
                merged.entry(token.clone()).or_insert_with(|| record.clone());
            }
        }
        merged
    }

    /// Concatenate lists across sources, used for related-entities unions
    /// (§4.4).
    pub fn merge_concat<R: Clone>(
        result: &FanOutResult<Vec<R>>,
    ) -> HashMap<Token, Vec<R>> {
        let mut merged: HashMap<Token, Vec<R>> = HashMap::new();
        for source in result.in_priority_order() {
            for (token, items) in source {
                merged.entry(token.clone()).or_default().extend(items.iter().cloned());
            }
        }
        merged
    }

    /// Overlay-first fan-out with per-slot backfill (§4.4 "overlay ranks
    /// above every persistent instance"; §8 property 4/5): a token the
    /// overlay resolves wins outright and persistent is never consulted
    /// for it. Persistent instances are queried only for the keys whose
    /// token the overlay left unresolved, using a row-set reduced to just
    /// those keys, and their results are unioned among themselves the
    /// same way [`merge_concat`] would (a token can still appear in more
    /// than one persistent instance).
    pub async fn fan_out_backfill<R, D, T>(
        &self,
        row_set: RowSet,
        decode: D,
        token_fn: T,
    ) -> Result<HashMap<Token, Vec<R>>, RowStoreError>
    where
        R: Send + 'static,
        D: Fn(&str, &[u8]) -> Result<R, CodecError> + Send + Sync + 'static,
        T: Fn(&str) -> Token + Send + Sync + 'static,
    {
        let decode = Arc::new(decode);
        let token_fn = Arc::new(token_fn);

        let overlay_result: HashMap<Token, R> = {
            let decode = Arc::clone(&decode);
            let token_fn = Arc::clone(&token_fn);
            self.overlay
                .read_parallel(&row_set, move |k, b| decode(k, b), move |k| token_fn(k))
                .await
        };

        let mut merged: HashMap<Token, Vec<R>> = overlay_result
            .into_iter()
            .map(|(token, record)| (token, vec![record]))
            .collect();

        // Range reads aren't used by the ranked handlers this backfill
        // serves; fall back to querying every persistent instance for the
        // whole range rather than silently dropping it.
        let RowSet::Keys(keys) = &row_set else {
            return self.fan_out_backfill_full_range(row_set, decode, token_fn, merged).await;
        };
        let remaining_keys: Vec<String> = keys
            .iter()
            .filter(|k| !merged.contains_key(&token_fn(k)))
            .cloned()
            .collect();

        if remaining_keys.is_empty() {
            return Ok(merged);
        }

        let reduced = RowSet::Keys(remaining_keys);
        let mut persistent_futs = Vec::with_capacity(self.persistent.len());
        for instance in &self.persistent {
            let client = Arc::clone(&instance.client);
            let reduced = reduced.clone();
            let decode = Arc::clone(&decode);
            let token_fn = Arc::clone(&token_fn);
            persistent_futs.push(async move {
                read_rows(client, reduced, move |k, b| decode(k, b), move |k| token_fn(k)).await
            });
        }

        for result in futures::future::join_all(persistent_futs).await {
            for (token, record) in result? {
                merged.entry(token).or_default().push(record);
            }
        }

        Ok(merged)
    }

    /// Range-read fallback for [`fan_out_backfill`]: the overlay only
    /// exposes exact-key reads against ranges (it scans its own snapshot),
    /// so there is no reduced key list to hand persistent — every
    /// persistent instance is queried for the full range instead.
    async fn fan_out_backfill_full_range<R, D, T>(
        &self,
        row_set: RowSet,
        decode: Arc<D>,
        token_fn: Arc<T>,
        mut merged: HashMap<Token, Vec<R>>,
    ) -> Result<HashMap<Token, Vec<R>>, RowStoreError>
    where
        R: Send + 'static,
        D: Fn(&str, &[u8]) -> Result<R, CodecError> + Send + Sync + 'static,
        T: Fn(&str) -> Token + Send + Sync + 'static,
    {
        let mut persistent_futs = Vec::with_capacity(self.persistent.len());
        for instance in &self.persistent {
            let client = Arc::clone(&instance.client);
            let row_set = row_set.clone();
            let decode = Arc::clone(&decode);
            let token_fn = Arc::clone(&token_fn);
            persistent_futs.push(async move {
                read_rows(client, row_set, move |k, b| decode(k, b), move |k| token_fn(k)).await
            });
        }
        for result in futures::future::join_all(persistent_futs).await {
            for (token, record) in result? {
                merged.entry(token).or_default().push(record);
            }
        }
        Ok(merged)
    }
}
