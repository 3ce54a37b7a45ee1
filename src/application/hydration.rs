//! Request-scoped hydration.
//!
//! `Hydrator::hydrate` fans out one batched read per data category,
//! concurrently, and joins the results into a `HydrationState`. The batch
//! count is constant regardless of how many refs are hydrated; that is the
//! anti-N+1 guarantee the rest of the engine builds on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::application::error::EngineError;
use crate::application::store::{
    Aggregates, LabelRow, ListMembership, RecordStore, Relationship, StoreError, ViewerStateRow,
};
use crate::cache::{CacheConfig, CacheKey, CacheStore, DataClass, get_typed, set_typed};
use crate::domain::ids::{AtUri, ContentRef, Did};
use crate::domain::records::{ActorRow, PostRecord, RecordEmbed, RecordRow, RecordValue};

/// Joined result of one hydration call.
///
/// Immutable once built; absent keys mean absent data. The serializer reads
/// exclusively from here and performs no I/O of its own.
#[derive(Debug, Default, Clone)]
pub struct HydrationState {
    pub viewer: Option<Did>,
    pub records: HashMap<AtUri, RecordRow>,
    pub actors: HashMap<Did, ActorRow>,
    pub aggregates: HashMap<AtUri, Aggregates>,
    pub viewer_states: HashMap<AtUri, ViewerStateRow>,
    pub relationships: HashMap<Did, Relationship>,
    pub labels: HashMap<String, Vec<LabelRow>>,
    pub list_mutes: HashMap<Did, ListMembership>,
    pub list_blocks: HashMap<Did, ListMembership>,
}

impl HydrationState {
    pub fn record(&self, uri: &AtUri) -> Option<&RecordRow> {
        self.records.get(uri)
    }

    pub fn post_record(&self, uri: &AtUri) -> Option<(&RecordRow, &PostRecord)> {
        let row = self.records.get(uri)?;
        row.value.as_post().map(|post| (row, post))
    }

    pub fn actor(&self, did: &Did) -> Option<&ActorRow> {
        self.actors.get(did)
    }

    /// Aggregation counts, zeroed when no row exists.
    pub fn aggregates_or_zero(&self, uri: &AtUri) -> Aggregates {
        self.aggregates.get(uri).copied().unwrap_or_default()
    }

    pub fn viewer_state(&self, uri: &AtUri) -> Option<&ViewerStateRow> {
        self.viewer_states.get(uri)
    }

    pub fn relationship(&self, author: &Did) -> Option<&Relationship> {
        self.relationships.get(author)
    }

    pub fn labels_for(&self, subject: &str) -> &[LabelRow] {
        self.labels.get(subject).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn list_mute(&self, author: &Did) -> Option<&ListMembership> {
        self.list_mutes.get(author)
    }

    pub fn list_block(&self, author: &Did) -> Option<&ListMembership> {
        self.list_blocks.get(author)
    }

    /// Whether a mutual-block relationship hides this author from the viewer.
    pub fn blocked_between_viewer_and(&self, author: &Did) -> bool {
        if self.viewer.as_ref() == Some(author) {
            return false;
        }
        self.relationship(author)
            .is_some_and(Relationship::blocked_either_way)
            || self.list_block(author).is_some()
    }

    /// Fold another hydration pass into this one. Later passes win on key
    /// collisions, which only happen when the same record was re-read.
    pub fn absorb(&mut self, other: HydrationState) {
        self.records.extend(other.records);
        self.actors.extend(other.actors);
        self.aggregates.extend(other.aggregates);
        self.viewer_states.extend(other.viewer_states);
        self.relationships.extend(other.relationships);
        self.labels.extend(other.labels);
        self.list_mutes.extend(other.list_mutes);
        self.list_blocks.extend(other.list_blocks);
    }
}

pub struct Hydrator {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    cache_config: CacheConfig,
    batch_deadline: Duration,
}

impl Hydrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        cache_config: CacheConfig,
        batch_deadline: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            cache_config,
            batch_deadline,
        }
    }

    /// Hydrate a set of content refs for an optional viewer.
    ///
    /// The records batch is critical; every other category degrades to empty
    /// data on failure or timeout, logged at warning level, so a flaky label
    /// service costs labels rather than the whole request.
    pub async fn hydrate(
        &self,
        refs: &[ContentRef],
        viewer: Option<&Did>,
    ) -> Result<HydrationState, EngineError> {
        let uris = dedupe_uris(refs);
        let authors = dedupe_authors(&uris);
        let label_subjects = label_subjects(&uris, &authors);

        let (records, actors, aggregates, viewer_states, relationships, labels, list_mutes, list_blocks) = tokio::join!(
            self.critical(self.store.get_records(refs)),
            self.degrading("actors", self.store.get_actors(&authors)),
            self.degrading("aggregates", self.store.get_aggregates(&uris)),
            self.viewer_scoped(
                "viewer_states",
                viewer.map(|v| self.store.get_viewer_states(&uris, v)),
            ),
            self.cached_relationships("relationships", viewer, &authors),
            self.degrading("labels", self.store.get_labels_for_subjects(&label_subjects)),
            self.viewer_scoped(
                "list_mutes",
                viewer.map(|v| self.store.get_list_mutes(v, &authors)),
            ),
            self.viewer_scoped(
                "list_blocks",
                viewer.map(|v| self.store.get_list_blocks(v, &authors)),
            ),
        );

        let mut state = HydrationState {
            viewer: viewer.cloned(),
            records: records?,
            actors,
            aggregates,
            viewer_states,
            relationships,
            labels,
            list_mutes,
            list_blocks,
        };

        self.hydrate_quotes(&mut state, viewer).await;
        Ok(state)
    }

    /// Pull in quoted records referenced by embeds but absent from the input
    /// set. One supplemental records batch and one actors batch, so the total
    /// stays constant.
    async fn hydrate_quotes(&self, state: &mut HydrationState, viewer: Option<&Did>) {
        let quote_refs: Vec<ContentRef> = state
            .records
            .values()
            .filter_map(|row| row.value.as_post())
            .filter_map(|post| post.embed.as_ref())
            .filter_map(embedded_record_ref)
            .filter(|quoted| !state.records.contains_key(&quoted.uri))
            .cloned()
            .collect();
        if quote_refs.is_empty() {
            return;
        }

        let quote_records = self
            .degrading("quoted_records", self.store.get_records(&quote_refs))
            .await;
        let quote_authors = dedupe_authors(&dedupe_uris(&quote_refs));
        let (quote_actors, quote_relationships) = tokio::join!(
            self.degrading("quoted_actors", self.store.get_actors(&quote_authors)),
            self.cached_relationships("quoted_relationships", viewer, &quote_authors),
        );

        state.records.extend(quote_records);
        state.actors.extend(quote_actors);
        state.relationships.extend(quote_relationships);
    }

    async fn critical<T>(
        &self,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.batch_deadline, fut).await {
            Ok(result) => result.map_err(EngineError::from_critical_store),
            Err(_) => Err(EngineError::UpstreamUnavailable(
                "records batch timed out".to_string(),
            )),
        }
    }

    /// Run a non-critical batch under the deadline. `None` means the batch
    /// failed or timed out and its data should be treated as absent.
    async fn attempt<T>(
        &self,
        batch: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.batch_deadline, fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(batch, error = %err, "Hydration batch failed; degrading to empty");
                None
            }
            Err(_) => {
                warn!(batch, "Hydration batch timed out; degrading to empty");
                None
            }
        }
    }

    async fn degrading<T: Default>(
        &self,
        batch: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> T {
        self.attempt(batch, fut).await.unwrap_or_default()
    }

    /// A batch that only exists for signed-in requests: `None` skips the
    /// store entirely.
    async fn viewer_scoped<T: Default>(
        &self,
        batch: &'static str,
        fut: Option<impl Future<Output = Result<T, StoreError>>>,
    ) -> T {
        match fut {
            Some(fut) => self.degrading(batch, fut).await,
            None => T::default(),
        }
    }

    /// Relationship rows read through the cache, one entry per
    /// (viewer, author) pair. Known-absent pairs are cached as `None` so
    /// repeat views of unrelated authors stay off the store; only the cache
    /// misses reach it, still as a single batch.
    async fn cached_relationships(
        &self,
        batch: &'static str,
        viewer: Option<&Did>,
        authors: &[Did],
    ) -> HashMap<Did, Relationship> {
        let Some(viewer) = viewer else {
            return HashMap::new();
        };

        let mut rows = HashMap::new();
        let mut misses = Vec::new();
        for author in authors {
            let key = CacheKey::Relationships {
                viewer: viewer.clone(),
                author: author.clone(),
            };
            match get_typed::<Option<Relationship>>(self.cache.as_ref(), &key) {
                Some(Some(row)) => {
                    rows.insert(author.clone(), row);
                }
                Some(None) => {}
                None => misses.push(author.clone()),
            }
        }
        if misses.is_empty() {
            return rows;
        }

        let Some(fetched) = self
            .attempt(batch, self.store.get_relationships(viewer, &misses))
            .await
        else {
            // A failed fetch degrades without caching, so nothing absent is
            // remembered past the failure.
            return rows;
        };
        for author in misses {
            let row = fetched.get(&author).cloned();
            set_typed(
                self.cache.as_ref(),
                CacheKey::Relationships {
                    viewer: viewer.clone(),
                    author: author.clone(),
                },
                &row,
                self.cache_config.ttl(DataClass::Relationships),
            );
            if let Some(row) = row {
                rows.insert(author, row);
            }
        }
        rows
    }
}

fn dedupe_uris(refs: &[ContentRef]) -> Vec<AtUri> {
    let mut seen = HashSet::new();
    refs.iter()
        .map(|r| r.uri.clone())
        .filter(|uri| seen.insert(uri.clone()))
        .collect()
}

fn dedupe_authors(uris: &[AtUri]) -> Vec<Did> {
    let mut seen = HashSet::new();
    uris.iter()
        .map(AtUri::authority)
        .filter(|did| seen.insert(did.clone()))
        .collect()
}

fn label_subjects(uris: &[AtUri], authors: &[Did]) -> Vec<String> {
    uris.iter()
        .map(|uri| uri.as_str().to_string())
        .chain(authors.iter().map(|did| did.as_str().to_string()))
        .collect()
}

fn embedded_record_ref(embed: &RecordEmbed) -> Option<&ContentRef> {
    match embed {
        RecordEmbed::Record { record } | RecordEmbed::RecordWithMedia { record, .. } => {
            Some(record)
        }
        _ => None,
    }
}

/// Extract the post value from a record row if it is a post.
pub fn as_post_row(row: &RecordRow) -> Option<(&RecordRow, &PostRecord)> {
    match &row.value {
        RecordValue::Post(post) => Some((row, post)),
        _ => None,
    }
}
