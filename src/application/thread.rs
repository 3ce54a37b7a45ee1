//! Thread assembly.
//!
//! `ThreadAssembler` turns an anchor post into a bounded reply tree: ancestor
//! chain up to `parent_height`, descendants by per-level BFS down to `depth`,
//! every level hydrated in one batch. Assembled trees are memoized per thread
//! root, so a write anywhere in the thread invalidates one cache sweep.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use time::OffsetDateTime;
use tracing::warn;
use url::Url;

use crate::application::error::EngineError;
use crate::application::hydration::{HydrationState, Hydrator};
use crate::application::store::{RecordStore, StoreError};
use crate::cache::{CacheConfig, CacheKey, CacheStore, DataClass, get_typed, hash_value, set_typed};
use crate::config::ThreadSettings;
use crate::domain::ids::{AtUri, ContentRef, Did};
use crate::domain::records::{ThreadGateRecord, ThreadGateRule};
use crate::domain::views::ThreadNode;
use crate::presentation::serialize_post;

/// Ordering of sibling replies inside a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortMode {
    Newest,
    Oldest,
    Top,
}

/// Per-request assembly parameters. Each bound is clamped to the configured
/// caps before use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadParams {
    pub depth: usize,
    pub parent_height: usize,
    pub branching_factor: usize,
    pub sort: SortMode,
    pub prioritize_followed: bool,
}

impl Default for ThreadParams {
    fn default() -> Self {
        Self {
            depth: 6,
            parent_height: 80,
            branching_factor: 50,
            sort: SortMode::Oldest,
            prioritize_followed: false,
        }
    }
}

impl ThreadParams {
    fn clamped(&self, caps: &ThreadSettings) -> Self {
        Self {
            depth: self.depth.min(caps.max_depth),
            parent_height: self.parent_height.min(caps.max_parent_height),
            branching_factor: self.branching_factor.clamp(1, caps.max_branching_factor),
            sort: self.sort,
            prioritize_followed: self.prioritize_followed,
        }
    }
}

pub struct ThreadAssembler {
    hydrator: Arc<Hydrator>,
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn CacheStore>,
    cache_config: CacheConfig,
    settings: ThreadSettings,
    base_url: Url,
}

impl ThreadAssembler {
    pub fn new(
        hydrator: Arc<Hydrator>,
        store: Arc<dyn RecordStore>,
        cache: Arc<dyn CacheStore>,
        cache_config: CacheConfig,
        settings: ThreadSettings,
        base_url: Url,
    ) -> Self {
        Self {
            hydrator,
            store,
            cache,
            cache_config,
            settings,
            base_url,
        }
    }

    /// Assemble the thread around `anchor` for an optional viewer.
    ///
    /// Returns the topmost resolved ancestor; the anchor sits at the bottom
    /// of a single-child chain, with its reply tree below it.
    pub async fn assemble(
        &self,
        anchor: &ContentRef,
        params: &ThreadParams,
        viewer: Option<&Did>,
    ) -> Result<ThreadNode, EngineError> {
        let params = params.clamped(&self.settings);

        let mut state = self
            .hydrator
            .hydrate(std::slice::from_ref(anchor), viewer)
            .await?;
        let Some((_, anchor_post)) = state.post_record(&anchor.uri) else {
            return Err(EngineError::NotFound);
        };
        let anchor_author = anchor.uri.authority();
        if state.blocked_between_viewer_and(&anchor_author) {
            return Err(EngineError::Blocked);
        }

        let root = anchor_post
            .reply
            .as_ref()
            .map(|reply| reply.root.uri.clone())
            .unwrap_or_else(|| anchor.uri.clone());

        let key = CacheKey::Thread {
            root: root.clone(),
            viewer: viewer.cloned(),
            params_hash: hash_value(&(anchor.uri.as_str(), &params)),
        };
        if let Some(cached) = get_typed::<ThreadNode>(self.cache.as_ref(), &key) {
            return Ok(cached);
        }

        if root != anchor.uri
            && let Ok(root_state) = self
                .hydrator
                .hydrate(&[ContentRef::new(root.clone())], viewer)
                .await
        {
            state.absorb(root_state);
        }

        let gate = self.gate_context(&root, &state, viewer).await;
        let ancestors = self
            .collect_ancestors(anchor, &params, viewer, &mut state)
            .await;
        let (children_of, blocked) = self
            .collect_descendants(anchor, &params, viewer, &gate, &mut state)
            .await;

        let anchor_node = self.build_node(&anchor.uri, &state, &children_of, &blocked);
        let Some(anchor_node) = anchor_node else {
            // The anchor was resolvable above; a vanished row mid-assembly is
            // an upstream inconsistency, not a missing thread.
            return Err(EngineError::internal("anchor record lost during assembly"));
        };

        let tree = nest_ancestors(anchor_node, ancestors);
        set_typed(
            self.cache.as_ref(),
            key,
            &tree,
            self.cache_config.ttl(DataClass::Thread),
        );
        Ok(tree)
    }

    /// Walk `reply.parent` pointers up to `parent_height`, hydrating one
    /// level per step. Returns placeholders nearest-first.
    async fn collect_ancestors(
        &self,
        anchor: &ContentRef,
        params: &ThreadParams,
        viewer: Option<&Did>,
        state: &mut HydrationState,
    ) -> Vec<ThreadNode> {
        let mut ancestors = Vec::new();
        let root = state
            .post_record(&anchor.uri)
            .and_then(|(_, post)| post.reply.as_ref())
            .map(|reply| reply.root.clone());
        let mut next = state
            .post_record(&anchor.uri)
            .and_then(|(_, post)| post.reply.as_ref())
            .map(|reply| reply.parent.clone());

        while let Some(parent_ref) = next.take() {
            if ancestors.len() >= params.parent_height {
                break;
            }
            if !state.records.contains_key(&parent_ref.uri)
                && let Ok(parent_state) = self
                    .hydrator
                    .hydrate(std::slice::from_ref(&parent_ref), viewer)
                    .await
            {
                state.absorb(parent_state);
            }

            let author = parent_ref.uri.authority();
            match state.post_record(&parent_ref.uri) {
                Some((_, post)) => {
                    let parent_of_parent = post.reply.as_ref().map(|reply| reply.parent.clone());
                    if state.blocked_between_viewer_and(&author) {
                        ancestors.push(ThreadNode::blocked(parent_ref.uri.clone(), author));
                    } else if let Some(view) =
                        serialize_post(&parent_ref.uri, state, &self.base_url)
                    {
                        ancestors.push(ThreadNode::post(parent_ref.uri.clone(), view, Vec::new()));
                    }
                    next = parent_of_parent;
                }
                None => {
                    ancestors.push(ThreadNode::not_found(parent_ref.uri.clone()));
                    // The missing record's own parent pointer is gone; the
                    // only still-resolvable ancestor is the thread root.
                    next = root
                        .as_ref()
                        .filter(|r| r.uri != parent_ref.uri)
                        .filter(|r| !ancestors.iter().any(|node| node.uri == r.uri))
                        .cloned();
                }
            }
        }

        ancestors
    }

    /// Per-level BFS over replies. Each level costs one `get_replies` batch
    /// and one hydration; no per-node awaits.
    async fn collect_descendants(
        &self,
        anchor: &ContentRef,
        params: &ThreadParams,
        viewer: Option<&Did>,
        gate: &GateContext,
        state: &mut HydrationState,
    ) -> (HashMap<AtUri, Vec<AtUri>>, HashSet<AtUri>) {
        let mut children_of: HashMap<AtUri, Vec<AtUri>> = HashMap::new();
        let mut blocked: HashSet<AtUri> = HashSet::new();
        let mut frontier = vec![anchor.uri.clone()];

        for _ in 0..params.depth {
            if frontier.is_empty() {
                break;
            }
            let replies = match self
                .store
                .get_replies(&frontier, self.settings.reply_fetch_limit.get())
                .await
            {
                Ok(replies) => replies,
                Err(err) => {
                    warn!(error = %err, "Reply listing failed; truncating thread level");
                    break;
                }
            };

            let level_refs: Vec<ContentRef> = frontier
                .iter()
                .filter_map(|parent| replies.get(parent))
                .flatten()
                .cloned()
                .collect();
            if level_refs.is_empty() {
                break;
            }
            if let Ok(level_state) = self.hydrator.hydrate(&level_refs, viewer).await {
                state.absorb(level_state);
            }

            let mut next_frontier = Vec::new();
            for parent in &frontier {
                let Some(reply_refs) = replies.get(parent) else {
                    continue;
                };
                let mut candidates: Vec<Candidate> = reply_refs
                    .iter()
                    .filter_map(|reply| self.candidate(reply, viewer, gate, state))
                    .collect();
                candidates.sort_by(|a, b| compare_candidates(a, b, params.sort));
                if params.prioritize_followed {
                    // Stable partition: followed authors first, relative
                    // order inside each half preserved.
                    candidates.sort_by_key(|candidate| !candidate.followed);
                }
                candidates.truncate(params.branching_factor);

                let mut ordered = Vec::with_capacity(candidates.len());
                for candidate in candidates {
                    if candidate.blocked {
                        blocked.insert(candidate.uri.clone());
                    } else {
                        next_frontier.push(candidate.uri.clone());
                    }
                    ordered.push(candidate.uri);
                }
                if !ordered.is_empty() {
                    children_of.insert(parent.clone(), ordered);
                }
            }
            frontier = next_frontier;
        }

        (children_of, blocked)
    }

    fn candidate(
        &self,
        reply: &ContentRef,
        viewer: Option<&Did>,
        gate: &GateContext,
        state: &HydrationState,
    ) -> Option<Candidate> {
        let (_, post) = state.post_record(&reply.uri)?;
        let author = reply.uri.authority();
        if !gate.passes(&author, viewer) {
            return None;
        }
        Some(Candidate {
            uri: reply.uri.clone(),
            created_at: post.created_at,
            like_count: state.aggregates_or_zero(&reply.uri).like_count,
            blocked: state.blocked_between_viewer_and(&author),
            followed: state
                .relationship(&author)
                .is_some_and(crate::application::store::Relationship::is_following),
        })
    }

    fn build_node(
        &self,
        uri: &AtUri,
        state: &HydrationState,
        children_of: &HashMap<AtUri, Vec<AtUri>>,
        blocked: &HashSet<AtUri>,
    ) -> Option<ThreadNode> {
        if blocked.contains(uri) {
            return Some(ThreadNode::blocked(uri.clone(), uri.authority()));
        }
        let view = serialize_post(uri, state, &self.base_url)?;
        let children = children_of
            .get(uri)
            .into_iter()
            .flatten()
            .filter_map(|child| self.build_node(child, state, children_of, blocked))
            .collect();
        Some(ThreadNode::post(uri.clone(), view, children))
    }

    /// Load the root's gate through the cache and resolve the sets its rules
    /// reference: list members per list rule, the viewer's follows for a
    /// following rule. Lookup failures degrade and are logged; a flaky gate
    /// backend narrows the thread rather than failing it.
    async fn gate_context(
        &self,
        root: &AtUri,
        state: &HydrationState,
        viewer: Option<&Did>,
    ) -> GateContext {
        let gate = self.load_gate(root).await;
        let mentioned: HashSet<Did> = state
            .post_record(root)
            .map(|(_, post)| post.mentioned_dids().into_iter().cloned().collect())
            .unwrap_or_default();

        let mut list_members = HashMap::new();
        if let Some(gate) = gate.as_ref() {
            for rule in &gate.allow {
                if let ThreadGateRule::List { list } = rule
                    && !list_members.contains_key(list)
                {
                    let members = self.load_list_members(list).await;
                    list_members.insert(list.clone(), members);
                }
            }
        }

        let wants_following = gate
            .as_ref()
            .is_some_and(|gate| gate.allow.contains(&ThreadGateRule::Following));
        let following = match viewer {
            Some(viewer) if wants_following => self.load_following(viewer).await,
            _ => HashSet::new(),
        };

        GateContext {
            root_author: root.authority(),
            rules: gate.map(|record| record.allow),
            mentioned,
            list_members,
            following,
        }
    }

    async fn load_gate(&self, root: &AtUri) -> Option<ThreadGateRecord> {
        let key = CacheKey::Gate { post: root.clone() };
        if let Some(cached) = get_typed::<Option<ThreadGateRecord>>(self.cache.as_ref(), &key) {
            return cached;
        }
        let gate = match self.store.get_thread_gate(root).await {
            Ok(gate) => gate,
            Err(StoreError::NotFound) => None,
            Err(err) => {
                warn!(error = %err, "Thread gate lookup failed; treating as ungated");
                return None;
            }
        };
        set_typed(
            self.cache.as_ref(),
            key,
            &gate,
            self.cache_config.ttl(DataClass::Gate),
        );
        gate
    }

    async fn load_list_members(&self, list: &AtUri) -> HashSet<Did> {
        let key = CacheKey::ListMembers { list: list.clone() };
        if let Some(cached) = get_typed::<Vec<Did>>(self.cache.as_ref(), &key) {
            return cached.into_iter().collect();
        }
        match self.store.get_list_items(list).await {
            Ok(members) => {
                set_typed(
                    self.cache.as_ref(),
                    key,
                    &members,
                    self.cache_config.ttl(DataClass::ListMembers),
                );
                members.into_iter().collect()
            }
            Err(err) => {
                warn!(list = %list, error = %err, "List member lookup failed; treating as empty");
                HashSet::new()
            }
        }
    }

    async fn load_following(&self, viewer: &Did) -> HashSet<Did> {
        let key = CacheKey::Following {
            viewer: viewer.clone(),
        };
        if let Some(cached) = get_typed::<Vec<Did>>(self.cache.as_ref(), &key) {
            return cached.into_iter().collect();
        }
        match self.store.get_following(viewer).await {
            Ok(follows) => {
                set_typed(
                    self.cache.as_ref(),
                    key,
                    &follows,
                    self.cache_config.ttl(DataClass::Following),
                );
                follows.into_iter().collect()
            }
            Err(err) => {
                warn!(viewer = %viewer, error = %err, "Following lookup failed; treating as empty");
                HashSet::new()
            }
        }
    }
}

struct Candidate {
    uri: AtUri,
    created_at: OffsetDateTime,
    like_count: u64,
    blocked: bool,
    followed: bool,
}

fn compare_candidates(a: &Candidate, b: &Candidate, sort: SortMode) -> Ordering {
    let primary = match sort {
        SortMode::Oldest => a.created_at.cmp(&b.created_at),
        SortMode::Newest => b.created_at.cmp(&a.created_at),
        SortMode::Top => b
            .like_count
            .cmp(&a.like_count)
            .then_with(|| b.created_at.cmp(&a.created_at)),
    };
    primary.then_with(|| a.uri.as_str().cmp(b.uri.as_str()))
}

/// Resolved gate rules for one thread root.
struct GateContext {
    root_author: Did,
    /// `None` means no gate record; `Some(vec![])` means a gate that allows
    /// only the root author and the viewer themselves.
    rules: Option<Vec<ThreadGateRule>>,
    mentioned: HashSet<Did>,
    list_members: HashMap<AtUri, HashSet<Did>>,
    /// The viewer's follows; loaded only when a following rule is present.
    following: HashSet<Did>,
}

impl GateContext {
    fn passes(&self, author: &Did, viewer: Option<&Did>) -> bool {
        let Some(rules) = self.rules.as_ref() else {
            return true;
        };
        if author == &self.root_author || viewer == Some(author) {
            return true;
        }
        rules.iter().any(|rule| match rule {
            ThreadGateRule::Mention => self.mentioned.contains(author),
            ThreadGateRule::Following => self.following.contains(author),
            ThreadGateRule::List { list } => self
                .list_members
                .get(list)
                .is_some_and(|members| members.contains(author)),
        })
    }
}

fn nest_ancestors(anchor: ThreadNode, ancestors: Vec<ThreadNode>) -> ThreadNode {
    let mut node = anchor;
    for mut ancestor in ancestors {
        ancestor.children = vec![node];
        node = ancestor;
    }
    node
}
