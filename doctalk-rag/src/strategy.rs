//! Retrieval strategies built on top of [`RetrievalIndex::search`].
//!
//! The index answers single top-k queries. The strategies here decide which
//! queries to run for a chat turn and how to shape the results into the
//! context handed to the answer synthesizer:
//!
//! - [`broad_coverage_search`] samples every document for summary requests,
//! - [`focused_search`] caps each source's share for regular questions,
//! - [`retrieve_context`] picks between the two with [`RetrievalMode::for_query`].

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RagConfig;
use crate::document::ScoredChunk;
use crate::error::Result;
use crate::index::RetrievalIndex;

/// Results requested per seed term when none is configured.
pub const DEFAULT_SEED_K: usize = 20;

/// Words that mark a message as a request to summarize the documents.
const SUMMARY_MARKERS: [&str; 10] = [
    "summarize",
    "summary",
    "summarise",
    "sumary",
    "brief",
    "overview",
    "gist",
    "main points",
    "key points",
    "highlights",
];

/// How context is gathered for a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// A question answered from the most relevant passages.
    Question,
    /// A request to summarize all uploaded documents.
    Summary,
}

impl RetrievalMode {
    /// Classify a user message by looking for summary markers.
    pub fn for_query(query: &str) -> Self {
        let lowered = query.to_lowercase();
        if SUMMARY_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::Summary
        } else {
            Self::Question
        }
    }
}

/// Sample every source of `index` with a fixed set of seed queries.
///
/// Runs [`RetrievalIndex::search`] once per seed term with `seed_k` results,
/// unions the hits (a chunk found by several seeds is kept once, with its
/// best score), groups them by `source_id` and keeps the `per_source_cap`
/// best chunks of every group, ordered by descending score.
///
/// The empty seed embeds to a query without features in most providers; it
/// stands for "whatever ranks first" and, through the search tie-break,
/// favors the opening chunks of each document.
pub async fn broad_coverage_search_with<S: AsRef<str>>(
    index: &RetrievalIndex,
    seed_terms: &[S],
    seed_k: usize,
    per_source_cap: usize,
) -> Result<BTreeMap<String, Vec<ScoredChunk>>> {
    let mut best: HashMap<(String, usize), ScoredChunk> = HashMap::new();

    for seed in seed_terms {
        for hit in index.search(seed.as_ref(), seed_k).await? {
            let key = (hit.chunk.source_id.clone(), hit.chunk.chunk_index);
            match best.entry(key) {
                Entry::Occupied(mut existing) => {
                    if existing.get().score < hit.score {
                        existing.insert(hit);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(hit);
                }
            }
        }
    }

    let mut groups: BTreeMap<String, Vec<ScoredChunk>> = BTreeMap::new();
    for hit in best.into_values() {
        groups.entry(hit.chunk.source_id.clone()).or_default().push(hit);
    }
    for hits in groups.values_mut() {
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
        });
        hits.truncate(per_source_cap);
    }

    debug!(
        seed_count = seed_terms.len(),
        source_count = groups.len(),
        chunk_count = groups.values().map(Vec::len).sum::<usize>(),
        "broad coverage search completed"
    );

    Ok(groups)
}

/// [`broad_coverage_search_with`] using [`DEFAULT_SEED_K`] results per seed.
pub async fn broad_coverage_search<S: AsRef<str>>(
    index: &RetrievalIndex,
    seed_terms: &[S],
    per_source_cap: usize,
) -> Result<BTreeMap<String, Vec<ScoredChunk>>> {
    broad_coverage_search_with(index, seed_terms, DEFAULT_SEED_K, per_source_cap).await
}

/// Retrieve context for a regular question.
///
/// Searches with `k`, groups the hits by source in order of each source's
/// best hit, keeps at most `per_source_cap` hits per source and truncates the
/// flattened list to `max_total`. Passages of one source stay adjacent so the
/// synthesizer can cite them together.
pub async fn focused_search(
    index: &RetrievalIndex,
    query: &str,
    k: usize,
    per_source_cap: usize,
    max_total: usize,
) -> Result<Vec<ScoredChunk>> {
    let hits = index.search(query, k).await?;

    let mut groups: Vec<(String, Vec<ScoredChunk>)> = Vec::new();
    for hit in hits {
        match groups.iter_mut().find(|(source, _)| *source == hit.chunk.source_id) {
            Some((_, group)) => group.push(hit),
            None => groups.push((hit.chunk.source_id.clone(), vec![hit])),
        }
    }

    let context: Vec<ScoredChunk> = groups
        .into_iter()
        .flat_map(|(_, group)| group.into_iter().take(per_source_cap))
        .take(max_total)
        .collect();

    debug!(k, result_count = context.len(), "focused search completed");

    Ok(context)
}

/// Gather the context for `query` according to its [`RetrievalMode`].
///
/// Summary requests use [`broad_coverage_search_with`] with the configured
/// seeds, flattened source by source; everything else uses [`focused_search`].
pub async fn retrieve_context(
    index: &RetrievalIndex,
    query: &str,
    config: &RagConfig,
) -> Result<(RetrievalMode, Vec<ScoredChunk>)> {
    let mode = RetrievalMode::for_query(query);
    let context = match mode {
        RetrievalMode::Summary => broad_coverage_search_with(
            index,
            &config.summary_seeds,
            config.summary_seed_k,
            config.summary_per_source_cap,
        )
        .await?
        .into_values()
        .flatten()
        .collect(),
        RetrievalMode::Question => {
            focused_search(index, query, config.top_k, config.per_source_cap, config.max_context)
                .await?
        }
    };
    Ok((mode, context))
}
