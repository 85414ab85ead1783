//! Hybrid relevance scoring and bounded top-K selection.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use recall_core::config::RankingSettings;
use recall_core::types::IndexEntry;
use recall_vector::cosine_similarity;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    settings: RankingSettings,
}

impl Ranker {
    pub fn new(settings: RankingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RankingSettings {
        &self.settings
    }

    /// Score one entry against a lower-cased query.
    ///
    /// With a query vector of matching dimension, a similarity above
    /// `min_similarity` counts only if the entry also contains the query text
    /// or the similarity reaches `confident_similarity`. Anything that does
    /// not earn a vector score falls back to lexical scoring. Zero means
    /// "not a candidate".
    pub fn score(&self, entry: &IndexEntry, query_lower: &str, query_vec: Option<&[f32]>) -> f32 {
        let title_hit = entry.title_lower().contains(query_lower);
        let content_hit = entry.content_lower().contains(query_lower);

        if let Some(qv) = query_vec {
            if entry.has_embedding() && entry.embedding.len() == qv.len() {
                let similarity = cosine_similarity(qv, &entry.embedding);
                if similarity > self.settings.min_similarity
                    && (title_hit || content_hit || similarity >= self.settings.confident_similarity)
                {
                    return similarity;
                }
            }
        }

        if title_hit {
            self.settings.title_hit_score
        } else if content_hit {
            self.settings.content_hit_score
        } else {
            0.0
        }
    }

    /// The `limit` best-scoring entries, highest first; `limit == 0` keeps all
    /// candidates. Runs in O(n log k).
    pub fn top_k(
        &self,
        entries: &[Arc<IndexEntry>],
        query: &str,
        query_vec: Option<&[f32]>,
        limit: usize,
    ) -> Vec<Arc<IndexEntry>> {
        let query_lower = query.to_lowercase();
        let limit = if limit == 0 || limit > entries.len() { entries.len() } else { limit };
        if limit == 0 {
            return Vec::new();
        }

        let mut heap: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(limit + 1);
        for entry in entries {
            let score = self.score(entry, &query_lower, query_vec);
            if score <= 0.0 {
                continue;
            }
            if heap.len() < limit {
                heap.push(Reverse(Scored { score, entry: Arc::clone(entry) }));
                continue;
            }
            if heap.peek().is_some_and(|Reverse(min)| score > min.score) {
                heap.pop();
                heap.push(Reverse(Scored { score, entry: Arc::clone(entry) }));
            }
        }

        // Popping a min-heap yields ascending scores; fill from the back.
        let mut results = Vec::with_capacity(heap.len());
        while let Some(Reverse(scored)) = heap.pop() {
            results.push(scored.entry);
        }
        results.reverse();
        results
    }
}

struct Scored {
    score: f32,
    entry: Arc<IndexEntry>,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }
}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
