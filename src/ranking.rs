//! Turning raw nearest-neighbor hits into ranked, deduplicated matches.

use crate::Project;
use crate::cache::ScoredProject;
use crate::projects::ProjectSource;
use crate::vector::{Generation, Neighbor};
use serde::Serialize;
use std::collections::HashSet;

/// Default number of matches returned per query.
pub const DEFAULT_TOP_N: usize = 2;

/// Convert a squared L2 distance into a score in `(0, 100]`.
///
/// This is not cosine similarity. It is kept as is so scores stay comparable
/// with previously stored results.
#[inline]
#[must_use]
pub fn similarity_score(distance: f32) -> f32 {
    100.0 / (1.0 + distance)
}

/// A project returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMatch {
    #[serde(flatten)]
    pub project: Project,
    #[serde(rename = "similarity")]
    pub score: f32,
}

impl RankedMatch {
    pub fn to_scored(&self) -> ScoredProject {
        ScoredProject {
            id: self.project.id,
            similarity: self.score,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityRanker {
    top_n: usize,
}

impl Default for SimilarityRanker {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

impl SimilarityRanker {
    pub fn new(top_n: usize) -> Self {
        Self { top_n }
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Rank `neighbors` (ascending by distance) found in `generation`.
    ///
    /// Positions outside the generation and projects the source no longer
    /// knows are skipped. Only the first entry per title is kept, and at most
    /// `top_n` matches are returned; fewer unique titles means fewer matches.
    pub fn rank(
        &self,
        generation: &Generation,
        neighbors: &[Neighbor],
        source: &dyn ProjectSource,
    ) -> Vec<RankedMatch> {
        let mut seen_titles = HashSet::new();
        let mut matches = Vec::with_capacity(self.top_n);

        for neighbor in neighbors {
            if matches.len() >= self.top_n {
                break;
            }

            let Some(id) = generation.project_id(neighbor.position) else {
                tracing::debug!(
                    "Skipping position {} outside generation of {} entries",
                    neighbor.position,
                    generation.len()
                );
                continue;
            };

            let Some(project) = source.lookup_project(id) else {
                tracing::debug!("Skipping project {id}: no longer in the catalog");
                continue;
            };

            if !seen_titles.insert(project.title.clone()) {
                continue;
            }

            matches.push(RankedMatch {
                project,
                score: similarity_score(neighbor.distance),
            });
        }

        matches
    }
}

/// Rebuild matches from cached `(id, similarity)` pairs.
///
/// Ids that no longer resolve are dropped.
pub fn hydrate(scored: &[ScoredProject], source: &dyn ProjectSource) -> Vec<RankedMatch> {
    scored
        .iter()
        .filter_map(|entry| {
            source.lookup_project(entry.id).map(|project| RankedMatch {
                project,
                score: entry.similarity,
            })
        })
        .collect()
}
