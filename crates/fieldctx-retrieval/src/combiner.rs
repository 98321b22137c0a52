//! Merges the lexical and semantic candidate lists into one ranking.
//!
//! `base = wl * lexical_norm + ws * semantic_norm`; chunks retrieved by both
//! channels get `base * intersection_boost`. A large boost can push a weak
//! consensus chunk above a strong single-channel match.

use std::collections::{HashMap, HashSet};

use fieldctx_core::config::{LexicalNormalization, RetrievalConfig};
use fieldctx_core::types::sort_ranked;
use fieldctx_core::{FieldSpec, ScoredChunk};

use crate::normalize::LexicalNormalizer;

#[derive(Debug, Clone, Copy)]
pub struct ScoreCombiner {
    lexical_weight: f32,
    semantic_weight: f32,
    normalization: LexicalNormalization,
}

impl Default for ScoreCombiner {
    fn default() -> Self { Self::from_config(&RetrievalConfig::default()) }
}

impl ScoreCombiner {
    pub fn new(lexical_weight: f32, semantic_weight: f32, normalization: LexicalNormalization) -> Self {
        Self { lexical_weight, semantic_weight, normalization }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.lexical_weight, config.semantic_weight, config.lexical_normalization)
    }

    /// Ranked union of both channels, descending by `combined_score`.
    pub fn combine(&self, lexical: Vec<ScoredChunk>, semantic: Vec<ScoredChunk>, spec: &FieldSpec) -> Vec<ScoredChunk> {
        let lexical_ids: HashSet<String> = lexical.iter().map(|c| c.chunk_id().to_string()).collect();
        let semantic_ids: HashSet<String> = semantic.iter().map(|c| c.chunk_id().to_string()).collect();

        // Merging keeps the max per channel so a repeated id can never lower a score.
        let mut merged: HashMap<String, ScoredChunk> = HashMap::new();
        for candidate in lexical.into_iter().chain(semantic) {
            merged
                .entry(candidate.chunk_id().to_string())
                .and_modify(|m| {
                    m.lexical_score = m.lexical_score.max(candidate.lexical_score);
                    m.semantic_score = m.semantic_score.max(candidate.semantic_score);
                })
                .or_insert(candidate);
        }

        let raw_lexical: Vec<f32> = merged.values().map(|c| c.lexical_score).collect();
        let normalizer = LexicalNormalizer::fit(self.normalization, &raw_lexical);

        let mut ranked: Vec<ScoredChunk> = merged
            .into_iter()
            .map(|(id, mut c)| {
                let base = self.base_score(normalizer.apply(c.lexical_score), c.semantic_score.clamp(0.0, 1.0));
                c.found_by_both = lexical_ids.contains(&id) && semantic_ids.contains(&id);
                c.combined_score = if c.found_by_both { base * spec.intersection_boost } else { base };
                c
            })
            .collect();
        sort_ranked(&mut ranked);
        ranked
    }

    pub fn base_score(&self, lexical_norm: f32, semantic_norm: f32) -> f32 {
        self.lexical_weight * lexical_norm + self.semantic_weight * semantic_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldctx_core::Chunk;
    use std::sync::Arc;

    fn chunk(id: &str) -> Arc<Chunk> { Arc::new(Chunk::text("doc", id, Some(0), 0, "text")) }

    fn combiner() -> ScoreCombiner { ScoreCombiner::new(0.5, 0.5, LexicalNormalization::FixedDivisor { divisor: 1.0 }) }

    fn spec(boost: f32) -> FieldSpec {
        let mut s = FieldSpec::new("f");
        s.lexical_query_terms = vec!["x".into()];
        s.intersection_boost = boost;
        s
    }

    #[test]
    fn consensus_chunk_is_boosted_and_ranked_first() {
        let lexical = vec![ScoredChunk::lexical(chunk("1"), 1.0), ScoredChunk::lexical(chunk("3"), 0.5)];
        let semantic = vec![ScoredChunk::semantic(chunk("3"), 0.5), ScoredChunk::semantic(chunk("4"), 1.0)];
        let ranked = combiner().combine(lexical, semantic, &spec(2.0));

        let ids: Vec<&str> = ranked.iter().map(ScoredChunk::chunk_id).collect();
        assert_eq!(ids, vec!["3", "1", "4"]);
        assert!((ranked[0].combined_score - 1.0).abs() < 1e-6);
        assert!(ranked[0].found_by_both);
        assert!((ranked[1].combined_score - 0.5).abs() < 1e-6);
        assert!(!ranked[1].found_by_both && !ranked[2].found_by_both);
    }

    #[test]
    fn duplicate_ids_merge_by_max() {
        let lexical = vec![ScoredChunk::lexical(chunk("a"), 0.2), ScoredChunk::lexical(chunk("a"), 0.8)];
        let ranked = combiner().combine(lexical, vec![], &spec(1.0));
        assert_eq!(ranked.len(), 1);
        assert!((ranked[0].lexical_score - 0.8).abs() < 1e-6);
        assert!(!ranked[0].found_by_both);
    }

    #[test]
    fn boost_one_leaves_scores_alone() {
        let lexical = vec![ScoredChunk::lexical(chunk("a"), 0.4)];
        let semantic = vec![ScoredChunk::semantic(chunk("a"), 0.4)];
        let ranked = combiner().combine(lexical, semantic, &spec(1.0));
        assert!((ranked[0].combined_score - 0.4).abs() < 1e-6);
        assert!(ranked[0].found_by_both);
    }

    #[test]
    fn equal_base_consensus_wins_when_boosted() {
        let lexical = vec![ScoredChunk::lexical(chunk("both"), 0.6), ScoredChunk::lexical(chunk("lex"), 1.0)];
        let semantic = vec![ScoredChunk::semantic(chunk("both"), 0.4)];
        let ranked = combiner().combine(lexical, semantic, &spec(1.01));
        assert_eq!(ranked[0].chunk_id(), "both");
        assert!(ranked[0].combined_score > ranked[1].combined_score);
    }

    #[test]
    fn aggressive_boost_can_invert_single_channel_order() {
        let lexical = vec![ScoredChunk::lexical(chunk("strong"), 1.0), ScoredChunk::lexical(chunk("weak"), 0.2)];
        let semantic = vec![ScoredChunk::semantic(chunk("weak"), 0.2)];
        let ranked = combiner().combine(lexical, semantic, &spec(4.0));
        assert_eq!(ranked[0].chunk_id(), "weak");
    }
}
