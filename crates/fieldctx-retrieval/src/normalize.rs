//! Lexical score normalisation into [0, 1].
//!
//! Semantic similarity is already bounded; lexical relevance is not, so the
//! mapping is chosen by `LexicalNormalization` in the retrieval config.

use fieldctx_core::config::LexicalNormalization;

#[derive(Debug, Clone, Copy)]
pub struct LexicalNormalizer {
    divisor: f32,
}

impl LexicalNormalizer {
    /// Fix the divisor for one batch of raw lexical scores.
    pub fn fit(mode: LexicalNormalization, batch: &[f32]) -> Self {
        let divisor = match mode {
            LexicalNormalization::FixedDivisor { divisor } => divisor,
            LexicalNormalization::Percentile { percentile } => percentile_value(batch, percentile),
        };
        Self { divisor }
    }

    pub fn apply(&self, raw: f32) -> f32 {
        if raw <= 0.0 || self.divisor <= 0.0 {
            return 0.0;
        }
        (raw / self.divisor).min(1.0)
    }
}

/// Nearest-rank percentile over the positive scores of the batch; 0 when empty.
fn percentile_value(batch: &[f32], percentile: f32) -> f32 {
    let mut positive: Vec<f32> = batch.iter().copied().filter(|s| *s > 0.0 && s.is_finite()).collect();
    if positive.is_empty() {
        return 0.0;
    }
    positive.sort_by(f32::total_cmp);
    let rank = (percentile.clamp(0.0, 1.0) * positive.len() as f32).ceil() as usize;
    positive[rank.clamp(1, positive.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_divisor_caps_at_one() {
        let n = LexicalNormalizer::fit(LexicalNormalization::FixedDivisor { divisor: 10.0 }, &[]);
        assert!((n.apply(5.0) - 0.5).abs() < 1e-6);
        assert!((n.apply(25.0) - 1.0).abs() < 1e-6);
        assert_eq!(n.apply(0.0), 0.0);
    }

    #[test]
    fn percentile_uses_batch() {
        let batch = [2.0, 4.0, 6.0, 8.0, 0.0];
        let max = LexicalNormalizer::fit(LexicalNormalization::Percentile { percentile: 1.0 }, &batch);
        assert!((max.apply(8.0) - 1.0).abs() < 1e-6);
        assert!((max.apply(4.0) - 0.5).abs() < 1e-6);

        let p50 = LexicalNormalizer::fit(LexicalNormalization::Percentile { percentile: 0.5 }, &batch);
        assert!((p50.apply(2.0) - 0.5).abs() < 1e-6);
        assert!((p50.apply(8.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn percentile_of_empty_batch_is_zero() {
        let n = LexicalNormalizer::fit(LexicalNormalization::Percentile { percentile: 0.9 }, &[0.0]);
        assert_eq!(n.apply(3.0), 0.0);
    }
}
