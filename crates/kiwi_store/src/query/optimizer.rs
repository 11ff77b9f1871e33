//! Pattern reordering before compilation.

use super::compiler::ResolvedPattern;
use crate::persistence::KiWiConnection;

/// Reorders the patterns of a query. The result set must not change, only
/// the order in which the database is asked to join.
pub trait PatternOptimizer: Send + Sync {
    fn optimize(&self, patterns: Vec<ResolvedPattern>, conn: &KiWiConnection) -> Vec<ResolvedPattern>;
}

/// Puts the most selective patterns first, estimated by counting the
/// triples that match each pattern's fixed slots.
#[derive(Debug, Clone, Copy, Default)]
pub struct CardinalityOptimizer;

impl PatternOptimizer for CardinalityOptimizer {
    fn optimize(&self, patterns: Vec<ResolvedPattern>, conn: &KiWiConnection) -> Vec<ResolvedPattern> {
        if patterns.len() < 2 {
            return patterns;
        }
        let counts = patterns
            .iter()
            .map(|pattern| {
                let [s, p, o, c] = pattern.bound_ids();
                conn.count_pattern(s, p, o, c)
            })
            .collect::<crate::Result<Vec<i64>>>();
        let counts = match counts {
            Ok(counts) => counts,
            Err(e) => {
                log::warn!("cardinality estimate failed, keeping pattern order: {}", e);
                return patterns;
            }
        };
        let mut estimated: Vec<(i64, ResolvedPattern)> = counts.into_iter().zip(patterns).collect();
        estimated.sort_by_key(|(count, _)| *count);
        log::trace!(
            "pattern cardinalities: {:?}",
            estimated.iter().map(|(c, _)| *c).collect::<Vec<_>>()
        );
        estimated.into_iter().map(|(_, p)| p).collect()
    }
}
