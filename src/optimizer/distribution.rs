//! Per-variable statistical summaries over a filtered trial population.

use statrs::statistics::{Data, Distribution as StatDistribution, Max, Min, OrderStatistics};
use std::collections::BTreeMap;

use crate::types::ParameterDistribution;

/// Post-processes trial populations into distribution summaries.
pub struct DistributionAnalyzer;

impl DistributionAnalyzer {
    /// Summarize one variable's samples. Returns `None` on an empty set —
    /// the caller decides whether that is a fallback condition or a bug.
    pub fn analyze(samples: &[f64], percentile_ranks: &[u8]) -> Option<ParameterDistribution> {
        if samples.is_empty() {
            return None;
        }

        let mut data = Data::new(samples.to_vec());
        let mean = data.mean().unwrap_or(0.0);
        let std = data.std_dev().unwrap_or(0.0);
        let median = data.median();
        let min = data.min();
        let max = data.max();

        let mut percentiles = BTreeMap::new();
        for &p in percentile_ranks {
            let rank = usize::from(p.min(100));
            percentiles.insert(p, data.percentile(rank));
        }

        Some(ParameterDistribution {
            mean,
            std,
            median,
            percentiles,
            min,
            max,
            sample_count: samples.len(),
        })
    }

    /// Summarize many variables at once: `series` maps variable id to its
    /// sample vector.
    pub fn analyze_all(
        series: &BTreeMap<String, Vec<f64>>,
        percentile_ranks: &[u8],
    ) -> BTreeMap<String, ParameterDistribution> {
        series
            .iter()
            .filter_map(|(id, samples)| {
                Self::analyze(samples, percentile_ranks).map(|d| (id.clone(), d))
            })
            .collect()
    }
}
