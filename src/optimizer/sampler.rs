//! Sequential model-based proposal sampler.
//!
//! A tree-structured-Parzen-style surrogate over the trial history: finished
//! trials are split at the γ-quantile into a "good" and a "bad" set, each
//! modeled as a Gaussian mixture over its MV vectors. Candidates are drawn
//! around good trials and the one with the best good/bad density ratio is
//! proposed. Until enough history exists, proposals are uniform within
//! registry bounds. Proposals are always clamped to bounds, so every trial
//! stays inside the operating envelope.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config;
use crate::config::defaults;

/// Bandwidth floor as a fraction of each dimension's span. Keeps the kernel
/// from collapsing when the good set clusters tightly.
const BANDWIDTH_FLOOR_FRACTION: f64 = 0.02;

pub struct TpeSampler {
    bounds: Vec<(f64, f64)>,
    n_startup: usize,
    gamma: f64,
    n_candidates: usize,
    rng: StdRng,
}

impl TpeSampler {
    /// Build a sampler over per-dimension `(lower, upper)` bounds.
    pub fn new(bounds: Vec<(f64, f64)>, seed: u64) -> Self {
        let (n_startup, gamma, n_candidates) = if config::is_initialized() {
            let opt = &config::get().optimization;
            (
                opt.n_startup_trials,
                opt.sampler_gamma,
                opt.sampler_candidates,
            )
        } else {
            (
                defaults::N_STARTUP_TRIALS,
                defaults::SAMPLER_GAMMA,
                defaults::SAMPLER_CANDIDATES,
            )
        };
        Self {
            bounds,
            n_startup,
            gamma,
            n_candidates: n_candidates.max(2),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Propose the next MV vector given the full `(x, score)` history.
    /// Lower scores are better. Non-finite scores are ignored.
    pub fn propose(&mut self, history: &[(Vec<f64>, f64)]) -> Vec<f64> {
        let finite: Vec<&(Vec<f64>, f64)> =
            history.iter().filter(|(_, s)| s.is_finite()).collect();

        if finite.len() < self.n_startup.max(2) {
            return self.uniform();
        }

        // Split at the gamma quantile: best trials form the "good" set.
        let mut order: Vec<usize> = (0..finite.len()).collect();
        order.sort_by(|&a, &b| {
            finite[a]
                .1
                .partial_cmp(&finite[b].1)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let n_good = ((finite.len() as f64 * self.gamma).ceil() as usize)
            .clamp(1, finite.len() - 1);

        let good: Vec<&[f64]> = order[..n_good]
            .iter()
            .map(|&i| finite[i].0.as_slice())
            .collect();
        let bad: Vec<&[f64]> = order[n_good..]
            .iter()
            .map(|&i| finite[i].0.as_slice())
            .collect();

        let good_sigma = self.bandwidths(&good);
        let bad_sigma = self.bandwidths(&bad);

        // Draw candidates around good trials, keep the best density ratio.
        let mut best: Option<(Vec<f64>, f64)> = None;
        for _ in 0..self.n_candidates {
            let center = good[self.rng.gen_range(0..good.len())];
            let candidate = self.perturb(center, &good_sigma);
            let ratio = log_mixture_density(&candidate, &good, &good_sigma)
                - log_mixture_density(&candidate, &bad, &bad_sigma);
            match &best {
                Some((_, r)) if *r >= ratio => {}
                _ => best = Some((candidate, ratio)),
            }
        }
        match best {
            Some((x, _)) => x,
            None => self.uniform(),
        }
    }

    fn uniform(&mut self) -> Vec<f64> {
        self.bounds
            .iter()
            .map(|&(lo, hi)| self.rng.gen_range(lo..=hi))
            .collect()
    }

    fn perturb(&mut self, center: &[f64], sigma: &[f64]) -> Vec<f64> {
        center
            .iter()
            .zip(sigma.iter())
            .zip(self.bounds.iter())
            .map(|((&c, &s), &(lo, hi))| {
                let draw = Normal::new(c, s.max(1e-12))
                    .map(|n| n.sample(&mut self.rng))
                    .unwrap_or(c);
                draw.clamp(lo, hi)
            })
            .collect()
    }

    /// Per-dimension kernel bandwidth for a trial set: sample std with a
    /// floor proportional to the dimension span.
    fn bandwidths(&self, set: &[&[f64]]) -> Vec<f64> {
        let n = set.len() as f64;
        self.bounds
            .iter()
            .enumerate()
            .map(|(d, &(lo, hi))| {
                let floor = (hi - lo) * BANDWIDTH_FLOOR_FRACTION;
                if set.len() < 2 {
                    return ((hi - lo) / 4.0).max(floor);
                }
                let mean = set.iter().map(|x| x[d]).sum::<f64>() / n;
                let var = set.iter().map(|x| (x[d] - mean).powi(2)).sum::<f64>() / n;
                var.sqrt().max(floor)
            })
            .collect()
    }
}

/// Log density of an equal-weight Gaussian mixture with diagonal, shared
/// per-dimension bandwidths.
fn log_mixture_density(x: &[f64], centers: &[&[f64]], sigma: &[f64]) -> f64 {
    if centers.is_empty() {
        return f64::NEG_INFINITY;
    }
    // log-sum-exp over component log densities
    let component_logs: Vec<f64> = centers
        .iter()
        .map(|c| {
            x.iter()
                .zip(c.iter())
                .zip(sigma.iter())
                .map(|((&xi, &ci), &si)| {
                    let z = (xi - ci) / si;
                    -0.5 * z * z - si.ln()
                })
                .sum::<f64>()
        })
        .collect();
    let max = component_logs
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = component_logs.iter().map(|l| (l - max).exp()).sum();
    max + (sum / centers.len() as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_proposals_stay_in_bounds() {
        let mut sampler = TpeSampler::new(vec![(0.0, 10.0), (-5.0, 5.0)], 1);
        for _ in 0..50 {
            let x = sampler.propose(&[]);
            assert!((0.0..=10.0).contains(&x[0]));
            assert!((-5.0..=5.0).contains(&x[1]));
        }
    }

    #[test]
    fn surrogate_proposals_stay_in_bounds() {
        let mut sampler = TpeSampler::new(vec![(0.0, 10.0)], 2);
        // Objective: minimize distance to 3.0
        let history: Vec<(Vec<f64>, f64)> = (0..40)
            .map(|i| {
                let x = f64::from(i) / 4.0;
                (vec![x], (x - 3.0).abs())
            })
            .collect();
        for _ in 0..50 {
            let x = sampler.propose(&history);
            assert!((0.0..=10.0).contains(&x[0]));
        }
    }

    #[test]
    fn surrogate_concentrates_near_good_region() {
        let mut sampler = TpeSampler::new(vec![(0.0, 10.0)], 3);
        let history: Vec<(Vec<f64>, f64)> = (0..60)
            .map(|i| {
                let x = f64::from(i) / 6.0;
                (vec![x], (x - 3.0).abs())
            })
            .collect();
        let proposals: Vec<f64> = (0..100).map(|_| sampler.propose(&history)[0]).collect();
        let near = proposals.iter().filter(|x| (*x - 3.0).abs() < 1.5).count();
        assert!(
            near > 60,
            "expected most proposals near 3.0, got {near}/100"
        );
    }

    #[test]
    fn seeded_sampler_is_deterministic() {
        let history: Vec<(Vec<f64>, f64)> = (0..30)
            .map(|i| (vec![f64::from(i) / 3.0], f64::from(i)))
            .collect();
        let mut a = TpeSampler::new(vec![(0.0, 10.0)], 99);
        let mut b = TpeSampler::new(vec![(0.0, 10.0)], 99);
        for _ in 0..20 {
            assert_eq!(a.propose(&history), b.propose(&history));
        }
    }

    #[test]
    fn non_finite_scores_are_ignored() {
        let mut sampler = TpeSampler::new(vec![(0.0, 1.0)], 4);
        let history = vec![
            (vec![0.5], f64::NAN),
            (vec![0.6], f64::INFINITY),
            (vec![0.1], 1.0),
        ];
        // Only one finite entry: should fall back to uniform without panicking
        let x = sampler.propose(&history);
        assert!((0.0..=1.0).contains(&x[0]));
    }
}
