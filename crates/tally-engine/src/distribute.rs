//! Weight plans: per-bag weights that add up to a target total exactly.
//!
//! All arithmetic runs on integer cents. Every bag but the last gets the mean scaled by a random
//! variation drawn from the band, and the last bag takes whatever is left. When the leftover
//! lands outside the band the whole sequence is drawn again, up to `max_retries` times, after
//! which the last bag is clamped into the band and the difference is spread over the other bags
//! in proportion to their remaining headroom.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::EngineError;

pub const DEFAULT_MAX_RETRIES: u32 = 50;

/// Inclusive percentage range a bag may deviate from the mean weight.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct VariationBand {
    pub min_percent: f64,
    pub max_percent: f64,
}

impl VariationBand {
    pub fn new(min_percent: f64, max_percent: f64) -> Result<Self, EngineError> {
        if !min_percent.is_finite() {
            return Err(EngineError::invalid("min_percent", "must be a finite number"));
        }
        if !max_percent.is_finite() {
            return Err(EngineError::invalid("max_percent", "must be a finite number"));
        }
        if min_percent > 0.0 {
            return Err(EngineError::invalid(
                "min_percent",
                format!("{min_percent} is above 0"),
            ));
        }
        if min_percent < -100.0 {
            return Err(EngineError::invalid(
                "min_percent",
                format!("{min_percent} is below -100"),
            ));
        }
        if max_percent < 0.0 {
            return Err(EngineError::invalid(
                "max_percent",
                format!("{max_percent} is below 0"),
            ));
        }
        if max_percent > 100.0 {
            return Err(EngineError::invalid(
                "max_percent",
                format!("{max_percent} is above 100"),
            ));
        }
        Ok(Self {
            min_percent,
            max_percent,
        })
    }

    fn is_point(&self) -> bool {
        self.min_percent == self.max_percent
    }
}

/// Retry and tolerance knobs for [`distribute_with_rng`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DistributeOptions {
    pub max_retries: u32,
    /// Extra percentage points the final bag may sit outside the band.
    pub tolerance_percent: f64,
}

impl Default for DistributeOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            tolerance_percent: 0.0,
        }
    }
}

/// Per-bag weights for one request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WeightPlan {
    cents: Vec<i64>,
    /// Draws made before the plan was accepted, including the first.
    pub attempts: u32,
    /// Set when the clamp-and-rebalance pass produced the plan.
    pub rebalanced: bool,
}

impl WeightPlan {
    pub fn len(&self) -> usize {
        self.cents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cents.is_empty()
    }

    /// Weights in cents.
    pub fn cents(&self) -> &[i64] {
        &self.cents
    }

    /// Weights as two-decimal numbers.
    pub fn values(&self) -> Vec<f64> {
        self.cents.iter().map(|c| cents_to_value(*c)).collect()
    }

    pub fn total_cents(&self) -> i64 {
        self.cents.iter().sum()
    }

    pub fn total(&self) -> f64 {
        cents_to_value(self.total_cents())
    }

    pub fn min(&self) -> Option<f64> {
        self.cents.iter().min().map(|c| cents_to_value(*c))
    }

    pub fn max(&self) -> Option<f64> {
        self.cents.iter().max().map(|c| cents_to_value(*c))
    }

    pub fn mean(&self) -> Option<f64> {
        if self.cents.is_empty() {
            return None;
        }
        Some(self.total_cents() as f64 / self.cents.len() as f64 / 100.0)
    }

    /// Deviation of bag `index` from the mean, in percent.
    pub fn variation_percent(&self, index: usize) -> Option<f64> {
        let mean = self.total_cents() as f64 / self.cents.len() as f64;
        let cents = *self.cents.get(index)?;
        (mean != 0.0).then(|| (cents as f64 - mean) / mean * 100.0)
    }
}

pub(crate) fn cents_to_value(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub(crate) fn value_to_cents(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Seeded [`distribute_with_rng`] with default options.
pub fn distribute(
    total: f64,
    count: u32,
    min_percent: f64,
    max_percent: f64,
    seed: u64,
) -> Result<WeightPlan, EngineError> {
    let band = VariationBand::new(min_percent, max_percent)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    distribute_with_rng(total, count, band, DistributeOptions::default(), &mut rng)
}

pub fn distribute_with_rng<R: Rng + ?Sized>(
    total: f64,
    count: u32,
    band: VariationBand,
    options: DistributeOptions,
    rng: &mut R,
) -> Result<WeightPlan, EngineError> {
    if count == 0 {
        return Err(EngineError::invalid("bag_count", "must be at least 1"));
    }
    if !total.is_finite() || total <= 0.0 {
        return Err(EngineError::invalid(
            "target_weight",
            format!("{total} is not a positive number"),
        ));
    }
    let total_cents = value_to_cents(total);
    if total_cents <= 0 {
        return Err(EngineError::invalid(
            "target_weight",
            format!("{total} rounds to zero"),
        ));
    }
    if count == 1 {
        return Ok(WeightPlan {
            cents: vec![total_cents],
            attempts: 0,
            rebalanced: false,
        });
    }

    let n = count as usize;
    let mean = total_cents as f64 / n as f64;
    let tolerance = options.tolerance_percent;
    let (accept_lo, accept_hi) = if band.is_point() {
        // Every bag rounds the same way, so the final bag carries half a cent per other bag.
        let slack = ((n - 1) as f64 / 2.0).ceil() as i64;
        let (lo, hi) = cent_bounds(mean, band.min_percent - tolerance, band.max_percent + tolerance);
        (lo - slack, hi + slack)
    } else {
        cent_bounds(mean, band.min_percent - tolerance, band.max_percent + tolerance)
    };

    let mut cents = vec![0i64; n];
    let mut attempts = 0;
    while attempts <= options.max_retries {
        attempts += 1;
        for slot in cents.iter_mut().take(n - 1) {
            let v = if band.is_point() {
                band.min_percent
            } else {
                rng.random_range(band.min_percent..=band.max_percent)
            };
            *slot = (mean * (1.0 + v / 100.0)).round() as i64;
        }
        let last = total_cents - cents[..n - 1].iter().sum::<i64>();
        cents[n - 1] = last;
        if last >= 0 && (accept_lo..=accept_hi).contains(&last) {
            return Ok(WeightPlan {
                cents,
                attempts,
                rebalanced: false,
            });
        }
        log::debug!(
            "final bag of {last} cents is outside [{accept_lo}, {accept_hi}], redrawing (attempt {attempts})"
        );
    }

    let (lo, hi) = cent_bounds(mean, band.min_percent, band.max_percent);
    log::warn!(
        "no draw kept the final bag in range after {attempts} attempts, clamping it into [{lo}, {hi}] cents"
    );
    clamp_and_rebalance(&mut cents, lo.max(0), hi);
    Ok(WeightPlan {
        cents,
        attempts,
        rebalanced: true,
    })
}

/// Whole-cent bounds of a bag that deviates `min_percent..=max_percent` from `mean` cents.
fn cent_bounds(mean: f64, min_percent: f64, max_percent: f64) -> (i64, i64) {
    (
        (mean * (1.0 + min_percent / 100.0)).floor() as i64,
        (mean * (1.0 + max_percent / 100.0)).ceil() as i64,
    )
}

/// Clamp the last entry into `lo..=hi` and move the difference onto the others, each in
/// proportion to how far it may still move inside the same bounds.
///
/// The others can always absorb the difference when `lo <= mean <= hi`; anything they cannot
/// take stays on the last entry so the sum is kept.
fn clamp_and_rebalance(cents: &mut [i64], lo: i64, hi: i64) {
    let Some((last, others)) = cents.split_last_mut() else {
        return;
    };
    if *last > hi {
        let excess = *last - hi;
        let headroom: Vec<i64> = others.iter().map(|c| (hi - *c).max(0)).collect();
        let shares = apportion(excess, &headroom);
        let moved: i64 = shares.iter().sum();
        for (c, share) in others.iter_mut().zip(shares) {
            *c += share;
        }
        *last -= moved;
    } else if *last < lo {
        let deficit = lo - *last;
        let headroom: Vec<i64> = others.iter().map(|c| (*c - lo).max(0)).collect();
        let shares = apportion(deficit, &headroom);
        let moved: i64 = shares.iter().sum();
        for (c, share) in others.iter_mut().zip(shares) {
            *c -= share;
        }
        *last += moved;
    }
}

/// Split up to `amount` across slots proportionally to `weights` using largest remainders.
///
/// No share exceeds its weight, so the shares add up to `amount.min(weights.sum())`.
fn apportion(amount: i64, weights: &[i64]) -> Vec<i64> {
    let total: i64 = weights.iter().sum();
    let mut shares = vec![0i64; weights.len()];
    if total <= 0 || amount <= 0 {
        return shares;
    }
    let amount = amount.min(total);
    let mut remainders = Vec::with_capacity(weights.len());
    let mut assigned = 0;
    for (i, w) in weights.iter().enumerate() {
        let exact = i128::from(amount) * i128::from(*w);
        shares[i] = (exact / i128::from(total)) as i64;
        assigned += shares[i];
        remainders.push((exact % i128::from(total), i));
    }
    remainders.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    for (_, i) in remainders.into_iter().take((amount - assigned) as usize) {
        shares[i] += 1;
    }
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Source whose every draw lands at the top of a range.
    struct Saturated;

    impl rand::RngCore for Saturated {
        fn next_u32(&mut self) -> u32 {
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            u64::MAX
        }

        fn fill_bytes(&mut self, dst: &mut [u8]) {
            dst.fill(0xff);
        }
    }

    #[test]
    fn single_bag_takes_the_whole_total() {
        let plan = distribute(1000.5, 1, -2.0, 2.0, 7).unwrap();
        assert_eq!(plan.values(), vec![1000.5]);
        assert_eq!(plan.attempts, 0);
    }

    #[test]
    fn zero_width_band_gives_the_rounded_mean() {
        let plan = distribute(100.0, 3, 0.0, 0.0, 1).unwrap();
        assert_eq!(plan.cents(), &[3333, 3333, 3334]);
        assert!(!plan.rebalanced);
        assert_eq!(plan.attempts, 1);
    }

    #[test]
    fn rejects_bands_on_the_wrong_side_of_zero() {
        for (min, max, field) in [
            (1.0, 2.0, "min_percent"),
            (-2.0, -1.0, "max_percent"),
            (-101.0, 2.0, "min_percent"),
            (-2.0, 100.5, "max_percent"),
            (f64::NAN, 2.0, "min_percent"),
        ] {
            let err = distribute(10.0, 2, min, max, 0).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::InvalidRangeError);
            assert_eq!(err.field(), Some(field), "{min}..{max}");
        }
        assert_eq!(
            distribute(10.0, 0, -1.0, 1.0, 0).unwrap_err().field(),
            Some("bag_count")
        );
        assert_eq!(
            distribute(-5.0, 3, -1.0, 1.0, 0).unwrap_err().field(),
            Some("target_weight")
        );
    }

    #[test]
    fn fixed_seed_is_reproducible() {
        let a = distribute(1000.5, 25, -2.0, 2.0, 42).unwrap();
        let b = distribute(1000.5, 25, -2.0, 2.0, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn exhausted_retries_fall_back_to_clamping() {
        let band = VariationBand::new(-0.1, 0.1).unwrap();
        let options = DistributeOptions {
            max_retries: 0,
            tolerance_percent: 0.0,
        };
        // Always drawing the top of the band drives the last bag far below it.
        let mut rng = Saturated;
        let plan = distribute_with_rng(1000.0, 40, band, options, &mut rng).unwrap();
        assert!(plan.rebalanced);
        assert_eq!(plan.total_cents(), 100_000);
        let lo = (2500.0f64 * 0.999).floor() as i64;
        let hi = (2500.0f64 * 1.001).ceil() as i64;
        for c in plan.cents() {
            assert!((lo..=hi).contains(c), "{c} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn apportion_follows_headroom() {
        assert_eq!(apportion(4, &[2, 2, 4]), vec![1, 1, 2]);
        assert_eq!(apportion(5, &[2, 2, 4]), vec![1, 1, 3]);
        assert_eq!(apportion(3, &[5, 0, 1]), vec![3, 0, 0]);
    }

    #[test]
    fn apportion_never_goes_past_the_headroom() {
        assert_eq!(apportion(10, &[1, 1, 2]), vec![1, 1, 2]);
        assert_eq!(apportion(7, &[0, 0]), vec![0, 0]);
        assert_eq!(apportion(3, &[1, 1]), vec![1, 1]);
    }

    #[test]
    fn final_bag_is_held_to_the_band_for_small_means() {
        // One cent per bag leaves no room for rounding drift to hide behind.
        for seed in 0..50 {
            let plan = distribute(1000.0, 1000, -2.0, 2.0, seed).unwrap();
            assert_eq!(plan.total_cents(), 100_000);
            let (lo, hi) = cent_bounds(100.0, -2.0, 2.0);
            let last = *plan.cents().last().unwrap();
            assert!((lo..=hi).contains(&last), "seed {seed}: {last} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn tolerance_widens_the_final_bag_window() {
        let band = VariationBand::new(-1.0, 1.0).unwrap();
        let options = DistributeOptions {
            max_retries: 0,
            tolerance_percent: 100.0,
        };
        let plan = distribute_with_rng(1000.0, 40, band, options, &mut Saturated).unwrap();
        assert!(!plan.rebalanced);
        assert_eq!(plan.total_cents(), 100_000);
    }
}
