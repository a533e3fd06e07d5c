//! Weight cleaning: drop negligible weights and renormalize.

use crate::error::{PortfolioError, Result, Stage};
use crate::types::Weights;

/// Default cutoff below which a weight is treated as zero.
pub const DEFAULT_THRESHOLD: f64 = 1e-4;

/// Zero every weight below `threshold` (negatives included) and rescale the
/// remainder to sum to 1.
///
/// A vector that already satisfies the post-condition is returned
/// unchanged, so `clean_weights(&clean_weights(w, t)?, t)` is bitwise equal
/// to `clean_weights(w, t)`.
///
/// Fails with `InvalidInput` if the threshold is not finite or would remove
/// every weight.
pub fn clean_weights(weights: &Weights, threshold: f64) -> Result<Weights> {
    if !threshold.is_finite() {
        return Err(PortfolioError::invalid(
            Stage::Cleaning,
            format!("threshold must be finite, got {threshold}"),
        ));
    }

    let mut values = weights.values().to_vec();
    let mut changed = false;
    // Rescaling a vector that summed above 1 can push a survivor below the
    // threshold, so repeat until nothing new is removed.
    loop {
        let mut removed = false;
        for v in &mut values {
            if *v != 0.0 && (*v < threshold || *v < 0.0 || !v.is_finite()) {
                *v = 0.0;
                removed = true;
            }
        }
        changed |= removed;

        let sum: f64 = values.iter().sum();
        if !changed && (sum - 1.0).abs() <= 1e-12 {
            return Ok(weights.clone());
        }
        if sum <= 0.0 {
            return Err(PortfolioError::invalid(
                Stage::Cleaning,
                format!("threshold {threshold} removes every weight"),
            ));
        }
        for v in &mut values {
            *v /= sum;
        }
        changed = true;
        if !values.iter().any(|&v| v != 0.0 && v < threshold) {
            break;
        }
    }
    Ok(Weights::new(weights.symbols().to_vec(), values))
}
