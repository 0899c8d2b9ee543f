// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

/// Percentile over already-sorted `values`, via linear interpolation
/// (matches numpy/R/Excel default — spec §4.G).
pub fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let index = (p / 100.0) * (sorted_values.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = (index.ceil() as usize).min(sorted_values.len() - 1);
    let weight = index - lower as f64;

    sorted_values[lower] + (sorted_values[upper] - sorted_values[lower]) * weight
}

/// Exponential recency weight: `0.5^((now-ts)/half_life)`. `ts`/`now` are
/// microseconds since the epoch, `half_life_hours` is converted internally.
pub fn time_decay_weight(ts: i64, now: i64, half_life_hours: f64) -> f64 {
    let age_hours = (now - ts) as f64 / (1_000_000.0 * 3600.0);
    0.5f64.powf(age_hours / half_life_hours)
}

/// Weighted percentile: cumulative weight over (value, weight) pairs sorted
/// by value. `values` and `weights` must have equal length.
pub fn weighted_percentile(values: &[f64], weights: &[f64], p: f64) -> Result<f64, String> {
    if values.len() != weights.len() {
        return Err(format!(
            "values and weights must have equal length, got {} and {}",
            values.len(),
            weights.len()
        ));
    }
    if values.is_empty() {
        return Ok(0.0);
    }

    let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return Ok(pairs[0].0);
    }

    let target = (p / 100.0) * total_weight;
    let mut cumulative = 0.0;
    for (value, weight) in &pairs {
        cumulative += weight;
        if cumulative >= target {
            return Ok(*value);
        }
    }
    Ok(pairs.last().unwrap().0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_ordering_holds() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let p50 = percentile(&values, 50.0);
        let p75 = percentile(&values, 75.0);
        let p95 = percentile(&values, 95.0);
        let p99 = percentile(&values, 99.0);
        assert!(p50 <= p75);
        assert!(p75 <= p95);
        assert!(p95 <= p99);
    }

    #[test]
    fn mismatched_lengths_error() {
        assert!(weighted_percentile(&[1.0, 2.0], &[1.0], 50.0).is_err());
    }

    #[test]
    fn shorter_half_life_lowers_influence_of_old_samples() {
        // One old-expensive sample plus many new-cheap ones.
        let now = 1_000_000_000i64;
        let hour = 3_600_000_000i64;
        let old_ts = now - 1000 * hour;
        let mut values = vec![100.0];
        let mut weights = vec![time_decay_weight(old_ts, now, 1.0)];
        for _ in 0..50 {
            values.push(1.0);
            weights.push(time_decay_weight(now, now, 1.0));
        }
        let short = weighted_percentile(&values, &weights, 95.0).unwrap();

        let weights_long: Vec<f64> = std::iter::once(time_decay_weight(old_ts, now, 1000.0))
            .chain(std::iter::repeat(time_decay_weight(now, now, 1000.0)).take(50))
            .collect();
        let long = weighted_percentile(&values, &weights_long, 95.0).unwrap();

        assert!(short < long);
    }
}
