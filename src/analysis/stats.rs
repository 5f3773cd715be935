//! Duration statistics over TTM samples.
//!
//! Percentiles use linear interpolation between closest ranks, the same
//! convention spreadsheet and dataframe tooling default to.

use serde::{Deserialize, Serialize};

/// Percentile of `values` at fraction `p` (0.0..=1.0). `None` when empty.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    percentile_sorted(&sorted, p)
}

/// Same as [`percentile`] but `sorted` must already be in ascending order.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let h = (n - 1) as f64 * p.clamp(0.0, 1.0);
            let lo = h.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            let frac = h - lo as f64;
            Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
        }
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 0.5)
}

/// Percentile, mean and median of one population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub count: usize,
    pub percentile: f64,
    pub mean: f64,
    pub median: f64,
}

impl Snapshot {
    /// `None` for an empty population.
    pub fn compute(values: &[f64], p: f64) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            count: sorted.len(),
            percentile: percentile_sorted(&sorted, p)?,
            mean: mean(&sorted)?,
            median: percentile_sorted(&sorted, 0.5)?,
        })
    }
}

/// Descriptive summary used by the summary and comparison reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
    pub min: f64,
    pub max: f64,
}

impl DurationSummary {
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let at = |p| percentile_sorted(&sorted, p);
        Some(Self {
            count: sorted.len(),
            mean: mean(&sorted)?,
            median: at(0.5)?,
            p75: at(0.75)?,
            p90: at(0.90)?,
            p95: at(0.95)?,
            min: *sorted.first()?,
            max: *sorted.last()?,
        })
    }
}

/// One equal-frequency band of the TTM distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuintileBand {
    /// "Q1" (fastest) through "Q5" (slowest).
    pub label: String,
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Split `values` into five bands at the 20/40/60/80th percentiles.
/// Edges that coincide collapse their band, which is then omitted.
pub fn quintiles(values: &[f64]) -> Vec<QuintileBand> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let Some(min) = sorted.first().copied() else {
        return Vec::new();
    };

    let mut edges: Vec<f64> = [0.2, 0.4, 0.6, 0.8]
        .iter()
        .filter_map(|&p| percentile_sorted(&sorted, p))
        .collect();
    edges.dedup();

    // Each band is (lower, upper]; the first band also takes the minimum.
    let mut bands: Vec<Vec<f64>> = vec![Vec::new(); edges.len() + 1];
    for &v in &sorted {
        let slot = edges.iter().position(|&e| v <= e).unwrap_or(edges.len());
        bands[slot].push(v);
    }

    bands
        .into_iter()
        .enumerate()
        .filter(|(_, band)| !band.is_empty())
        .filter_map(|(i, band)| {
            Some(QuintileBand {
                label: format!("Q{}", i + 1),
                count: band.len(),
                min: band.first().copied().unwrap_or(min),
                max: *band.last()?,
                mean: mean(&band)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_linear_interpolation() {
        assert_eq!(percentile(&[10.0, 50.0, 5.0, 100.0], 0.75), Some(62.5));
        assert_eq!(percentile(&[10.0, 50.0], 0.75), Some(40.0));
        assert_eq!(percentile(&[5.0, 100.0], 0.75), Some(76.25));
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), Some(3.0));
        assert_eq!(percentile(&[7.0], 0.9), Some(7.0));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_mean_and_median() {
        assert_eq!(mean(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_snapshot_empty_is_none() {
        assert!(Snapshot::compute(&[], 0.75).is_none());
        let s = Snapshot::compute(&[10.0, 50.0, 5.0, 100.0], 0.75).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!(s.percentile, 62.5);
        assert_eq!(s.mean, 41.25);
        assert_eq!(s.median, 30.0);
    }

    #[test]
    fn test_summary_bounds() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        let s = DurationSummary::from_values(&values).unwrap();
        assert_eq!(s.count, 100);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 100.0);
        assert_eq!(s.median, 50.5);
        assert!((s.p75 - 75.25).abs() < 1e-9);
        assert!(s.p90 <= s.p95 && s.p95 <= s.max);
        assert!(DurationSummary::from_values(&[]).is_none());
    }

    #[test]
    fn test_quintiles_partition_values() {
        let values: Vec<f64> = (1..=10).map(f64::from).collect();
        let bands = quintiles(&values);
        assert_eq!(bands.len(), 5);
        assert_eq!(bands.iter().map(|b| b.count).sum::<usize>(), 10);
        assert_eq!(bands[0].label, "Q1");
        assert_eq!(bands[0].min, 1.0);
        assert_eq!(bands[4].max, 10.0);
    }

    #[test]
    fn test_quintiles_collapse_duplicate_edges() {
        let bands = quintiles(&[5.0; 8]);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].count, 8);
        assert!(quintiles(&[]).is_empty());
    }
}
