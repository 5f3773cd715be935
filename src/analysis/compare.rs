//! Period-over-period comparison of two incident tables.

use std::collections::BTreeSet;

use serde::Serialize;

use super::summary::severity_counts;
use crate::incident::IncidentTable;
use crate::whatif::{compute_baseline, Percentile, WhatIfError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Change {
    pub current: f64,
    pub previous: f64,
    pub delta: f64,
    /// `None` when the previous value is zero.
    pub percent: Option<f64>,
}

impl Change {
    pub fn new(current: f64, previous: f64) -> Self {
        let delta = current - previous;
        let percent = if previous != 0.0 {
            Some(delta / previous * 100.0)
        } else {
            None
        };
        Self {
            current,
            previous,
            delta,
            percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityChange {
    pub severity: String,
    pub current: usize,
    pub previous: usize,
    pub delta: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub percentile: Percentile,
    pub volume: Change,
    pub ttm: Change,
    pub mean_ttm: Change,
    pub severities: Vec<SeverityChange>,
}

/// Compare `current` against `previous`. Both tables must be non-empty.
pub fn compare(
    current: &IncidentTable,
    previous: &IncidentTable,
    percentile: Percentile,
) -> Result<Comparison, WhatIfError> {
    let now = compute_baseline(current, percentile)?;
    let before = compute_baseline(previous, percentile)?;

    let now_sev = severity_counts(current);
    let before_sev = severity_counts(previous);
    let labels: BTreeSet<&String> = now_sev.keys().chain(before_sev.keys()).collect();

    let severities = labels
        .into_iter()
        .map(|label| {
            let c = now_sev.get(label).copied().unwrap_or(0);
            let p = before_sev.get(label).copied().unwrap_or(0);
            SeverityChange {
                severity: label.clone(),
                current: c,
                previous: p,
                delta: c as i64 - p as i64,
            }
        })
        .collect();

    Ok(Comparison {
        percentile,
        volume: Change::new(current.len() as f64, previous.len() as f64),
        ttm: Change::new(now.value, before.value),
        mean_ttm: Change::new(now.mean, before.mean),
        severities,
    })
}
