//! Descriptive summary of one incident table.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use serde::Serialize;

use super::stats::{self, DurationSummary, QuintileBand};
use crate::config::{AnalysisConfig, ColumnConfig};
use crate::incident::{Incident, IncidentTable};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeverityShare {
    pub severity: String,
    pub count: usize,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceLoad {
    pub service: String,
    pub count: usize,
    pub mean_ttm: f64,
}

/// Incidents of the configured high severity or flagged multi-region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighImpact {
    pub count: usize,
    pub mean_ttm: Option<f64>,
    pub median_ttm: Option<f64>,
}

/// Post-incident review completion among incidents that require one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PirCompletion {
    pub required: usize,
    pub completed: usize,
    pub rate_pct: f64,
}

/// Incidents created in one calendar week of a month (days 1-7, 8-14, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyLoad {
    /// "Week 1 (Oct 1-7)".
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: usize,
    pub mean_ttm: f64,
    pub median_ttm: f64,
    pub high_severity: usize,
    pub top_services: Vec<ServiceLoad>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSummary {
    pub ttm: DurationSummary,
    pub severities: Vec<SeverityShare>,
    pub top_services: Vec<ServiceLoad>,
    pub quintiles: Vec<QuintileBand>,
    pub high_impact: HighImpact,
    /// `None` when no incident carries a PIR-required flag.
    pub pir: Option<PirCompletion>,
    pub weeks: Vec<WeeklyLoad>,
    /// Incidents without a usable create date, left out of `weeks`.
    pub undated: usize,
    pub rejected: usize,
}

/// Incidents without a severity are bucketed under this label.
pub const UNSPECIFIED: &str = "unspecified";

/// Services listed under each week.
const WEEK_SERVICES: usize = 3;

/// Count incidents per severity label, sorted by label.
pub fn severity_counts(table: &IncidentTable) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for incident in table.incidents() {
        let key = incident.severity.clone().unwrap_or_else(|| UNSPECIFIED.to_string());
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Busiest services by incident count; ties broken by service name.
pub fn top_services(table: &IncidentTable, limit: usize) -> Vec<ServiceLoad> {
    rank_services(table.incidents().iter(), limit)
}

fn rank_services<'a>(incidents: impl Iterator<Item = &'a Incident>, limit: usize) -> Vec<ServiceLoad> {
    let mut by_service: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for incident in incidents {
        by_service
            .entry(incident.service_or_unknown())
            .or_default()
            .push(incident.ttm_minutes);
    }

    let mut loads: Vec<ServiceLoad> = by_service
        .into_iter()
        .map(|(service, values)| ServiceLoad {
            service: service.to_string(),
            count: values.len(),
            mean_ttm: stats::mean(&values).unwrap_or(0.0),
        })
        .collect();
    // BTreeMap iteration already sorted by name; a stable sort keeps that for ties.
    loads.sort_by(|a, b| b.count.cmp(&a.count));
    loads.truncate(limit);
    loads
}

/// Exports write booleans as "True"/"False", "1"/"0" or "1.0".
fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "1.0")
}

fn flag(incident: &Incident, column: &str) -> Option<bool> {
    incident.metadata.get(column).map(|v| is_truthy(v))
}

fn is_high_impact(incident: &Incident, analysis: &AnalysisConfig, columns: &ColumnConfig) -> bool {
    incident.severity.as_deref() == Some(analysis.high_severity.as_str())
        || flag(incident, &columns.multi_region).unwrap_or(false)
}

pub fn high_impact(table: &IncidentTable, analysis: &AnalysisConfig, columns: &ColumnConfig) -> HighImpact {
    let values: Vec<f64> = table
        .incidents()
        .iter()
        .filter(|i| is_high_impact(i, analysis, columns))
        .map(|i| i.ttm_minutes)
        .collect();
    HighImpact {
        count: values.len(),
        mean_ttm: stats::mean(&values),
        median_ttm: stats::median(&values),
    }
}

/// A review counts as completed when its status mentions "complete".
pub fn pir_completion(table: &IncidentTable, columns: &ColumnConfig) -> Option<PirCompletion> {
    let tracked: Vec<&Incident> = table
        .incidents()
        .iter()
        .filter(|i| i.metadata.contains_key(&columns.pir_required))
        .collect();
    if tracked.is_empty() {
        return None;
    }

    let required: Vec<&Incident> = tracked
        .into_iter()
        .filter(|i| flag(i, &columns.pir_required).unwrap_or(false))
        .collect();
    let completed = required
        .iter()
        .filter(|i| {
            i.metadata
                .get(&columns.pir_status)
                .is_some_and(|s| s.to_ascii_lowercase().contains("complete"))
        })
        .count();
    let rate_pct = if required.is_empty() {
        0.0
    } else {
        completed as f64 / required.len() as f64 * 100.0
    };

    Some(PirCompletion {
        required: required.len(),
        completed,
        rate_pct,
    })
}

/// First and last day of the week-of-month containing `date`. The last
/// bucket of a month runs from day 29 to the month's end.
fn week_bounds(date: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
    let start = date.with_day(date.day0() / 7 * 7 + 1)?;
    let month_end = start.with_day(1)?.checked_add_months(Months::new(1))?.pred_opt()?;
    let end = if start.day() >= 29 {
        month_end
    } else {
        (start + Duration::days(6)).min(month_end)
    };
    Some((start, end))
}

/// Incidents per week of month, in date order. Returns the weeks and the
/// number of incidents that had no create date.
pub fn weekly_breakdown(table: &IncidentTable, high_severity: &str) -> (Vec<WeeklyLoad>, usize) {
    let mut buckets: BTreeMap<(NaiveDate, NaiveDate), Vec<&Incident>> = BTreeMap::new();
    let mut undated = 0;
    for incident in table.incidents() {
        match incident.created_at.and_then(|at| week_bounds(at.date())) {
            Some(bounds) => buckets.entry(bounds).or_default().push(incident),
            None => undated += 1,
        }
    }

    let weeks = buckets
        .into_iter()
        .filter_map(|((start, end), incidents)| {
            let values: Vec<f64> = incidents.iter().map(|i| i.ttm_minutes).collect();
            Some(WeeklyLoad {
                label: format!(
                    "Week {} ({} {}-{})",
                    start.day0() / 7 + 1,
                    start.format("%b"),
                    start.day(),
                    end.day()
                ),
                start,
                end,
                count: incidents.len(),
                mean_ttm: stats::mean(&values)?,
                median_ttm: stats::median(&values)?,
                high_severity: incidents
                    .iter()
                    .filter(|i| i.severity.as_deref() == Some(high_severity))
                    .count(),
                top_services: rank_services(incidents.iter().copied(), WEEK_SERVICES),
            })
        })
        .collect();

    (weeks, undated)
}

/// `None` for an empty table.
pub fn summarize(table: &IncidentTable, analysis: &AnalysisConfig, columns: &ColumnConfig) -> Option<TableSummary> {
    let durations = table.durations();
    let ttm = DurationSummary::from_values(&durations)?;
    let total = table.len() as f64;

    let severities = severity_counts(table)
        .into_iter()
        .map(|(severity, count)| SeverityShare {
            severity,
            count,
            share_pct: count as f64 / total * 100.0,
        })
        .collect();
    let (weeks, undated) = weekly_breakdown(table, &analysis.high_severity);

    Some(TableSummary {
        ttm,
        severities,
        top_services: top_services(table, analysis.top_services),
        quintiles: stats::quintiles(&durations),
        high_impact: high_impact(table, analysis, columns),
        pir: pir_completion(table, columns),
        weeks,
        undated,
        rejected: table.rejected_count(),
    })
}
