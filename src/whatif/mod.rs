//! Event-system what-if analysis.
//!
//! An event system is a root incident plus every incident whose root
//! reference resolves to it. Each system is hypothetically removed from the
//! population to measure how much it moves the tail percentile; systems are
//! then removed cumulatively in that rank order.
//!
//! Cumulative removal ranks once and never re-ranks after a removal. This is
//! a greedy approximation: the truly optimal removal subset is combinatorial.

pub mod report;

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::analysis::stats::Snapshot;
use crate::incident::{Incident, IncidentId, IncidentTable};

#[derive(Debug, Error, PartialEq)]
pub enum WhatIfError {
    #[error("no data: the incident table is empty")]
    NoData,
    #[error("percentile {0} is outside (0, 1)")]
    InvalidPercentile(f64),
}

/// A percentile fraction strictly between 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Percentile(f64);

impl Percentile {
    pub const P75: Percentile = Percentile(0.75);

    pub fn new(p: f64) -> Result<Self, WhatIfError> {
        if p.is_finite() && p > 0.0 && p < 1.0 {
            Ok(Self(p))
        } else {
            Err(WhatIfError::InvalidPercentile(p))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Short label such as "P75" or "P99.9".
    pub fn label(self) -> String {
        let scaled = self.0 * 100.0;
        if (scaled - scaled.round()).abs() < 1e-9 {
            format!("P{}", scaled.round() as u64)
        } else {
            format!("P{}", scaled)
        }
    }
}

// ---------------------------------------------------------------------------
// Baseline
// ---------------------------------------------------------------------------

/// The statistic over the full population, the reference for every delta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Baseline {
    pub percentile: Percentile,
    pub value: f64,
    pub mean: f64,
    pub median: f64,
    pub count: usize,
}

pub fn compute_baseline(table: &IncidentTable, percentile: Percentile) -> Result<Baseline, WhatIfError> {
    let snapshot = Snapshot::compute(&table.durations(), percentile.value()).ok_or(WhatIfError::NoData)?;
    Ok(Baseline {
        percentile,
        value: snapshot.percentile,
        mean: snapshot.mean,
        median: snapshot.median,
        count: snapshot.count,
    })
}

/// Change relative to the baseline. Positive means the statistic went down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Delta {
    pub absolute: f64,
    /// `None` when the baseline value is zero.
    pub percent: Option<f64>,
}

impl Delta {
    fn between(baseline: f64, current: f64) -> Self {
        let absolute = baseline - current;
        let percent = if baseline != 0.0 {
            Some(absolute / baseline * 100.0)
        } else {
            None
        };
        Self { absolute, percent }
    }
}

/// Statistics of what is left after a removal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum Remainder {
    Stats {
        snapshot: Snapshot,
        delta: Delta,
        mean_delta: Delta,
    },
    /// The removal emptied the population.
    NotApplicable,
}

impl Remainder {
    fn compute(values: &[f64], baseline: &Baseline) -> Self {
        match Snapshot::compute(values, baseline.percentile.value()) {
            Some(snapshot) => Remainder::Stats {
                delta: Delta::between(baseline.value, snapshot.percentile),
                mean_delta: Delta::between(baseline.mean, snapshot.mean),
                snapshot,
            },
            None => Remainder::NotApplicable,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            Remainder::Stats { snapshot, .. } => Some(snapshot),
            Remainder::NotApplicable => None,
        }
    }

    pub fn delta(&self) -> Option<Delta> {
        match self {
            Remainder::Stats { delta, .. } => Some(*delta),
            Remainder::NotApplicable => None,
        }
    }

    pub fn mean_delta(&self) -> Option<Delta> {
        match self {
            Remainder::Stats { mean_delta, .. } => Some(*mean_delta),
            Remainder::NotApplicable => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Member {
    pub id: IncidentId,
    pub ttm_minutes: f64,
    pub service: Option<String>,
}

/// A root incident and its cascades.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSystem {
    pub root: IncidentId,
    /// Members in table order.
    pub members: Vec<Member>,
    /// Whether the root incident itself is present in the table.
    pub root_present: bool,
    pub service: Option<String>,
    pub severity: Option<String>,
    pub root_cause: Option<String>,
    pub root_ttm: f64,
    pub created_at: Option<NaiveDateTime>,
}

impl EventSystem {
    fn start(root: IncidentId, first: &Incident) -> Self {
        Self {
            root,
            members: Vec::new(),
            root_present: false,
            service: first.service.clone(),
            severity: first.severity.clone(),
            root_cause: first.root_cause.clone(),
            root_ttm: first.ttm_minutes,
            created_at: first.created_at,
        }
    }

    fn push(&mut self, incident: &Incident) {
        if incident.id == self.root && !self.root_present {
            self.root_present = true;
            self.service = incident.service.clone();
            self.severity = incident.severity.clone();
            self.root_cause = incident.root_cause.clone();
            self.root_ttm = incident.ttm_minutes;
            self.created_at = incident.created_at;
        }
        self.members.push(Member {
            id: incident.id,
            ttm_minutes: incident.ttm_minutes,
            service: incident.service.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn cascade_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    pub fn total_ttm(&self) -> f64 {
        self.members.iter().map(|m| m.ttm_minutes).sum()
    }

    pub fn max_ttm(&self) -> f64 {
        self.members.iter().map(|m| m.ttm_minutes).fold(0.0, f64::max)
    }

    pub fn member_ids(&self) -> impl Iterator<Item = IncidentId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    /// Members other than the root incident.
    pub fn cascades(&self) -> impl Iterator<Item = &Member> + '_ {
        let root = self.root;
        let root_present = self.root_present;
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, m)| if root_present { m.id != root } else { *i != 0 })
            .map(|(_, m)| m)
    }
}

/// Event systems in first-appearance order plus classification counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Grouping {
    pub systems: Vec<EventSystem>,
    /// Incidents that are their own root.
    pub root_events: usize,
    /// Incidents attributed to another incident's system.
    pub cascading: usize,
    /// Incidents whose root reference was absent from the table.
    pub fallbacks: usize,
}

impl Grouping {
    pub fn get(&self, root: IncidentId) -> Option<&EventSystem> {
        self.systems.iter().find(|s| s.root == root)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

/// Effective root of one incident, falling back to itself when the
/// reference is absent, self-referential or dangling.
fn resolve_root(incident: &Incident, known: &HashSet<IncidentId>) -> (IncidentId, bool) {
    match incident.root_ref {
        Some(root) if root != incident.id && known.contains(&root) => (root, false),
        Some(root) if root != incident.id => (incident.id, true),
        _ => (incident.id, false),
    }
}

pub fn group_into_event_systems(table: &IncidentTable) -> Grouping {
    let known = table.ids();
    let mut grouping = Grouping::default();
    let mut slots: HashMap<IncidentId, usize> = HashMap::new();

    for incident in table.incidents() {
        let (root, fell_back) = resolve_root(incident, &known);
        if fell_back {
            grouping.fallbacks += 1;
            warn!(
                id = %incident.id,
                root_ref = ?incident.root_ref,
                "root reference not in table, treating incident as its own root"
            );
        }
        if root == incident.id {
            grouping.root_events += 1;
        } else {
            grouping.cascading += 1;
        }

        let slot = *slots.entry(root).or_insert_with(|| {
            grouping.systems.push(EventSystem::start(root, incident));
            grouping.systems.len() - 1
        });
        grouping.systems[slot].push(incident);
    }

    debug!(
        systems = grouping.systems.len(),
        roots = grouping.root_events,
        cascading = grouping.cascading,
        fallbacks = grouping.fallbacks,
        "grouped incidents into event systems"
    );
    grouping
}

// ---------------------------------------------------------------------------
// Impact
// ---------------------------------------------------------------------------

/// Effect of removing a single event system from the population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemImpact {
    pub root: IncidentId,
    pub member_count: usize,
    pub cascade_count: usize,
    pub total_ttm: f64,
    pub max_ttm: f64,
    pub root_ttm: f64,
    pub service: Option<String>,
    pub severity: Option<String>,
    pub root_cause: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub remainder: Remainder,
}

impl SystemImpact {
    pub fn delta(&self) -> Option<Delta> {
        self.remainder.delta()
    }

    pub fn service_or_unknown(&self) -> &str {
        self.service.as_deref().unwrap_or("Unknown")
    }
}

pub fn compute_single_system_impact(
    table: &IncidentTable,
    system: &EventSystem,
    baseline: &Baseline,
) -> SystemImpact {
    let excluded: HashSet<IncidentId> = system.member_ids().collect();
    let remainder = Remainder::compute(&table.durations_without(&excluded), baseline);

    SystemImpact {
        root: system.root,
        member_count: system.len(),
        cascade_count: system.cascade_count(),
        total_ttm: system.total_ttm(),
        max_ttm: system.max_ttm(),
        root_ttm: system.root_ttm,
        service: system.service.clone(),
        severity: system.severity.clone(),
        root_cause: system.root_cause.clone(),
        created_at: system.created_at,
        remainder,
    }
}

/// Stable sort by |percentile delta| descending. Impacts whose remainder is
/// not applicable go last; equal deltas keep their incoming order.
pub fn rank_event_systems(mut impacts: Vec<SystemImpact>) -> Vec<SystemImpact> {
    impacts.sort_by(|a, b| match (a.delta(), b.delta()) {
        (Some(da), Some(db)) => db.absolute.abs().total_cmp(&da.absolute.abs()),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    impacts
}

/// One step of cumulative removal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CumulativeStep {
    /// 1-based position in the ranking.
    pub step: usize,
    /// Root of the system added at this step.
    pub added_root: IncidentId,
    pub systems_removed: usize,
    /// Table rows excluded so far. Rows sharing an id are removed together.
    pub incidents_removed: usize,
    pub pct_removed: f64,
    pub remainder: Remainder,
}

/// Remove `ranked` systems one after another and recompute after each step.
pub fn compute_cumulative_impact(
    table: &IncidentTable,
    ranked: &[SystemImpact],
    grouping: &Grouping,
    baseline: &Baseline,
) -> Vec<CumulativeStep> {
    if table.is_empty() {
        return Vec::new();
    }

    let total = table.len();
    let mut excluded: HashSet<IncidentId> = HashSet::new();
    let mut steps = Vec::with_capacity(ranked.len());

    for (idx, impact) in ranked.iter().enumerate() {
        match grouping.get(impact.root) {
            Some(system) => excluded.extend(system.member_ids()),
            None => {
                warn!(root = %impact.root, "ranked system missing from grouping, removing root only");
                excluded.insert(impact.root);
            }
        }

        let remaining = table.durations_without(&excluded);
        let removed = total - remaining.len();
        let remainder = Remainder::compute(&remaining, baseline);

        steps.push(CumulativeStep {
            step: idx + 1,
            added_root: impact.root,
            systems_removed: idx + 1,
            incidents_removed: removed,
            pct_removed: removed as f64 / total as f64 * 100.0,
            remainder,
        });
    }

    steps
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeStats {
    pub systems_with_cascades: usize,
    pub total_cascades: usize,
    pub max_cascade: usize,
    pub avg_cascades: f64,
}

/// Everything the what-if report needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhatIfReport {
    pub baseline: Baseline,
    pub root_events: usize,
    pub cascading: usize,
    pub fallbacks: usize,
    pub rejected: usize,
    pub impacts: Vec<SystemImpact>,
    pub cumulative: Vec<CumulativeStep>,
    #[serde(skip)]
    pub grouping: Grouping,
}

impl WhatIfReport {
    pub fn system_count(&self) -> usize {
        self.impacts.len()
    }

    /// Cumulative step after removing the top `n` systems, clamped to the
    /// last step when fewer systems exist.
    pub fn after_top(&self, n: usize) -> Option<&CumulativeStep> {
        if n == 0 {
            return None;
        }
        self.cumulative.get(n - 1).or_else(|| self.cumulative.last())
    }

    /// Share of the baseline percentile removed by the top `n` systems.
    pub fn concentration(&self, n: usize) -> Option<f64> {
        self.after_top(n)?.remainder.delta()?.percent
    }

    /// Distinct services of the top-ranked systems, in rank order.
    pub fn priority_services(&self, limit: usize) -> Vec<&str> {
        let mut services: Vec<&str> = Vec::new();
        for impact in &self.impacts {
            if services.len() == limit {
                break;
            }
            let service = impact.service_or_unknown();
            if !services.contains(&service) {
                services.push(service);
            }
        }
        services
    }

    /// Distinct recorded root causes among the top `systems` systems.
    pub fn priority_root_causes(&self, systems: usize, limit: usize) -> Vec<&str> {
        let mut causes: Vec<&str> = Vec::new();
        for cause in self.impacts.iter().take(systems).filter_map(|i| i.root_cause.as_deref()) {
            if cause.eq_ignore_ascii_case("n/a") || causes.contains(&cause) {
                continue;
            }
            causes.push(cause);
        }
        causes.truncate(limit);
        causes
    }

    pub fn cascade_stats(&self) -> CascadeStats {
        let total_cascades: usize = self.impacts.iter().map(|i| i.cascade_count).sum();
        let avg_cascades = if self.impacts.is_empty() {
            0.0
        } else {
            total_cascades as f64 / self.impacts.len() as f64
        };
        CascadeStats {
            systems_with_cascades: self.impacts.iter().filter(|i| i.cascade_count > 0).count(),
            total_cascades,
            max_cascade: self.impacts.iter().map(|i| i.cascade_count).max().unwrap_or(0),
            avg_cascades,
        }
    }
}

/// Baseline, per-system impacts, ranking and cumulative removal in one pass.
pub fn analyze(table: &IncidentTable, percentile: Percentile) -> Result<WhatIfReport, WhatIfError> {
    let baseline = compute_baseline(table, percentile)?;
    info!(
        incidents = baseline.count,
        percentile = %percentile.label(),
        value = baseline.value,
        "computed baseline"
    );

    let grouping = group_into_event_systems(table);
    let impacts: Vec<SystemImpact> = grouping
        .systems
        .iter()
        .map(|system| compute_single_system_impact(table, system, &baseline))
        .collect();
    let ranked = rank_event_systems(impacts);
    let cumulative = compute_cumulative_impact(table, &ranked, &grouping, &baseline);

    info!(
        systems = ranked.len(),
        fallbacks = grouping.fallbacks,
        rejected = table.rejected_count(),
        "what-if analysis complete"
    );

    Ok(WhatIfReport {
        baseline,
        root_events: grouping.root_events,
        cascading: grouping.cascading,
        fallbacks: grouping.fallbacks,
        rejected: table.rejected_count(),
        impacts: ranked,
        cumulative,
        grouping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// Two systems: {1, 2} rooted at 1 and {3, 4} rooted at 3.
    fn scenario() -> IncidentTable {
        IncidentTable::new(vec![
            Incident::new(1u64, 10.0).with_root(1u64),
            Incident::new(2u64, 50.0).with_root(1u64),
            Incident::new(3u64, 5.0).with_root(3u64),
            Incident::new(4u64, 100.0).with_root(3u64),
        ])
    }

    #[test]
    fn test_percentile_bounds() {
        assert!(Percentile::new(0.75).is_ok());
        assert_eq!(Percentile::new(0.0), Err(WhatIfError::InvalidPercentile(0.0)));
        assert_eq!(Percentile::new(1.0), Err(WhatIfError::InvalidPercentile(1.0)));
        assert!(Percentile::new(f64::NAN).is_err());
        assert_eq!(Percentile::P75.label(), "P75");
        assert_eq!(Percentile::new(0.999).unwrap().label(), "P99.9");
    }

    #[test]
    fn test_baseline_scenario() {
        let b = compute_baseline(&scenario(), Percentile::P75).unwrap();
        assert!(close(b.value, 62.5));
        assert!(close(b.mean, 41.25));
        assert!(close(b.median, 30.0));
        assert_eq!(b.count, 4);
    }

    #[test]
    fn test_baseline_empty_is_no_data() {
        let empty = IncidentTable::default();
        assert_eq!(compute_baseline(&empty, Percentile::P75), Err(WhatIfError::NoData));
        assert_eq!(analyze(&empty, Percentile::P75).unwrap_err(), WhatIfError::NoData);
        assert!(group_into_event_systems(&empty).is_empty());
    }

    #[test]
    fn test_grouping_scenario() {
        let g = group_into_event_systems(&scenario());
        assert_eq!(g.len(), 2);
        let first = g.get(IncidentId(1)).unwrap();
        assert_eq!(first.member_ids().collect::<Vec<_>>(), vec![IncidentId(1), IncidentId(2)]);
        assert!(close(first.total_ttm(), 60.0));
        let second = g.get(IncidentId(3)).unwrap();
        assert!(close(second.total_ttm(), 105.0));
        assert_eq!(second.cascade_count(), 1);
        assert_eq!(g.root_events, 2);
        assert_eq!(g.cascading, 2);
        assert_eq!(g.fallbacks, 0);
    }

    #[test]
    fn test_dangling_root_falls_back_to_self() {
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 10.0),
            Incident::new(2u64, 20.0).with_root(99u64),
            Incident::new(3u64, 30.0).with_root(1u64),
        ]);
        let g = group_into_event_systems(&table);
        assert_eq!(g.fallbacks, 1);
        assert_eq!(g.len(), 2);
        assert_eq!(g.get(IncidentId(2)).unwrap().len(), 1);
        assert!(g.get(IncidentId(99)).is_none());
        assert_eq!(g.get(IncidentId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_root_listed_after_cascade_becomes_representative() {
        let table = IncidentTable::new(vec![
            Incident::new(2u64, 50.0).with_root(1u64).with_service("Storage"),
            Incident::new(1u64, 10.0).with_service("Compute"),
        ]);
        let g = group_into_event_systems(&table);
        let system = g.get(IncidentId(1)).unwrap();
        assert!(system.root_present);
        assert_eq!(system.service.as_deref(), Some("Compute"));
        assert!(close(system.root_ttm, 10.0));
        let cascades: Vec<_> = system.cascades().map(|m| m.id).collect();
        assert_eq!(cascades, vec![IncidentId(2)]);
    }

    #[test]
    fn test_single_impact_sign_reversal() {
        let table = scenario();
        let baseline = compute_baseline(&table, Percentile::P75).unwrap();
        let g = group_into_event_systems(&table);

        let without_3 = compute_single_system_impact(&table, g.get(IncidentId(3)).unwrap(), &baseline);
        let d = without_3.delta().unwrap();
        assert!(close(without_3.remainder.snapshot().unwrap().percentile, 40.0));
        assert!(close(d.absolute, 22.5));
        assert!(close(d.percent.unwrap(), 36.0));

        let without_1 = compute_single_system_impact(&table, g.get(IncidentId(1)).unwrap(), &baseline);
        let d = without_1.delta().unwrap();
        assert!(close(without_1.remainder.snapshot().unwrap().percentile, 76.25));
        assert!(close(d.absolute, -13.75));
        assert!(close(d.percent.unwrap(), -22.0));
    }

    #[test]
    fn test_removing_everything_is_not_applicable() {
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 10.0),
            Incident::new(2u64, 20.0).with_root(1u64),
        ]);
        let report = analyze(&table, Percentile::P75).unwrap();
        assert_eq!(report.impacts.len(), 1);
        assert_eq!(report.impacts[0].remainder, Remainder::NotApplicable);
        assert_eq!(report.cumulative.len(), 1);
        assert_eq!(report.cumulative[0].remainder, Remainder::NotApplicable);
        assert_eq!(report.cumulative[0].incidents_removed, 2);
        assert!(close(report.cumulative[0].pct_removed, 100.0));
        assert_eq!(report.concentration(1), None);
    }

    #[test]
    fn test_zero_baseline_has_no_percent() {
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 0.0),
            Incident::new(2u64, 0.0),
            Incident::new(3u64, 0.0),
        ]);
        let report = analyze(&table, Percentile::P75).unwrap();
        let d = report.impacts[0].delta().unwrap();
        assert_eq!(d.absolute, 0.0);
        assert_eq!(d.percent, None);
    }

    #[test]
    fn test_rank_is_stable_and_puts_not_applicable_last() {
        let table = scenario();
        let baseline = compute_baseline(&table, Percentile::P75).unwrap();
        let g = group_into_event_systems(&table);
        let impacts: Vec<_> = g
            .systems
            .iter()
            .map(|s| compute_single_system_impact(&table, s, &baseline))
            .collect();

        let mut with_na = impacts.clone();
        let mut na = impacts[0].clone();
        na.root = IncidentId(77);
        na.remainder = Remainder::NotApplicable;
        with_na.insert(0, na);

        let mut tie = impacts[0].clone();
        tie.root = IncidentId(88);
        with_na.push(tie);

        let ranked = rank_event_systems(with_na);
        let order: Vec<_> = ranked.iter().map(|i| i.root.0).collect();
        // |22.5| > |-13.75| (root 1, then its tie 88), NotApplicable last.
        assert_eq!(order, vec![3, 1, 88, 77]);
    }

    #[test]
    fn test_cumulative_scenario() {
        let report = analyze(&scenario(), Percentile::P75).unwrap();
        assert_eq!(report.impacts[0].root, IncidentId(3));
        assert_eq!(report.impacts[1].root, IncidentId(1));

        let steps = &report.cumulative;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[0].incidents_removed, 2);
        assert!(close(steps[0].pct_removed, 50.0));
        assert!(close(steps[0].remainder.delta().unwrap().absolute, 22.5));
        assert_eq!(steps[1].incidents_removed, 4);
        assert_eq!(steps[1].remainder, Remainder::NotApplicable);
        assert!(close(report.concentration(1).unwrap(), 36.0));
        // Clamped to the last step, which emptied the population.
        assert_eq!(report.concentration(5), None);
    }

    #[test]
    fn test_cumulative_counts_each_incident_once() {
        let table = scenario();
        let baseline = compute_baseline(&table, Percentile::P75).unwrap();
        let g = group_into_event_systems(&table);
        let impact = compute_single_system_impact(&table, &g.systems[0], &baseline);
        // The same system ranked twice must not double count its members.
        let ranked = vec![impact.clone(), impact];
        let steps = compute_cumulative_impact(&table, &ranked, &g, &baseline);
        assert_eq!(steps[0].incidents_removed, 2);
        assert_eq!(steps[1].incidents_removed, 2);
        assert_eq!(steps[1].systems_removed, 2);
        assert_eq!(steps[0].remainder, steps[1].remainder);
    }

    #[test]
    fn test_empty_inputs_are_no_data() {
        let empty = IncidentTable::default();
        let baseline = compute_baseline(&scenario(), Percentile::P75).unwrap();
        let grouping = group_into_event_systems(&empty);

        assert!(rank_event_systems(Vec::new()).is_empty());
        assert!(compute_cumulative_impact(&empty, &[], &grouping, &baseline).is_empty());

        // Ranked impacts from another table still yield no steps over an empty one.
        let table = scenario();
        let g = group_into_event_systems(&table);
        let impact = compute_single_system_impact(&table, &g.systems[0], &baseline);
        assert!(compute_cumulative_impact(&empty, &[impact], &g, &baseline).is_empty());

        let impact = compute_single_system_impact(&empty, &g.systems[0], &baseline);
        assert_eq!(impact.remainder, Remainder::NotApplicable);
        assert_eq!(impact.delta(), None);
    }

    #[test]
    fn test_repeated_id_removal_matches_remaining_count() {
        // Id 1 appears twice, once pointing at system 2.
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 10.0),
            Incident::new(1u64, 20.0).with_root(2u64),
            Incident::new(2u64, 30.0),
            Incident::new(3u64, 40.0),
        ]);
        let report = analyze(&table, Percentile::P75).unwrap();
        assert_eq!(report.cumulative.len(), 3);

        for step in &report.cumulative {
            let remaining = step.remainder.snapshot().map_or(0, |s| s.count);
            assert_eq!(step.incidents_removed + remaining, table.len());
            assert!(close(
                step.pct_removed,
                step.incidents_removed as f64 / table.len() as f64 * 100.0
            ));
        }

        let last = report.cumulative.last().unwrap();
        assert_eq!(last.remainder, Remainder::NotApplicable);
        assert_eq!(last.incidents_removed, 4);
        assert!(close(last.pct_removed, 100.0));
    }

    #[test]
    fn test_representative_carries_create_date() {
        let date = chrono::NaiveDate::from_ymd_opt(2025, 10, 3)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let mut root = Incident::new(1u64, 10.0);
        root.created_at = Some(date);
        let table = IncidentTable::new(vec![Incident::new(2u64, 50.0).with_root(1u64), root]);

        let report = analyze(&table, Percentile::P75).unwrap();
        assert_eq!(report.impacts[0].created_at, Some(date));
    }

    #[test]
    fn test_prevention_priorities() {
        let mut a = Incident::new(1u64, 100.0).with_service("Network");
        a.root_cause = Some("Config change".to_string());
        let mut b = Incident::new(2u64, 90.0).with_service("Network");
        b.root_cause = Some("Config change".to_string());
        let mut c = Incident::new(3u64, 80.0).with_service("Storage");
        c.root_cause = Some("N/A".to_string());
        let table = IncidentTable::new(vec![
            a,
            b,
            c,
            Incident::new(4u64, 1.0).with_service("Compute"),
            Incident::new(5u64, 2.0),
        ]);
        let report = analyze(&table, Percentile::P75).unwrap();

        let services = report.priority_services(3);
        assert_eq!(services.len(), 3);
        assert_eq!(services[0], report.impacts[0].service_or_unknown());
        let mut sorted = services.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);

        assert_eq!(report.priority_root_causes(5, 3), vec!["Config change"]);
        assert!(report.priority_root_causes(0, 3).is_empty());
    }

    #[test]
    fn test_cascade_stats() {
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 10.0),
            Incident::new(2u64, 20.0).with_root(1u64),
            Incident::new(3u64, 30.0).with_root(1u64),
            Incident::new(4u64, 40.0),
        ]);
        let stats = analyze(&table, Percentile::P75).unwrap().cascade_stats();
        assert_eq!(stats.systems_with_cascades, 1);
        assert_eq!(stats.total_cascades, 2);
        assert_eq!(stats.max_cascade, 2);
        assert!(close(stats.avg_cascades, 1.0));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// Incidents with ids 0..n, each pointing at a random id in 0..n+3 so
    /// some references dangle.
    fn table_strategy() -> impl Strategy<Value = IncidentTable> {
        (1usize..40).prop_flat_map(|n| {
            prop::collection::vec((0.0f64..10_000.0, prop::option::of(0u64..(n as u64 + 3))), n).prop_map(
                |rows| {
                    IncidentTable::new(
                        rows.into_iter()
                            .enumerate()
                            .map(|(i, (ttm, root))| {
                                let mut incident = Incident::new(i as u64, ttm);
                                incident.root_ref = root.map(IncidentId);
                                incident
                            })
                            .collect(),
                    )
                },
            )
        })
    }

    proptest! {
        #[test]
        fn baseline_is_deterministic(table in table_strategy(), p in 0.01f64..0.99) {
            let p = Percentile::new(p).unwrap();
            prop_assert_eq!(compute_baseline(&table, p), compute_baseline(&table, p));
        }

        #[test]
        fn grouping_partitions_the_table(table in table_strategy()) {
            let g = group_into_event_systems(&table);
            let mut flattened: Vec<IncidentId> = g.systems.iter().flat_map(|s| s.member_ids()).collect();
            let mut original: Vec<IncidentId> = table.incidents().iter().map(|i| i.id).collect();
            flattened.sort();
            original.sort();
            prop_assert_eq!(flattened, original);
            prop_assert_eq!(g.root_events + g.cascading, table.len());
            for system in &g.systems {
                prop_assert!(!system.is_empty());
            }
        }

        #[test]
        fn cumulative_removal_is_monotone(table in table_strategy()) {
            let report = analyze(&table, Percentile::P75).unwrap();
            prop_assert_eq!(report.cumulative.len(), report.impacts.len());

            let mut seen: HashSet<IncidentId> = HashSet::new();
            let mut previous = 0;
            for (step, impact) in report.cumulative.iter().zip(&report.impacts) {
                seen.extend(report.grouping.get(impact.root).unwrap().member_ids());
                prop_assert!(step.incidents_removed >= previous);
                prop_assert_eq!(step.incidents_removed, seen.len());
                previous = step.incidents_removed;
            }
            prop_assert_eq!(previous, table.len());
        }

        #[test]
        fn removing_a_tail_group_never_raises_the_percentile(
            low in prop::collection::vec(0.0f64..100.0, 1..20),
            high in prop::collection::vec(100.0f64..1000.0, 1..10),
        ) {
            let mut incidents: Vec<Incident> = low
                .iter()
                .enumerate()
                .map(|(i, &ttm)| Incident::new(i as u64, ttm))
                .collect();
            let root = low.len() as u64;
            for (j, &ttm) in high.iter().enumerate() {
                incidents.push(Incident::new(root + j as u64, ttm).with_root(root));
            }
            let table = IncidentTable::new(incidents);
            let baseline = compute_baseline(&table, Percentile::P75).unwrap();
            let g = group_into_event_systems(&table);
            let tail = g.get(IncidentId(root)).unwrap();
            prop_assume!(tail.members.iter().all(|m| m.ttm_minutes >= baseline.value));

            let impact = compute_single_system_impact(&table, tail, &baseline);
            let snapshot = impact.remainder.snapshot().unwrap();
            prop_assert!(snapshot.percentile <= baseline.value);
            prop_assert!(impact.delta().unwrap().absolute >= 0.0);
        }
    }
}
