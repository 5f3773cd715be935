//! Incident records and the immutable table the analyses run over.

pub mod loader;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Outage incident identifier as exported (an integer id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub u64);

impl IncidentId {
    /// Parse an id cell. Exports frequently render integer ids as floats
    /// ("1234.0"), so a float with no fractional part is accepted too.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(v) = raw.parse::<u64>() {
            return Some(Self(v));
        }
        match raw.parse::<f64>() {
            Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                Some(Self(f as u64))
            }
            _ => None,
        }
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for IncidentId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// A single outage incident with a validated, non-negative TTM.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Incident {
    pub id: IncidentId,
    /// Time to mitigate, in minutes.
    pub ttm_minutes: f64,
    /// Root-responsible incident; `None` or self-referential means this incident is a root.
    pub root_ref: Option<IncidentId>,
    pub service: Option<String>,
    pub severity: Option<String>,
    pub root_cause: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    /// Pass-through columns the analyses do not interpret.
    pub metadata: BTreeMap<String, String>,
}

impl Incident {
    /// Minimal incident, mostly useful for tests and programmatic callers.
    pub fn new(id: impl Into<IncidentId>, ttm_minutes: f64) -> Self {
        Self {
            id: id.into(),
            ttm_minutes,
            root_ref: None,
            service: None,
            severity: None,
            root_cause: None,
            created_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_root(mut self, root: impl Into<IncidentId>) -> Self {
        self.root_ref = Some(root.into());
        self
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(service.to_string());
        self
    }

    pub fn with_severity(mut self, severity: &str) -> Self {
        self.severity = Some(severity.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn service_or_unknown(&self) -> &str {
        self.service.as_deref().unwrap_or("Unknown")
    }
}

/// Raw TTM cell as read from the source, before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDuration {
    Missing,
    Text(String),
    Value(f64),
}

/// An incident as ingested, whose duration has not yet been checked.
#[derive(Debug, Clone)]
pub struct IncidentRow {
    /// 1-based data line in the source (0 when not from a file).
    pub line: usize,
    pub incident: Incident,
    pub duration: RawDuration,
}

/// Why a row was kept out of the statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum RejectReason {
    MissingDuration,
    NonNumericDuration(String),
    NegativeDuration(f64),
    NonFiniteDuration,
    InvalidId(String),
    Malformed(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingDuration => write!(f, "missing TTM"),
            RejectReason::NonNumericDuration(v) => write!(f, "non-numeric TTM {:?}", v),
            RejectReason::NegativeDuration(v) => write!(f, "negative TTM {}", v),
            RejectReason::NonFiniteDuration => write!(f, "non-finite TTM"),
            RejectReason::InvalidId(v) => write!(f, "invalid incident id {:?}", v),
            RejectReason::Malformed(e) => write!(f, "malformed record: {}", e),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedRow {
    pub line: usize,
    pub id: Option<IncidentId>,
    pub reason: RejectReason,
}

/// Validated incidents for one analysis run. Never mutated after construction.
#[derive(Debug, Clone, Default)]
pub struct IncidentTable {
    incidents: Vec<Incident>,
    rejected: Vec<RejectedRow>,
}

impl IncidentTable {
    /// Build a table from already-validated incidents. Any incident whose
    /// TTM is negative or non-finite is still rejected.
    pub fn new(incidents: Vec<Incident>) -> Self {
        let rows = incidents
            .into_iter()
            .map(|incident| IncidentRow {
                line: 0,
                duration: RawDuration::Value(incident.ttm_minutes),
                incident,
            })
            .collect();
        Self::from_rows(rows, Vec::new())
    }

    /// Validate raw rows. `rejected` carries rows the caller already
    /// refused (malformed records, bad ids) so they are counted alongside.
    pub fn from_rows(rows: Vec<IncidentRow>, mut rejected: Vec<RejectedRow>) -> Self {
        let mut incidents = Vec::with_capacity(rows.len());

        for row in rows {
            let IncidentRow { line, mut incident, duration } = row;
            let verdict = match duration {
                RawDuration::Missing => Err(RejectReason::MissingDuration),
                RawDuration::Text(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        Err(RejectReason::MissingDuration)
                    } else if let Ok(v) = trimmed.parse::<f64>() {
                        validate_duration(v)
                    } else {
                        Err(RejectReason::NonNumericDuration(trimmed.to_string()))
                    }
                }
                RawDuration::Value(v) => validate_duration(v),
            };

            match verdict {
                Ok(ttm) => {
                    incident.ttm_minutes = ttm;
                    incidents.push(incident);
                }
                Err(reason) => {
                    warn!(line, id = %incident.id, %reason, "excluding incident from statistics");
                    rejected.push(RejectedRow {
                        line,
                        id: Some(incident.id),
                        reason,
                    });
                }
            }
        }

        Self { incidents, rejected }
    }

    pub fn incidents(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn rejected(&self) -> &[RejectedRow] {
        &self.rejected
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn durations(&self) -> Vec<f64> {
        self.incidents.iter().map(|i| i.ttm_minutes).collect()
    }

    pub fn ids(&self) -> HashSet<IncidentId> {
        self.incidents.iter().map(|i| i.id).collect()
    }

    /// Durations of every incident whose id is not in `excluded`.
    pub fn durations_without(&self, excluded: &HashSet<IncidentId>) -> Vec<f64> {
        self.incidents
            .iter()
            .filter(|i| !excluded.contains(&i.id))
            .map(|i| i.ttm_minutes)
            .collect()
    }
}

fn validate_duration(v: f64) -> Result<f64, RejectReason> {
    if !v.is_finite() {
        Err(RejectReason::NonFiniteDuration)
    } else if v < 0.0 {
        Err(RejectReason::NegativeDuration(v))
    } else {
        Ok(v)
    }
}
