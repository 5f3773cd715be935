//! CSV ingestion of the monthly outage export.
//!
//! Known columns are mapped onto typed [`Incident`] fields through
//! [`ColumnConfig`]; everything else is carried in the metadata bag.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Incident, IncidentId, IncidentRow, IncidentTable, RawDuration, RejectReason, RejectedRow};
use crate::config::ColumnConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV headers: {0}")]
    Headers(#[source] csv::Error),
    #[error("required column {0:?} not found in export")]
    MissingColumn(String),
}

/// Resolved header positions for one export.
#[derive(Debug)]
struct ColumnIndex {
    id: usize,
    ttm: Option<usize>,
    root: Option<usize>,
    service: Option<usize>,
    severity: Option<usize>,
    root_cause: Option<usize>,
    created_at: Option<usize>,
}

impl ColumnIndex {
    fn resolve(headers: &[String], columns: &ColumnConfig) -> Result<Self, LoadError> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let id = find(&columns.id).ok_or_else(|| LoadError::MissingColumn(columns.id.clone()))?;

        let ttm = find(&columns.ttm);
        if ttm.is_none() {
            warn!(column = %columns.ttm, "TTM column missing, every row will be rejected");
        }

        let root = match find(&columns.root) {
            Some(i) => Some(i),
            None => {
                let fallback = find(&columns.fallback_root);
                if fallback.is_some() {
                    warn!(
                        missing = %columns.root,
                        fallback = %columns.fallback_root,
                        "root column not found, grouping by fallback column"
                    );
                } else {
                    debug!(column = %columns.root, "no root column, every incident is its own root");
                }
                fallback
            }
        };

        let severity = columns.severity.iter().find_map(|name| find(name));

        Ok(Self {
            id,
            ttm,
            root,
            service: find(&columns.service),
            severity,
            root_cause: find(&columns.root_cause),
            created_at: find(&columns.created_at),
        })
    }

    fn is_typed(&self, idx: usize) -> bool {
        idx == self.id
            || Some(idx) == self.ttm
            || Some(idx) == self.root
            || Some(idx) == self.service
            || Some(idx) == self.severity
            || Some(idx) == self.root_cause
            || Some(idx) == self.created_at
    }
}

/// Load an export from disk.
pub fn load_csv(path: &Path, columns: &ColumnConfig) -> Result<IncidentTable, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let table = read_csv(file, columns)?;
    info!(
        path = %path.display(),
        incidents = table.len(),
        rejected = table.rejected_count(),
        "loaded incident export"
    );
    Ok(table)
}

/// Read an export from any reader. Malformed records and rows with an
/// unusable id are rejected and counted; loading continues.
pub fn read_csv<R: Read>(reader: R, columns: &ColumnConfig) -> Result<IncidentTable, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(LoadError::Headers)?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();
    let index = ColumnIndex::resolve(&headers, columns)?;

    let mut rows = Vec::new();
    let mut rejected = Vec::new();

    for (idx, result) in rdr.records().enumerate() {
        let line = idx + 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(line, error = %e, "skipping malformed record");
                rejected.push(RejectedRow {
                    line,
                    id: None,
                    reason: RejectReason::Malformed(e.to_string()),
                });
                continue;
            }
        };

        let cell = |i: Option<usize>| -> Option<&str> {
            i.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let raw_id = record.get(index.id).unwrap_or("").trim();
        let Some(id) = IncidentId::parse(raw_id) else {
            warn!(line, id = raw_id, "skipping row with unusable incident id");
            rejected.push(RejectedRow {
                line,
                id: None,
                reason: RejectReason::InvalidId(raw_id.to_string()),
            });
            continue;
        };

        let duration = match cell(index.ttm) {
            Some(text) => RawDuration::Text(text.to_string()),
            None => RawDuration::Missing,
        };

        let mut metadata = BTreeMap::new();
        for (i, value) in record.iter().enumerate() {
            if index.is_typed(i) {
                continue;
            }
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if let Some(header) = headers.get(i) {
                metadata.insert(header.clone(), value.to_string());
            }
        }

        let incident = Incident {
            id,
            ttm_minutes: 0.0,
            root_ref: cell(index.root).and_then(IncidentId::parse),
            service: cell(index.service).map(str::to_string),
            severity: cell(index.severity).map(normalize_severity),
            root_cause: cell(index.root_cause).map(str::to_string),
            created_at: cell(index.created_at).and_then(parse_timestamp),
            metadata,
        };

        rows.push(IncidentRow {
            line,
            incident,
            duration,
        });
    }

    Ok(IncidentTable::from_rows(rows, rejected))
}

/// Severities are exported as "2" or "2.0"; keep one spelling.
fn normalize_severity(raw: &str) -> String {
    match raw.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", f as i64),
        _ => raw.to_string(),
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %I:%M:%S %p",
    ];
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
