//! ttmwhatif -- Time-to-Mitigate analysis for monthly incident exports.
//!
//! This crate loads an outage export into a typed incident table and
//! computes descriptive TTM statistics, period comparisons, root-cause
//! categories and the event-system what-if impact analysis.

pub mod analysis;
pub mod classify;
pub mod config;
pub mod incident;
pub mod whatif;

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::incident::IncidentTable;

/// Load an export using the configured column names.
pub fn load_table(path: &Path, config: &Config) -> Result<IncidentTable> {
    incident::loader::load_csv(path, &config.columns)
        .with_context(|| format!("failed to load incident export {}", path.display()))
}

/// Load an export and run the what-if analysis over it.
pub fn run_whatif(path: &Path, config: &Config) -> Result<whatif::WhatIfReport> {
    let table = load_table(path, config)?;
    let percentile = config.analysis.percentile()?;
    tracing::info!(path = %path.display(), percentile = %percentile.label(), "running what-if analysis");
    Ok(whatif::analyze(&table, percentile)?)
}
