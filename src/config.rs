//! TOML configuration for ttmwhatif.
//!
//! Layered model: an explicit `--config` path wins, then the
//! `TTMWHATIF_CONFIG` environment variable, then `./ttmwhatif.toml`, then
//! compiled-in defaults that match the monthly outage export.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::whatif::Percentile;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "TTMWHATIF_CONFIG";

/// Config file picked up from the working directory when present.
pub const LOCAL_CONFIG: &str = "ttmwhatif.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try `$TTMWHATIF_CONFIG`, then `./ttmwhatif.toml`, then defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "TTMWHATIF_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let local = Path::new(LOCAL_CONFIG);
        if local.exists() {
            match Self::load(local) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %local.display(),
                        error = %e,
                        "local config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.analysis.percentile()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Percentile used as the baseline statistic, in (0, 1).
    pub percentile: f64,
    /// Number of services listed in the descriptive summary.
    pub top_services: usize,
    /// Severity label counted as high impact.
    pub high_severity: String,
}

impl AnalysisConfig {
    pub fn percentile(&self) -> Result<Percentile> {
        Ok(Percentile::new(self.percentile)?)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            percentile: 0.75,
            top_services: 10,
            high_severity: "2".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Column names in the incident export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub id: String,
    pub ttm: String,
    pub root: String,
    /// Used for grouping when `root` is absent from the export.
    pub fallback_root: String,
    pub service: String,
    /// First column present wins.
    pub severity: Vec<String>,
    pub root_cause: String,
    pub created_at: String,
    /// Free-text columns fed to the root-cause classifier.
    pub narratives: Vec<String>,
    /// Boolean column marking multi-region incidents (high impact).
    pub multi_region: String,
    pub pir_required: String,
    pub pir_status: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            id: "OutageIncidentId".to_string(),
            ttm: "TTM".to_string(),
            root: "RootResponsibleIncidentId".to_string(),
            fallback_root: "EventId".to_string(),
            service: "ServiceName".to_string(),
            severity: vec!["OutageIncidentSeverity".to_string(), "Severity".to_string()],
            root_cause: "RootCauseCategory".to_string(),
            created_at: "OutageCreateDate".to_string(),
            narratives: vec!["set_Whys".to_string(), "RootCauses".to_string()],
            multi_region: "IsMultiRegion".to_string(),
            pir_required: "PIRRequired".to_string(),
            pir_status: "PIRStatus".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Limits and thresholds for the rendered what-if report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Cumulative steps rendered in detail.
    pub cumulative_steps: usize,
    /// Rows in the cumulative comparison table.
    pub comparison_rows: usize,
    /// Rows in the top event systems table.
    pub top_systems: usize,
    /// Cascading outages listed under each event system.
    pub cascades_listed: usize,
    /// |delta %| at or above which a system is flagged high impact.
    pub high_impact_pct: f64,
    /// Cascade count at or above which a system is flagged high cascade.
    pub high_cascade: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            cumulative_steps: 20,
            comparison_rows: 15,
            top_systems: 10,
            cascades_listed: 10,
            high_impact_pct: 2.0,
            high_cascade: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON lines instead of human-readable logs.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
