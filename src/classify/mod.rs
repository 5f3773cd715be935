//! Keyword classification of free-text root-cause narratives.
//!
//! Rules are evaluated top-down and the first rule with a matching keyword
//! wins, so more specific categories sit above broader ones.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::analysis::stats;
use crate::incident::{Incident, IncidentTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    HardwareFailure,
    SoftwareBug,
    ConfigurationIssue,
    CapacityResource,
    NetworkIssue,
    DeploymentChange,
    ExternalDependency,
    Transient,
    Unknown,
}

impl Category {
    pub fn label(self) -> &'static str {
        match self {
            Category::HardwareFailure => "Hardware Failure",
            Category::SoftwareBug => "Software Bug",
            Category::ConfigurationIssue => "Configuration Issue",
            Category::CapacityResource => "Capacity/Resource",
            Category::NetworkIssue => "Network Issue",
            Category::DeploymentChange => "Deployment/Change",
            Category::ExternalDependency => "External Dependency",
            Category::Transient => "Transient",
            Category::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.label())
    }
}

/// Ordered (category, keywords) rules. Keywords are lower case.
pub const RULES: &[(Category, &[&str])] = &[
    (
        Category::HardwareFailure,
        &[
            "hardware failure", "hardware error", "psu", "power loss", "fuse", "ssd failure",
            "disk failure", "memory failure", "nic failure", "tor switch", "power breaker",
            "parity error",
        ],
    ),
    (
        Category::SoftwareBug,
        &[
            "software bug", "code bug", "null reference", "exception", "assertion failure",
            "crash", "memory leak", "deadlock", "race condition", "known bug", "csc",
            "process crash",
        ],
    ),
    (
        Category::ConfigurationIssue,
        &[
            "configuration", "misconfiguration", "config error", "wrong setting",
            "incorrect parameter", "config change", "settings", "firewall rule", "acl", "policy",
        ],
    ),
    (
        Category::CapacityResource,
        &[
            "capacity", "exhaustion", "out of memory", "oom", "disk full", "cpu high",
            "throttling", "quota", "resource limit", "scaling", "overload",
        ],
    ),
    (
        Category::NetworkIssue,
        &[
            "network", "connectivity", "packet loss", "latency", "bgp", "routing", "dns",
            "timeout", "connection reset",
        ],
    ),
    (
        Category::DeploymentChange,
        &[
            "deployment", "rollout", "release", "code push", "change", "update", "upgrade",
            "migration", "rollback",
        ],
    ),
    (
        Category::ExternalDependency,
        &[
            "external", "dependency", "downstream", "upstream", "third party", "vendor",
            "azure ad", "cosmos",
        ],
    ),
    (
        Category::Transient,
        &[
            "transient", "intermittent", "temporary", "flaky", "self-healing", "self-resolved",
            "recovered",
        ],
    ),
];

/// Classify a narrative. Empty text and unmatched text are `Unknown`.
pub fn classify_text(text: &str) -> Category {
    let text = text.to_lowercase();
    if text.trim().is_empty() {
        return Category::Unknown;
    }
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
        .map_or(Category::Unknown, |(category, _)| *category)
}

/// Classify an incident from the named narrative metadata columns.
pub fn classify_incident(incident: &Incident, narrative_columns: &[String]) -> Category {
    let text = narrative_columns
        .iter()
        .filter_map(|c| incident.metadata.get(c))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    classify_text(&text)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryLoad {
    pub category: Category,
    pub count: usize,
    pub mean_ttm: f64,
}

/// Incidents per category with mean TTM, busiest first. Ties follow rule order.
pub fn category_breakdown(table: &IncidentTable, narrative_columns: &[String]) -> Vec<CategoryLoad> {
    let mut buckets: HashMap<Category, Vec<f64>> = HashMap::new();
    for incident in table.incidents() {
        buckets
            .entry(classify_incident(incident, narrative_columns))
            .or_default()
            .push(incident.ttm_minutes);
    }

    let order: Vec<Category> = RULES
        .iter()
        .map(|(c, _)| *c)
        .chain(std::iter::once(Category::Unknown))
        .collect();

    let mut loads: Vec<CategoryLoad> = order
        .into_iter()
        .filter_map(|category| {
            let values = buckets.get(&category)?;
            Some(CategoryLoad {
                category,
                count: values.len(),
                mean_ttm: stats::mean(values)?,
            })
        })
        .collect();
    loads.sort_by(|a, b| b.count.cmp(&a.count));
    loads
}
