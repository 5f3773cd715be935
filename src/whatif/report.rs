//! Markdown rendering of a what-if run.

use chrono::Local;

use super::{Delta, Remainder, WhatIfReport};
use crate::analysis::stats::Snapshot;
use crate::config::ReportConfig;

/// "+22.5 min (+36.0%)", or "n/a" when the remainder was empty.
pub fn format_delta(delta: Option<Delta>) -> String {
    match delta {
        Some(Delta { absolute, percent: Some(pct) }) => format!("{:+.1} min ({:+.1}%)", absolute, pct),
        Some(Delta { absolute, percent: None }) => format!("{:+.1} min", absolute),
        None => "n/a".to_string(),
    }
}

fn format_pct(delta: Option<Delta>) -> String {
    match delta.and_then(|d| d.percent) {
        Some(pct) => format!("{:+.1}%", pct),
        None => "n/a".to_string(),
    }
}

fn format_value(remainder: &Remainder, pick: impl Fn(&Snapshot) -> f64) -> String {
    match remainder.snapshot() {
        Some(s) => format!("{:.1}", pick(s)),
        None => "n/a".to_string(),
    }
}

/// Render the full report: baseline, per-system ranking, cumulative
/// removal, summary tables, concentration insights and priorities.
pub fn render_markdown(report: &WhatIfReport, cfg: &ReportConfig) -> String {
    let b = &report.baseline;
    let label = b.percentile.label();
    let systems = report.system_count();

    let mut out = String::from("# TTM What-If Scenario Analysis (Event Systems)\n\n");
    out.push_str(&format!("**Generated:** {}\n\n", Local::now().format("%Y-%m-%d %H:%M:%S")));
    out.push_str("---\n\n");

    out.push_str("## Executive Summary\n\n");
    out.push_str("### Dataset Classification\n\n");
    out.push_str(&format!("- **Total Incidents:** {}\n", b.count));
    out.push_str(&format!("- **Root Events:** {}\n", report.root_events));
    out.push_str(&format!("- **Cascading Outages:** {}\n", report.cascading));
    out.push_str(&format!("- **Unique Event Systems:** {}\n", systems));
    if systems > 0 {
        out.push_str(&format!(
            "- **Average incidents per event system:** {:.1}\n",
            b.count as f64 / systems as f64
        ));
    }
    if report.rejected > 0 {
        out.push_str(&format!("- **Rows excluded (invalid TTM or id):** {}\n", report.rejected));
    }
    if report.fallbacks > 0 {
        out.push_str(&format!(
            "- **Dangling root references (treated as own root):** {}\n",
            report.fallbacks
        ));
    }

    out.push_str("\n### Baseline Metrics (All Incidents)\n\n");
    out.push_str(&format!("- **{} TTM:** {:.1} minutes\n", label, b.value));
    out.push_str(&format!("- **Mean TTM:** {:.1} minutes\n", b.mean));
    out.push_str(&format!("- **Median TTM:** {:.1} minutes\n\n", b.median));
    out.push_str("---\n\n");

    out.push_str(&render_individual(report, cfg, &label));
    out.push_str(&render_cumulative(report, cfg, &label));
    out.push_str(&render_tables(report, cfg, &label));
    out.push_str(&render_insights(report, &label));

    out
}

fn render_individual(report: &WhatIfReport, cfg: &ReportConfig, label: &str) -> String {
    let mut out = format!(
        "## Part 1: Individual Event System Impacts (Ranked by {} Impact)\n\n",
        label
    );

    for (rank, impact) in report.impacts.iter().enumerate() {
        let date = impact
            .created_at
            .map_or_else(|| "N/A".to_string(), |at| at.format("%Y-%m-%d").to_string());

        out.push_str(&format!("### Rank #{}: Event System {}\n\n", rank + 1, impact.root));
        out.push_str(&format!("- **Service:** {}\n", impact.service_or_unknown()));
        out.push_str(&format!("- **Severity:** {}\n", impact.severity.as_deref().unwrap_or("N/A")));
        out.push_str(&format!("- **Root Event TTM:** {:.0} minutes\n", impact.root_ttm));
        out.push_str(&format!("- **Cascading Outages:** {}\n", impact.cascade_count));
        out.push_str(&format!("- **Total Incidents in System:** {}\n", impact.member_count));
        out.push_str(&format!("- **System Total TTM:** {:.0} minutes\n", impact.total_ttm));
        out.push_str(&format!("- **Date:** {}\n\n", date));

        if let Some(system) = report.grouping.get(impact.root) {
            if impact.cascade_count > 0 {
                out.push_str("**Cascading Outages:**\n");
                for m in system.cascades().take(cfg.cascades_listed) {
                    out.push_str(&format!(
                        "  - Outage {} ({}, TTM: {:.0} min)\n",
                        m.id,
                        m.service.as_deref().unwrap_or("Unknown"),
                        m.ttm_minutes
                    ));
                }
                if impact.cascade_count > cfg.cascades_listed {
                    out.push_str(&format!(
                        "  - ...and {} more cascading outages\n",
                        impact.cascade_count - cfg.cascades_listed
                    ));
                }
                out.push('\n');
            }
        }

        out.push_str("**Impact if This Event System Prevented:**\n");
        match impact.remainder.snapshot() {
            Some(s) => {
                out.push_str(&format!("- **{} TTM:** {:.1} minutes\n", label, s.percentile));
                out.push_str(&format!("- **{} Delta:** {}\n", label, format_delta(impact.delta())));
                out.push_str(&format!(
                    "- **Mean TTM:** {:.1} minutes (Δ {})\n",
                    s.mean,
                    format_delta(impact.remainder.mean_delta())
                ));
                out.push_str(&format!("- **Median TTM:** {:.1} minutes\n", s.median));
                out.push_str(&format!("- **Remaining Incidents:** {}\n\n", s.count));
            }
            None => out.push_str("- Not applicable: no incidents would remain\n\n"),
        }

        if let Some(cause) = impact.root_cause.as_deref() {
            out.push_str(&format!("**Root Cause:** {}\n\n", cause));
        }
        if let Some(pct) = impact.delta().and_then(|d| d.percent) {
            if pct.abs() >= cfg.high_impact_pct {
                out.push_str(&format!(
                    "**High Impact:** Preventing this event system would change {} by {:.1}%\n\n",
                    label,
                    pct.abs()
                ));
            }
        }
        if impact.cascade_count >= cfg.high_cascade {
            out.push_str(&format!(
                "**High Cascade:** This event triggered {} downstream outages\n\n",
                impact.cascade_count
            ));
        }
        out.push_str("---\n\n");
    }

    out
}

fn render_cumulative(report: &WhatIfReport, cfg: &ReportConfig, label: &str) -> String {
    let mut out = String::from("## Part 2: Cumulative Removal Impact Analysis\n\n");
    out.push_str(
        "Event systems are removed in Part 1 rank order and metrics are recalculated after each removal. \
         The order is fixed up front and not re-ranked between steps.\n\n",
    );

    for step in report.cumulative.iter().take(cfg.cumulative_steps) {
        out.push_str(&format!(
            "### Cumulative Step {}: Remove Top {} Event System{}\n\n",
            step.step,
            step.systems_removed,
            if step.systems_removed > 1 { "s" } else { "" }
        ));
        if let Some(system) = report.grouping.get(step.added_root) {
            out.push_str(&format!(
                "**Latest Event Added:** {} ({}, {} incidents)\n\n",
                step.added_root,
                system.service.as_deref().unwrap_or("Unknown"),
                system.len()
            ));
        }
        out.push_str(&format!(
            "- **Total Incidents Removed:** {} ({:.1}% of all incidents)\n",
            step.incidents_removed, step.pct_removed
        ));
        match step.remainder.snapshot() {
            Some(s) => {
                out.push_str(&format!("- **Remaining Incidents:** {}\n", s.count));
                out.push_str(&format!("- **{} TTM:** {:.1} minutes\n", label, s.percentile));
                out.push_str(&format!(
                    "- **{} Delta from Baseline:** {}\n",
                    label,
                    format_delta(step.remainder.delta())
                ));
                out.push_str(&format!(
                    "- **Mean TTM:** {:.1} minutes (Δ {})\n",
                    s.mean,
                    format_delta(step.remainder.mean_delta())
                ));
                out.push_str(&format!("- **Median TTM:** {:.1} minutes\n\n", s.median));
            }
            None => out.push_str("- Not applicable: no incidents remain\n\n"),
        }
        out.push_str("---\n\n");
    }

    out
}

fn render_tables(report: &WhatIfReport, cfg: &ReportConfig, label: &str) -> String {
    let mut out = String::from("## Summary: Cumulative Removal Comparison Table\n\n");
    out.push_str(&format!(
        "| Rank | Events Removed | Incidents Removed | % of Total | {l} TTM (min) | Δ {l} (min) | Δ {l} (%) | Remaining |\n",
        l = label
    ));
    out.push_str("|------|----------------|-------------------|------------|------|------|------|-----------|\n");
    for step in report.cumulative.iter().take(cfg.comparison_rows) {
        let delta = step.remainder.delta();
        out.push_str(&format!(
            "| {} | {} | {} | {:.1}% | {} | {} | {} | {} |\n",
            step.step,
            step.systems_removed,
            step.incidents_removed,
            step.pct_removed,
            format_value(&step.remainder, |s| s.percentile),
            delta.map_or_else(|| "n/a".to_string(), |d| format!("{:+.1}", d.absolute)),
            format_pct(delta),
            step.remainder.snapshot().map_or(0, |s| s.count),
        ));
    }

    out.push_str("\n## Top Event Systems Summary\n\n");
    out.push_str(&format!(
        "| Rank | Event ID | Service | Cascades | Total TTM | {l} Impact | {l} Δ % |\n",
        l = label
    ));
    out.push_str("|------|----------|---------|----------|-----------|------|------|\n");
    for (rank, impact) in report.impacts.iter().take(cfg.top_systems).enumerate() {
        let delta = impact.delta();
        let service: String = impact.service_or_unknown().chars().take(30).collect();
        out.push_str(&format!(
            "| {} | {} | {} | {} | {:.0} min | {} | {} |\n",
            rank + 1,
            impact.root,
            service,
            impact.cascade_count,
            impact.total_ttm,
            delta.map_or_else(|| "n/a".to_string(), |d| format!("{:+.1} min", d.absolute)),
            format_pct(delta),
        ));
    }
    out.push_str("\n---\n\n");

    out
}

fn render_insights(report: &WhatIfReport, label: &str) -> String {
    let share_of = |n: usize| {
        report
            .concentration(n)
            .map_or_else(|| "n/a".to_string(), |p| format!("{:.1}%", p.abs()))
    };

    let mut out = String::from("## Key Insights\n\n### Impact Concentration\n\n");
    for n in [1usize, 5, 10] {
        let Some(step) = report.after_top(n) else {
            continue;
        };
        out.push_str(&format!(
            "- **Top {} Event System{}:** {} of {} TTM ({} incidents)\n",
            n,
            if n > 1 { "s" } else { "" },
            share_of(n),
            label,
            step.incidents_removed
        ));
    }

    let cascades = report.cascade_stats();
    let share = if report.system_count() > 0 {
        cascades.systems_with_cascades as f64 / report.system_count() as f64 * 100.0
    } else {
        0.0
    };
    out.push_str("\n### Cascading Analysis\n\n");
    out.push_str(&format!(
        "- **Event Systems with Cascades:** {} ({:.1}%)\n",
        cascades.systems_with_cascades, share
    ));
    out.push_str(&format!("- **Total Cascading Outages:** {}\n", report.cascading));
    out.push_str(&format!(
        "- **Maximum Cascade Depth:** {} outages from single event\n",
        cascades.max_cascade
    ));
    out.push_str(&format!("- **Average Cascades per Event System:** {:.1}\n", cascades.avg_cascades));

    let causes = report.priority_root_causes(5, 3);
    let causes = if causes.is_empty() {
        "none recorded".to_string()
    } else {
        causes.join(", ")
    };
    out.push_str("\n### Prevention Priorities\n\n");
    out.push_str(&format!(
        "1. **Focus on Top 10 Events:** These event systems account for {} of {} TTM\n",
        share_of(10),
        label
    ));
    out.push_str(&format!(
        "2. **Target Services:** {} show the highest individual event impacts\n",
        report.priority_services(3).join(", ")
    ));
    out.push_str(
        "3. **Cascade Prevention:** Events with high cascade counts amplify their impact; \
         faster root resolution shortens the cascades\n",
    );
    out.push_str(&format!(
        "4. **Root Cause Focus:** Address root causes of top-ranked events: {}\n",
        causes
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::incident::{Incident, IncidentTable};
    use crate::whatif::{analyze, Percentile};

    fn report() -> WhatIfReport {
        let mut network = Incident::new(3u64, 5.0).with_root(3u64).with_service("Network");
        network.root_cause = Some("Bad rollout".to_string());
        network.created_at = chrono::NaiveDate::from_ymd_opt(2025, 10, 12).and_then(|d| d.and_hms_opt(4, 0, 0));
        let table = IncidentTable::new(vec![
            Incident::new(1u64, 10.0).with_root(1u64).with_service("Compute"),
            Incident::new(2u64, 50.0).with_root(1u64).with_service("Storage"),
            network,
            Incident::new(4u64, 100.0).with_root(3u64).with_service("Network"),
        ]);
        analyze(&table, Percentile::P75).unwrap()
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(
            format_delta(Some(Delta { absolute: 22.5, percent: Some(36.0) })),
            "+22.5 min (+36.0%)"
        );
        assert_eq!(
            format_delta(Some(Delta { absolute: -13.75, percent: None })),
            "-13.8 min"
        );
        assert_eq!(format_delta(None), "n/a");
    }

    #[test]
    fn test_markdown_contains_ranking_and_tables() {
        let md = render_markdown(&report(), &ReportConfig::default());
        assert!(md.contains("**P75 TTM:** 62.5 minutes"));
        assert!(md.contains("### Rank #1: Event System 3"));
        assert!(md.contains("### Rank #2: Event System 1"));
        assert!(md.contains("+22.5 min (+36.0%)"));
        assert!(md.contains("-13.8 min (-22.0%)"));
        assert!(md.contains("Outage 4 (Network, TTM: 100 min)"));
        assert!(md.contains("Not applicable: no incidents remain"));
        assert!(md.contains("| 1 | 1 | 2 | 50.0% | 40.0 | +22.5 | +36.0% | 2 |"));
        assert!(md.contains("**High Impact:**"));
    }

    #[test]
    fn test_markdown_shows_create_date_per_system() {
        let md = render_markdown(&report(), &ReportConfig::default());
        assert!(md.contains("- **Date:** 2025-10-12\n"));
        assert!(md.contains("- **Date:** N/A\n"));
        let rank1 = md.find("### Rank #1").unwrap();
        let rank2 = md.find("### Rank #2").unwrap();
        assert!(md[rank1..rank2].contains("2025-10-12"));
    }

    #[test]
    fn test_markdown_prevention_priorities() {
        let md = render_markdown(&report(), &ReportConfig::default());
        let section = &md[md.find("### Prevention Priorities").unwrap()..];
        assert!(section.contains("**Target Services:** Network, Compute show"));
        assert!(section.contains("top-ranked events: Bad rollout"));
        // Two systems only, so the top 10 clamp to the last step, which emptied the table.
        assert!(section.contains("account for n/a of P75 TTM"));
    }

    #[test]
    fn test_markdown_respects_limits() {
        let cfg = ReportConfig {
            cumulative_steps: 1,
            top_systems: 1,
            ..ReportConfig::default()
        };
        let md = render_markdown(&report(), &cfg);
        assert!(md.contains("### Cumulative Step 1:"));
        assert!(!md.contains("### Cumulative Step 2:"));
    }
}
