use std::fmt::Write;

use crate::models::{AnalyticsSnapshot, DashboardView};

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

pub fn build_report(snapshot: &AnalyticsSnapshot, dashboard: &DashboardView) -> String {
    let mut output = String::new();
    let summary = &snapshot.summary;

    let _ = writeln!(output, "# Diagnostic Analytics Report");
    let _ = writeln!(
        output,
        "Generated {} for the {} ({})",
        snapshot.generated_at.format("%Y-%m-%d %H:%M UTC"),
        snapshot.range.describe(),
        snapshot.range
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Total scans: {}", summary.total_scans);
    let _ = writeln!(output, "- Active patients: {}", summary.active_patients);
    let _ = writeln!(
        output,
        "- Avg confidence: {}%",
        summary.avg_confidence_percent.round() as i64
    );
    let _ = writeln!(output, "- This month: {}", summary.scans_this_month);
    let _ = writeln!(output, "- Today: {}", dashboard.scans_today);
    let _ = writeln!(output, "- Critical cases: {}", dashboard.critical_cases);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly Scan Volume");
    for bucket in &snapshot.monthly {
        let _ = writeln!(output, "- {}: {} scans", bucket.label, bucket.scan_count);
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Disease Distribution");

    if snapshot.distribution.is_empty() {
        let _ = writeln!(output, "No diagnosis data available.");
    } else {
        for entry in &snapshot.distribution {
            let _ = writeln!(
                output,
                "- {}: {} ({:.0}%) {}",
                entry.name,
                entry.count,
                percent(entry.count, summary.total_scans),
                entry.color
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Diagnoses");

    if snapshot.top_diseases.is_empty() {
        let _ = writeln!(output, "No diagnosis data available for the selected period.");
    } else {
        for disease in &snapshot.top_diseases {
            let trend = match disease.trend {
                Some(change) => format!("{change:+.0}%"),
                None => "n/a (no baseline)".to_string(),
            };
            let _ = writeln!(
                output,
                "{}. {} with {} cases, trend {}",
                disease.rank, disease.disease, disease.cases, trend
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Diagnoses");

    if dashboard.recent.is_empty() {
        let _ = writeln!(output, "No diagnoses recorded yet.");
    } else {
        for row in &dashboard.recent {
            let date = row
                .date
                .map_or_else(|| "unknown date".to_string(), |date| date.to_string());
            let flag = if row.critical { " [critical]" } else { "" };
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {} at {}%{}",
                row.patient, row.patient_id, date, row.disease, row.confidence, flag
            );
        }
    }

    output
}
