use chrono::{DateTime, Utc};

use crate::config::AnalyticsConfig;
use crate::models::{ConfidenceTier, DashboardView, DiagnosisRecord, RecentDiagnosis};

/// Scans recorded on the UTC calendar day of `now`. Offset timestamps are
/// converted first, so a late-evening scan west of UTC counts toward the next
/// UTC day rather than the date printed in its string.
pub fn scans_on_day(records: &[DiagnosisRecord], now: DateTime<Utc>) -> usize {
    let today = now.date_naive();
    records
        .iter()
        .filter(|record| record.recorded_at().is_some_and(|at| at.date_naive() == today))
        .count()
}

pub fn is_critical(record: &DiagnosisRecord, critical_diseases: &[String]) -> bool {
    record.diagnosis.as_deref().is_some_and(|diagnosis| {
        critical_diseases
            .iter()
            .any(|disease| diagnosis.contains(disease.as_str()))
    })
}

pub fn critical_cases(records: &[DiagnosisRecord], critical_diseases: &[String]) -> usize {
    records
        .iter()
        .filter(|record| is_critical(record, critical_diseases))
        .count()
}

/// The first `limit` records, in the order given (newest first from the API).
pub fn recent_diagnoses(
    records: &[DiagnosisRecord],
    limit: usize,
    critical_diseases: &[String],
) -> Vec<RecentDiagnosis> {
    records
        .iter()
        .take(limit)
        .map(|record| {
            let confidence = record.confidence_or_zero();
            RecentDiagnosis {
                id: record.id.clone(),
                patient_id: record
                    .patient_id
                    .clone()
                    .unwrap_or_else(|| "N/A".to_string()),
                patient: record
                    .patient_name
                    .clone()
                    .unwrap_or_else(|| "Unknown Patient".to_string()),
                disease: record.disease_label().to_string(),
                confidence: confidence.round() as i64,
                date: record.recorded_at().map(|at| at.date_naive()),
                tier: ConfidenceTier::from_confidence(confidence),
                critical: is_critical(record, critical_diseases),
            }
        })
        .collect()
}

pub fn dashboard_view(
    records: &[DiagnosisRecord],
    patients: usize,
    now: DateTime<Utc>,
    config: &AnalyticsConfig,
) -> DashboardView {
    DashboardView {
        total_scans: records.len(),
        scans_today: scans_on_day(records, now),
        patients,
        critical_cases: critical_cases(records, &config.critical_diseases),
        recent: recent_diagnoses(records, config.recent_limit, &config.critical_diseases),
    }
}
