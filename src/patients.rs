use std::cmp::Reverse;
use std::collections::HashMap;

use crate::models::{DiagnosisRecord, PatientSummary, RosterStats};

/// Collapses scan records into one entry per patient id.
///
/// Records are visited newest first, so name, age, gender, latest diagnosis and
/// last visit all come from each patient's most recent scan. Records without a
/// patient id share a single entry.
pub fn roster_from_records(records: &[DiagnosisRecord]) -> Vec<PatientSummary> {
    let mut ordered: Vec<&DiagnosisRecord> = records.iter().collect();
    // Unparseable timestamps sort last.
    ordered.sort_by_cached_key(|record| Reverse(record.recorded_at()));

    let mut positions: HashMap<Option<&str>, usize> = HashMap::new();
    let mut roster: Vec<PatientSummary> = Vec::new();

    for record in ordered {
        let key = record.patient_id.as_deref();
        let position = *positions.entry(key).or_insert_with(|| {
            roster.push(PatientSummary {
                id: record.patient_id.clone(),
                name: record.patient_name.clone(),
                age: record.age,
                gender: record.sex.clone(),
                total_scans: 0,
                latest_diagnosis: record.diagnosis.clone(),
                last_visit: record.timestamp.clone(),
            });
            roster.len() - 1
        });
        roster[position].total_scans += 1;
    }

    roster
}

/// Gender value that disables the gender filter.
pub const ALL_GENDERS: &str = "all";

fn contains_ignore_case(field: Option<&str>, needle: &str) -> bool {
    field.unwrap_or_default().to_lowercase().contains(needle)
}

/// Patients whose name or id contains `search` (case-insensitive) and whose
/// gender equals `gender` exactly. `gender` of [`ALL_GENDERS`] keeps everyone.
pub fn filter_roster(
    roster: &[PatientSummary],
    search: &str,
    gender: &str,
) -> Vec<PatientSummary> {
    let needle = search.to_lowercase();
    roster
        .iter()
        .filter(|patient| {
            contains_ignore_case(patient.name.as_deref(), &needle)
                || contains_ignore_case(patient.id.as_deref(), &needle)
        })
        .filter(|patient| gender == ALL_GENDERS || patient.gender.as_deref() == Some(gender))
        .cloned()
        .collect()
}

/// Every scan for one patient, in input order.
pub fn patient_history(records: &[DiagnosisRecord], patient_id: &str) -> Vec<DiagnosisRecord> {
    records
        .iter()
        .filter(|record| record.patient_id.as_deref() == Some(patient_id))
        .cloned()
        .collect()
}

pub fn roster_stats(roster: &[PatientSummary]) -> RosterStats {
    let total_scans: usize = roster.iter().map(|patient| patient.total_scans).sum();
    let avg_scans_per_patient = if roster.is_empty() {
        0.0
    } else {
        (total_scans as f64 / roster.len() as f64 * 10.0).round() / 10.0
    };

    RosterStats {
        total_patients: roster.len(),
        total_scans,
        avg_scans_per_patient,
    }
}
