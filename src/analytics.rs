use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::config::AnalyticsConfig;
use crate::models::{
    AnalyticsSnapshot, DiagnosisRecord, DiseaseDistributionEntry, MonthlyBucket, RankedDisease,
    SummaryStats, TimeRange, PALETTE,
};

/// Number of trailing calendar months charted on the analytics page.
pub const MONTHLY_BUCKETS: usize = 6;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Whole days between `at` and `now`, floored. Future instants are negative.
pub fn age_in_days(now: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (now - at).num_milliseconds().div_euclid(MILLIS_PER_DAY)
}

/// Keeps the records young enough for `range`.
///
/// Bounded ranges drop records whose timestamp cannot be parsed; `All` keeps
/// every record.
pub fn filter_by_range(
    records: &[DiagnosisRecord],
    range: TimeRange,
    now: DateTime<Utc>,
) -> Vec<DiagnosisRecord> {
    let Some(max_days) = range.max_age_days() else {
        return records.to_vec();
    };

    records
        .iter()
        .filter(|record| {
            record
                .recorded_at()
                .is_some_and(|at| age_in_days(now, at) <= max_days)
        })
        .cloned()
        .collect()
}

/// Distribution coloured with the built-in [`PALETTE`].
pub fn distribution_by_disease(records: &[DiagnosisRecord]) -> Vec<DiseaseDistributionEntry> {
    distribution_with_palette(records, &PALETTE)
}

/// Counts records per disease label, most frequent first. Colours are handed
/// out by first-seen position; an empty `palette` means [`PALETTE`].
pub fn distribution_with_palette<P: AsRef<str>>(
    records: &[DiagnosisRecord],
    palette: &[P],
) -> Vec<DiseaseDistributionEntry> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut entries: Vec<DiseaseDistributionEntry> = Vec::new();

    for record in records {
        let label = record.disease_label();
        match positions.get(label) {
            Some(&position) => entries[position].count += 1,
            None => {
                let position = entries.len();
                positions.insert(label, position);
                let (color_index, color) = if palette.is_empty() {
                    let index = position % PALETTE.len();
                    (index, PALETTE[index])
                } else {
                    let index = position % palette.len();
                    (index, palette[index].as_ref())
                };
                entries.push(DiseaseDistributionEntry {
                    name: label.to_string(),
                    count: 1,
                    color_index,
                    color: color.to_string(),
                });
            }
        }
    }

    // Stable: equal counts keep first-seen order.
    entries.sort_by(|a, b| b.count.cmp(&a.count));
    entries
}

pub fn top_n(distribution: &[DiseaseDistributionEntry], n: usize) -> Vec<RankedDisease> {
    distribution
        .iter()
        .take(n)
        .enumerate()
        .map(|(index, entry)| RankedDisease {
            rank: index + 1,
            disease: entry.name.clone(),
            cases: entry.count,
            trend: None,
        })
        .collect()
}

/// Year and month `back` calendar months before (`year`, `month`).
fn shift_month(year: i32, month: u32, back: u32) -> (i32, u32) {
    let total = year * 12 + month as i32 - 1 - back as i32;
    (total.div_euclid(12), total.rem_euclid(12) as u32 + 1)
}

/// Six trailing calendar-month buckets, oldest first, ending with the month
/// containing `now`. Records are counted regardless of any range filter.
pub fn monthly_buckets(records: &[DiagnosisRecord], now: DateTime<Utc>) -> Vec<MonthlyBucket> {
    let months: Vec<(i32, u32)> = (0..MONTHLY_BUCKETS as u32)
        .rev()
        .map(|back| shift_month(now.year(), now.month(), back))
        .collect();

    let mut buckets: Vec<MonthlyBucket> = months
        .iter()
        .map(|&(year, month)| {
            let name = MONTH_NAMES[month as usize - 1];
            MonthlyBucket {
                label: format!("{name} {year}"),
                month: name.to_string(),
                year,
                scan_count: 0,
                disease_counts: BTreeMap::new(),
            }
        })
        .collect();

    for record in records {
        let Some(at) = record.recorded_at() else {
            continue;
        };
        let key = (at.year(), at.month());
        if let Some(position) = months.iter().position(|month| *month == key) {
            let bucket = &mut buckets[position];
            bucket.scan_count += 1;
            *bucket
                .disease_counts
                .entry(record.disease_label().to_string())
                .or_insert(0) += 1;
        }
    }

    buckets
}

pub fn average_confidence(records: &[DiagnosisRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }

    let total: f64 = records.iter().map(DiagnosisRecord::confidence_or_zero).sum();
    total / records.len() as f64
}

/// First instant of the UTC calendar month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

pub fn summary_stats(
    all_records: &[DiagnosisRecord],
    filtered: &[DiagnosisRecord],
    active_patients: usize,
    now: DateTime<Utc>,
) -> SummaryStats {
    let start = month_start(now);
    let scans_this_month = all_records
        .iter()
        .filter(|record| record.recorded_at().is_some_and(|at| at >= start))
        .count();

    SummaryStats {
        total_scans: filtered.len(),
        active_patients,
        avg_confidence_percent: average_confidence(filtered),
        scans_this_month,
    }
}

/// Builds every analytics view for one range selection.
pub fn aggregate(
    records: &[DiagnosisRecord],
    range: TimeRange,
    now: DateTime<Utc>,
    active_patients: usize,
    config: &AnalyticsConfig,
) -> AnalyticsSnapshot {
    let filtered = filter_by_range(records, range, now);
    let distribution = distribution_with_palette(&filtered, &config.palette);
    let top_diseases = top_n(&distribution, config.top_n);
    let summary = summary_stats(records, &filtered, active_patients, now);

    tracing::debug!(
        range = %range,
        total = records.len(),
        filtered = filtered.len(),
        diseases = distribution.len(),
        "aggregated diagnosis records"
    );

    AnalyticsSnapshot {
        range,
        generated_at: now,
        average_confidence: summary.avg_confidence_percent,
        summary,
        monthly: monthly_buckets(records, now),
        distribution,
        top_diseases,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(diagnosis: Option<&str>, confidence: Option<f64>, timestamp: &str) -> DiagnosisRecord {
        DiagnosisRecord {
            diagnosis: diagnosis.map(str::to_string),
            confidence,
            timestamp: Some(timestamp.to_string()),
            ..DiagnosisRecord::default()
        }
    }

    fn june_20() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 20, 0, 0, 0).unwrap()
    }

    fn scenario_records() -> Vec<DiagnosisRecord> {
        vec![
            record(Some("Pneumonia"), Some(92.0), "2024-06-01T00:00:00Z"),
            record(Some("Pneumonia"), Some(88.0), "2024-06-15T00:00:00Z"),
            record(Some("Normal"), Some(99.0), "2024-05-01T00:00:00Z"),
        ]
    }

    #[test]
    fn month_range_drops_older_scan() {
        let records = scenario_records();
        let filtered = filter_by_range(&records, TimeRange::Month, june_20());

        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|r| r.disease_label() == "Pneumonia"));

        let distribution = distribution_by_disease(&filtered);
        assert_eq!(distribution.len(), 1);
        assert_eq!(distribution[0].name, "Pneumonia");
        assert_eq!(distribution[0].count, 2);
        assert!((average_confidence(&filtered) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn age_is_floored_to_whole_days() {
        let now = june_20();
        let almost_a_week = now - chrono::Duration::hours(7 * 24 + 23);
        let past_a_week = now - chrono::Duration::days(8);
        assert_eq!(age_in_days(now, almost_a_week), 7);
        assert_eq!(age_in_days(now, past_a_week), 8);
        assert_eq!(age_in_days(now, now + chrono::Duration::hours(1)), -1);

        let records = vec![
            record(Some("A"), None, &almost_a_week.to_rfc3339()),
            record(Some("B"), None, &past_a_week.to_rfc3339()),
        ];
        let week = filter_by_range(&records, TimeRange::Week, now);
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].disease_label(), "A");
    }

    #[test]
    fn ranges_are_nested() {
        let now = june_20();
        let records: Vec<DiagnosisRecord> = [0i64, 3, 7, 8, 29, 31, 89, 91, 364, 366, 2000]
            .iter()
            .map(|days| {
                let at = now - chrono::Duration::days(*days);
                record(Some("Scan"), Some(50.0), &at.to_rfc3339())
            })
            .chain(std::iter::once(record(Some("Scan"), None, "garbage")))
            .collect();

        let sizes: Vec<usize> = [
            TimeRange::Week,
            TimeRange::Month,
            TimeRange::Quarter,
            TimeRange::Year,
            TimeRange::All,
        ]
        .iter()
        .map(|range| filter_by_range(&records, *range, now).len())
        .collect();

        assert_eq!(sizes, vec![3, 5, 7, 9, 12]);

        let week = filter_by_range(&records, TimeRange::Week, now);
        let month = filter_by_range(&records, TimeRange::Month, now);
        assert!(week.iter().all(|r| month.contains(r)));
    }

    #[test]
    fn unparseable_timestamps_only_survive_all() {
        let records = vec![
            record(Some("Tuberculosis"), Some(70.0), "not a date"),
            DiagnosisRecord {
                diagnosis: Some("Normal".to_string()),
                ..DiagnosisRecord::default()
            },
        ];

        assert!(filter_by_range(&records, TimeRange::Year, june_20()).is_empty());

        let all = filter_by_range(&records, TimeRange::All, june_20());
        assert_eq!(all.len(), 2);
        let distribution = distribution_by_disease(&all);
        assert_eq!(distribution.iter().map(|e| e.count).sum::<usize>(), 2);
    }

    #[test]
    fn distribution_counts_missing_labels_as_unknown() {
        let records = vec![
            record(None, None, "2024-06-01T00:00:00Z"),
            record(Some(""), None, "2024-06-01T00:00:00Z"),
            record(Some("COVID-19"), None, "2024-06-01T00:00:00Z"),
        ];

        let distribution = distribution_by_disease(&records);
        assert_eq!(distribution[0].name, "Unknown");
        assert_eq!(distribution[0].count, 2);
        assert_eq!(distribution.iter().map(|e| e.count).sum::<usize>(), records.len());
    }

    #[test]
    fn distribution_ties_keep_first_seen_order() {
        let records: Vec<DiagnosisRecord> = ["Normal", "Pneumonia", "COVID-19", "Pneumonia", "Normal"]
            .into_iter()
            .map(|name| record(Some(name), None, "2024-06-01T00:00:00Z"))
            .collect();

        let distribution = distribution_by_disease(&records);
        let names: Vec<&str> = distribution.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Normal", "Pneumonia", "COVID-19"]);

        let colors: Vec<usize> = distribution.iter().map(|e| e.color_index).collect();
        assert_eq!(colors, vec![0, 1, 2]);
    }

    #[test]
    fn colour_index_wraps_around_palette() {
        let records: Vec<DiagnosisRecord> = (0..10)
            .map(|i| record(Some(format!("Disease {i}").as_str()), None, "2024-06-01T00:00:00Z"))
            .collect();

        let distribution = distribution_by_disease(&records);
        assert_eq!(distribution[8].name, "Disease 8");
        assert_eq!(distribution[8].color_index, 0);
        assert_eq!(distribution[9].color_index, 1);
        assert_eq!(distribution[9].color, PALETTE[1]);
    }

    #[test]
    fn padded_labels_are_separate_diseases() {
        let records = vec![
            record(Some(" Pneumonia "), None, "2024-06-01T00:00:00Z"),
            record(Some("Pneumonia"), None, "2024-06-01T00:00:00Z"),
        ];

        let distribution = distribution_by_disease(&records);
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].name, " Pneumonia ");
        assert_eq!(distribution[1].name, "Pneumonia");
    }

    #[test]
    fn configured_palette_drives_colours() {
        let palette = vec!["#111111".to_string(), "#222222".to_string()];
        let records: Vec<DiagnosisRecord> = ["A", "B", "C"]
            .into_iter()
            .map(|name| record(Some(name), None, "2024-06-01T00:00:00Z"))
            .collect();

        let distribution = distribution_with_palette(&records, &palette);
        let colors: Vec<&str> = distribution.iter().map(|e| e.color.as_str()).collect();
        assert_eq!(colors, vec!["#111111", "#222222", "#111111"]);
        assert_eq!(distribution[2].color_index, 0);

        let empty: Vec<String> = Vec::new();
        let fallback = distribution_with_palette(&records, &empty);
        assert_eq!(fallback[2].color, PALETTE[2]);
    }

    #[test]
    fn top_n_ranks_without_trend() {
        let records: Vec<DiagnosisRecord> = ["A", "B", "B", "C", "C", "C"]
            .into_iter()
            .map(|name| record(Some(name), None, "2024-06-01T00:00:00Z"))
            .collect();
        let distribution = distribution_by_disease(&records);

        let top = top_n(&distribution, 2);
        assert_eq!(top.len(), 2);
        assert_eq!((top[0].rank, top[0].disease.as_str(), top[0].cases), (1, "C", 3));
        assert_eq!((top[1].rank, top[1].disease.as_str(), top[1].cases), (2, "B", 2));
        assert!(top.iter().all(|entry| entry.trend.is_none()));

        assert_eq!(top_n(&distribution, 10).len(), 3);
        assert!(top_n(&distribution, 0).is_empty());
    }

    #[test]
    fn buckets_cover_six_trailing_months() {
        let buckets = monthly_buckets(&[], june_20());
        let labels: Vec<&str> = buckets.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Jan 2024", "Feb 2024", "Mar 2024", "Apr 2024", "May 2024", "Jun 2024"]
        );
        assert!(buckets.iter().all(|b| b.scan_count == 0 && b.disease_counts.is_empty()));
    }

    #[test]
    fn buckets_wrap_across_year_boundary() {
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();
        let buckets = monthly_buckets(&[], now);
        assert_eq!(buckets.len(), MONTHLY_BUCKETS);
        assert_eq!(buckets[0].label, "Sep 2023");
        assert_eq!(buckets[0].year, 2023);
        assert_eq!(buckets[5].month, "Feb");
    }

    #[test]
    fn buckets_count_unfiltered_records_in_window() {
        let records = vec![
            record(Some("Pneumonia"), None, "2024-06-01T00:00:00Z"),
            record(Some("Pneumonia"), None, "2024-06-15T00:00:00Z"),
            record(Some("Normal"), None, "2024-05-01T00:00:00Z"),
            record(None, None, "2024-01-31T23:59:59Z"),
            record(Some("Normal"), None, "2023-12-31T23:59:59Z"),
            record(Some("Normal"), None, "2023-06-15T00:00:00Z"),
            record(Some("Normal"), None, "garbage"),
        ];

        let buckets = monthly_buckets(&records, june_20());
        let counts: Vec<usize> = buckets.iter().map(|b| b.scan_count).collect();
        assert_eq!(counts, vec![1, 0, 0, 0, 1, 2]);
        assert_eq!(buckets[5].disease_counts.get("Pneumonia"), Some(&2));
        assert_eq!(buckets[0].disease_counts.get("Unknown"), Some(&1));
    }

    #[test]
    fn average_of_empty_is_zero() {
        assert_eq!(average_confidence(&[]), 0.0);

        let records = vec![
            record(Some("A"), Some(80.0), "2024-06-01T00:00:00Z"),
            record(Some("B"), Some(100.0), "2024-06-01T00:00:00Z"),
        ];
        assert_eq!(average_confidence(&records), 90.0);

        let with_missing = vec![
            record(Some("A"), Some(80.0), "2024-06-01T00:00:00Z"),
            record(Some("B"), None, "2024-06-01T00:00:00Z"),
        ];
        assert_eq!(average_confidence(&with_missing), 40.0);
    }

    #[test]
    fn summary_counts_calendar_month_over_all_records() {
        let records = scenario_records();
        let filtered = filter_by_range(&records, TimeRange::Week, june_20());
        let summary = summary_stats(&records, &filtered, 4, june_20());

        assert_eq!(summary.total_scans, 1);
        assert_eq!(summary.active_patients, 4);
        assert_eq!(summary.avg_confidence_percent, 88.0);
        assert_eq!(summary.scans_this_month, 2);
    }

    #[test]
    fn month_start_is_first_instant() {
        let start = month_start(Utc.with_ymd_and_hms(2024, 6, 20, 15, 45, 3).unwrap());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn empty_input_yields_zeroed_snapshot() {
        for range in [
            TimeRange::Week,
            TimeRange::Month,
            TimeRange::Quarter,
            TimeRange::Year,
            TimeRange::All,
        ] {
            let snapshot = aggregate(&[], range, june_20(), 0, &AnalyticsConfig::default());
            assert_eq!(snapshot.summary.total_scans, 0);
            assert_eq!(snapshot.summary.avg_confidence_percent, 0.0);
            assert_eq!(snapshot.monthly.len(), 6);
            assert!(snapshot.monthly.iter().all(|b| b.scan_count == 0));
            assert!(snapshot.distribution.is_empty());
            assert!(snapshot.top_diseases.is_empty());
        }
    }

    #[test]
    fn aggregate_is_repeatable() {
        let records = scenario_records();
        let config = AnalyticsConfig::default();

        let first = aggregate(&records, TimeRange::Quarter, june_20(), 2, &config);
        let second = aggregate(&records, TimeRange::Quarter, june_20(), 2, &config);

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }
}
