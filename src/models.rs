use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Label used when a record carries no usable diagnosis.
pub const UNKNOWN_DISEASE: &str = "Unknown";

/// Chart colours handed out to diseases in first-seen order.
pub const PALETTE: [&str; 8] = [
    "#00A86B", "#0066CC", "#6366F1", "#F59E0B", "#EF4444", "#8B5CF6", "#EC4899", "#10B981",
];

/// One scan result as returned by the history endpoint.
///
/// Every field is optional on the wire. Mistyped values decode as absent so a
/// single bad row never poisons a whole payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisRecord {
    #[serde(deserialize_with = "opaque_id")]
    pub id: Option<String>,
    #[serde(alias = "patientId", deserialize_with = "lenient_string")]
    pub patient_id: Option<String>,
    #[serde(alias = "patientName", deserialize_with = "lenient_string")]
    pub patient_name: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub age: Option<i64>,
    #[serde(deserialize_with = "lenient_string")]
    pub sex: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub diagnosis: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub timestamp: Option<String>,
}

impl DiagnosisRecord {
    /// Disease label, or [`UNKNOWN_DISEASE`] when absent or empty. Labels are
    /// taken verbatim: `" Pneumonia "` and `"Pneumonia"` stay distinct.
    pub fn disease_label(&self) -> &str {
        self.diagnosis
            .as_deref()
            .filter(|label| !label.is_empty())
            .unwrap_or(UNKNOWN_DISEASE)
    }

    pub fn confidence_or_zero(&self) -> f64 {
        self.confidence.unwrap_or(0.0)
    }

    /// Parsed instant of the scan, if the timestamp is usable.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp.as_deref().and_then(parse_timestamp)
    }
}

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses the timestamp shapes the backends emit. Values without an offset are
/// read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn opaque_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(id)) => Some(id),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(value.filter(|number| number.is_finite()))
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Recency window selected on the analytics page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Week,
    #[default]
    Month,
    #[serde(alias = "gear")]
    Quarter,
    Year,
    All,
}

impl TimeRange {
    /// Largest whole-day age a record may have; `None` is unbounded.
    pub fn max_age_days(self) -> Option<i64> {
        match self {
            TimeRange::Week => Some(7),
            TimeRange::Month => Some(30),
            TimeRange::Quarter => Some(90),
            TimeRange::Year => Some(365),
            TimeRange::All => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Quarter => "quarter",
            TimeRange::Year => "year",
            TimeRange::All => "all",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            TimeRange::Week => "last 7 days",
            TimeRange::Month => "last 30 days",
            TimeRange::Quarter => "last 3 months",
            TimeRange::Year => "last year",
            TimeRange::All => "all time",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown time range `{0}` (expected week, month, quarter, year or all)")]
pub struct UnknownTimeRange(pub String);

impl FromStr for TimeRange {
    type Err = UnknownTimeRange;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(TimeRange::Week),
            "month" => Ok(TimeRange::Month),
            "quarter" | "gear" => Ok(TimeRange::Quarter),
            "year" => Ok(TimeRange::Year),
            "all" => Ok(TimeRange::All),
            _ => Err(UnknownTimeRange(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBucket {
    pub label: String,
    pub month: String,
    pub year: i32,
    pub scan_count: usize,
    pub disease_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseDistributionEntry {
    pub name: String,
    pub count: usize,
    pub color_index: usize,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedDisease {
    pub rank: usize,
    pub disease: String,
    pub cases: usize,
    /// Period-over-period change. Always `None`: no historical baseline exists.
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub total_scans: usize,
    pub active_patients: usize,
    pub avg_confidence_percent: f64,
    pub scans_this_month: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub range: TimeRange,
    pub generated_at: DateTime<Utc>,
    pub summary: SummaryStats,
    pub average_confidence: f64,
    pub monthly: Vec<MonthlyBucket>,
    pub distribution: Vec<DiseaseDistributionEntry>,
    pub top_diseases: Vec<RankedDisease>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 90.0 {
            ConfidenceTier::High
        } else if confidence >= 70.0 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDiagnosis {
    pub id: Option<String>,
    pub patient_id: String,
    pub patient: String,
    pub disease: String,
    pub confidence: i64,
    pub date: Option<NaiveDate>,
    pub tier: ConfidenceTier,
    pub critical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub total_scans: usize,
    pub scans_today: usize,
    pub patients: usize,
    pub critical_cases: usize,
    pub recent: Vec<RecentDiagnosis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: Option<String>,
    pub name: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub total_scans: usize,
    pub latest_diagnosis: Option<String>,
    pub last_visit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStats {
    pub total_patients: usize,
    pub total_scans: usize,
    /// Rounded to one decimal; 0 for an empty roster.
    pub avg_scans_per_patient: f64,
}
