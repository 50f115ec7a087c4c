use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::DiagnosisRecord;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

/// Most recent scans from the `records` table, newest first.
pub async fn fetch_diagnoses(
    pool: &PgPool,
    user_id: Option<Uuid>,
    limit: i64,
) -> anyhow::Result<Vec<DiagnosisRecord>> {
    let mut query = String::from(
        "SELECT id::text AS id, patient_id::text AS patient_id, \
         patient_name::text AS patient_name, age::int8 AS age, sex::text AS sex, \
         diagnosis::text AS diagnosis, confidence::float8 AS confidence, \
         \"timestamp\"::text AS recorded_at \
         FROM records",
    );

    if user_id.is_some() {
        query.push_str(" WHERE user_id::text = $2");
    }
    query.push_str(" ORDER BY \"timestamp\" DESC LIMIT $1");

    let mut rows = sqlx::query(&query).bind(limit.max(1));
    if let Some(user_id) = user_id {
        rows = rows.bind(user_id.to_string());
    }

    let rows = rows
        .fetch_all(pool)
        .await
        .context("failed to fetch diagnosis records")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(DiagnosisRecord {
            id: row.try_get("id")?,
            patient_id: row.try_get("patient_id")?,
            patient_name: row.try_get("patient_name")?,
            age: row.try_get("age")?,
            sex: row.try_get("sex")?,
            diagnosis: row.try_get("diagnosis")?,
            confidence: row
                .try_get::<Option<f64>, _>("confidence")?
                .filter(|confidence| confidence.is_finite()),
            timestamp: row.try_get("recorded_at")?,
        });
    }

    tracing::debug!(count = records.len(), "fetched diagnosis records");
    Ok(records)
}

/// Distinct patients behind the `records` table.
pub async fn count_patients(pool: &PgPool, user_id: Option<Uuid>) -> anyhow::Result<usize> {
    let mut query = String::from("SELECT COUNT(DISTINCT patient_id) AS patients FROM records");
    if user_id.is_some() {
        query.push_str(" WHERE user_id::text = $1");
    }

    let mut rows = sqlx::query(&query);
    if let Some(user_id) = user_id {
        rows = rows.bind(user_id.to_string());
    }

    let patients: i64 = rows
        .fetch_one(pool)
        .await
        .context("failed to count patients")?
        .try_get("patients")?;

    Ok(usize::try_from(patients).unwrap_or(0))
}
