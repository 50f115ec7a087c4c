//! Derived analytics over AI-assisted diagnosis scan history.
//!
//! Everything under [`analytics`], [`dashboard`] and [`patients`] is a pure
//! function of its inputs. The reference instant is always passed in, so the
//! same records and `now` give the same views.

pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod models;
pub mod patients;
pub mod report;
pub mod source;

pub use analytics::aggregate;
pub use config::AnalyticsConfig;
pub use models::{AnalyticsSnapshot, DiagnosisRecord, TimeRange};
