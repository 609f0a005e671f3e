use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{SnapshotId, SubmissionId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReading {
    pub source: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub id: SnapshotId,
    pub average_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub source_count: usize,
    pub sources: Vec<SourceReading>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentPriceResponse {
    pub current_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub source_count: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    pub price: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub prices: Vec<PriceSnapshot>,
    pub chart_data: Vec<HistoryPoint>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerifyResponse {
    Confirmed {
        confirmed_price: f64,
        district: String,
        timestamp: DateTime<Utc>,
    },
    CorrectionQueued {
        submission: SubmissionRecord,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub price: f64,
    pub district: String,
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Correction,
    NewSubmission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub kind: SubmissionKind,
    pub user_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_price: Option<f64>,
    pub district: String,
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    pub notes: String,
    pub status: SubmissionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionsResponse {
    pub data: Vec<SubmissionRecord>,
    pub count: usize,
    pub pending_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictPrice {
    pub district: String,
    pub price: f64,
    pub min: f64,
    pub max: f64,
    pub trend: String,
    pub source_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictsResponse {
    pub districts: Vec<DistrictPrice>,
    pub state_average: f64,
    pub total_districts: usize,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub current_price: f64,
    pub min_today: f64,
    pub max_today: f64,
    pub source_count: usize,
    pub seven_day_average: f64,
    pub weekly_change: String,
    pub total_submissions: usize,
    pub pending_submissions: usize,
    pub data_points: usize,
    pub last_updated: DateTime<Utc>,
}
