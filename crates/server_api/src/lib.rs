use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{seq::SliceRandom, Rng};
use shared::{
    domain::{SnapshotId, SubmissionId},
    error::ApiError,
    protocol::{
        CurrentPriceResponse, DistrictPrice, DistrictsResponse, HistoryPoint, HistoryResponse,
        PriceSnapshot, PriceStats, SourceReading, SubmissionKind, SubmissionRecord,
        SubmissionStatus, SubmissionsResponse, SubmitRequest, VerifyRequest, VerifyResponse,
    },
};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Readings outside this band are treated as scraping noise.
pub const VALID_PRICE_RANGE: std::ops::RangeInclusive<f64> = 10.0..=100.0;
pub const DEFAULT_RETENTION_DAYS: i64 = 30;
/// Longest retention window accepted; larger values are clamped.
pub const MAX_RETENTION_DAYS: i64 = 3650;
pub const DEFAULT_HISTORY_DAYS: usize = 7;
const DISTRICT_TABLE_SIZE: usize = 12;
const DISTRICT_PRICE_FLOOR: f64 = 20.0;
const DISTRICT_PRICE_CEILING: f64 = 35.0;
const TREND_STEPS: [i32; 7] = [-2, -1, 0, 0, 1, 2, 2];

pub const TAMIL_NADU_DISTRICTS: [&str; 26] = [
    "Chennai",
    "Coimbatore",
    "Madurai",
    "Thanjavur",
    "Trichy",
    "Salem",
    "Erode",
    "Tirunelveli",
    "Vellore",
    "Thoothukudi",
    "Dindigul",
    "Kanyakumari",
    "Kanchipuram",
    "Tiruvallur",
    "Cuddalore",
    "Nagapattinam",
    "Pudukkottai",
    "Sivaganga",
    "Ramanathapuram",
    "Virudhunagar",
    "Theni",
    "Namakkal",
    "Dharmapuri",
    "Krishnagiri",
    "Ariyalur",
    "Perambalur",
];

/// `(source, low, high)` bands for the simulated scrape.
const SIMULATED_SOURCES: [(&str, u32, u32); 5] = [
    ("commodityonline", 26, 32),
    ("commoditymarketlive", 27, 31),
    ("kisantak", 25, 30),
    ("krishidunia", 28, 33),
    ("krishidunia", 27, 32),
];

/// Daily averages used to seed an empty price book.
const SEED_HISTORY: [f64; 7] = [25.0, 26.0, 26.0, 27.0, 27.0, 28.0, 28.0];

/// Aggregated snapshots, oldest first.
#[derive(Default)]
pub struct PriceBook {
    snapshots: Vec<PriceSnapshot>,
}

impl PriceBook {
    fn latest(&self) -> Result<&PriceSnapshot, ApiError> {
        self.snapshots.last().ok_or_else(no_price_data)
    }
}

/// Submissions waiting for admin review, in arrival order.
#[derive(Default)]
pub struct SubmissionQueue {
    records: Vec<SubmissionRecord>,
}

impl SubmissionQueue {
    fn enqueue(&mut self, mut record: SubmissionRecord) -> SubmissionRecord {
        record.id = SubmissionId(self.records.len() as u64 + 1);
        self.records.push(record.clone());
        record
    }

    fn pending(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.status == SubmissionStatus::Pending)
            .count()
    }
}

/// In-memory price book and review queue shared by every request handler.
#[derive(Clone)]
pub struct ApiContext {
    prices: Arc<RwLock<PriceBook>>,
    queue: Arc<Mutex<SubmissionQueue>>,
    retention: Duration,
}

impl ApiContext {
    pub fn new(retention_days: i64) -> Self {
        Self {
            prices: Arc::new(RwLock::new(PriceBook::default())),
            queue: Arc::new(Mutex::new(SubmissionQueue::default())),
            retention: Duration::days(retention_days.clamp(1, MAX_RETENTION_DAYS)),
        }
    }

    /// Fills the book with one snapshot per day ending at `now`.
    pub async fn seed_history(&self, now: DateTime<Utc>) {
        let mut book = self.prices.write().await;
        let days = SEED_HISTORY.len() as i64;
        book.snapshots = SEED_HISTORY
            .iter()
            .enumerate()
            .map(|(index, price)| PriceSnapshot {
                id: SnapshotId(index as u64 + 1),
                average_price: *price,
                min_price: price - 2.0,
                max_price: price + 2.0,
                source_count: SIMULATED_SOURCES.len(),
                sources: Vec::new(),
                timestamp: now - Duration::days(days - 1 - index as i64),
            })
            .collect();
    }
}

impl Default for ApiContext {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_DAYS)
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn signed_percent(value: i32) -> String {
    if value >= 0 {
        format!("+{value}%")
    } else {
        format!("{value}%")
    }
}

/// One decimal with an explicit sign; `-0.0` reads as `+0.0%`.
fn signed_change(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    if value >= 0.0 {
        format!("+{value:.1}%")
    } else {
        format!("{value:.1}%")
    }
}

fn no_price_data() -> ApiError {
    ApiError::not_found("No price data available. Please refresh prices.")
}

/// One reading per configured source, drawn from that source's usual band.
pub fn simulated_samples<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Vec<SourceReading> {
    SIMULATED_SOURCES
        .iter()
        .map(|(source, low, high)| SourceReading {
            source: (*source).to_string(),
            price: f64::from(rng.gen_range(*low..=*high)),
            timestamp: now,
        })
        .collect()
}

pub async fn current_price(ctx: &ApiContext) -> Result<CurrentPriceResponse, ApiError> {
    let book = ctx.prices.read().await;
    let latest = book.latest()?;
    Ok(CurrentPriceResponse {
        current_price: latest.average_price,
        min_price: latest.min_price,
        max_price: latest.max_price,
        source_count: latest.source_count,
        last_updated: latest.timestamp,
    })
}

/// Folds a batch of source readings into a new snapshot and drops snapshots
/// that fell out of the retention window.
pub async fn refresh_prices(
    ctx: &ApiContext,
    readings: Vec<SourceReading>,
    now: DateTime<Utc>,
) -> Result<PriceSnapshot, ApiError> {
    let valid: Vec<f64> = readings
        .iter()
        .map(|reading| reading.price)
        .filter(|price| VALID_PRICE_RANGE.contains(price))
        .collect();
    if valid.is_empty() {
        return Err(ApiError::validation("No valid prices found from sources"));
    }

    let average = round_to(valid.iter().sum::<f64>() / valid.len() as f64, 2);
    let min = round_to(valid.iter().copied().fold(f64::INFINITY, f64::min), 2);
    let max = round_to(valid.iter().copied().fold(f64::NEG_INFINITY, f64::max), 2);

    let mut book = ctx.prices.write().await;
    book.snapshots.push(PriceSnapshot {
        id: SnapshotId(0),
        average_price: average,
        min_price: min,
        max_price: max,
        source_count: valid.len(),
        sources: readings,
        timestamp: now,
    });

    if let Some(cutoff) = now.checked_sub_signed(ctx.retention) {
        book.snapshots.retain(|snapshot| snapshot.timestamp > cutoff);
    }
    for (index, snapshot) in book.snapshots.iter_mut().enumerate() {
        snapshot.id = SnapshotId(index as u64 + 1);
    }

    info!(average, min, max, sources = valid.len(), "prices: refreshed");
    book.latest().cloned()
}

/// The last `days` snapshots, seven by default. `days = 0` returns the whole
/// retained history.
pub async fn history(ctx: &ApiContext, days: Option<usize>) -> HistoryResponse {
    let book = ctx.prices.read().await;
    let skip = match days.unwrap_or(DEFAULT_HISTORY_DAYS) {
        0 => 0,
        days => book.snapshots.len().saturating_sub(days),
    };
    let prices: Vec<PriceSnapshot> = book.snapshots[skip..].to_vec();
    let chart_data = prices
        .iter()
        .map(|snapshot| HistoryPoint {
            date: snapshot.timestamp.format("%b %d").to_string(),
            price: snapshot.average_price,
            min: snapshot.min_price,
            max: snapshot.max_price,
        })
        .collect();
    HistoryResponse {
        count: prices.len(),
        prices,
        chart_data,
    }
}

/// Handles the yes/no answer to "is this price correct?". A "no" must carry
/// the user's price and is queued for review.
pub async fn verify(ctx: &ApiContext, request: VerifyRequest) -> Result<VerifyResponse, ApiError> {
    let district = request
        .district
        .filter(|district| !district.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string());

    let current_average = ctx
        .prices
        .read()
        .await
        .latest()
        .map_or(0.0, |snapshot| snapshot.average_price);

    if request.is_correct {
        info!(price = current_average, %district, "verify: price confirmed");
        return Ok(VerifyResponse::Confirmed {
            confirmed_price: current_average,
            district,
            timestamp: Utc::now(),
        });
    }

    let price = request
        .price
        .ok_or_else(|| ApiError::validation("Please provide the correct price"))?;
    if !price.is_finite() || price <= 0.0 {
        return Err(ApiError::validation("Price must be a positive number"));
    }

    let submission = ctx.queue.lock().await.enqueue(SubmissionRecord {
        id: SubmissionId(0),
        kind: SubmissionKind::Correction,
        user_price: price,
        system_price: Some(current_average),
        district,
        market: request.market.unwrap_or_default(),
        contact: None,
        notes: "User reported incorrect price".to_string(),
        status: SubmissionStatus::Pending,
        timestamp: Utc::now(),
    });
    info!(
        id = %submission.id,
        price,
        district = %submission.district,
        market = %submission.market,
        "verify: correction queued"
    );
    Ok(VerifyResponse::CorrectionQueued { submission })
}

pub async fn submit(ctx: &ApiContext, request: SubmitRequest) -> Result<SubmissionRecord, ApiError> {
    if request.district.trim().is_empty() {
        return Err(ApiError::validation("Missing required field: district"));
    }
    if !request.price.is_finite() || request.price <= 0.0 {
        return Err(ApiError::validation("Price must be a positive number"));
    }

    let submission = ctx.queue.lock().await.enqueue(SubmissionRecord {
        id: SubmissionId(0),
        kind: SubmissionKind::NewSubmission,
        user_price: request.price,
        system_price: None,
        district: request.district,
        market: request.market.unwrap_or_default(),
        contact: request.contact.filter(|contact| !contact.is_empty()),
        notes: request.notes.unwrap_or_default(),
        status: SubmissionStatus::Pending,
        timestamp: Utc::now(),
    });
    info!(
        id = %submission.id,
        price = submission.user_price,
        district = %submission.district,
        "submit: new price queued"
    );
    Ok(submission)
}

/// District table derived from the latest average, highest price first.
pub async fn district_prices<R: Rng>(
    ctx: &ApiContext,
    rng: &mut R,
) -> Result<DistrictsResponse, ApiError> {
    let (base, last_updated) = {
        let book = ctx.prices.read().await;
        let latest = book.latest()?;
        (latest.average_price, latest.timestamp)
    };

    let mut districts: Vec<DistrictPrice> = TAMIL_NADU_DISTRICTS
        .iter()
        .take(DISTRICT_TABLE_SIZE)
        .map(|district| {
            let variation = rng.gen_range(-3.0..=3.0);
            let price = round_to(base + variation, 1)
                .clamp(DISTRICT_PRICE_FLOOR, DISTRICT_PRICE_CEILING);
            let trend = TREND_STEPS.choose(rng).copied().unwrap_or(0);
            DistrictPrice {
                district: (*district).to_string(),
                price,
                min: round_to(price * 0.9, 1),
                max: round_to(price * 1.1, 1),
                trend: signed_percent(trend),
                source_count: rng.gen_range(2..=5),
            }
        })
        .collect();
    districts.sort_by(|a, b| b.price.total_cmp(&a.price));

    Ok(DistrictsResponse {
        total_districts: districts.len(),
        districts,
        state_average: base,
        last_updated,
    })
}

pub async fn submissions(
    ctx: &ApiContext,
    status: Option<SubmissionStatus>,
) -> SubmissionsResponse {
    let queue = ctx.queue.lock().await;
    let data: Vec<SubmissionRecord> = queue
        .records
        .iter()
        .filter(|record| status.map_or(true, |status| record.status == status))
        .cloned()
        .collect();
    SubmissionsResponse {
        count: data.len(),
        data,
        pending_count: queue.pending(),
    }
}

pub async fn stats(ctx: &ApiContext) -> Result<PriceStats, ApiError> {
    let (total_submissions, pending_submissions) = {
        let queue = ctx.queue.lock().await;
        (queue.records.len(), queue.pending())
    };

    let book = ctx.prices.read().await;
    let latest = book.latest()?;

    let recent = &book.snapshots[book.snapshots.len().saturating_sub(7)..];
    let seven_day_average = round_to(
        recent.iter().map(|snapshot| snapshot.average_price).sum::<f64>() / recent.len() as f64,
        2,
    );

    let change = match book.snapshots.len() {
        0 | 1 => 0.0,
        len => {
            let previous = book.snapshots[len - 2].average_price;
            round_to((latest.average_price - previous) / previous * 100.0, 1)
        }
    };

    Ok(PriceStats {
        current_price: latest.average_price,
        min_today: latest.min_price,
        max_today: latest.max_price,
        source_count: latest.source_count,
        seven_day_average,
        weekly_change: signed_change(change),
        total_submissions,
        pending_submissions,
        data_points: book.snapshots.len(),
        last_updated: latest.timestamp,
    })
}
