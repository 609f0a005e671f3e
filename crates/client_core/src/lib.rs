use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{CorrectionSubmission, DistrictQuote, PriceQuote};
use tracing::info;

pub mod alerts;
pub mod error;
pub mod http;
pub mod prices;
pub mod verification;

pub use alerts::AlertStore;
pub use error::{AlertError, FieldIssue, FieldProblem, FormField, ValidationFailure, VerificationError};
pub use http::{HttpClientConfig, HttpPriceSource, HttpSubmissionSink};
pub use prices::{PriceBoard, StubPriceSource};
pub use verification::{
    CorrectionDraft, SessionState, VerificationEngine, VerificationEvent, VerificationSnapshot,
};

/// Receives accepted corrections, typically the admin review queue.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, submission: &CorrectionSubmission) -> Result<()>;
}

/// Accepts every submission without forwarding it anywhere.
pub struct AcceptingSink;

#[async_trait]
impl SubmissionSink for AcceptingSink {
    async fn submit(&self, submission: &CorrectionSubmission) -> Result<()> {
        info!(
            scope = %submission.scope,
            district = %submission.district,
            price = submission.proposed_price,
            location = %submission.location_label,
            "sink: correction accepted for review"
        );
        Ok(())
    }
}

/// Produces the aggregate and per-district quotes the dashboard shows.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn current_price(&self) -> Result<PriceQuote>;
    async fn district_prices(&self) -> Result<Vec<DistrictQuote>>;
}
