use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use shared::domain::{District, DistrictQuote, PriceQuote};
use tracing::{info, warn};

use crate::PriceSource;

pub const STUB_FETCH_DELAY: Duration = Duration::from_millis(1500);
pub const STUB_CURRENT_PRICE: f64 = 28.0;

/// `(district, price, min, max, trend)` rows the stub serves.
const STUB_DISTRICT_TABLE: [(&str, f64, f64, f64, &str); 6] = [
    ("Chennai", 28.0, 26.0, 30.0, "+2%"),
    ("Coimbatore", 27.0, 25.0, 29.0, "+1%"),
    ("Madurai", 26.0, 24.0, 28.0, "0%"),
    ("Thanjavur", 29.0, 27.0, 31.0, "+3%"),
    ("Trichy", 27.0, 25.0, 29.0, "+1%"),
    ("Salem", 28.0, 26.0, 30.0, "+2%"),
];

/// Fixed-latency, fixed-value source used when no backend is configured.
pub struct StubPriceSource {
    delay: Duration,
}

impl StubPriceSource {
    pub fn new() -> Self {
        Self {
            delay: STUB_FETCH_DELAY,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for StubPriceSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for StubPriceSource {
    async fn current_price(&self) -> Result<PriceQuote> {
        tokio::time::sleep(self.delay).await;
        Ok(PriceQuote {
            value: STUB_CURRENT_PRICE,
            captured_at: Utc::now(),
        })
    }

    async fn district_prices(&self) -> Result<Vec<DistrictQuote>> {
        let captured_at = Utc::now();
        STUB_DISTRICT_TABLE
            .iter()
            .map(|(name, price, min, max, trend)| {
                let district = District::known(name)
                    .with_context(|| format!("stub district '{name}' is not a known district"))?;
                Ok(DistrictQuote {
                    district,
                    quote: PriceQuote {
                        value: *price,
                        captured_at,
                    },
                    min: *min,
                    max: *max,
                    trend: (*trend).to_string(),
                })
            })
            .collect()
    }
}

/// The quotes currently on display. A refresh swaps them all at once.
#[derive(Debug, Clone, Default)]
pub struct PriceBoard {
    current: Option<PriceQuote>,
    districts: Vec<DistrictQuote>,
}

impl PriceBoard {
    pub fn current(&self) -> Option<&PriceQuote> {
        self.current.as_ref()
    }

    pub fn districts(&self) -> &[DistrictQuote] {
        &self.districts
    }

    pub fn district(&self, district: &District) -> Option<&DistrictQuote> {
        self.districts
            .iter()
            .find(|quote| &quote.district == district)
    }

    /// Fetches both views before replacing anything, so a failed refresh
    /// keeps the previous quotes.
    pub async fn refresh(&mut self, source: &dyn PriceSource) -> Result<()> {
        let fetched = async {
            let current = source
                .current_price()
                .await
                .context("failed to fetch current price")?;
            let districts = source
                .district_prices()
                .await
                .context("failed to fetch district prices")?;
            anyhow::Ok((current, districts))
        }
        .await;

        match fetched {
            Ok((current, districts)) => {
                info!(
                    price = current.value,
                    districts = districts.len(),
                    "prices: board refreshed"
                );
                self.current = Some(current);
                self.districts = districts;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "prices: refresh failed; keeping previous quotes");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/prices_tests.rs"]
mod tests;
