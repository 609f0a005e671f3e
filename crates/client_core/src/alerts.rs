use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{AlertId, AlertKind, AlertRecord, AlertTarget};
use tracing::{debug, info};

use crate::error::AlertError;

pub const DEFAULT_THRESHOLD_PRICE: f64 = 30.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub enabled: bool,
    pub threshold_price: f64,
    pub target: AlertTarget,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_price: DEFAULT_THRESHOLD_PRICE,
            target: AlertTarget::AllDistricts,
        }
    }
}

/// Alert settings plus the notification list, newest record first.
#[derive(Debug, Clone)]
pub struct AlertStore {
    config: AlertConfig,
    records: Vec<AlertRecord>,
    next_id: u64,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}

impl AlertStore {
    pub fn new(config: AlertConfig) -> Self {
        Self {
            config,
            records: Vec::new(),
            next_id: 1,
        }
    }

    /// Starts from existing records. Ids handed out later continue after the
    /// highest seeded id so none is ever reused.
    pub fn with_records(config: AlertConfig, mut records: Vec<AlertRecord>) -> Self {
        let mut seen = HashSet::new();
        records.retain(|record| seen.insert(record.id));
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let next_id = records.iter().map(|record| record.id.0).max().unwrap_or(0) + 1;
        Self {
            config,
            records,
            next_id,
        }
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    pub fn records(&self) -> &[AlertRecord] {
        &self.records
    }

    pub fn get(&self, id: AlertId) -> Option<&AlertRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|record| !record.read).count()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        info!(enabled, "alerts: notifications toggled");
    }

    pub fn set_threshold(&mut self, price: f64, target: AlertTarget) -> Result<(), AlertError> {
        if !price.is_finite() || price <= 0.0 {
            return Err(AlertError::InvalidThreshold(price));
        }
        self.config.threshold_price = price;
        self.config.target = target;
        debug!(price, target = %self.config.target, "alerts: threshold updated");
        Ok(())
    }

    pub fn create_alert_from_config(&mut self) -> Result<AlertId, AlertError> {
        if !self.config.enabled {
            return Err(AlertError::Disabled);
        }
        let message = format!(
            "Alert set: Notify when price reaches ₹{} in {}",
            self.config.threshold_price, self.config.target
        );
        Ok(self.record(AlertKind::ThresholdSet, message, Utc::now()))
    }

    /// Adds a record produced outside the store, e.g. by a price change
    /// detector. Records older than the current head are slotted in by
    /// `created_at` so the list stays newest first.
    pub fn record(
        &mut self,
        kind: AlertKind,
        message: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> AlertId {
        let id = AlertId(self.next_id);
        self.next_id += 1;
        let position = self
            .records
            .iter()
            .position(|record| record.created_at <= created_at)
            .unwrap_or(self.records.len());
        self.records.insert(
            position,
            AlertRecord {
                id,
                kind,
                message: message.into(),
                created_at,
                read: false,
            },
        );
        info!(id = %id, ?kind, "alerts: record added");
        id
    }

    pub fn mark_read(&mut self, id: AlertId) {
        if let Some(record) = self.records.iter_mut().find(|record| record.id == id) {
            record.read = true;
        }
    }

    pub fn delete(&mut self, id: AlertId) {
        self.records.retain(|record| record.id != id);
    }
}

/// The sample notifications the dashboard ships with.
pub fn reference_records(now: DateTime<Utc>) -> Vec<AlertRecord> {
    vec![
        AlertRecord {
            id: AlertId(1),
            kind: AlertKind::PriceIncrease,
            message: "Price increased by ₹2 in Chennai".to_string(),
            created_at: now - Duration::hours(2),
            read: false,
        },
        AlertRecord {
            id: AlertId(2),
            kind: AlertKind::PriceDrop,
            message: "Price decreased in Madurai district".to_string(),
            created_at: now - Duration::hours(5),
            read: false,
        },
        AlertRecord {
            id: AlertId(3),
            kind: AlertKind::MarketUpdate,
            message: "New market data available for Coimbatore".to_string(),
            created_at: now - Duration::days(1),
            read: true,
        },
    ]
}

#[cfg(test)]
#[path = "tests/alerts_tests.rs"]
mod tests;
