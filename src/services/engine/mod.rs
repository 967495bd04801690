//! Shelf state engine
//!
//! Owns one instance of every shelf component and exposes the operations
//! the transports call. The engine is synchronous and shared behind an
//! `Arc`; no lock is ever held across an `.await` because no method is
//! async.
//!
//! Every side-effecting operation has an `_at` variant that takes the
//! clock value explicitly.


use crate::domain::alert::MisplacementRequest;
use crate::domain::error::{ConfigurationError, ValidationError};
use crate::domain::sale::{SaleInput, SaleReceipt, SalesSummary, TheftRecord};
use crate::domain::shelf::{ShelfConfig, ShelfEvaluation, ShelfStatusEntry};
use crate::domain::types::SensorReading;
use crate::domain::Alert;
use crate::infra::config::{Config, Policy};
use crate::infra::metrics::Metrics;
use crate::services::alert_journal::AlertJournal;
use crate::services::sale_ledger::{validate_sale, SaleLedger};
use crate::services::sensor_store::SensorStore;
use crate::services::shelf_registry::ShelfRegistry;
use crate::services::stock_estimator::{alert_for, StockEstimator};
use crate::services::theft_reconciler::TheftReconciler;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of ingesting a batch of readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub accepted: usize,
    pub ignored: usize,
}

pub struct ShelfEngine {
    registry: ShelfRegistry,
    sensors: SensorStore,
    estimator: StockEstimator,
    ledger: SaleLedger,
    thefts: TheftReconciler,
    alerts: AlertJournal,
    policy: Policy,
    metrics: Arc<Metrics>,
}

impl ShelfEngine {
    /// Build an engine, validating the policy and every shelf
    pub fn new(
        shelves: BTreeMap<String, ShelfConfig>,
        policy: Policy,
        metrics: Arc<Metrics>,
    ) -> Result<Self, ConfigurationError> {
        policy.validate()?;
        let registry = ShelfRegistry::new(shelves)?;
        let sensors = SensorStore::new(registry.sensor_ids());

        Ok(Self {
            sensors,
            estimator: StockEstimator::new(&policy),
            ledger: SaleLedger::new(),
            thefts: TheftReconciler::new(policy.theft_window(), policy.theft_retention),
            alerts: AlertJournal::new(policy.alert_retention),
            registry,
            policy,
            metrics,
        })
    }

    pub fn from_config(config: &Config, metrics: Arc<Metrics>) -> Result<Self, ConfigurationError> {
        Self::new(config.shelves().clone(), config.policy().clone(), metrics)
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    // ------------------------------------------------------------------
    // Readings
    // ------------------------------------------------------------------

    /// Store the latest value for a known sensor. Unknown ids are dropped.
    pub fn ingest_reading(&self, sensor_id: &str, value: i64) -> bool {
        let accepted = self.sensors.ingest(sensor_id, value);
        self.metrics.record_reading(accepted);
        if !accepted {
            debug!(sensor_id = %sensor_id, value = %value, "reading_ignored");
        }
        accepted
    }

    pub fn ingest_batch(&self, readings: &[SensorReading]) -> IngestReport {
        let mut report = IngestReport::default();
        for reading in readings {
            if self.ingest_reading(&reading.sensor_id, reading.value) {
                report.accepted += 1;
            } else {
                report.ignored += 1;
            }
        }
        report
    }

    pub fn read_sensor(&self, sensor_id: &str) -> i64 {
        self.sensors.read(sensor_id)
    }

    /// Raw value of every known sensor
    pub fn sensor_snapshot(&self) -> BTreeMap<String, i64> {
        self.sensors.snapshot()
    }

    // ------------------------------------------------------------------
    // Sales
    // ------------------------------------------------------------------

    pub fn record_sale(&self, input: SaleInput) -> Result<SaleReceipt, ValidationError> {
        self.record_sale_at(input, Utc::now())
    }

    /// Validate and append a sale. On error the ledger is unchanged.
    pub fn record_sale_at(
        &self,
        input: SaleInput,
        now: DateTime<Utc>,
    ) -> Result<SaleReceipt, ValidationError> {
        let result = validate_sale(input, &self.registry, now).and_then(|sale| {
            let thefts = self.thefts.lock();
            let mut sales = self.ledger.lock();

            let duplicate = sales.iter().any(|s| s.sale_id == sale.sale_id)
                || thefts.is_flagged(&sale.sale_id);
            if duplicate {
                return Err(ValidationError::DuplicateSaleId(sale.sale_id));
            }

            sales.push(sale.clone());
            Ok(SaleReceipt { accepted: true, sale, total_sale_count: sales.len() })
        });

        match &result {
            Ok(receipt) => {
                self.metrics.record_sale(true);
                info!(
                    sale_id = %receipt.sale.sale_id,
                    shelf_id = %receipt.sale.shelf_id,
                    items_sold = %receipt.sale.items_sold,
                    pending = %receipt.total_sale_count,
                    "sale_recorded"
                );
            }
            Err(e) => {
                self.metrics.record_sale(false);
                warn!(error = %e, "sale_rejected");
            }
        }
        result
    }

    pub fn sales_summary(&self) -> SalesSummary {
        self.sales_summary_at(Utc::now())
    }

    pub fn sales_summary_at(&self, now: DateTime<Utc>) -> SalesSummary {
        self.ledger.summary(now)
    }

    pub fn pending_sales(&self) -> usize {
        self.ledger.len()
    }

    // ------------------------------------------------------------------
    // Shelf status
    // ------------------------------------------------------------------

    /// Evaluate every shelf against current readings without side effects
    pub fn evaluate_shelves(&self) -> Vec<ShelfEvaluation> {
        self.registry
            .iter()
            .map(|(sensor_id, cfg)| {
                let distance = self.sensors.read(sensor_id);
                let weight = self.sensors.read(&cfg.force_sensor);
                self.estimator.evaluate(sensor_id, cfg, distance, weight)
            })
            .collect()
    }

    pub fn get_shelf_status(&self) -> BTreeMap<String, ShelfStatusEntry> {
        self.get_shelf_status_at(Utc::now())
    }

    /// Status keyed by both sensor ids of every shelf
    ///
    /// Appends one alert per empty or low shelf on every call.
    pub fn get_shelf_status_at(&self, now: DateTime<Utc>) -> BTreeMap<String, ShelfStatusEntry> {
        self.metrics.record_status_poll();
        let mut status = BTreeMap::new();

        for evaluation in self.evaluate_shelves() {
            if let Some(alert) = alert_for(&evaluation, now) {
                info!(
                    shelf_id = %evaluation.sensor_id,
                    status = %evaluation.estimate.status.as_str(),
                    count = %evaluation.estimate.count,
                    "stock_alert"
                );
                self.metrics.record_alert(alert.severity);
                self.alerts.append(alert);
            }
            status.insert(evaluation.sensor_id.clone(), evaluation.distance_entry());
            status.insert(evaluation.force_sensor.clone(), evaluation.force_entry());
        }

        status
    }

    pub fn get_alerts(&self) -> Vec<Alert> {
        self.alerts.list()
    }

    // ------------------------------------------------------------------
    // Thefts
    // ------------------------------------------------------------------

    pub fn get_potential_thefts(&self) -> Vec<TheftRecord> {
        self.get_potential_thefts_at(Utc::now())
    }

    /// Sweep the ledger at `now`, then return every retained theft record
    pub fn get_potential_thefts_at(&self, now: DateTime<Utc>) -> Vec<TheftRecord> {
        self.metrics.record_theft_sweep();
        let created = self.thefts.sweep(&self.ledger, now);

        for theft in &created {
            info!(
                sale_id = %theft.sale_id,
                shelf_id = %theft.shelf_id,
                items = %theft.items_removed,
                "theft_flagged"
            );
        }
        self.metrics.record_thefts_flagged(created.len() as u64);

        self.thefts.list()
    }

    /// Records a sweep at `now` would create
    pub fn theft_candidates(&self, now: DateTime<Utc>) -> Vec<TheftRecord> {
        self.thefts.candidates(&self.ledger, now)
    }

    pub fn flagged_thefts(&self) -> usize {
        self.thefts.len()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    pub fn get_shelf_config(&self) -> &BTreeMap<String, ShelfConfig> {
        self.registry.shelves()
    }

    /// Build a classifier request for one shelf
    ///
    /// Without an explicit expected product the shelf's configured product
    /// is used. Image content is never inspected.
    pub fn misplacement_request(
        &self,
        shelf_id: &str,
        expected_product: Option<&str>,
        image: Bytes,
    ) -> Result<MisplacementRequest, ValidationError> {
        let shelf_id = shelf_id.trim();
        if shelf_id.is_empty() {
            return Err(ValidationError::MissingFields(vec!["shelf_id".to_string()]));
        }
        if image.is_empty() {
            return Err(ValidationError::InvalidField {
                field: "image".to_string(),
                reason: "image is empty".to_string(),
            });
        }

        let expected_product = match expected_product.filter(|p| !p.trim().is_empty()) {
            Some(product) => product.to_string(),
            None => self.registry.product_for(shelf_id).map(str::to_string).ok_or_else(|| {
                ValidationError::InvalidField {
                    field: "shelf_id".to_string(),
                    reason: format!("unknown shelf {shelf_id} and no expected_product given"),
                }
            })?,
        };

        Ok(MisplacementRequest { shelf_id: shelf_id.to_string(), expected_product, image })
    }
}
