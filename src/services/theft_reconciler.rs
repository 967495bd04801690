//! Theft reconciliation over the sale ledger
//!
//! A sale that stays pending longer than the reconciliation window with no
//! explanation is promoted to a `TheftRecord`. The only explanation is the
//! passage of time today: nothing correlates shelf depletion with sales yet,
//! so every sale older than the window is promoted.
//!
//! Only the most recent `retention` records are kept, but the ids of
//! evicted records stay in a separate history of `FLAGGED_ID_HISTORY` ids.
//! An id in that history is never promoted again, and the engine refuses to
//! record a sale under it. Ids older than the history are forgotten.
//!
//! Lock order: theft collection, then ledger. `sweep` and `candidates` both
//! follow it and so does sale recording in the engine.

use crate::domain::sale::{Sale, TheftRecord};
use crate::services::sale_ledger::SaleLedger;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashSet;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

/// Ids of flagged sales remembered after their records are evicted
pub const FLAGGED_ID_HISTORY: usize = 4096;

/// Retained theft records plus the ids of records already evicted
#[derive(Debug, Default)]
pub struct TheftState {
    records: VecDeque<TheftRecord>,
    evicted_ids: FxHashSet<String>,
    evicted_order: VecDeque<String>,
}

impl TheftState {
    /// Whether a sale id was ever flagged, within the remembered history
    pub fn is_flagged(&self, sale_id: &str) -> bool {
        self.evicted_ids.contains(sale_id) || self.records.iter().any(|t| t.sale_id == sale_id)
    }

    fn remember_evicted(&mut self, sale_id: String) {
        if self.evicted_ids.insert(sale_id.clone()) {
            self.evicted_order.push_back(sale_id);
        }
        while self.evicted_order.len() > FLAGGED_ID_HISTORY {
            if let Some(old) = self.evicted_order.pop_front() {
                self.evicted_ids.remove(&old);
            }
        }
    }
}

pub struct TheftReconciler {
    thefts: Mutex<TheftState>,
    window: Duration,
    retention: usize,
}

/// Sales eligible for promotion at `now`, skipping ids already flagged
///
/// Expiry is strict: a sale exactly `window` old is still pending. Sales
/// stamped in the future are never expired.
fn expired<'a>(
    sales: &'a [Sale],
    thefts: &TheftState,
    window: Duration,
    now: DateTime<Utc>,
) -> Vec<(usize, &'a Sale)> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for (idx, sale) in sales.iter().enumerate() {
        if now.signed_duration_since(sale.timestamp) <= window {
            continue;
        }
        if thefts.is_flagged(&sale.sale_id) {
            continue;
        }
        if seen.insert(sale.sale_id.as_str()) {
            out.push((idx, sale));
        }
    }
    out
}

impl TheftReconciler {
    pub fn new(window: Duration, retention: usize) -> Self {
        Self { thefts: Mutex::new(TheftState::default()), window, retention }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, TheftState> {
        self.thefts.lock()
    }

    /// Promote expired sales and prune the ledger
    ///
    /// Returns the records created by this sweep. A pending sale whose id is
    /// already flagged is left in the ledger.
    pub fn sweep(&self, ledger: &SaleLedger, now: DateTime<Utc>) -> Vec<TheftRecord> {
        let mut thefts = self.thefts.lock();
        let mut sales = ledger.lock();

        let promoted: Vec<(usize, TheftRecord)> = expired(&sales, &thefts, self.window, now)
            .into_iter()
            .map(|(idx, sale)| (idx, TheftRecord::from_sale(sale)))
            .collect();

        if promoted.is_empty() {
            return Vec::new();
        }

        let marked: HashSet<usize> = promoted.iter().map(|(idx, _)| *idx).collect();
        let mut idx = 0;
        sales.retain(|_| {
            let keep = !marked.contains(&idx);
            idx += 1;
            keep
        });

        let created: Vec<TheftRecord> = promoted.into_iter().map(|(_, record)| record).collect();
        thefts.records.extend(created.iter().cloned());

        let overflow = thefts.records.len().saturating_sub(self.retention);
        if overflow > 0 {
            let evicted: Vec<TheftRecord> = thefts.records.drain(..overflow).collect();
            for record in evicted {
                thefts.remember_evicted(record.sale_id);
            }
            warn!(evicted = %overflow, retention = %self.retention, "theft_records_evicted");
        }

        created
    }

    /// Records a sweep at `now` would create, without mutating anything
    pub fn candidates(&self, ledger: &SaleLedger, now: DateTime<Utc>) -> Vec<TheftRecord> {
        let thefts = self.thefts.lock();
        let sales = ledger.lock();
        expired(&sales, &thefts, self.window, now)
            .into_iter()
            .map(|(_, sale)| TheftRecord::from_sale(sale))
            .collect()
    }

    /// Retained records, oldest first
    pub fn list(&self) -> Vec<TheftRecord> {
        self.thefts.lock().records.iter().cloned().collect()
    }

    /// Whether `sale_id` was flagged, including evicted records
    pub fn contains(&self, sale_id: &str) -> bool {
        self.thefts.lock().is_flagged(sale_id)
    }

    pub fn len(&self) -> usize {
        self.thefts.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.thefts.lock().records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sale::THEFT_REASON;
    use crate::domain::types::Confidence;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn sale(id: &str, ts: DateTime<Utc>) -> Sale {
        Sale {
            sale_id: id.to_string(),
            shelf_id: "D1".to_string(),
            items_sold: 2,
            timestamp: ts,
            product_name: "Product 1".to_string(),
        }
    }

    fn reconciler() -> TheftReconciler {
        TheftReconciler::new(Duration::minutes(10), 20)
    }

    #[test]
    fn test_sweep_promotes_expired_sale() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0()));
        let rec = reconciler();

        let created = rec.sweep(&ledger, t0() + Duration::minutes(11));
        assert_eq!(created.len(), 1);

        let theft = &created[0];
        assert_eq!(theft.sale_id, "S1");
        assert_eq!(theft.items_removed, 2);
        assert_eq!(theft.timestamp, t0());
        assert_eq!(theft.confidence, Confidence::High);
        assert_eq!(theft.reason, THEFT_REASON);

        assert!(ledger.is_empty());
        assert_eq!(rec.list(), created);
    }

    #[test]
    fn test_window_boundary_is_strict() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0()));
        let rec = reconciler();

        assert!(rec.sweep(&ledger, t0() + Duration::minutes(10)).is_empty());
        assert_eq!(ledger.len(), 1);

        let created = rec.sweep(&ledger, t0() + Duration::minutes(10) + Duration::milliseconds(1));
        assert_eq!(created.len(), 1);
    }

    #[test]
    fn test_future_sale_never_expires() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0() + Duration::hours(1)));
        let rec = reconciler();

        assert!(rec.sweep(&ledger, t0()).is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0()));
        let rec = reconciler();
        let later = t0() + Duration::minutes(30);

        rec.sweep(&ledger, later);
        assert!(rec.sweep(&ledger, later).is_empty());
        assert_eq!(rec.len(), 1);
    }

    #[test]
    fn test_flagged_id_is_not_promoted_twice() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0()));
        let rec = reconciler();
        rec.sweep(&ledger, t0() + Duration::minutes(11));

        // Same id reappears pending
        ledger.lock().push(sale("S1", t0()));
        assert!(rec.sweep(&ledger, t0() + Duration::minutes(20)).is_empty());
        assert_eq!(rec.len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_only_expired_sales_removed() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("old", t0()));
        ledger.lock().push(sale("fresh", t0() + Duration::minutes(8)));
        let rec = reconciler();

        rec.sweep(&ledger, t0() + Duration::minutes(15));
        let pending: Vec<_> = ledger.snapshot().into_iter().map(|s| s.sale_id).collect();
        assert_eq!(pending, vec!["fresh"]);
    }

    #[test]
    fn test_retention_keeps_most_recent() {
        let ledger = SaleLedger::new();
        for i in 0..25 {
            ledger.lock().push(sale(&format!("S{i}"), t0() + Duration::seconds(i)));
        }
        let rec = reconciler();

        let created = rec.sweep(&ledger, t0() + Duration::hours(1));
        assert_eq!(created.len(), 25);

        let kept = rec.list();
        assert_eq!(kept.len(), 20);
        assert_eq!(kept.first().unwrap().sale_id, "S5");
        assert_eq!(kept.last().unwrap().sale_id, "S24");
    }

    #[test]
    fn test_evicted_id_is_not_promoted_again() {
        let ledger = SaleLedger::new();
        let rec = TheftReconciler::new(Duration::minutes(10), 2);
        for i in 0..3 {
            ledger.lock().push(sale(&format!("S{i}"), t0() + Duration::seconds(i)));
        }
        rec.sweep(&ledger, t0() + Duration::hours(1));
        assert_eq!(rec.len(), 2);
        assert!(rec.list().iter().all(|t| t.sale_id != "S0"));
        assert!(rec.contains("S0"));

        // S0 shows up pending again after its record was evicted
        ledger.lock().push(sale("S0", t0()));
        assert!(rec.sweep(&ledger, t0() + Duration::hours(2)).is_empty());
        assert!(rec.candidates(&ledger, t0() + Duration::hours(2)).is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_flagged_id_history_is_bounded() {
        let mut state = TheftState::default();
        for i in 0..FLAGGED_ID_HISTORY + 5 {
            state.remember_evicted(format!("S{i}"));
        }
        assert_eq!(state.evicted_order.len(), FLAGGED_ID_HISTORY);
        assert_eq!(state.evicted_ids.len(), FLAGGED_ID_HISTORY);
        assert!(!state.is_flagged("S0"));
        assert!(state.is_flagged(&format!("S{}", FLAGGED_ID_HISTORY + 4)));
    }

    #[test]
    fn test_candidates_do_not_mutate() {
        let ledger = SaleLedger::new();
        ledger.lock().push(sale("S1", t0()));
        let rec = reconciler();
        let later = t0() + Duration::minutes(11);

        let preview = rec.candidates(&ledger, later);
        assert_eq!(preview.len(), 1);
        assert_eq!(ledger.len(), 1);
        assert!(rec.is_empty());

        assert_eq!(rec.sweep(&ledger, later), preview);
    }
}
