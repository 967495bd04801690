//! Bounded, time-ordered alert journal

use crate::domain::alert::Alert;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct AlertJournal {
    /// Insertion order, oldest at the front
    alerts: Mutex<VecDeque<Alert>>,
    retention: usize,
}

impl AlertJournal {
    pub fn new(retention: usize) -> Self {
        Self { alerts: Mutex::new(VecDeque::with_capacity(retention + 1)), retention }
    }

    /// Push, then evict oldest-inserted until within retention
    pub fn append(&self, alert: Alert) {
        let mut alerts = self.alerts.lock();
        alerts.push_back(alert);
        while alerts.len() > self.retention {
            alerts.pop_front();
        }
    }

    /// Newest timestamp first. Equal timestamps list the most recently
    /// inserted alert first.
    pub fn list(&self) -> Vec<Alert> {
        let mut out: Vec<Alert> = self.alerts.lock().iter().rev().cloned().collect();
        // Stable sort keeps the reversed insertion order among ties
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::Severity;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn alert(sensor: &str, ts: DateTime<Utc>) -> Alert {
        Alert::stock("low", sensor, "Low Stock Alert", String::new(), Severity::Medium, ts)
    }

    #[test]
    fn test_list_descending_by_timestamp() {
        let journal = AlertJournal::new(50);
        journal.append(alert("D1", t0()));
        journal.append(alert("D2", t0() + Duration::seconds(5)));
        journal.append(alert("D3", t0() - Duration::seconds(5)));

        let ids: Vec<_> = journal.list().into_iter().map(|a| a.id).collect();
        assert!(ids[0].contains("-D2-"));
        assert!(ids[1].contains("-D1-"));
        assert!(ids[2].contains("-D3-"));
    }

    #[test]
    fn test_ties_list_most_recent_insert_first() {
        let journal = AlertJournal::new(50);
        journal.append(alert("D1", t0()));
        journal.append(alert("D2", t0()));

        let list = journal.list();
        assert!(list[0].id.contains("-D2-"));
        assert!(list[1].id.contains("-D1-"));
    }

    #[test]
    fn test_retention_evicts_oldest_inserted() {
        let journal = AlertJournal::new(3);
        for i in 0..5 {
            journal.append(alert(&format!("D{i}"), t0() + Duration::seconds(i)));
        }
        assert_eq!(journal.len(), 3);
        let list = journal.list();
        assert!(list.iter().all(|a| !a.id.contains("-D0-") && !a.id.contains("-D1-")));
    }

    #[test]
    fn test_list_does_not_mutate() {
        let journal = AlertJournal::new(50);
        journal.append(alert("D1", t0()));
        assert_eq!(journal.list(), journal.list());
        assert_eq!(journal.len(), 1);
    }
}
