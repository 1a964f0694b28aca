//! Pieces shared by the retrieval and generation reports

use serde::{Deserialize, Serialize};

use ragprobe_core::Error;

/// A record excluded from aggregate denominators, with the cause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unevaluable {
    pub record_id: String,
    pub reason: String,
}

impl Unevaluable {
    pub fn new(record_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            reason: reason.into(),
        }
    }
}

/// `sum / count`, or 0 when nothing was counted
pub(crate) fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 { 0.0 } else { sum / count as f64 }
}

pub(crate) fn sort_unevaluable(items: &mut [Unevaluable]) {
    items.sort_by(|a, b| a.record_id.cmp(&b.record_id));
}

/// Records whose work was dropped by cancellation, by input position
pub(crate) fn cancelled_records(record_ids: &[String], discarded: &[usize]) -> Vec<Unevaluable> {
    discarded
        .iter()
        .filter_map(|&i| record_ids.get(i))
        .map(|id| Unevaluable::new(id.clone(), Error::Cancelled.to_string()))
        .collect()
}
