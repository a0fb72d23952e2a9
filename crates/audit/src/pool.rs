use std::collections::BTreeSet;

use crate::model::BillItem;

/// Bill items already attributed to an adjudication line.
///
/// Threaded by value through the two-pass loop: each strong match returns a
/// new pool, so no line can observe a half-applied consumption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionPool {
    consumed: BTreeSet<String>,
}

impl ConsumptionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_consumed(&self, id: &str) -> bool {
        self.consumed.contains(id)
    }

    /// Mark `ids` consumed. Ids already in the pool are left as they are and
    /// reported back so the caller can log the conflict.
    pub fn consume(mut self, ids: &[String]) -> (Self, Vec<String>) {
        let mut conflicts = Vec::new();
        for id in ids {
            if !self.consumed.insert(id.clone()) {
                conflicts.push(id.clone());
            }
        }
        (self, conflicts)
    }

    /// Unconsumed items, in the order given (physical order for a prepared bill).
    pub fn available<'a>(&self, items: &'a [BillItem]) -> Vec<&'a BillItem> {
        items.iter().filter(|item| !self.is_consumed(&item.id)).collect()
    }

    pub fn len(&self) -> usize {
        self.consumed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.consumed.iter().map(String::as_str)
    }
}
