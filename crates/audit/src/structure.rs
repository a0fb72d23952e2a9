//! Read-only indices over the currently available bill items.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::SearchBudget;
use crate::model::BillItem;
use crate::vocab::{self, ANCHORS};

/// A set of adjacent items accounting for one amount.
///
/// Explicit blocks are followed by an item whose stated total equals their
/// sum (an accounting subtotal, `row_id`). Virtual blocks are whole sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtotalBlock {
    pub item_ids: Vec<String>,
    pub total: i64,
    pub explicit: bool,
    pub label: String,
    pub row_id: Option<String>,
}

impl SubtotalBlock {
    fn overlaps(&self, other: &Self) -> bool {
        self.item_ids.iter().any(|id| other.item_ids.contains(id))
    }
}

#[derive(Debug)]
pub struct BillIndex<'a> {
    /// Available items in physical order.
    pub available: Vec<&'a BillItem>,
    by_id: BTreeMap<String, usize>,
    by_amount: BTreeMap<i64, Vec<usize>>,
    by_text: BTreeMap<String, Vec<usize>>,
    pub blocks: Vec<SubtotalBlock>,
}

impl<'a> BillIndex<'a> {
    /// Index `available`, detecting subtotal rows among the items themselves.
    pub fn build(available: Vec<&'a BillItem>, budget: &SearchBudget) -> Self {
        let subtotals = explicit_blocks(&available);
        Self::with_subtotals(available, &subtotals, budget)
    }

    /// Index `available` against subtotal blocks detected on the whole bill.
    ///
    /// Subtotal rows restate their components and are never matchable items.
    /// A block is kept only while all of its components are still available.
    pub fn with_subtotals(available: Vec<&'a BillItem>, subtotals: &[SubtotalBlock], budget: &SearchBudget) -> Self {
        let rows: BTreeSet<&str> = subtotals.iter().filter_map(|b| b.row_id.as_deref()).collect();
        let available: Vec<&'a BillItem> =
            available.into_iter().filter(|item| !rows.contains(item.id.as_str())).collect();

        let mut by_id = BTreeMap::new();
        let mut by_amount: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        let mut by_text: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, item) in available.iter().enumerate() {
            by_id.insert(item.id.clone(), i);
            by_amount.entry(item.total).or_default().push(i);
            by_text.entry(vocab::normalize(&item.description)).or_default().push(i);
        }

        let mut blocks: Vec<SubtotalBlock> = subtotals
            .iter()
            .filter(|b| b.item_ids.iter().all(|id| by_id.contains_key(id)))
            .cloned()
            .collect();
        for section in section_blocks(&available) {
            if !blocks.iter().any(|b| b.item_ids == section.item_ids) {
                blocks.push(section);
            }
        }
        blocks.truncate(budget.max_blocks);

        Self { available, by_id, by_amount, by_text, blocks }
    }

    pub fn get(&self, id: &str) -> Option<&'a BillItem> {
        self.by_id.get(id).map(|&i| self.available[i])
    }

    /// Items for `ids`, skipping unknown ones.
    pub fn items(&self, ids: &[String]) -> Vec<&'a BillItem> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn with_amount(&self, amount: i64) -> Vec<&'a BillItem> {
        self.resolve(self.by_amount.get(&amount))
    }

    /// Items whose normalized description equals `normalized`.
    pub fn with_text(&self, normalized: &str) -> Vec<&'a BillItem> {
        self.resolve(self.by_text.get(normalized))
    }

    /// Items whose normalized description contains, or is contained in, `normalized`.
    pub fn with_text_fragment(&self, normalized: &str) -> Vec<&'a BillItem> {
        let mut idx: Vec<usize> = self
            .by_text
            .iter()
            .filter(|(text, _)| {
                text.as_str() != normalized
                    && !text.is_empty()
                    && (text.contains(normalized) || normalized.contains(text.as_str()))
            })
            .flat_map(|(_, v)| v.iter().copied())
            .collect();
        idx.sort_unstable();
        idx.into_iter().map(|i| self.available[i]).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Explicit and virtual blocks, or disjoint combinations of up to
    /// `max_combination` of them, totalling `target`.
    pub fn block_combinations(&self, target: i64, max_combination: usize) -> Vec<Vec<&SubtotalBlock>> {
        let mut found = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        self.combine(target, max_combination, 0, 0, &mut stack, &mut found);
        found
    }

    fn combine<'s>(
        &'s self,
        target: i64,
        max_combination: usize,
        start: usize,
        sum: i64,
        stack: &mut Vec<usize>,
        found: &mut Vec<Vec<&'s SubtotalBlock>>,
    ) {
        if !stack.is_empty() && sum == target {
            found.push(stack.iter().map(|&i| &self.blocks[i]).collect());
            return;
        }
        if stack.len() >= max_combination || sum > target {
            return;
        }
        for i in start..self.blocks.len() {
            let block = &self.blocks[i];
            if stack.iter().any(|&j| self.blocks[j].overlaps(block)) {
                continue;
            }
            stack.push(i);
            self.combine(target, max_combination, i + 1, sum + block.total, stack, found);
            stack.pop();
        }
    }

    fn resolve(&self, idx: Option<&Vec<usize>>) -> Vec<&'a BillItem> {
        idx.map(|v| v.iter().map(|&i| self.available[i]).collect()).unwrap_or_default()
    }
}

/// Right-to-left running sum before each item: two or more adjacent items
/// adding up exactly to the item's total form a block.
pub fn explicit_blocks(available: &[&BillItem]) -> Vec<SubtotalBlock> {
    let mut blocks = Vec::new();
    for (k, subtotal) in available.iter().enumerate() {
        if subtotal.total <= 0 {
            continue;
        }
        let mut running = 0i64;
        for j in (0..k).rev() {
            running += available[j].total;
            if running > subtotal.total {
                break;
            }
            if running == subtotal.total && k - j >= 2 {
                blocks.push(SubtotalBlock {
                    item_ids: available[j..k].iter().map(|i| i.id.clone()).collect(),
                    total: running,
                    explicit: true,
                    label: format!("subtotal:{}", subtotal.id),
                    row_id: Some(subtotal.id.clone()),
                });
                break;
            }
        }
    }
    blocks
}

fn section_blocks(available: &[&BillItem]) -> Vec<SubtotalBlock> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: BTreeMap<&str, Vec<&BillItem>> = BTreeMap::new();
    for item in available {
        let entry = groups.entry(item.section.as_str()).or_default();
        if entry.is_empty() {
            order.push(item.section.as_str());
        }
        entry.push(item);
    }

    order
        .into_iter()
        .filter_map(|section| {
            let items = groups.get(section)?;
            (items.len() >= 2).then(|| SubtotalBlock {
                item_ids: items.iter().map(|i| i.id.clone()).collect(),
                total: items.iter().map(|i| i.total).sum(),
                explicit: false,
                label: format!("section:{section}"),
                row_id: None,
            })
        })
        .collect()
}

/// Positions of structural anchors (pavilion rights, bed days) on the whole bill.
pub fn anchor_positions(items: &[BillItem]) -> Vec<usize> {
    items
        .iter()
        .filter(|item| ANCHORS.matches(&vocab::normalize(&item.description)))
        .map(|item| item.position)
        .collect()
}

/// Distance to the nearest anchor; zero when the bill has none.
pub fn anchor_distance(anchors: &[usize], position: usize) -> usize {
    anchors.iter().map(|&a| a.abs_diff(position)).min().unwrap_or(0)
}
