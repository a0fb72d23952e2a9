//! Bounded exact-sum search over a pool of bill items, and bundle scoring.

use std::collections::BTreeSet;

use crate::config::{SearchBudget, Thresholds};
use crate::domain::DomainFilter;
use crate::model::{BillItem, CandidateSet, PoolOrdering};
use crate::vocab::ItemTraits;

pub const ALL_ORDERINGS: [PoolOrdering; 4] = [
    PoolOrdering::Physical,
    PoolOrdering::SectionSorted,
    PoolOrdering::AmountDescending,
    PoolOrdering::NonClinicalFirst,
];

// ---------------------------------------------------------------------------
// Subset sum (bounded DP)
// ---------------------------------------------------------------------------

/// Exact subset sum by first-reach dynamic programming.
///
/// `reach[s]` holds `1 + index` of the item that first made sum `s`
/// reachable; entries are never overwritten, so the reconstructed subset
/// favors items that come early in `amounts`. Memory is `target + 1` slots,
/// which is why callers bound `target` by [`SearchBudget::max_target`].
pub fn subset_sum(amounts: &[i64], target: i64) -> Option<Vec<usize>> {
    let t = usize::try_from(target).ok().filter(|&t| t > 0)?;
    let mut reach: Vec<u32> = vec![0; t + 1];

    for (i, &amount) in amounts.iter().enumerate() {
        let a = match usize::try_from(amount) {
            Ok(a) if a > 0 && a <= t => a,
            _ => continue,
        };
        // Descending sums: reach[s - a] still reflects the items before i.
        for s in (a..=t).rev() {
            if reach[s] == 0 && (s == a || reach[s - a] != 0) {
                reach[s] = (i + 1) as u32;
            }
        }
        if reach[t] != 0 {
            break;
        }
    }
    if reach[t] == 0 {
        return None;
    }

    let mut picked = Vec::new();
    let mut s = t;
    while s > 0 {
        let i = reach[s] as usize - 1;
        picked.push(i);
        s -= usize::try_from(amounts[i]).ok()?;
    }
    picked.sort_unstable();
    Some(picked)
}

// ---------------------------------------------------------------------------
// Pool orderings
// ---------------------------------------------------------------------------

/// Candidates for a target under one ordering: positive items no larger than
/// the target, ordered, then truncated to the budget.
pub fn order_pool<'a>(
    pool: &[&'a BillItem],
    target: i64,
    ordering: PoolOrdering,
    max_candidates: usize,
) -> Vec<&'a BillItem> {
    let mut items: Vec<&BillItem> =
        pool.iter().copied().filter(|i| i.total > 0 && i.total <= target).collect();
    match ordering {
        PoolOrdering::Physical => items.sort_by_key(|i| i.position),
        PoolOrdering::SectionSorted => {
            items.sort_by(|a, b| a.section.cmp(&b.section).then(a.position.cmp(&b.position)))
        }
        PoolOrdering::AmountDescending => {
            items.sort_by(|a, b| b.total.cmp(&a.total).then(a.position.cmp(&b.position)))
        }
        PoolOrdering::NonClinicalFirst => items.sort_by_key(|i| {
            let traits = ItemTraits::of(&i.section, &i.description);
            (!traits.non_clinical(), traits.clinical_signal(), i.position)
        }),
    }
    items.truncate(max_candidates);
    items
}

// ---------------------------------------------------------------------------
// Bundle scoring
// ---------------------------------------------------------------------------

/// Coherence of a bundle as evidence for one line. Higher is better.
///
/// Starts at 100; loses points for physical gaps, extra sections, oversize
/// bundles and items outside the line's domain. Catch-all lines lose points
/// per clinical item and gain per amenity or administrative item.
pub fn score_bundle(
    items: &[&BillItem],
    filter: DomainFilter,
    generic_line: bool,
    thresholds: &Thresholds,
) -> i32 {
    if items.is_empty() {
        return 0;
    }
    let mut score = 100i32;

    let min = items.iter().map(|i| i.position).min().unwrap_or(0);
    let max = items.iter().map(|i| i.position).max().unwrap_or(0);
    let gaps = (max - min + 1).saturating_sub(items.len());
    score -= (gaps as i32 * 3).min(40);

    let sections: BTreeSet<&str> = items.iter().map(|i| i.section.as_str()).collect();
    score -= 10 * (sections.len() as i32 - 1);

    if items.len() > thresholds.max_bundle_size {
        score -= 5 * (items.len() - thresholds.max_bundle_size) as i32;
    }

    if filter.is_restricted() {
        let outsiders = items.iter().filter(|i| !filter.admits(&i.section, &i.description)).count();
        if outsiders == 0 {
            score += 10;
        } else {
            score -= 20 * outsiders as i32;
        }
    }

    if generic_line {
        for item in items {
            let traits = ItemTraits::of(&item.section, &item.description);
            if traits.clinical_signal() {
                score -= 15;
            } else if traits.non_clinical() {
                score += 5;
            }
        }
    }

    score
}

// ---------------------------------------------------------------------------
// Ranked search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Solution<'a> {
    pub items: Vec<&'a BillItem>,
    pub ordering: PoolOrdering,
    pub score: i32,
}

impl Solution<'_> {
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }

    pub fn total(&self) -> i64 {
        self.items.iter().map(|i| i.total).sum()
    }

    pub fn candidate(&self) -> CandidateSet {
        CandidateSet { item_ids: self.ids(), total: self.total(), score: self.score }
    }

    /// Higher score, then fewer items, then earliest positions.
    fn rank_key(&self) -> (i32, usize, Vec<usize>) {
        (-self.score, self.items.len(), self.items.iter().map(|i| i.position).collect())
    }

    fn equivalent(&self, other: &Self) -> bool {
        self.score == other.score && self.items.len() == other.items.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome<'a> {
    /// Distinct solutions, best first.
    pub ranked: Vec<Solution<'a>>,
    pub skipped_over_budget: bool,
}

impl<'a> SearchOutcome<'a> {
    pub fn from_solutions(solutions: Vec<Solution<'a>>) -> Self {
        let mut ranked = Vec::new();
        for s in solutions {
            push_distinct(&mut ranked, s);
        }
        sort_solutions(&mut ranked);
        Self { ranked, skipped_over_budget: false }
    }

    pub fn best(&self) -> Option<&Solution<'a>> {
        self.ranked.first()
    }

    /// Two distinct item sets are indistinguishable by score and size.
    pub fn ambiguous(&self) -> bool {
        match (self.ranked.first(), self.ranked.get(1)) {
            (Some(a), Some(b)) => a.equivalent(b),
            _ => false,
        }
    }

    pub fn candidates(&self, limit: usize) -> Vec<CandidateSet> {
        self.ranked.iter().take(limit).map(Solution::candidate).collect()
    }

    pub fn merge(&mut self, other: SearchOutcome<'a>) {
        self.skipped_over_budget |= other.skipped_over_budget;
        for s in other.ranked {
            push_distinct(&mut self.ranked, s);
        }
        sort_solutions(&mut self.ranked);
    }
}

/// Run the exact-sum search under every ordering and rank the distinct results.
pub fn search<'a>(
    pool: &[&'a BillItem],
    target: i64,
    orderings: &[PoolOrdering],
    filter: DomainFilter,
    generic_line: bool,
    budget: &SearchBudget,
    thresholds: &Thresholds,
) -> SearchOutcome<'a> {
    if target > budget.max_target {
        tracing::debug!(amount = target, max_target = budget.max_target, "subset search skipped: target over budget");
        return SearchOutcome { ranked: Vec::new(), skipped_over_budget: true };
    }

    let mut ranked: Vec<Solution<'a>> = Vec::new();
    for &ordering in orderings {
        let candidates = order_pool(pool, target, ordering, budget.max_candidates);
        let amounts: Vec<i64> = candidates.iter().map(|i| i.total).collect();
        let Some(picked) = subset_sum(&amounts, target) else { continue };

        let mut items: Vec<&BillItem> = picked.into_iter().map(|k| candidates[k]).collect();
        items.sort_by_key(|i| i.position);
        let score = score_bundle(&items, filter, generic_line, thresholds);
        push_distinct(&mut ranked, Solution { items, ordering, score });
    }
    sort_solutions(&mut ranked);
    SearchOutcome { ranked, skipped_over_budget: false }
}

fn push_distinct<'a>(ranked: &mut Vec<Solution<'a>>, solution: Solution<'a>) {
    let ids = solution.ids();
    if !ranked.iter().any(|s| s.ids() == ids) {
        ranked.push(solution);
    }
}

fn sort_solutions(ranked: &mut [Solution<'_>]) {
    ranked.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
}
