//! Layered matching of one adjudication line against the available bill.
//!
//! Strategies run in priority order for each target amount (the line value,
//! then its copay) and stop at the first Strong result. Every attempt is kept
//! in the trace; only the summary decides what gets consumed.

use crate::config::AuditConfig;
use crate::domain::DomainFilter;
use crate::model::{
    AdjudicationLine, AttemptStatus, BillItem, CandidateSet, Pass, PoolOrdering, Strategy,
    TraceAttempt, TraceSummary, Traceability, LineTrace,
};
use crate::search::{self, SearchOutcome, Solution, ALL_ORDERINGS};
use crate::structure::{anchor_distance, BillIndex, SubtotalBlock};
use crate::vocab::{self, GENERIC_DESCRIPTIONS};

/// Read-only context shared by every line of a run.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'c> {
    pub config: &'c AuditConfig,
    /// Positions of structural anchors on the whole bill.
    pub anchors: &'c [usize],
}

pub fn trace_line(
    line: &AdjudicationLine,
    filter: DomainFilter,
    pass: Pass,
    index: &BillIndex<'_>,
    ctx: &MatchContext<'_>,
) -> LineTrace {
    let mut attempts = Vec::new();
    let targets = targets(line);
    if targets.is_empty() {
        attempts.push(TraceAttempt::fail(Strategy::ExactAmount, 0, "line has no positive amount"));
    }
    for target in targets {
        if run_strategies(line, target, filter, index, ctx, &mut attempts) {
            break;
        }
    }
    let summary = summarize(&attempts, index);
    tracing::debug!(
        line = %line.id,
        traceability = ?summary.traceability,
        strategy = ?summary.strategy,
        items = summary.item_ids.len(),
        "line traced"
    );
    LineTrace { pass, attempts, summary }
}

fn targets(line: &AdjudicationLine) -> Vec<i64> {
    let mut out = Vec::new();
    if line.value > 0 {
        out.push(line.value);
    }
    if line.copay > 0 && line.copay != line.value {
        out.push(line.copay);
    }
    out
}

/// Returns true once a Strong attempt has been recorded.
fn run_strategies(
    line: &AdjudicationLine,
    target: i64,
    filter: DomainFilter,
    index: &BillIndex<'_>,
    ctx: &MatchContext<'_>,
    attempts: &mut Vec<TraceAttempt>,
) -> bool {
    let mut record = |new: Vec<TraceAttempt>| {
        let strong = new.iter().any(|a| a.traceability == Traceability::Strong);
        attempts.extend(new);
        strong
    };

    if record(vec![exact_amount(target, filter, index, ctx)]) {
        return true;
    }
    if record(vec![glosa(line, target, index, ctx)]) {
        return true;
    }
    if record(vec![contiguous_window(target, filter, index, ctx)]) {
        return true;
    }
    if record(vec![subtotal_block(target, filter, index, ctx)]) {
        return true;
    }
    match filter {
        DomainFilter::Generic => {
            if record(vec![residual_segments(target, index, ctx)]) {
                return true;
            }
            record(vec![full_pool(target, index, ctx)])
        }
        _ => record(subset_search(target, filter, index, ctx)),
    }
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn exact_amount(target: i64, filter: DomainFilter, index: &BillIndex<'_>, ctx: &MatchContext<'_>) -> TraceAttempt {
    let mut hits = index.with_amount(target);
    if hits.is_empty() {
        return TraceAttempt::fail(Strategy::ExactAmount, target, "no item with this amount");
    }
    hits.sort_by(|a, b| {
        exact_rank(a, filter, ctx)
            .cmp(&exact_rank(b, filter, ctx))
            .then_with(|| a.id.cmp(&b.id))
    });

    let t = &ctx.config.thresholds;
    let candidates = hits
        .iter()
        .take(ctx.config.search.max_ranked_candidates)
        .map(|item| CandidateSet {
            item_ids: vec![item.id.clone()],
            total: item.total,
            score: search::score_bundle(&[*item], filter, matches!(filter, DomainFilter::Generic), t),
        })
        .collect();

    let unique = hits.len() == 1;
    let in_domain = !filter.is_strict() || filter.admits(&hits[0].section, &hits[0].description);
    let note = if !unique {
        Some(format!("{} items share this amount", hits.len()))
    } else if !in_domain {
        Some("only item with this amount lies outside the line's domain".to_string())
    } else {
        None
    };
    TraceAttempt {
        strategy: Strategy::ExactAmount,
        target,
        status: if unique { AttemptStatus::Ok } else { AttemptStatus::Ambiguous },
        traceability: if unique && in_domain { Traceability::Strong } else { Traceability::Weak },
        item_ids: vec![hits[0].id.clone()],
        candidates,
        note,
    }
}

/// Anchor proximity, domain consistency, then physical position.
fn exact_rank(item: &BillItem, filter: DomainFilter, ctx: &MatchContext<'_>) -> (usize, bool, usize) {
    (
        anchor_distance(ctx.anchors, item.position),
        !filter.admits(&item.section, &item.description),
        item.position,
    )
}

fn glosa(line: &AdjudicationLine, target: i64, index: &BillIndex<'_>, ctx: &MatchContext<'_>) -> TraceAttempt {
    let text = vocab::normalize(&line.description);
    if text.len() < 4 || GENERIC_DESCRIPTIONS.matches(&text) {
        return TraceAttempt::fail(Strategy::Glosa, target, "description too generic for text matching");
    }
    let limit = ctx.config.search.max_ranked_candidates;

    let mut exact = index.with_text(&text);
    if !exact.is_empty() {
        exact.sort_by_key(|i| (anchor_distance(ctx.anchors, i.position), i.position));
        let sum: i64 = exact.iter().map(|i| i.total).sum();
        let same_amount: Vec<&BillItem> = exact.iter().copied().filter(|i| i.total == target).collect();
        let (status, traceability, items, note) = if sum == target {
            (AttemptStatus::Ok, Traceability::Strong, exact.clone(), None)
        } else if same_amount.len() == 1 {
            (AttemptStatus::Ok, Traceability::Strong, same_amount, None)
        } else if same_amount.len() > 1 {
            let note = format!("{} identical items with this amount", same_amount.len());
            (AttemptStatus::Ambiguous, Traceability::Weak, vec![same_amount[0]], Some(note))
        } else {
            let note = format!("text matches, amounts sum to {sum}");
            (AttemptStatus::Partial, Traceability::Weak, exact.clone(), Some(note))
        };
        return TraceAttempt {
            strategy: Strategy::Glosa,
            target,
            status,
            traceability,
            item_ids: ids(&items),
            candidates: single_candidates(&exact, limit),
            note,
        };
    }

    let fragments = index.with_text_fragment(&text);
    if fragments.is_empty() {
        return TraceAttempt::fail(Strategy::Glosa, target, "no item with a matching description");
    }
    let same_amount: Vec<&BillItem> = fragments.iter().copied().filter(|i| i.total == target).collect();
    let (status, items, note) = match same_amount.len() {
        1 => (AttemptStatus::Ok, same_amount, None),
        0 => (AttemptStatus::Partial, fragments.clone(), Some("partial text match, amounts differ".to_string())),
        n => (AttemptStatus::Ambiguous, vec![same_amount[0]], Some(format!("{n} partial text matches with this amount"))),
    };
    TraceAttempt {
        strategy: Strategy::Glosa,
        target,
        status,
        traceability: Traceability::Weak,
        item_ids: ids(&items),
        candidates: single_candidates(&fragments, limit),
        note,
    }
}

/// Runs of adjacent available items summing exactly to the target. Under a
/// strict domain a run may not cross an item outside the domain.
fn contiguous_window(
    target: i64,
    filter: DomainFilter,
    index: &BillIndex<'_>,
    ctx: &MatchContext<'_>,
) -> TraceAttempt {
    let avail = &index.available;
    let max_len = ctx.config.search.max_candidates;
    let generic = matches!(filter, DomainFilter::Generic);
    let strict = filter.is_strict();

    let mut windows = Vec::new();
    for start in 0..avail.len() {
        if avail[start].total <= 0 {
            continue;
        }
        let mut sum = 0i64;
        for end in start..avail.len().min(start + max_len) {
            if strict && !filter.admits(&avail[end].section, &avail[end].description) {
                break;
            }
            sum += avail[end].total;
            if sum > target {
                break;
            }
            if sum == target && end > start {
                let items = avail[start..=end].to_vec();
                let score = search::score_bundle(&items, filter, generic, &ctx.config.thresholds);
                windows.push(Solution { items, ordering: PoolOrdering::Physical, score });
                break;
            }
        }
    }

    let outcome = SearchOutcome::from_solutions(windows);
    let Some(best) = outcome.best() else {
        return TraceAttempt::fail(Strategy::ContiguousWindow, target, "no contiguous run sums to target");
    };
    let strong = best.score >= ctx.config.thresholds.strong_score && !outcome.ambiguous();
    from_outcome(Strategy::ContiguousWindow, target, &outcome, strong, ctx)
}

fn subtotal_block(
    target: i64,
    filter: DomainFilter,
    index: &BillIndex<'_>,
    ctx: &MatchContext<'_>,
) -> TraceAttempt {
    let mut combos = index.block_combinations(target, ctx.config.search.max_block_combination);
    let found = combos.len();
    if filter.is_strict() {
        combos.retain(|combo| {
            combo
                .iter()
                .flat_map(|b| index.items(&b.item_ids))
                .all(|i| filter.admits(&i.section, &i.description))
        });
    }
    if combos.is_empty() {
        let note = if found > 0 {
            "every block summing to target holds items outside the line's domain"
        } else {
            "no block or block combination sums to target"
        };
        return TraceAttempt::fail(Strategy::SubtotalBlock, target, note);
    }

    let generic = matches!(filter, DomainFilter::Generic);
    let candidates: Vec<CandidateSet> = combos
        .iter()
        .take(ctx.config.search.max_ranked_candidates)
        .map(|combo| {
            let item_ids: Vec<String> = combo.iter().flat_map(|b| b.item_ids.iter().cloned()).collect();
            let items = index.items(&item_ids);
            CandidateSet {
                total: combo.iter().map(|b| b.total).sum(),
                score: search::score_bundle(&items, filter, generic, &ctx.config.thresholds),
                item_ids,
            }
        })
        .collect();

    let explicit: Vec<&Vec<&SubtotalBlock>> =
        combos.iter().filter(|c| c.len() == 1 && c[0].explicit).collect();
    let (status, traceability, item_ids, note) = match explicit.as_slice() {
        [only] => (AttemptStatus::Ok, Traceability::Strong, only[0].item_ids.clone(), Some(only[0].label.clone())),
        [first, ..] => (
            AttemptStatus::Ambiguous,
            Traceability::Weak,
            first[0].item_ids.clone(),
            Some(format!("{} subtotal blocks share this amount", explicit.len())),
        ),
        [] => {
            let first = &combos[0];
            let labels: Vec<&str> = first.iter().map(|b| b.label.as_str()).collect();
            (
                AttemptStatus::Ok,
                Traceability::Weak,
                first.iter().flat_map(|b| b.item_ids.iter().cloned()).collect(),
                Some(labels.join(" + ")),
            )
        }
    };

    TraceAttempt { strategy: Strategy::SubtotalBlock, target, status, traceability, item_ids, candidates, note }
}

/// Domain-filtered subset search, relaxed to the whole pool when allowed.
fn subset_search(
    target: i64,
    filter: DomainFilter,
    index: &BillIndex<'_>,
    ctx: &MatchContext<'_>,
) -> Vec<TraceAttempt> {
    let budget = &ctx.config.search;
    let thresholds = &ctx.config.thresholds;
    let pool: Vec<&BillItem> = index
        .available
        .iter()
        .copied()
        .filter(|i| filter.admits(&i.section, &i.description))
        .collect();

    let outcome = search::search(&pool, target, &ALL_ORDERINGS, filter, false, budget, thresholds);
    if let Some(best) = outcome.best() {
        let strong = filter.is_restricted() && best.score >= thresholds.strong_score && !outcome.ambiguous();
        let strategy = Strategy::SubsetSum { ordering: best.ordering, relaxed: false };
        return vec![from_outcome(strategy, target, &outcome, strong, ctx)];
    }

    let mut attempts = vec![search_failure(
        Strategy::SubsetSum { ordering: PoolOrdering::Physical, relaxed: false },
        target,
        &outcome,
    )];
    if filter.is_strict() {
        tracing::debug!(amount = target, ?filter, "strict domain: subset search not relaxed");
        return attempts;
    }
    if filter.is_restricted() {
        let relaxed = search::search(&index.available, target, &ALL_ORDERINGS, filter, false, budget, thresholds);
        attempts.push(match relaxed.best() {
            Some(best) => from_outcome(
                Strategy::SubsetSum { ordering: best.ordering, relaxed: true },
                target,
                &relaxed,
                false,
                ctx,
            ),
            None => search_failure(Strategy::SubsetSum { ordering: PoolOrdering::Physical, relaxed: true }, target, &relaxed),
        });
    }
    attempts
}

/// Catch-all lines: search each physically coherent run of the pool on its own.
fn residual_segments(target: i64, index: &BillIndex<'_>, ctx: &MatchContext<'_>) -> TraceAttempt {
    let segments = split_segments(&index.available, ctx.config.search.segment_max_gap);
    let mut merged = SearchOutcome::default();
    for segment in &segments {
        if segment.iter().map(|i| i.total.max(0)).sum::<i64>() < target {
            continue;
        }
        merged.merge(search::search(
            segment,
            target,
            &ALL_ORDERINGS,
            DomainFilter::Generic,
            true,
            &ctx.config.search,
            &ctx.config.thresholds,
        ));
    }

    let Some(best) = merged.best() else {
        return search_failure(
            Strategy::ResidualSegment { segment: 0, ordering: PoolOrdering::Physical },
            target,
            &merged,
        );
    };
    let segment = best
        .items
        .first()
        .and_then(|first| segments.iter().position(|seg| seg.iter().any(|i| i.id == first.id)))
        .unwrap_or(0);
    let strong = best.score >= ctx.config.thresholds.strong_score && !merged.ambiguous();
    let strategy = Strategy::ResidualSegment { segment, ordering: best.ordering };
    from_outcome(strategy, target, &merged, strong, ctx)
}

/// Last resort for catch-all lines. Never strong.
fn full_pool(target: i64, index: &BillIndex<'_>, ctx: &MatchContext<'_>) -> TraceAttempt {
    let outcome = search::search(
        &index.available,
        target,
        &ALL_ORDERINGS,
        DomainFilter::Generic,
        true,
        &ctx.config.search,
        &ctx.config.thresholds,
    );
    match outcome.best() {
        Some(best) => from_outcome(
            Strategy::SubsetSum { ordering: best.ordering, relaxed: true },
            target,
            &outcome,
            false,
            ctx,
        ),
        None => search_failure(Strategy::SubsetSum { ordering: PoolOrdering::Physical, relaxed: true }, target, &outcome),
    }
}

/// Split physically ordered items where the position gap exceeds `max_gap`.
pub fn split_segments<'a>(items: &[&'a BillItem], max_gap: usize) -> Vec<Vec<&'a BillItem>> {
    let mut segments: Vec<Vec<&BillItem>> = Vec::new();
    for &item in items {
        match segments.last_mut() {
            Some(seg) if seg.last().is_some_and(|prev| item.position - prev.position <= max_gap + 1) => seg.push(item),
            _ => segments.push(vec![item]),
        }
    }
    segments
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn from_outcome(
    strategy: Strategy,
    target: i64,
    outcome: &SearchOutcome<'_>,
    strong: bool,
    ctx: &MatchContext<'_>,
) -> TraceAttempt {
    let ambiguous = outcome.ambiguous();
    let item_ids = outcome.best().map(Solution::ids).unwrap_or_default();
    TraceAttempt {
        strategy,
        target,
        status: if ambiguous { AttemptStatus::Ambiguous } else { AttemptStatus::Ok },
        traceability: if strong { Traceability::Strong } else { Traceability::Weak },
        item_ids,
        candidates: outcome.candidates(ctx.config.search.max_ranked_candidates),
        note: ambiguous.then(|| "tied candidate sets".to_string()),
    }
}

fn search_failure(strategy: Strategy, target: i64, outcome: &SearchOutcome<'_>) -> TraceAttempt {
    let note = if outcome.skipped_over_budget {
        "target exceeds search budget"
    } else {
        "no subset sums to target"
    };
    TraceAttempt::fail(strategy, target, note)
}

fn ids(items: &[&BillItem]) -> Vec<String> {
    items.iter().map(|i| i.id.clone()).collect()
}

fn single_candidates(items: &[&BillItem], limit: usize) -> Vec<CandidateSet> {
    items
        .iter()
        .take(limit)
        .map(|i| CandidateSet { item_ids: vec![i.id.clone()], total: i.total, score: 0 })
        .collect()
}

/// First Strong attempt, else first Ok, else first Partial or Ambiguous.
///
/// A Partial or Ambiguous pick keeps its status but carries no items: its
/// evidence stays on the attempt and is never reported as the line's match.
pub fn summarize(attempts: &[TraceAttempt], index: &BillIndex<'_>) -> TraceSummary {
    let chosen = attempts
        .iter()
        .find(|a| a.traceability == Traceability::Strong)
        .or_else(|| attempts.iter().find(|a| a.status == AttemptStatus::Ok))
        .or_else(|| {
            attempts
                .iter()
                .find(|a| matches!(a.status, AttemptStatus::Partial | AttemptStatus::Ambiguous))
        });

    match chosen {
        Some(a) => {
            let inconclusive = a.traceability != Traceability::Strong
                && matches!(a.status, AttemptStatus::Partial | AttemptStatus::Ambiguous);
            let item_ids = if inconclusive { Vec::new() } else { a.item_ids.clone() };
            TraceSummary {
                status: a.status,
                traceability: a.traceability,
                strategy: Some(a.strategy),
                matched_total: index.items(&item_ids).iter().map(|i| i.total).sum(),
                item_ids,
            }
        }
        None => TraceSummary {
            status: AttemptStatus::Fail,
            traceability: Traceability::None,
            strategy: None,
            item_ids: Vec::new(),
            matched_total: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CoverageDomain;
    use crate::structure::anchor_positions;

    fn item(id: &str, position: usize, section: &str, description: &str, total: i64) -> BillItem {
        BillItem {
            id: id.into(),
            position,
            section: section.into(),
            section_inferred: false,
            description: description.into(),
            quantity: 1.0,
            unit_price: total,
            total,
        }
    }

    fn line(code: &str, description: &str, value: i64, paid: i64, copay: i64) -> AdjudicationLine {
        AdjudicationLine {
            id: "L1".into(),
            folio: "F1".into(),
            ordinal: 0,
            code: code.into(),
            description: description.into(),
            value,
            paid,
            copay,
        }
    }

    fn trace(items: &[BillItem], l: &AdjudicationLine, domain: CoverageDomain) -> LineTrace {
        let config = AuditConfig::default();
        let anchors = anchor_positions(items);
        let ctx = MatchContext { config: &config, anchors: &anchors };
        let index = BillIndex::build(items.iter().collect(), &config.search);
        trace_line(l, DomainFilter::for_domain(domain), Pass::First, &index, &ctx)
    }

    #[test]
    fn unique_exact_amount_is_strong() {
        let items = vec![item("a", 0, "LAB", "Hemograma", 5_000), item("b", 1, "LAB", "Perfil bioquímico", 7_000)];
        let t = trace(&items, &line("0301045", "Perfil", 7_000, 5_000, 2_000), CoverageDomain::Laboratory);
        assert!(t.is_strong());
        assert_eq!(t.summary.strategy, Some(Strategy::ExactAmount));
        assert_eq!(t.summary.item_ids, vec!["b"]);
        assert_eq!(t.attempts.len(), 1);
    }

    #[test]
    fn tied_exact_amounts_rank_by_anchor_distance() {
        let items = vec![
            item("far", 0, "X", "Curación", 9_000),
            item("mid", 1, "X", "Algo", 1),
            item("anchor", 5, "PABELLON", "Derecho de pabellón", 300_000),
            item("near", 6, "PABELLON", "Curación", 9_000),
        ];
        let t = trace(&items, &line("X1", "", 9_000, 0, 9_000), CoverageDomain::Other);
        let exact = &t.attempts[0];
        assert_eq!(exact.status, AttemptStatus::Ambiguous);
        assert_eq!(exact.traceability, Traceability::Weak);
        assert_eq!(exact.item_ids, vec!["near"]);
        assert_eq!(exact.candidates.len(), 2);
    }

    #[test]
    fn glosa_exact_text_sums_identical_items() {
        let items = vec![
            item("d1", 0, "DIA CAMA", "Día cama sala", 80_000),
            item("d2", 1, "DIA CAMA", "Día cama sala", 80_000),
            item("x", 2, "FARMACIA", "Paracetamol 1 g", 80_000),
        ];
        let t = trace(&items, &line("0202003", "DIA CAMA SALA", 160_000, 120_000, 40_000), CoverageDomain::Hospitalization);
        assert!(t.is_strong());
        assert_eq!(t.summary.strategy, Some(Strategy::Glosa));
        assert_eq!(t.summary.item_ids, vec!["d1", "d2"]);
        assert_eq!(t.summary.matched_total, 160_000);
    }

    #[test]
    fn contiguous_pharmacy_run_is_strong() {
        let amounts = [102_588, 4_587, 15_716, 2_344, 3_048, 5_817];
        let mut items = vec![item("k", 0, "INSUMOS", "Kit de aseo", 9_990)];
        for (n, a) in amounts.iter().enumerate() {
            items.push(item(&format!("m{n}"), n + 1, "FARMACIA", &format!("Medicamento {n} 1 mg"), *a));
        }
        let t = trace(&items, &line("medications", "", 134_100, 0, 134_100), CoverageDomain::Medications);
        assert!(t.is_strong());
        assert_eq!(t.summary.strategy, Some(Strategy::ContiguousWindow));
        assert_eq!(t.summary.item_ids.len(), 6);
        assert_eq!(t.summary.matched_total, 134_100);
    }

    #[test]
    fn subtotal_row_is_never_the_match() {
        let items = vec![
            item("a", 0, "LAB", "Hemograma", 4_000),
            item("gap", 1, "LAB", "Glicemia", 10_000_000),
            item("b", 2, "LAB", "Creatinina", 3_000),
            item("c", 3, "LAB", "Orina completa", 4_000),
            item("s", 4, "LAB", "Subtotal", 7_000),
        ];
        // 7_000 is the subtotal row and the window {b, c}; the row restates the window.
        let t = trace(&items, &line("0301", "", 7_000, 0, 7_000), CoverageDomain::Laboratory);
        assert!(t.is_strong());
        assert_eq!(t.summary.strategy, Some(Strategy::ContiguousWindow));
        assert_eq!(t.summary.item_ids, vec!["b", "c"]);
        assert!(t.attempts.iter().all(|a| !a.item_ids.iter().any(|id| id == "s")));
    }

    #[test]
    fn strict_domain_window_skips_outsiders() {
        let items = vec![
            item("x", 0, "HONORARIOS", "Honorario cirujano", 99_999),
            item("s1", 1, "INSUMOS", "Jeringa 10 ml", 600),
            item("s2", 2, "INSUMOS", "Gasa estéril", 800),
        ];
        let meds = trace(&items, &line("3101001", "", 1_400, 0, 1_400), CoverageDomain::Medications);
        assert!(!meds.is_strong());
        assert!(meds.summary.item_ids.is_empty());
        let window = meds.attempts.iter().find(|a| a.strategy == Strategy::ContiguousWindow).expect("window attempt");
        assert_eq!(window.status, AttemptStatus::Fail);

        let materials = trace(&items, &line("3101002", "", 1_400, 0, 1_400), CoverageDomain::Materials);
        assert!(materials.is_strong());
        assert_eq!(materials.summary.strategy, Some(Strategy::ContiguousWindow));
        assert_eq!(materials.summary.item_ids, vec!["s1", "s2"]);
    }

    #[test]
    fn strict_domain_exact_outsider_is_weak() {
        let items = vec![item("g", 0, "INSUMOS", "Gasa estéril", 800), item("f", 1, "FARMACIA", "Cefazolina 1 g", 500)];
        let t = trace(&items, &line("3101001", "", 800, 0, 800), CoverageDomain::Medications);
        let exact = &t.attempts[0];
        assert_eq!(exact.strategy, Strategy::ExactAmount);
        assert_eq!(exact.traceability, Traceability::Weak);
        assert!(!t.is_strong());
    }

    #[test]
    fn partial_text_match_reports_no_items() {
        let items = vec![item("h", 0, "LAB", "Hemograma completo", 5_000)];
        let t = trace(&items, &line("0301045", "Hemograma completo", 9_000, 0, 9_000), CoverageDomain::Laboratory);
        assert_eq!(t.summary.status, AttemptStatus::Partial);
        assert_eq!(t.summary.traceability, Traceability::Weak);
        assert_eq!(t.summary.strategy, Some(Strategy::Glosa));
        assert!(t.summary.item_ids.is_empty());
        assert_eq!(t.summary.matched_total, 0);
        let glosa = t.attempts.iter().find(|a| a.strategy == Strategy::Glosa).expect("glosa attempt");
        assert_eq!(glosa.item_ids, vec!["h"]);
    }

    #[test]
    fn strict_domain_never_relaxes() {
        let items = vec![
            item("s1", 0, "INSUMOS", "Jeringa 10 ml", 600),
            item("x", 1, "HONORARIOS", "Honorario cirujano", 1_000),
            item("s2", 5, "MATERIALES", "Gasa estéril", 800),
        ];
        let t = trace(&items, &line("medications", "", 1_400, 0, 1_400), CoverageDomain::Medications);
        assert_eq!(t.summary.traceability, Traceability::None);
        assert!(!t.attempts.iter().any(|a| matches!(a.strategy, Strategy::SubsetSum { relaxed: true, .. })));
    }

    #[test]
    fn restricted_domain_relaxes_to_weak() {
        let items = vec![
            item("a", 0, "LAB", "Hemograma", 600),
            item("x", 3, "HONORARIOS", "Honorario cirujano", 1_000),
            item("b", 9, "INSUMOS", "Gasa", 800),
        ];
        let t = trace(&items, &line("0301", "", 1_000, 0, 1_000), CoverageDomain::Laboratory);
        // Unique exact amount on x wins before any search.
        assert!(t.is_strong());

        let t = trace(&items, &line("0301", "", 1_400, 0, 1_400), CoverageDomain::Laboratory);
        assert_eq!(t.summary.traceability, Traceability::Weak);
        assert!(matches!(t.summary.strategy, Some(Strategy::SubsetSum { relaxed: true, .. })));
    }

    #[test]
    fn generic_line_uses_residual_segments() {
        let items = vec![
            item("d", 0, "PABELLON", "Propofol 1% 20 ml", 500),
            item("e", 1, "PABELLON", "Gasa", 100),
            item("s", 2, "PABELLON", "Sutura vicryl", 500),
            item("k", 10, "INSUMOS", "Kit de aseo", 700),
            item("z", 11, "INSUMOS", "Teléfono", 50),
            item("m", 12, "ADMISION", "Cargo de admisión", 300),
        ];
        let t = trace(&items, &line("3201001", "Gastos no cubiertos", 1_000, 0, 1_000), CoverageDomain::Generic);
        let chosen = t.summary.strategy.expect("traced");
        assert!(matches!(chosen, Strategy::ResidualSegment { segment: 1, .. }), "{chosen:?}");
        assert_eq!(t.summary.item_ids, vec!["k", "m"]);
        assert!(t.is_strong());
    }

    #[test]
    fn nothing_matches() {
        let items = vec![item("a", 0, "X", "Algo", 10)];
        let t = trace(&items, &line("X", "", 999, 0, 999), CoverageDomain::Other);
        assert_eq!(t.summary.status, AttemptStatus::Fail);
        assert!(t.summary.item_ids.is_empty());
        assert!(t.attempts.iter().all(|a| a.status == AttemptStatus::Fail));
    }

    #[test]
    fn segments_split_on_gaps() {
        let items = vec![item("a", 0, "X", "a", 1), item("b", 3, "X", "b", 1), item("c", 7, "X", "c", 1)];
        let refs: Vec<&BillItem> = items.iter().collect();
        let segs = split_segments(&refs, 2);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].len(), 2);
    }
}
