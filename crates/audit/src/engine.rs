use crate::classify::{classify, LineFacts};
use crate::config::AuditConfig;
use crate::contract;
use crate::domain::{code_class, resolve_domain, DomainFilter};
use crate::episode;
use crate::evidence::{compute_summary, findings_matrix};
use crate::matcher::{trace_line, MatchContext};
use crate::model::{
    AdjudicationLine, AuditInput, AuditMeta, AuditOutcome, AuditResult, AuditRow, AuditSummary, BillItem, CodeClass,
    CoverageDomain, EventModel, LineTrace, MatchedItem, Pass,
};
use crate::opacity;
use crate::pool::ConsumptionPool;
use crate::preprocess::prepare;
use crate::report;
use crate::structure::{anchor_positions, explicit_blocks, BillIndex};
use crate::vocab::VOCABULARY_VERSION;

/// Run a full audit. Never fails: an input without adjudication lines yields
/// a `Rejected` outcome with empty rows.
pub fn run(config: &AuditConfig, input: &AuditInput) -> AuditResult {
    let prepared = prepare(input, &config.tolerance);
    let meta = AuditMeta {
        config_name: config.name.clone(),
        engine_version: env!("CARGO_PKG_VERSION").to_string(),
        vocabulary_version: VOCABULARY_VERSION.to_string(),
        rates: config.conversion.provenance(),
        rate_source: config.conversion.source.clone(),
        rates_resolved_on: config.conversion.resolved_on,
    };

    if prepared.lines.is_empty() {
        tracing::warn!("adjudication has no lines, audit rejected");
        return finish(AuditResult {
            meta,
            outcome: AuditOutcome::Rejected { reason: "adjudication contains no lines".into() },
            warnings: prepared.warnings,
            episode: EventModel::default(),
            summary: AuditSummary { bill_items: prepared.items.len(), ..AuditSummary::default() },
            findings: Vec::new(),
            rows: Vec::new(),
            report: String::new(),
            complaint: String::new(),
        });
    }

    let items = &prepared.items;
    let lines = &prepared.lines;
    let domains: Vec<CoverageDomain> = lines.iter().map(|l| resolve_domain(&l.code, &l.description)).collect();
    let traces = resolve_traces(config, items, lines, &domains);

    let line_domains: Vec<(&AdjudicationLine, CoverageDomain)> = lines.iter().zip(domains.iter().copied()).collect();
    let episode = episode::detect(items, &line_domains);

    let rows: Vec<AuditRow> = lines
        .iter()
        .zip(domains)
        .zip(traces)
        .map(|((line, domain), trace)| assemble_row(config, input, items, &episode, line, domain, trace))
        .collect();

    let summary = compute_summary(&rows, items.len(), &config.thresholds);
    let findings = findings_matrix(&rows);
    tracing::info!(
        lines = summary.lines_analyzed,
        items = summary.bill_items,
        flagged = summary.flagged_lines,
        impacted = summary.total_copay_impacted,
        systemic = summary.systemic_pattern,
        "audit complete"
    );

    finish(AuditResult {
        meta,
        outcome: AuditOutcome::Completed,
        warnings: prepared.warnings,
        episode,
        summary,
        findings,
        rows,
        report: String::new(),
        complaint: String::new(),
    })
}

fn finish(mut result: AuditResult) -> AuditResult {
    result.report = report::forensic_report(&result);
    result.complaint = report::complaint_letter(&result);
    result
}

/// Order in which lines are traced: domain-specific lines in adjudication
/// order, then generic catch-all lines by descending value.
pub fn resolution_order(lines: &[AdjudicationLine], domains: &[CoverageDomain]) -> Vec<(usize, Pass)> {
    let (mut generic, specific): (Vec<usize>, Vec<usize>) =
        (0..lines.len()).partition(|&i| code_class(domains[i]) == CodeClass::GenericCatchAll);
    generic.sort_by(|&a, &b| lines[b].value.cmp(&lines[a].value).then(lines[a].ordinal.cmp(&lines[b].ordinal)));
    specific
        .into_iter()
        .map(|i| (i, Pass::First))
        .chain(generic.into_iter().map(|i| (i, Pass::Second)))
        .collect()
}

/// Two-pass matching. The pool is threaded through the loop and only Strong
/// traces consume items. Subtotal rows are detected once on the whole bill
/// and never offered to any line.
fn resolve_traces(
    config: &AuditConfig,
    items: &[BillItem],
    lines: &[AdjudicationLine],
    domains: &[CoverageDomain],
) -> Vec<LineTrace> {
    let anchors = anchor_positions(items);
    let ctx = MatchContext { config, anchors: &anchors };
    let positive: Vec<&BillItem> = items.iter().filter(|item| item.total > 0).collect();
    let subtotals = explicit_blocks(&positive);
    if !subtotals.is_empty() {
        tracing::debug!(rows = subtotals.len(), "subtotal rows excluded from matching");
    }
    let mut pool = ConsumptionPool::new();
    let mut traces: Vec<Option<LineTrace>> = vec![None; lines.len()];

    for (i, pass) in resolution_order(lines, domains) {
        let line = &lines[i];
        let available: Vec<&BillItem> = pool.available(items).into_iter().filter(|item| item.total > 0).collect();
        let index = BillIndex::with_subtotals(available, &subtotals, &config.search);
        let trace = trace_line(line, DomainFilter::for_domain(domains[i]), pass, &index, &ctx);

        if trace.is_strong() {
            let (next, conflicts) = pool.consume(&trace.summary.item_ids);
            pool = next;
            if !conflicts.is_empty() {
                tracing::warn!(line = %line.id, ?conflicts, "items already consumed by another line");
            }
        }
        traces[i] = Some(trace);
    }
    tracing::debug!(consumed = pool.len(), available = items.len() - pool.len(), "matching done");

    traces.into_iter().flatten().collect()
}

fn assemble_row(
    config: &AuditConfig,
    input: &AuditInput,
    items: &[BillItem],
    episode: &EventModel,
    line: &AdjudicationLine,
    domain: CoverageDomain,
    trace: LineTrace,
) -> AuditRow {
    let class = code_class(domain);
    let mut matched: Vec<&BillItem> =
        items.iter().filter(|item| trace.summary.item_ids.contains(&item.id)).collect();
    matched.sort_by_key(|item| item.position);

    let evaluation = contract::evaluate(line, domain, &input.contract, config);
    let facts = LineFacts {
        line,
        domain,
        code_class: class,
        trace: &trace,
        items: &matched,
        contract: &evaluation,
    };
    let classification = classify(&facts, episode, &input.contract, config);
    let opacity = opacity::score(
        line,
        class,
        trace.summary.traceability,
        &config.opacity,
        config.thresholds.opacity_threshold,
    );

    AuditRow {
        line: line.clone(),
        domain,
        code_class: class,
        matched_items: matched.iter().copied().map(MatchedItem::from).collect(),
        trace,
        contract: evaluation,
        classification,
        opacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(code: &str, value: i64, ordinal: usize) -> AdjudicationLine {
        AdjudicationLine {
            id: format!("L{ordinal}"),
            folio: "F".into(),
            ordinal,
            code: code.into(),
            description: String::new(),
            value,
            paid: 0,
            copay: value,
        }
    }

    #[test]
    fn generic_lines_resolve_last_largest_first() {
        let lines = vec![
            line("3201001", 1_000, 0),
            line("3101001", 500, 1),
            line("3201001", 9_000, 2),
            line("0301001", 200, 3),
            line("3201001", 9_000, 4),
        ];
        let domains: Vec<CoverageDomain> = lines.iter().map(|l| resolve_domain(&l.code, &l.description)).collect();
        let order = resolution_order(&lines, &domains);
        assert_eq!(
            order,
            vec![(1, Pass::First), (3, Pass::First), (2, Pass::Second), (4, Pass::Second), (0, Pass::Second)]
        );
    }

    #[test]
    fn no_lines_is_rejected() {
        let input = AuditInput::default();
        let result = run(&AuditConfig::default(), &input);
        assert!(matches!(result.outcome, AuditOutcome::Rejected { .. }));
        assert!(result.rows.is_empty());
        assert!(result.report.contains("AUDIT REJECTED"));
    }
}
