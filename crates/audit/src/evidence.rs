use std::collections::BTreeMap;

use crate::config::Thresholds;
use crate::model::{AuditRow, AuditSummary, FindingRow, Motor, Traceability};
use crate::opacity;

/// Compute summary statistics from assembled rows.
pub fn compute_summary(rows: &[AuditRow], bill_items: usize, thresholds: &Thresholds) -> AuditSummary {
    let mut motor_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_copay_analyzed = 0;
    let mut total_copay_impacted = 0;
    let mut transfer_impact = 0;
    let mut flagged_lines = 0;
    let mut strong_lines = 0;
    let mut weak_lines = 0;
    let mut untraced_lines = 0;

    for row in rows {
        total_copay_analyzed += row.line.copay.max(0);
        match row.trace.summary.traceability {
            Traceability::Strong => strong_lines += 1,
            Traceability::Weak => weak_lines += 1,
            Traceability::None => untraced_lines += 1,
        }

        let c = &row.classification;
        if c.finding.is_flagged() {
            flagged_lines += 1;
            total_copay_impacted += c.impact;
        }
        if let Some(motor) = c.finding.motor() {
            *motor_counts.entry(motor.to_string()).or_insert(0) += 1;
            if matches!(motor, Motor::M2 | Motor::M3) {
                transfer_impact += c.impact;
            }
        }
    }

    let cost_transfer_ratio = if total_copay_analyzed > 0 {
        transfer_impact as f64 / total_copay_analyzed as f64
    } else {
        0.0
    };
    let systemic_pattern = motor_counts.values().any(|&n| n >= thresholds.systemic_min_findings)
        || (transfer_impact > 0 && cost_transfer_ratio >= thresholds.systemic_cost_transfer_ratio);

    AuditSummary {
        lines_analyzed: rows.len(),
        bill_items,
        total_copay_analyzed,
        total_copay_impacted,
        flagged_lines,
        strong_lines,
        weak_lines,
        untraced_lines,
        motor_counts,
        cost_transfer_ratio,
        systemic_pattern,
        opaque_lines: rows.iter().filter(|r| r.opacity.opaque).count(),
        audit_opacity: opacity::audit_opacity(rows.iter().map(|r| &r.opacity)),
    }
}

/// One row per flagged line, in adjudication order.
pub fn findings_matrix(rows: &[AuditRow]) -> Vec<FindingRow> {
    rows.iter()
        .filter(|r| r.classification.finding.is_flagged())
        .map(|r| FindingRow {
            line_id: r.line.id.clone(),
            folio: r.line.folio.clone(),
            code: r.line.code.clone(),
            description: r.line.description.clone(),
            motor: r
                .classification
                .finding
                .motor()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "opacity".into()),
            copay: r.line.copay,
            impact: r.classification.impact,
            evidence: r.matched_items.iter().map(|i| i.id.clone()).collect(),
            rationale: r.classification.rationale.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AdjudicationLine, AttemptStatus, Classification, CodeClass, ContractEvaluation, ContractState,
        CostTransferKind, CoverageDomain, Finding, LineTrace, MatchedItem, OpacityScore, Pass, TraceSummary,
    };

    fn row(id: &str, copay: i64, finding: Finding, impact: i64, traceability: Traceability, opacity: u32) -> AuditRow {
        AuditRow {
            line: AdjudicationLine {
                id: id.into(),
                folio: "F1".into(),
                ordinal: 0,
                code: "3201001".into(),
                description: "Gastos no cubiertos".into(),
                value: copay,
                paid: 0,
                copay,
            },
            domain: CoverageDomain::Generic,
            code_class: CodeClass::GenericCatchAll,
            trace: LineTrace {
                pass: Pass::Second,
                attempts: vec![],
                summary: TraceSummary {
                    status: AttemptStatus::Ok,
                    traceability,
                    strategy: None,
                    item_ids: vec![],
                    matched_total: 0,
                },
            },
            matched_items: vec![MatchedItem {
                id: "i1".into(),
                position: 0,
                section: "INSUMOS".into(),
                description: "Kit de aseo".into(),
                total: copay,
            }],
            contract: ContractEvaluation {
                domain: CoverageDomain::Generic,
                rule_index: None,
                selection: None,
                coverage_pct: None,
                expected_paid: None,
                expected_copay: None,
                tolerance: 100,
                cap_amount: None,
                state: ContractState::NotVerifiableByContract { reason: "none".into() },
            },
            classification: Classification { finding, triggered: vec![], impact, rationale: "r".into() },
            opacity: OpacityScore { score: opacity, points: vec![], opaque: opacity >= 40 },
        }
    }

    fn transfer() -> Finding {
        Finding::CostTransfer { subtype: CostTransferKind::AmenityDominant }
    }

    #[test]
    fn summary_counts() {
        let rows = vec![
            row("a", 10_000, transfer(), 10_000, Traceability::Strong, 60),
            row("b", 30_000, Finding::Correct, 0, Traceability::Strong, 0),
            row("c", 5_000, Finding::TotalOpacity, 5_000, Traceability::None, 75),
            row("d", 5_000, Finding::Unconfirmed, 0, Traceability::Weak, 35),
        ];
        let s = compute_summary(&rows, 12, &Thresholds::default());
        assert_eq!(s.lines_analyzed, 4);
        assert_eq!(s.bill_items, 12);
        assert_eq!(s.total_copay_analyzed, 50_000);
        assert_eq!(s.total_copay_impacted, 15_000);
        assert_eq!(s.flagged_lines, 2);
        assert_eq!((s.strong_lines, s.weak_lines, s.untraced_lines), (2, 1, 1));
        assert_eq!(s.motor_counts.get("M3"), Some(&1));
        assert!((s.cost_transfer_ratio - 0.2).abs() < 1e-9);
        assert!(!s.systemic_pattern);
        assert_eq!(s.opaque_lines, 2);
        assert_eq!(s.audit_opacity, Some(75));
    }

    #[test]
    fn systemic_by_count_or_ratio() {
        let by_count: Vec<AuditRow> =
            (0..3).map(|n| row(&format!("l{n}"), 1_000, transfer(), 1_000, Traceability::Strong, 0)).collect();
        let mut padded = by_count.clone();
        padded.push(row("big", 1_000_000, Finding::Correct, 0, Traceability::Strong, 0));
        assert!(compute_summary(&padded, 0, &Thresholds::default()).systemic_pattern);

        let by_ratio = vec![
            row("a", 40_000, transfer(), 40_000, Traceability::Strong, 0),
            row("b", 60_000, Finding::Correct, 0, Traceability::Strong, 0),
        ];
        let s = compute_summary(&by_ratio, 0, &Thresholds::default());
        assert!(s.systemic_pattern);
        assert!((s.cost_transfer_ratio - 0.4).abs() < 1e-9);
    }

    #[test]
    fn matrix_lists_flagged_rows_only() {
        let rows = vec![
            row("a", 10_000, transfer(), 10_000, Traceability::Strong, 0),
            row("b", 30_000, Finding::Correct, 0, Traceability::Strong, 0),
            row("c", 5_000, Finding::TotalOpacity, 5_000, Traceability::None, 75),
        ];
        let m = findings_matrix(&rows);
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].motor, "M3");
        assert_eq!(m[1].motor, "opacity");
        assert_eq!(m[0].evidence, vec!["i1".to_string()]);
    }
}
