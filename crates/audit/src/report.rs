//! Plain-text renderings of an [`AuditResult`]: the forensic report and the
//! complaint letter. Both read the finished result and add no judgement of
//! their own.

use std::fmt;

use crate::model::{
    AuditOutcome, AuditResult, ContractState, PackageEvidence, RateOrigin, Traceability, WarningKind,
};

/// Forensic report over a finished result.
pub struct ForensicReport<'a>(pub &'a AuditResult);

/// Complaint letter template listing every disputed charge.
pub struct ComplaintLetter<'a>(pub &'a AuditResult);

pub fn forensic_report(result: &AuditResult) -> String {
    ForensicReport(result).to_string()
}

pub fn complaint_letter(result: &AuditResult) -> String {
    ComplaintLetter(result).to_string()
}

/// Chilean peso formatting: `$1.234.567`.
pub fn money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }
    if amount < 0 {
        format!("-${grouped}")
    } else {
        format!("${grouped}")
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

fn evidence_label(evidence: PackageEvidence) -> &'static str {
    match evidence {
        PackageEvidence::SectionText => "section text",
        PackageEvidence::AnesthesiaFingerprint => "anesthesia drug fingerprint",
        PackageEvidence::AdjudicationLine => "adjudication line",
    }
}

fn traceability_label(t: Traceability) -> &'static str {
    match t {
        Traceability::Strong => "strong",
        Traceability::Weak => "weak",
        Traceability::None => "none",
    }
}

fn contract_label(state: &ContractState) -> String {
    match state {
        ContractState::VerifiableOk => "copay within contract".into(),
        ContractState::UnderCovered { shortfall } => format!("under-covered by {}", money(*shortfall)),
        ContractState::CapExceeded { cap, withheld } => {
            format!("cap {} binding, {} above cap", money(*cap), money(*withheld))
        }
        ContractState::CapUnverifiable { kind } => format!("cap in {kind} not verifiable"),
        ContractState::NotVerifiableByContract { reason } => format!("not verifiable: {reason}"),
    }
}

fn warning_label(kind: &WarningKind) -> String {
    match kind {
        WarningKind::IncoherentLine { value, paid, copay } => format!(
            "value {} differs from paid {} + copay {}",
            money(*value),
            money(*paid),
            money(*copay)
        ),
        WarningKind::NegativeAmount { field, value } => format!("negative {field} {}", money(*value)),
        WarningKind::DuplicateItemId => "duplicate item id renamed".into(),
        WarningKind::NonPositiveItem { total } => format!("non-positive item total {}", money(*total)),
    }
}

impl fmt::Display for ForensicReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        writeln!(f, "FORENSIC AUDIT REPORT")?;
        writeln!(
            f,
            "config {} | engine {} | vocabulary {}",
            r.meta.config_name, r.meta.engine_version, r.meta.vocabulary_version
        )?;
        for rate in &r.meta.rates {
            let origin = match rate.origin {
                RateOrigin::Configured => "configured",
                RateOrigin::Fallback => "fallback",
                RateOrigin::Missing => "missing",
            };
            match rate.value {
                Some(v) => writeln!(f, "rate {}: {v} ({origin})", rate.unit)?,
                None => writeln!(f, "rate {}: unavailable", rate.unit)?,
            }
        }
        if let Some(source) = &r.meta.rate_source {
            match r.meta.rates_resolved_on {
                Some(day) => writeln!(f, "rates from {source} on {day}")?,
                None => writeln!(f, "rates from {source}")?,
            }
        }

        if let AuditOutcome::Rejected { reason } = &r.outcome {
            writeln!(f)?;
            writeln!(f, "AUDIT REJECTED: {reason}")?;
            return Ok(());
        }

        let s = &r.summary;
        writeln!(f)?;
        writeln!(f, "EPISODE")?;
        writeln!(f, "  principal act: {}", r.episode.principal_act.as_deref().unwrap_or("not identified"))?;
        if r.episode.packages.is_empty() {
            writeln!(f, "  packages: none detected")?;
        }
        for p in &r.episode.packages {
            writeln!(
                f,
                "  package: {} (from {}, {} items)",
                p.kind,
                evidence_label(p.evidence),
                p.item_ids.len()
            )?;
        }

        writeln!(f)?;
        writeln!(f, "SUMMARY")?;
        writeln!(f, "  lines analyzed:     {}", s.lines_analyzed)?;
        writeln!(f, "  bill items:         {}", s.bill_items)?;
        writeln!(f, "  copay analyzed:     {}", money(s.total_copay_analyzed))?;
        let impacted_share = if s.total_copay_analyzed > 0 {
            s.total_copay_impacted as f64 / s.total_copay_analyzed as f64
        } else {
            0.0
        };
        writeln!(f, "  copay impacted:     {} ({})", money(s.total_copay_impacted), percent(impacted_share))?;
        writeln!(
            f,
            "  traceability:       {} strong, {} weak, {} untraced",
            s.strong_lines, s.weak_lines, s.untraced_lines
        )?;
        if !s.motor_counts.is_empty() {
            let counts: Vec<String> = s.motor_counts.iter().map(|(m, n)| format!("{m} {n}")).collect();
            writeln!(f, "  findings by motor:  {}", counts.join(", "))?;
        }
        writeln!(f, "  cost transfer:      {}", percent(s.cost_transfer_ratio))?;
        writeln!(f, "  systemic pattern:   {}", if s.systemic_pattern { "yes" } else { "no" })?;
        match s.audit_opacity {
            Some(level) => writeln!(f, "  opacity:            {} opaque lines, audit level {level}", s.opaque_lines)?,
            None => writeln!(f, "  opacity:            no opaque lines")?,
        }

        writeln!(f)?;
        writeln!(f, "FINDINGS")?;
        if r.findings.is_empty() {
            writeln!(f, "  none")?;
        }
        for row in &r.findings {
            writeln!(
                f,
                "  [{}] folio {} line {} code {} {}",
                row.motor, row.folio, row.line_id, row.code, row.description
            )?;
            writeln!(f, "      copay {} | impact {}", money(row.copay), money(row.impact))?;
            writeln!(f, "      {}", row.rationale)?;
            if !row.evidence.is_empty() {
                writeln!(f, "      items: {}", row.evidence.join(", "))?;
            }
        }

        writeln!(f)?;
        writeln!(f, "LINES")?;
        for row in &r.rows {
            let strategy = row.trace.summary.strategy.map(|s| s.to_string()).unwrap_or_else(|| "-".into());
            writeln!(
                f,
                "  {} {} {} | {} | trace {} via {} | {} | {} | opacity {}",
                row.line.id,
                row.line.code,
                row.domain,
                money(row.line.copay),
                traceability_label(row.trace.summary.traceability),
                strategy,
                contract_label(&row.contract.state),
                row.classification.finding.label(),
                row.opacity.score
            )?;
        }

        if !r.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "INPUT WARNINGS")?;
            for w in &r.warnings {
                writeln!(f, "  {}: {}", w.subject, warning_label(&w.kind))?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ComplaintLetter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        writeln!(f, "To the claims review department,")?;
        writeln!(f)?;
        if let Some(act) = &r.episode.principal_act {
            writeln!(f, "Re: adjudication of the episode whose principal act is {act}.")?;
        } else {
            writeln!(f, "Re: adjudication of the attached hospital bill.")?;
        }
        writeln!(f)?;

        if r.findings.is_empty() {
            writeln!(
                f,
                "The reconciliation of the bill against the adjudication found no charge to dispute."
            )?;
            return writeln!(f, "\nSincerely,\n[patient name]");
        }

        writeln!(
            f,
            "I request the review of the following charges, for which the reconciliation of the itemized bill"
        )?;
        writeln!(f, "against your adjudication shows an irregularity:")?;
        writeln!(f)?;
        for (n, row) in r.findings.iter().enumerate() {
            let label = r
                .rows
                .iter()
                .find(|x| x.line.id == row.line_id)
                .map(|x| x.classification.finding.label())
                .unwrap_or_else(|| row.motor.clone());
            writeln!(f, "{}. Folio {}, code {} ({}): {}.", n + 1, row.folio, row.code, row.description, label)?;
            writeln!(f, "   {}", row.rationale)?;
            writeln!(f, "   Amount in dispute: {}.", money(row.impact))?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "The total amount in dispute is {} out of a copay of {}.",
            money(r.summary.total_copay_impacted),
            money(r.summary.total_copay_analyzed)
        )?;
        if r.summary.systemic_pattern {
            writeln!(
                f,
                "The number and weight of these findings point to a systemic pattern rather than isolated errors."
            )?;
        }
        writeln!(f, "Please send the itemized justification of each charge or reissue the adjudication.")?;
        writeln!(f, "\nSincerely,\n[patient name]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn money_groups_thousands() {
        assert_eq!(money(0), "$0");
        assert_eq!(money(999), "$999");
        assert_eq!(money(134_100), "$134.100");
        assert_eq!(money(1_234_567), "$1.234.567");
        assert_eq!(money(-4_500), "-$4.500");
    }

    #[test]
    fn percent_one_decimal() {
        assert_eq!(percent(0.25), "25.0%");
        assert_eq!(percent(0.0), "0.0%");
    }
}
