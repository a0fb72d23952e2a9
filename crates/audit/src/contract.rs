use std::collections::BTreeSet;

use crate::config::AuditConfig;
use crate::model::{
    AdjudicationLine, CapKind, Contract, ContractEvaluation, ContractRule, ContractState, CoverageDomain,
    RuleSelection,
};
use crate::vocab;

/// Pick the rule governing `domain` for a line described by `description`.
///
/// One candidate is taken as is. Several are ranked by shared description
/// tokens; without a unique affinity winner the rule with the lowest known
/// coverage is used, so the audit never overstates what the plan promised.
pub fn select_rule<'c>(
    contract: &'c Contract,
    domain: CoverageDomain,
    description: &str,
) -> Option<(usize, &'c ContractRule, RuleSelection)> {
    let candidates: Vec<(usize, &ContractRule)> =
        contract.rules.iter().enumerate().filter(|(_, r)| r.domain == domain).collect();

    match candidates.as_slice() {
        [] => None,
        [(i, rule)] => Some((*i, *rule, RuleSelection::Single)),
        _ => {
            let line_tokens = tokens(description);
            let scored: Vec<(usize, usize, &ContractRule)> = candidates
                .iter()
                .map(|&(i, r)| (line_tokens.intersection(&tokens(&r.source_text)).count(), i, r))
                .collect();
            let top = scored.iter().map(|(s, _, _)| *s).max().unwrap_or(0);
            let winners: Vec<&(usize, usize, &ContractRule)> = scored.iter().filter(|(s, _, _)| *s == top).collect();
            if top > 0 && winners.len() == 1 {
                let (_, i, rule) = winners[0];
                return Some((*i, *rule, RuleSelection::Affinity));
            }
            candidates
                .iter()
                .min_by(|(ia, a), (ib, b)| {
                    let pa = a.coverage_pct.unwrap_or(f64::INFINITY);
                    let pb = b.coverage_pct.unwrap_or(f64::INFINITY);
                    pa.total_cmp(&pb).then(ia.cmp(ib))
                })
                .map(|&(i, rule)| (i, rule, RuleSelection::Conservative))
        }
    }
}

fn tokens(text: &str) -> BTreeSet<String> {
    vocab::normalize(text)
        .split(' ')
        .filter(|t| t.chars().count() >= 4)
        .map(String::from)
        .collect()
}

/// Compare the adjudicated copay with what the selected rule implies.
///
/// A cap limits the insurer's share, not the billed value: it binds only when
/// `coverage % x value` exceeds the resolved cap, and the withheld amount is
/// that share minus the cap. A line billed above the cap with a smaller
/// contractual share is evaluated as uncapped.
pub fn evaluate(
    line: &AdjudicationLine,
    domain: CoverageDomain,
    contract: &Contract,
    config: &AuditConfig,
) -> ContractEvaluation {
    let tolerance = config.tolerance.copay_band(line.value);
    let mut eval = ContractEvaluation {
        domain,
        rule_index: None,
        selection: None,
        coverage_pct: None,
        expected_paid: None,
        expected_copay: None,
        tolerance,
        cap_amount: None,
        state: ContractState::NotVerifiableByContract { reason: format!("no contract rule for domain {domain}") },
    };

    let Some((index, rule, selection)) = select_rule(contract, domain, &line.description) else {
        return eval;
    };
    eval.rule_index = Some(index);
    eval.selection = Some(selection);
    eval.coverage_pct = rule.coverage_pct;

    let cap_amount = rule.cap.as_ref().and_then(|cap| {
        let rate = config.conversion.resolve(cap.kind).value?;
        Some((cap.value? * rate).round() as i64)
    });
    eval.cap_amount = cap_amount;
    let cap_unreadable = rule.cap.is_some() && cap_amount.is_none();
    let cap_kind = rule.cap.as_ref().map(|c| c.kind).unwrap_or(CapKind::Currency);

    let Some(pct) = rule.coverage_pct else {
        eval.state = if cap_unreadable {
            ContractState::CapUnverifiable { kind: cap_kind }
        } else {
            ContractState::NotVerifiableByContract { reason: "rule has no coverage percentage".into() }
        };
        return eval;
    };

    let uncapped = (line.value as f64 * pct / 100.0).round() as i64;
    let binding_cap = cap_amount.filter(|&cap| uncapped > cap);
    let expected_paid = binding_cap.unwrap_or(uncapped);
    let expected_copay = line.value - expected_paid;
    eval.expected_paid = Some(expected_paid);
    eval.expected_copay = Some(expected_copay);

    let excess = line.copay - expected_copay;
    eval.state = if excess > tolerance {
        ContractState::UnderCovered { shortfall: excess }
    } else if let Some(cap) = binding_cap {
        ContractState::CapExceeded { cap, withheld: uncapped - cap }
    } else if cap_unreadable {
        ContractState::CapUnverifiable { kind: cap_kind }
    } else {
        ContractState::VerifiableOk
    };
    eval
}

/// Best coverage the plan offers for `domain`, if any rule states one.
pub fn best_coverage(contract: &Contract, domain: CoverageDomain) -> Option<f64> {
    contract
        .rules
        .iter()
        .filter(|r| r.domain == domain)
        .filter_map(|r| r.coverage_pct)
        .max_by(f64::total_cmp)
}
