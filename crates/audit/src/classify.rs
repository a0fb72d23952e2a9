//! Fragmentation classifier: five motors, evaluated in priority order.
//!
//! Every motor is evaluated and every match is recorded in
//! [`Classification::triggered`]; the first match by priority becomes the
//! finding. The unexplained-rejection branch of M1 ranks after M2..M5.

use crate::config::{AuditConfig, Thresholds};
use crate::contract;
use crate::model::{
    AdjudicationLine, BillItem, Classification, CodeClass, Contract, ContractEvaluation, ContractState,
    CostTransferKind, CoverageDomain, EventModel, Finding, LineTrace, Motor, NonBillableReason, PackageKind,
    Strategy, Traceability,
};
use crate::vocab::{
    self, ItemTraits, MATERIAL_SECTIONS, NURSING_ACTS, NURSING_CATCH_CODE, PAVILION_TERMS, PHARMACY_SECTIONS,
    WARD_TERMS,
};

/// Everything the motors look at for one line.
#[derive(Debug, Clone, Copy)]
pub struct LineFacts<'a> {
    pub line: &'a AdjudicationLine,
    pub domain: CoverageDomain,
    pub code_class: CodeClass,
    pub trace: &'a LineTrace,
    /// Items of the trace summary, in physical order.
    pub items: &'a [&'a BillItem],
    pub contract: &'a ContractEvaluation,
}

impl LineFacts<'_> {
    fn rejected(&self) -> bool {
        self.line.paid == 0 && self.line.copay > 0
    }

    fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.id.clone()).collect()
    }
}

struct Hit {
    finding: Finding,
    impact: i64,
    rationale: String,
}

pub fn classify(facts: &LineFacts<'_>, episode: &EventModel, plan: &Contract, config: &AuditConfig) -> Classification {
    let t = &config.thresholds;
    let ordered: [Option<Hit>; 6] = [
        autonomous_act(facts),
        unbundling(facts, episode, t),
        cost_transfer(facts, episode, t),
        reclassification(facts, episode, plan),
        contractual(facts),
        unexplained_rejection(facts),
    ];

    let mut triggered: Vec<Motor> = ordered.iter().flatten().filter_map(|h| h.finding.motor()).collect();
    triggered.sort();
    triggered.dedup();

    if let Some(hit) = ordered.into_iter().flatten().next() {
        return Classification { finding: hit.finding, triggered, impact: hit.impact, rationale: hit.rationale };
    }

    let (finding, impact, rationale) = match facts.trace.summary.traceability {
        Traceability::Strong => (Finding::Correct, 0, "reconciled against a strong bill anchor".to_string()),
        Traceability::Weak => (
            Finding::Unconfirmed,
            0,
            "only a weak numeric coincidence supports this line".to_string(),
        ),
        Traceability::None => (
            Finding::TotalOpacity,
            facts.line.copay.max(0),
            "no bill item or combination of items accounts for this line".to_string(),
        ),
    };
    Classification { finding, triggered, impact, rationale }
}

// ---------------------------------------------------------------------------
// M1: non-billable act
// ---------------------------------------------------------------------------

fn autonomous_act(facts: &LineFacts<'_>) -> Option<Hit> {
    if !facts.rejected() {
        return None;
    }
    let summary = &facts.trace.summary;
    if summary.traceability == Traceability::Strong
        && summary.strategy == Some(Strategy::ExactAmount)
        && facts.items.len() == 1
    {
        let item = facts.items[0];
        let traits = ItemTraits::of(&item.section, &item.description);
        let nursing_required = facts.line.code == NURSING_CATCH_CODE;
        if !traits.amenity && !traits.administrative && (!nursing_required || traits.nursing_act) {
            return Some(Hit {
                finding: Finding::NonBillableAct { reason: NonBillableReason::AutonomousAct, item_ids: facts.item_ids() },
                impact: facts.line.copay,
                rationale: format!(
                    "item '{}' is anchored 1:1 and billed as an autonomous act the package already includes",
                    item.description
                ),
            });
        }
    }

    let in_package_domain = matches!(facts.domain, CoverageDomain::Pavilion | CoverageDomain::Hospitalization);
    let nursing_text = NURSING_ACTS.matches(&vocab::normalize(&facts.line.description))
        || facts.items.iter().any(|i| NURSING_ACTS.matches(&vocab::normalize(&i.description)));
    if nursing_text && !in_package_domain {
        return Some(Hit {
            finding: Finding::NonBillableAct { reason: NonBillableReason::NursingProcedure, item_ids: facts.item_ids() },
            impact: facts.line.copay,
            rationale: "nursing procedure charged outside the pavilion or ward package".into(),
        });
    }
    None
}

fn unexplained_rejection(facts: &LineFacts<'_>) -> Option<Hit> {
    (facts.rejected() && facts.code_class == CodeClass::Specific).then(|| Hit {
        finding: Finding::NonBillableAct {
            reason: NonBillableReason::UnexplainedRejection,
            item_ids: facts.item_ids(),
        },
        impact: facts.line.copay,
        rationale: format!("specific code {} rejected with no stated cause", facts.line.code),
    })
}

// ---------------------------------------------------------------------------
// M2: unbundling from a mandatory package
// ---------------------------------------------------------------------------

/// Whether an item belongs to an all-inclusive package on its own terms.
fn package_clinical(item: &BillItem) -> bool {
    let traits = ItemTraits::of(&item.section, &item.description);
    if traits.clinically_specific() {
        return true;
    }
    let section = vocab::normalize(&item.section);
    traits.weakly_specific()
        && (PAVILION_TERMS.matches(&section)
            || WARD_TERMS.matches(&section)
            || PHARMACY_SECTIONS.matches(&section)
            || MATERIAL_SECTIONS.matches(&section))
}

fn unbundling(facts: &LineFacts<'_>, episode: &EventModel, t: &Thresholds) -> Option<Hit> {
    if !facts.rejected() || !episode.has_package() || facts.items.is_empty() {
        return None;
    }
    let total: i64 = facts.items.iter().map(|i| i.total.max(0)).sum();
    let clinical: i64 = facts.items.iter().filter(|i| package_clinical(i)).map(|i| i.total.max(0)).sum();
    if total == 0 || (clinical as f64) < t.package_clinical_share * total as f64 {
        return None;
    }

    let surgical = facts
        .items
        .iter()
        .any(|i| ItemTraits::of(&i.section, &i.description).clinically_specific()
            || PAVILION_TERMS.matches(&vocab::normalize(&i.section)));
    let package = match (episode.package(PackageKind::Pavilion), episode.package(PackageKind::Ward)) {
        (Some(_), _) if surgical => PackageKind::Pavilion,
        (_, Some(_)) => PackageKind::Ward,
        (Some(_), None) => PackageKind::Pavilion,
        (None, None) => return None,
    };

    Some(Hit {
        finding: Finding::Unbundling { package, item_ids: facts.item_ids() },
        impact: facts.line.copay,
        rationale: format!(
            "{} of {} in clinical items carved out of the {} package",
            clinical, total, package
        ),
    })
}

// ---------------------------------------------------------------------------
// M3: non-clinical cost transfer
// ---------------------------------------------------------------------------

fn cost_transfer(facts: &LineFacts<'_>, episode: &EventModel, t: &Thresholds) -> Option<Hit> {
    if !facts.rejected() || !facts.code_class.is_catch_code() || facts.items.is_empty() {
        return None;
    }

    let traits: Vec<(ItemTraits, i64)> = facts
        .items
        .iter()
        .map(|i| (ItemTraits::of(&i.section, &i.description), i.total.max(0)))
        .collect();
    let clinical = traits.iter().any(|(tr, _)| tr.clinical_signal());
    let typed_catch = matches!(facts.code_class, CodeClass::MedicationCatch | CodeClass::MaterialCatch);

    let subtype = if clinical || (typed_catch && !episode.has_package()) {
        CostTransferKind::UnclassifiedGenericRejection
    } else {
        composition(&traits, t.composition_dominance)
    };

    let rationale = match subtype {
        CostTransferKind::UnclassifiedGenericRejection => {
            format!("catch-all code {} rejected; composition does not explain the charge", facts.line.code)
        }
        other => format!("non-clinical items billed under catch-all code {} ({other:?})", facts.line.code),
    };
    Some(Hit { finding: Finding::CostTransfer { subtype }, impact: facts.line.copay, rationale })
}

/// Amount share of amenity and administrative items decides the subtype.
fn composition(traits: &[(ItemTraits, i64)], dominance: f64) -> CostTransferKind {
    let total: i64 = traits.iter().map(|(_, a)| a).sum();
    if total == 0 {
        return CostTransferKind::Mixed;
    }
    let amenity: i64 = traits.iter().filter(|(t, _)| t.amenity).map(|(_, a)| a).sum();
    let admin: i64 = traits.iter().filter(|(t, _)| t.administrative).map(|(_, a)| a).sum();
    if amenity as f64 >= dominance * total as f64 {
        CostTransferKind::AmenityDominant
    } else if admin as f64 >= dominance * total as f64 {
        CostTransferKind::AdministrativeDominant
    } else {
        CostTransferKind::Mixed
    }
}

// ---------------------------------------------------------------------------
// M4: domain reclassification
// ---------------------------------------------------------------------------

fn reclassification(facts: &LineFacts<'_>, episode: &EventModel, plan: &Contract) -> Option<Hit> {
    if !(episode.hospitalization_active || episode.surgical_active) || !facts.domain.is_ambulatory() {
        return None;
    }
    let line = facts.line;
    let current = facts.contract.coverage_pct.unwrap_or_else(|| {
        if line.value > 0 {
            line.paid as f64 * 100.0 / line.value as f64
        } else {
            0.0
        }
    });

    let (to, better) = [CoverageDomain::Hospitalization, CoverageDomain::ProfessionalFees]
        .into_iter()
        .filter_map(|d| contract::best_coverage(plan, d).map(|pct| (d, pct)))
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    if better <= current {
        return None;
    }

    let impact = ((line.value as f64 * (better - current) / 100.0).round() as i64).clamp(0, line.copay.max(0));
    Some(Hit {
        finding: Finding::DomainReclassification { from: facts.domain, to, current_pct: current, better_pct: better },
        impact,
        rationale: format!(
            "{} line inside an active inpatient episode; {to} coverage {better}% beats {current:.1}%",
            facts.domain
        ),
    })
}

// ---------------------------------------------------------------------------
// M5: contractual
// ---------------------------------------------------------------------------

fn contractual(facts: &LineFacts<'_>) -> Option<Hit> {
    let (impact, rationale) = match &facts.contract.state {
        ContractState::UnderCovered { shortfall } => (
            *shortfall,
            format!("copay exceeds the contractual copay by {shortfall} beyond tolerance"),
        ),
        ContractState::CapExceeded { cap, withheld } => {
            (*withheld, format!("contractual cap of {cap} withholds {withheld} from coverage"))
        }
        _ => return None,
    };
    Some(Hit { finding: Finding::Contractual { state: facts.contract.state.clone() }, impact, rationale })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AttemptStatus, ContractRule, DetectedPackage, PackageEvidence, Pass, TraceSummary,
    };

    fn item(id: &str, section: &str, description: &str, total: i64) -> BillItem {
        BillItem {
            id: id.into(),
            position: 0,
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
            id: "L".into(),
            folio: "F".into(),
            ordinal: 0,
            code: code.into(),
            description: description.into(),
            value,
            paid,
            copay,
        }
    }

    fn trace(traceability: Traceability, strategy: Option<Strategy>, ids: &[&BillItem]) -> LineTrace {
        LineTrace {
            pass: Pass::First,
            attempts: Vec::new(),
            summary: TraceSummary {
                status: if traceability == Traceability::None { AttemptStatus::Fail } else { AttemptStatus::Ok },
                traceability,
                strategy,
                item_ids: ids.iter().map(|i| i.id.clone()).collect(),
                matched_total: ids.iter().map(|i| i.total).sum(),
            },
        }
    }

    fn no_rule(domain: CoverageDomain) -> ContractEvaluation {
        ContractEvaluation {
            domain,
            rule_index: None,
            selection: None,
            coverage_pct: None,
            expected_paid: None,
            expected_copay: None,
            tolerance: 100,
            cap_amount: None,
            state: ContractState::NotVerifiableByContract { reason: "none".into() },
        }
    }

    fn with_pavilion() -> EventModel {
        EventModel {
            principal_act: None,
            packages: vec![DetectedPackage {
                kind: PackageKind::Pavilion,
                evidence: PackageEvidence::SectionText,
                item_ids: vec![],
            }],
            hospitalization_active: false,
            surgical_active: true,
        }
    }

    fn run(
        l: &AdjudicationLine,
        domain: CoverageDomain,
        class: CodeClass,
        tr: &LineTrace,
        items: &[&BillItem],
        episode: &EventModel,
        plan: &Contract,
    ) -> Classification {
        let eval = no_rule(domain);
        let facts = LineFacts { line: l, domain, code_class: class, trace: tr, items, contract: &eval };
        classify(&facts, episode, plan, &AuditConfig::default())
    }

    fn pharmacy() -> Vec<BillItem> {
        [102_588, 4_587, 15_716, 2_344, 3_048, 5_817]
            .iter()
            .enumerate()
            .map(|(n, a)| item(&format!("m{n}"), "FARMACIA", &format!("Medicamento {n} 1 mg"), *a))
            .collect()
    }

    #[test]
    fn pharmacy_bundle_with_package_is_unbundling() {
        let items = pharmacy();
        let refs: Vec<&BillItem> = items.iter().collect();
        let l = line("medications", "", 134_100, 0, 134_100);
        let tr = trace(Traceability::Strong, Some(Strategy::ContiguousWindow), &refs);
        let c = run(&l, CoverageDomain::Medications, CodeClass::MedicationCatch, &tr, &refs, &with_pavilion(), &Contract::default());
        assert!(matches!(c.finding, Finding::Unbundling { package: PackageKind::Pavilion, .. }), "{:?}", c.finding);
        assert_eq!(c.impact, 134_100);
        assert_eq!(c.triggered, vec![Motor::M2, Motor::M3]);
    }

    #[test]
    fn pharmacy_bundle_without_package_is_cost_transfer() {
        let items = pharmacy();
        let refs: Vec<&BillItem> = items.iter().collect();
        let l = line("medications", "", 134_100, 0, 134_100);
        let tr = trace(Traceability::Strong, Some(Strategy::ContiguousWindow), &refs);
        let c = run(&l, CoverageDomain::Medications, CodeClass::MedicationCatch, &tr, &refs, &EventModel::default(), &Contract::default());
        assert_eq!(c.finding, Finding::CostTransfer { subtype: CostTransferKind::UnclassifiedGenericRejection });
    }

    #[test]
    fn nursing_act_on_catch_code_prefers_m1_over_m3() {
        let cure = item("c", "SIN SECCION", "Curación simple", 12_000);
        let refs = vec![&cure];
        let l = line(NURSING_CATCH_CODE, "Gastos no cubiertos", 12_000, 0, 12_000);
        let tr = trace(Traceability::Strong, Some(Strategy::ExactAmount), &refs);
        let c = run(&l, CoverageDomain::Generic, CodeClass::GenericCatchAll, &tr, &refs, &EventModel::default(), &Contract::default());
        assert!(matches!(c.finding, Finding::NonBillableAct { reason: NonBillableReason::AutonomousAct, .. }));
        assert_eq!(c.triggered, vec![Motor::M1, Motor::M3]);
    }

    #[test]
    fn amenity_items_on_generic_code() {
        let kit = item("k", "INSUMOS", "Kit de aseo", 7_000);
        let adm = item("a", "ADMISION", "Cargo de admisión", 1_000);
        let refs = vec![&kit, &adm];
        let l = line("3201001", "Gastos no cubiertos", 8_000, 0, 8_000);
        let tr = trace(Traceability::Weak, Some(Strategy::SubsetSum { ordering: crate::model::PoolOrdering::Physical, relaxed: true }), &refs);
        let c = run(&l, CoverageDomain::Generic, CodeClass::GenericCatchAll, &tr, &refs, &EventModel::default(), &Contract::default());
        assert_eq!(c.finding, Finding::CostTransfer { subtype: CostTransferKind::AmenityDominant });
        assert_eq!(c.triggered, vec![Motor::M3]);
    }

    #[test]
    fn ambulatory_line_inside_episode_is_reclassified() {
        let plan = Contract {
            rules: vec![ContractRule {
                domain: CoverageDomain::Hospitalization,
                coverage_pct: Some(90.0),
                cap: None,
                source_text: String::new(),
            }],
        };
        let l = line("0401001", "Radiografía", 100_000, 50_000, 50_000);
        let tr = trace(Traceability::None, None, &[]);
        let c = run(&l, CoverageDomain::Imaging, CodeClass::Specific, &tr, &[], &with_pavilion(), &plan);
        match c.finding {
            Finding::DomainReclassification { to, current_pct, better_pct, .. } => {
                assert_eq!(to, CoverageDomain::Hospitalization);
                assert_eq!(current_pct, 50.0);
                assert_eq!(better_pct, 90.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(c.impact, 40_000);
    }

    #[test]
    fn specific_zero_payment_is_unexplained_rejection() {
        let l = line("0301045", "Perfil lipídico", 9_000, 0, 9_000);
        let tr = trace(Traceability::None, None, &[]);
        let c = run(&l, CoverageDomain::Laboratory, CodeClass::Specific, &tr, &[], &EventModel::default(), &Contract::default());
        assert!(matches!(c.finding, Finding::NonBillableAct { reason: NonBillableReason::UnexplainedRejection, .. }));
        assert_eq!(c.impact, 9_000);
    }

    #[test]
    fn under_coverage_is_contractual() {
        let l = line("0301045", "Perfil", 10_000, 5_000, 5_000);
        let tr = trace(Traceability::Strong, Some(Strategy::ExactAmount), &[]);
        let mut eval = no_rule(CoverageDomain::Laboratory);
        eval.state = ContractState::UnderCovered { shortfall: 2_000 };
        let facts = LineFacts {
            line: &l,
            domain: CoverageDomain::Laboratory,
            code_class: CodeClass::Specific,
            trace: &tr,
            items: &[],
            contract: &eval,
        };
        let c = classify(&facts, &EventModel::default(), &Contract::default(), &AuditConfig::default());
        assert!(matches!(c.finding, Finding::Contractual { .. }));
        assert_eq!(c.impact, 2_000);
    }

    #[test]
    fn fallbacks() {
        let l = line("0301045", "Perfil", 10_000, 7_000, 3_000);
        let strong = trace(Traceability::Strong, Some(Strategy::ExactAmount), &[]);
        let weak = trace(Traceability::Weak, Some(Strategy::SubtotalBlock), &[]);
        let none = trace(Traceability::None, None, &[]);
        let plan = Contract::default();
        let ep = EventModel::default();
        let d = CoverageDomain::Laboratory;
        assert_eq!(run(&l, d, CodeClass::Specific, &strong, &[], &ep, &plan).finding, Finding::Correct);
        assert_eq!(run(&l, d, CodeClass::Specific, &weak, &[], &ep, &plan).finding, Finding::Unconfirmed);
        let opaque = run(&l, d, CodeClass::Specific, &none, &[], &ep, &plan);
        assert_eq!(opaque.finding, Finding::TotalOpacity);
        assert_eq!(opaque.impact, 3_000);
        assert!(opaque.triggered.is_empty());
    }
}
