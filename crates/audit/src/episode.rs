//! Event model: which all-inclusive packages the bill implies and what the
//! principal act of the episode was.

use std::collections::BTreeSet;

use crate::model::{
    AdjudicationLine, BillItem, CoverageDomain, DetectedPackage, EventModel, PackageEvidence, PackageKind,
};
use crate::vocab::{self, ANESTHESIA_DRUGS, PAVILION_TERMS, WARD_TERMS};

/// Distinct anesthesia drugs needed to infer a pavilion without section text.
pub const ANESTHESIA_FINGERPRINT_MIN: usize = 2;

pub fn detect(items: &[BillItem], lines: &[(&AdjudicationLine, CoverageDomain)]) -> EventModel {
    let mut packages = Vec::new();
    if let Some(p) = pavilion(items, lines) {
        packages.push(p);
    }
    if let Some(p) = ward(items, lines) {
        packages.push(p);
    }

    let principal_act = lines
        .iter()
        .filter(|(_, d)| matches!(d, CoverageDomain::Pavilion | CoverageDomain::ProfessionalFees))
        .max_by(|(a, _), (b, _)| a.value.cmp(&b.value).then(b.ordinal.cmp(&a.ordinal)))
        .map(|(l, _)| describe(l));

    let model = EventModel {
        principal_act,
        hospitalization_active: packages.iter().any(|p| p.kind == PackageKind::Ward),
        surgical_active: packages.iter().any(|p| p.kind == PackageKind::Pavilion),
        packages,
    };
    tracing::debug!(
        packages = model.packages.len(),
        principal = model.principal_act.as_deref().unwrap_or("-"),
        "event model"
    );
    model
}

fn describe(line: &AdjudicationLine) -> String {
    if line.description.is_empty() {
        line.code.clone()
    } else {
        format!("{} {}", line.code, line.description)
    }
}

fn pavilion(items: &[BillItem], lines: &[(&AdjudicationLine, CoverageDomain)]) -> Option<DetectedPackage> {
    let by_section = ids_where(items, |item| PAVILION_TERMS.matches(&vocab::normalize(&item.section)));
    if !by_section.is_empty() {
        return Some(package(PackageKind::Pavilion, PackageEvidence::SectionText, by_section));
    }

    let mut drugs = BTreeSet::new();
    let mut ids = Vec::new();
    for item in items {
        if let Some(term) = ANESTHESIA_DRUGS.first_match(&vocab::normalize(&item.description)) {
            drugs.insert(term);
            ids.push(item.id.clone());
        }
    }
    if drugs.len() >= ANESTHESIA_FINGERPRINT_MIN {
        return Some(package(PackageKind::Pavilion, PackageEvidence::AnesthesiaFingerprint, ids));
    }

    lines
        .iter()
        .any(|(_, d)| *d == CoverageDomain::Pavilion)
        .then(|| package(PackageKind::Pavilion, PackageEvidence::AdjudicationLine, Vec::new()))
}

fn ward(items: &[BillItem], lines: &[(&AdjudicationLine, CoverageDomain)]) -> Option<DetectedPackage> {
    let by_text = ids_where(items, |item| {
        WARD_TERMS.matches(&vocab::normalize(&item.section)) || WARD_TERMS.matches(&vocab::normalize(&item.description))
    });
    if !by_text.is_empty() {
        return Some(package(PackageKind::Ward, PackageEvidence::SectionText, by_text));
    }
    lines
        .iter()
        .any(|(_, d)| *d == CoverageDomain::Hospitalization)
        .then(|| package(PackageKind::Ward, PackageEvidence::AdjudicationLine, Vec::new()))
}

fn ids_where(items: &[BillItem], pred: impl Fn(&BillItem) -> bool) -> Vec<String> {
    items.iter().filter(|i| pred(i)).map(|i| i.id.clone()).collect()
}

fn package(kind: PackageKind, evidence: PackageEvidence, item_ids: Vec<String>) -> DetectedPackage {
    DetectedPackage { kind, evidence, item_ids }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, section: &str, description: &str) -> BillItem {
        BillItem {
            id: id.into(),
            position: 0,
            section: section.into(),
            section_inferred: false,
            description: description.into(),
            quantity: 1.0,
            unit_price: 1,
            total: 1,
        }
    }

    fn line(code: &str, description: &str, value: i64, ordinal: usize) -> AdjudicationLine {
        AdjudicationLine {
            id: format!("L{ordinal}"),
            folio: "F".into(),
            ordinal,
            code: code.into(),
            description: description.into(),
            value,
            paid: 0,
            copay: 0,
        }
    }

    #[test]
    fn pavilion_from_section_text() {
        let items = vec![item("a", "PABELLÓN CENTRAL", "Sutura"), item("b", "FARMACIA", "Propofol")];
        let model = detect(&items, &[]);
        let p = model.package(PackageKind::Pavilion).expect("pavilion");
        assert_eq!(p.evidence, PackageEvidence::SectionText);
        assert_eq!(p.item_ids, vec!["a"]);
        assert!(model.surgical_active);
        assert!(!model.hospitalization_active);
    }

    #[test]
    fn pavilion_from_anesthesia_fingerprint() {
        let one = vec![item("a", "FARMACIA", "Propofol 1%"), item("b", "FARMACIA", "Propofol 2%")];
        assert!(detect(&one, &[]).package(PackageKind::Pavilion).is_none());

        let two = vec![item("a", "FARMACIA", "Propofol 1%"), item("b", "FARMACIA", "Fentanilo 0,1 mg")];
        let model = detect(&two, &[]);
        assert_eq!(
            model.package(PackageKind::Pavilion).map(|p| p.evidence),
            Some(PackageEvidence::AnesthesiaFingerprint)
        );
    }

    #[test]
    fn ward_from_hospitalization_line() {
        let l = line("0202003", "Día cama", 100, 0);
        let model = detect(&[], &[(&l, CoverageDomain::Hospitalization)]);
        assert_eq!(
            model.package(PackageKind::Ward).map(|p| p.evidence),
            Some(PackageEvidence::AdjudicationLine)
        );
        assert!(model.hospitalization_active);
    }

    #[test]
    fn principal_act_is_largest_surgical_line() {
        let a = line("1801001", "Colecistectomía", 900_000, 0);
        let b = line("0203001", "Derecho de pabellón", 400_000, 1);
        let c = line("0202003", "Día cama", 2_000_000, 2);
        let model = detect(
            &[],
            &[
                (&a, CoverageDomain::ProfessionalFees),
                (&b, CoverageDomain::Pavilion),
                (&c, CoverageDomain::Hospitalization),
            ],
        );
        assert_eq!(model.principal_act.as_deref(), Some("1801001 Colecistectomía"));
    }
}
