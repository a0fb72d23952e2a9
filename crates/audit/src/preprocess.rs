//! Indexing and pre-processing: stable identifiers, physical order, inferred
//! sections and flattened adjudication lines.

use std::collections::BTreeSet;

use crate::config::ToleranceConfig;
use crate::model::{
    AdjudicationLine, AuditInput, BillItem, InputWarning, RawBillItem, WarningKind,
};
use crate::vocab::{self, SECTION_SIGNALS, SECTION_UNKNOWN};

/// Canonical documents after pre-processing. Nothing is dropped.
#[derive(Debug, Clone, Default)]
pub struct Prepared {
    pub items: Vec<BillItem>,
    pub lines: Vec<AdjudicationLine>,
    pub warnings: Vec<InputWarning>,
}

pub fn prepare(input: &AuditInput, tolerance: &ToleranceConfig) -> Prepared {
    let mut warnings = Vec::new();
    let mut items = index_items(&input.bill.items, &mut warnings);
    infer_sections(&input.bill.items, &mut items);
    let lines = flatten_lines(input, tolerance, &mut warnings);

    for w in &warnings {
        tracing::warn!(subject = %w.subject, kind = ?w.kind, "input integrity");
    }

    Prepared { items, lines, warnings }
}

/// Sort by physical index (input order breaks ties and fills gaps), then
/// assign ids and dense positions.
fn index_items(raw: &[RawBillItem], warnings: &mut Vec<InputWarning>) -> Vec<BillItem> {
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by_key(|&i| (raw[i].index.unwrap_or(i), i));

    let mut seen = BTreeSet::new();
    order
        .into_iter()
        .enumerate()
        .map(|(position, i)| {
            let r = &raw[i];
            let base = match r.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => format!("item-{:04}", r.index.unwrap_or(i)),
            };
            let id = unique_id(base, &mut seen, warnings);
            if r.total <= 0 {
                warnings.push(InputWarning {
                    subject: id.clone(),
                    kind: WarningKind::NonPositiveItem { total: r.total },
                });
            }
            BillItem {
                id,
                position,
                section: String::new(),
                section_inferred: false,
                description: r.description.trim().to_string(),
                quantity: r.quantity,
                unit_price: r.unit_price,
                total: r.total,
            }
        })
        .collect()
}

fn unique_id(base: String, seen: &mut BTreeSet<String>, warnings: &mut Vec<InputWarning>) -> String {
    if seen.insert(base.clone()) {
        return base;
    }
    warnings.push(InputWarning { subject: base.clone(), kind: WarningKind::DuplicateItemId });
    let mut n = 2;
    loop {
        let candidate = format!("{base}#{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Running "current section": explicit labels win, otherwise a description
/// carrying a section signal opens a new section that persists forward.
fn infer_sections(raw: &[RawBillItem], items: &mut [BillItem]) {
    let mut order: Vec<usize> = (0..raw.len()).collect();
    order.sort_by_key(|&i| (raw[i].index.unwrap_or(i), i));

    let mut current: Option<String> = None;
    for (item, &i) in items.iter_mut().zip(order.iter()) {
        let explicit = raw[i].section.as_deref().map(str::trim).filter(|s| !s.is_empty());
        match explicit {
            Some(section) => {
                current = Some(section.to_string());
                item.section = section.to_string();
            }
            None => {
                let desc = vocab::normalize(&item.description);
                if let Some((label, _)) = SECTION_SIGNALS.iter().find(|(_, table)| table.matches(&desc)) {
                    current = Some((*label).to_string());
                }
                item.section = current.clone().unwrap_or_else(|| SECTION_UNKNOWN.to_string());
                item.section_inferred = true;
            }
        }
    }
}

fn flatten_lines(
    input: &AuditInput,
    tolerance: &ToleranceConfig,
    warnings: &mut Vec<InputWarning>,
) -> Vec<AdjudicationLine> {
    let mut seen = BTreeSet::new();
    let mut lines = Vec::new();

    for folio in &input.adjudication.folios {
        for (n, raw) in folio.lines.iter().enumerate() {
            let base = match raw.id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => format!("{}-{:03}", folio.folio, n + 1),
            };
            let id = if seen.insert(base.clone()) {
                base
            } else {
                let mut k = 2;
                loop {
                    let candidate = format!("{base}#{k}");
                    if seen.insert(candidate.clone()) {
                        break candidate;
                    }
                    k += 1;
                }
            };

            for (field, value) in [("value", raw.value), ("paid", raw.paid), ("copay", raw.copay)] {
                if value < 0 {
                    warnings.push(InputWarning {
                        subject: id.clone(),
                        kind: WarningKind::NegativeAmount { field: field.into(), value },
                    });
                }
            }
            if (raw.value - raw.paid - raw.copay).abs() > tolerance.coherence_band(raw.value) {
                warnings.push(InputWarning {
                    subject: id.clone(),
                    kind: WarningKind::IncoherentLine { value: raw.value, paid: raw.paid, copay: raw.copay },
                });
            }

            lines.push(AdjudicationLine {
                id,
                folio: folio.folio.clone(),
                ordinal: lines.len(),
                code: raw.code.trim().to_string(),
                description: raw.description.trim().to_string(),
                value: raw.value,
                paid: raw.paid,
                copay: raw.copay,
            });
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Adjudication, Bill, Folio, RawAdjudicationLine};

    fn raw(index: Option<usize>, section: Option<&str>, description: &str, total: i64) -> RawBillItem {
        RawBillItem {
            id: None,
            index,
            section: section.map(String::from),
            description: description.into(),
            quantity: 1.0,
            unit_price: total,
            total,
        }
    }

    fn pam(code: &str, value: i64, paid: i64, copay: i64) -> RawAdjudicationLine {
        RawAdjudicationLine {
            id: None,
            code: code.into(),
            description: String::new(),
            value,
            paid,
            copay,
        }
    }

    fn input(items: Vec<RawBillItem>, lines: Vec<RawAdjudicationLine>) -> AuditInput {
        AuditInput {
            bill: Bill { items },
            adjudication: Adjudication { folios: vec![Folio { folio: "F1".into(), lines }] },
            ..Default::default()
        }
    }

    #[test]
    fn items_follow_physical_index() {
        let p = prepare(
            &input(
                vec![raw(Some(7), None, "b", 10), raw(Some(2), None, "a", 20), raw(None, None, "c", 30)],
                vec![],
            ),
            &ToleranceConfig::default(),
        );
        let order: Vec<&str> = p.items.iter().map(|i| i.description.as_str()).collect();
        // The un-indexed third item keeps its input slot (2) and sorts after index 2.
        assert_eq!(order, vec!["a", "c", "b"]);
        assert_eq!(p.items[0].id, "item-0002");
        assert_eq!(p.items[1].id, "item-0002#2");
        assert_eq!(p.items[2].position, 2);
        assert!(p.warnings.iter().any(|w| w.kind == WarningKind::DuplicateItemId));
    }

    #[test]
    fn section_propagates_until_next_signal() {
        let p = prepare(
            &input(
                vec![
                    raw(None, None, "Suero fisiológico", 10),
                    raw(None, None, "Derecho de pabellón", 10),
                    raw(None, None, "Propofol 1% 20 ml", 10),
                    raw(None, Some("FARMACIA"), "Paracetamol 1 g", 10),
                    raw(None, None, "Honorarios cirujano", 10),
                    raw(None, None, "Ayudante", 10),
                ],
                vec![],
            ),
            &ToleranceConfig::default(),
        );
        let sections: Vec<&str> = p.items.iter().map(|i| i.section.as_str()).collect();
        assert_eq!(
            sections,
            vec![SECTION_UNKNOWN, "PABELLON", "PABELLON", "FARMACIA", "HONORARIOS", "HONORARIOS"]
        );
        assert!(!p.items[3].section_inferred);
        assert!(p.items[2].section_inferred);
    }

    #[test]
    fn lines_are_flattened_with_warnings() {
        let p = prepare(
            &input(vec![], vec![pam("0101001", 10_000, 7_000, 3_000), pam("3201001", 5_000, 0, 4_000), pam("x", 100, 0, -1)]),
            &ToleranceConfig::default(),
        );
        assert_eq!(p.lines.len(), 3);
        assert_eq!(p.lines[1].id, "F1-002");
        assert_eq!(p.lines[2].ordinal, 2);
        assert!(p.warnings.iter().any(|w| w.subject == "F1-002"
            && matches!(w.kind, WarningKind::IncoherentLine { .. })));
        assert!(p.warnings.iter().any(|w| w.subject == "F1-003"
            && matches!(w.kind, WarningKind::NegativeAmount { .. })));
        assert!(!p.warnings.iter().any(|w| w.subject == "F1-001"));
    }
}
