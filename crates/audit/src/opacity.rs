use crate::config::OpacityWeights;
use crate::model::{
    AdjudicationLine, CodeClass, OpacityPoint, OpacityScore, OpacitySignal, Traceability,
};
use crate::vocab::{self, GENERIC_DESCRIPTIONS};

pub const MAX_SCORE: u32 = 100;

/// Transparency score of one line: points per signal, capped at [`MAX_SCORE`].
pub fn score(
    line: &AdjudicationLine,
    code_class: CodeClass,
    traceability: Traceability,
    weights: &OpacityWeights,
    threshold: u32,
) -> OpacityScore {
    let description = vocab::normalize(&line.description);
    let signals = [
        (
            OpacitySignal::GenericCode,
            code_class == CodeClass::GenericCatchAll && traceability != Traceability::Strong,
            weights.generic_code,
        ),
        (
            OpacitySignal::GenericDescription,
            description.is_empty() || GENERIC_DESCRIPTIONS.matches(&description),
            weights.generic_description,
        ),
        (OpacitySignal::ZeroPayment, line.paid == 0 && line.copay > 0, weights.zero_payment),
        (OpacitySignal::TraceFailure, traceability == Traceability::None, weights.trace_failure),
        (OpacitySignal::WeakTrace, traceability == Traceability::Weak, weights.weak_trace),
    ];

    let points: Vec<OpacityPoint> = signals
        .into_iter()
        .filter(|(_, hit, weight)| *hit && *weight > 0)
        .map(|(signal, _, points)| OpacityPoint { signal, points })
        .collect();
    let score = points.iter().map(|p| p.points).sum::<u32>().min(MAX_SCORE);
    OpacityScore { score, points, opaque: score >= threshold }
}

/// Audit-wide opacity: the highest score among opaque lines.
pub fn audit_opacity<'a>(scores: impl IntoIterator<Item = &'a OpacityScore>) -> Option<u32> {
    scores.into_iter().filter(|s| s.opaque).map(|s| s.score).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(description: &str, paid: i64, copay: i64) -> AdjudicationLine {
        AdjudicationLine {
            id: "L".into(),
            folio: "F".into(),
            ordinal: 0,
            code: "3201001".into(),
            description: description.into(),
            value: paid + copay,
            paid,
            copay,
        }
    }

    #[test]
    fn generic_rejected_untraced_line_is_opaque() {
        let s = score(
            &line("Gastos no cubiertos", 0, 50_000),
            CodeClass::GenericCatchAll,
            Traceability::None,
            &OpacityWeights::default(),
            40,
        );
        // 25 + 20 + 15 + 15
        assert_eq!(s.score, 75);
        assert!(s.opaque);
        assert_eq!(s.points.len(), 4);
    }

    #[test]
    fn strong_specific_line_is_transparent() {
        let s = score(
            &line("Hemograma", 3_000, 1_000),
            CodeClass::Specific,
            Traceability::Strong,
            &OpacityWeights::default(),
            40,
        );
        assert_eq!(s.score, 0);
        assert!(!s.opaque);
        assert!(s.points.is_empty());
    }

    #[test]
    fn score_is_capped() {
        let weights = OpacityWeights {
            generic_code: 90,
            generic_description: 90,
            ..OpacityWeights::default()
        };
        let s = score(&line("", 0, 1), CodeClass::GenericCatchAll, Traceability::Weak, &weights, 40);
        assert_eq!(s.score, MAX_SCORE);
    }

    #[test]
    fn audit_level_is_max_of_opaque_lines() {
        let a = OpacityScore { score: 35, points: vec![], opaque: false };
        let b = OpacityScore { score: 60, points: vec![], opaque: true };
        let c = OpacityScore { score: 45, points: vec![], opaque: true };
        assert_eq!(audit_opacity([&a, &b, &c]), Some(60));
        assert_eq!(audit_opacity([&a]), None);
    }
}
