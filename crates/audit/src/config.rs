use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::AuditError;
use crate::model::{CapKind, RateOrigin, ResolvedRate};

/// Currency per UF used when no resolved rate is configured.
pub const FALLBACK_UF: f64 = 39_000.0;
/// Currency per UTM used when no resolved rate is configured.
pub const FALLBACK_UTM: f64 = 68_000.0;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub search: SearchBudget,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub opacity: OpacityWeights,
    #[serde(default)]
    pub conversion: ConversionConfig,
}

fn default_name() -> String {
    "default".into()
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            tolerance: ToleranceConfig::default(),
            search: SearchBudget::default(),
            thresholds: Thresholds::default(),
            opacity: OpacityWeights::default(),
            conversion: ConversionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToleranceConfig {
    /// Allowed |value - (paid + copay)| before a line is reported incoherent.
    pub coherence_floor: i64,
    /// Fixed floor of the copay comparison band.
    pub copay_floor: i64,
    /// Proportional part of the copay band, as a fraction of the line total.
    pub copay_ratio: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            coherence_floor: 1,
            copay_floor: 100,
            copay_ratio: 0.001,
        }
    }
}

impl ToleranceConfig {
    /// Copay band for a line total: max(floor, ratio × total).
    pub fn copay_band(&self, total: i64) -> i64 {
        self.copay_floor.max(self.proportional(total))
    }

    pub fn coherence_band(&self, total: i64) -> i64 {
        self.coherence_floor.max(self.proportional(total))
    }

    fn proportional(&self, total: i64) -> i64 {
        // Epsilon keeps exact products like 1e6 × 0.001 from flooring to 999.
        (total.abs() as f64 * self.copay_ratio + 1e-9).floor() as i64
    }
}

// ---------------------------------------------------------------------------
// Search budget
// ---------------------------------------------------------------------------

/// Worst-case budget of the combinatorial strategies.
///
/// Subset search allocates one slot per currency unit up to `max_target`
/// and walks at most `max_candidates` items per pool ordering.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchBudget {
    pub max_candidates: usize,
    pub max_target: i64,
    pub max_blocks: usize,
    pub max_block_combination: usize,
    /// Largest hole (in physical positions) tolerated inside a residual segment.
    pub segment_max_gap: usize,
    pub max_ranked_candidates: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self {
            max_candidates: 40,
            max_target: 5_000_000,
            max_blocks: 60,
            max_block_combination: 3,
            segment_max_gap: 2,
            max_ranked_candidates: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    /// Minimum bundle score for a window or restricted subset to count as strong.
    pub strong_score: i32,
    /// Bundles larger than this are penalized per extra item.
    pub max_bundle_size: usize,
    pub opacity_threshold: u32,
    /// Findings of one motor needed to call the pattern systemic.
    pub systemic_min_findings: usize,
    /// Share of analyzed copay moved by M2/M3 that makes the pattern systemic.
    pub systemic_cost_transfer_ratio: f64,
    /// Share of clinical items needed to read a bundle as carved out of a package.
    pub package_clinical_share: f64,
    /// Share of amenity or administrative items that names an M3 subtype.
    pub composition_dominance: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            strong_score: 50,
            max_bundle_size: 8,
            opacity_threshold: 40,
            systemic_min_findings: 3,
            systemic_cost_transfer_ratio: 0.30,
            package_clinical_share: 0.5,
            composition_dominance: 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// Opacity weights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpacityWeights {
    pub generic_code: u32,
    pub generic_description: u32,
    pub zero_payment: u32,
    pub trace_failure: u32,
    pub weak_trace: u32,
}

impl Default for OpacityWeights {
    fn default() -> Self {
        Self {
            generic_code: 25,
            generic_description: 20,
            zero_payment: 15,
            trace_failure: 15,
            weak_trace: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Reference-unit conversion
// ---------------------------------------------------------------------------

/// Pre-resolved currency value of each cap unit, plus where it came from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionConfig {
    pub uf: Option<f64>,
    pub utm: Option<f64>,
    pub ac2: Option<f64>,
    pub vam: Option<f64>,
    pub source: Option<String>,
    pub resolved_on: Option<NaiveDate>,
}

impl ConversionConfig {
    pub fn resolve(&self, unit: CapKind) -> ResolvedRate {
        let (configured, fallback) = match unit {
            CapKind::Currency => (Some(1.0), None),
            CapKind::Uf => (self.uf, Some(FALLBACK_UF)),
            CapKind::Utm => (self.utm, Some(FALLBACK_UTM)),
            CapKind::Ac2 => (self.ac2, None),
            CapKind::Vam => (self.vam, None),
        };
        match (configured, fallback) {
            (Some(value), _) => ResolvedRate { unit, value: Some(value), origin: RateOrigin::Configured },
            (None, Some(value)) => ResolvedRate { unit, value: Some(value), origin: RateOrigin::Fallback },
            (None, None) => ResolvedRate { unit, value: None, origin: RateOrigin::Missing },
        }
    }

    /// Resolution of every non-currency unit, for result provenance.
    pub fn provenance(&self) -> Vec<ResolvedRate> {
        [CapKind::Uf, CapKind::Utm, CapKind::Ac2, CapKind::Vam]
            .into_iter()
            .map(|unit| self.resolve(unit))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl AuditConfig {
    pub fn from_toml(input: &str) -> Result<Self, AuditError> {
        let config: AuditConfig =
            toml::from_str(input).map_err(|e| AuditError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuditError> {
        let s = &self.search;
        if s.max_candidates == 0 {
            return Err(AuditError::ConfigValidation("search.max_candidates must be > 0".into()));
        }
        if s.max_target <= 0 {
            return Err(AuditError::ConfigValidation("search.max_target must be > 0".into()));
        }
        if !(1..=3).contains(&s.max_block_combination) {
            return Err(AuditError::ConfigValidation(format!(
                "search.max_block_combination must be 1..=3, got {}",
                s.max_block_combination
            )));
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("thresholds.systemic_cost_transfer_ratio", t.systemic_cost_transfer_ratio),
            ("thresholds.package_clinical_share", t.package_clinical_share),
            ("thresholds.composition_dominance", t.composition_dominance),
            ("tolerance.copay_ratio", self.tolerance.copay_ratio),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AuditError::ConfigValidation(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if self.tolerance.copay_floor < 0 || self.tolerance.coherence_floor < 0 {
            return Err(AuditError::ConfigValidation("tolerance floors must be >= 0".into()));
        }

        let c = &self.conversion;
        for (name, rate) in [("uf", c.uf), ("utm", c.utm), ("ac2", c.ac2), ("vam", c.vam)] {
            if let Some(r) = rate {
                if !(r > 0.0) {
                    return Err(AuditError::ConfigValidation(format!(
                        "conversion.{name} must be positive, got {r}"
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "Clinica 2026"

[tolerance]
coherence_floor = 2
copay_floor = 150
copay_ratio = 0.002

[search]
max_candidates = 30
max_target = 2000000
segment_max_gap = 1

[thresholds]
strong_score = 60
max_bundle_size = 6
opacity_threshold = 35

[opacity]
generic_code = 30

[conversion]
uf = 39500.5
utm = 67000.0
source = "central bank daily series"
resolved_on = "2026-10-01"
"#;

    #[test]
    fn empty_document_is_default() {
        let config = AuditConfig::from_toml("").unwrap();
        assert_eq!(config.name, "default");
        assert_eq!(config.thresholds.strong_score, 50);
        assert_eq!(config.thresholds.max_bundle_size, 8);
        assert_eq!(config.opacity.generic_code, 25);
        assert_eq!(config.search.max_block_combination, 3);
        assert!(config.conversion.uf.is_none());
    }

    #[test]
    fn parse_full() {
        let config = AuditConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name, "Clinica 2026");
        assert_eq!(config.tolerance.copay_floor, 150);
        assert_eq!(config.search.max_candidates, 30);
        assert_eq!(config.search.max_blocks, 60); // defaulted inside a present table
        assert_eq!(config.thresholds.strong_score, 60);
        assert_eq!(config.opacity.generic_code, 30);
        assert_eq!(config.opacity.zero_payment, 15);
        assert_eq!(config.conversion.resolved_on.unwrap().to_string(), "2026-10-01");
    }

    #[test]
    fn rate_resolution_origins() {
        let config = AuditConfig::from_toml(FULL).unwrap();
        let uf = config.conversion.resolve(CapKind::Uf);
        assert_eq!(uf.value, Some(39500.5));
        assert_eq!(uf.origin, RateOrigin::Configured);

        let defaults = ConversionConfig::default();
        assert_eq!(defaults.resolve(CapKind::Utm).origin, RateOrigin::Fallback);
        assert_eq!(defaults.resolve(CapKind::Utm).value, Some(FALLBACK_UTM));
        assert_eq!(defaults.resolve(CapKind::Vam).origin, RateOrigin::Missing);
        assert_eq!(defaults.resolve(CapKind::Currency).value, Some(1.0));
        assert_eq!(defaults.provenance().len(), 4);
    }

    #[test]
    fn copay_band_uses_larger_of_floor_and_ratio() {
        let tol = ToleranceConfig::default();
        assert_eq!(tol.copay_band(50_000), 100); // 0.1% = 50 < floor
        assert_eq!(tol.copay_band(1_000_000), 1_000);
        assert_eq!(tol.copay_band(1_234_567), 1_234);
    }

    #[test]
    fn reject_unknown_field() {
        let err = AuditConfig::from_toml("[thresholds]\nstrong = 3\n");
        assert!(err.is_err(), "typo in a threshold name should fail deserialization");
    }

    #[test]
    fn reject_block_combination_out_of_range() {
        let err = AuditConfig::from_toml("[search]\nmax_block_combination = 4\n").unwrap_err();
        assert!(err.to_string().contains("max_block_combination"));
    }

    #[test]
    fn reject_ratio_out_of_range() {
        let err = AuditConfig::from_toml("[thresholds]\nsystemic_cost_transfer_ratio = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("systemic_cost_transfer_ratio"));
    }

    #[test]
    fn reject_negative_rate() {
        let err = AuditConfig::from_toml("[conversion]\nuf = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("conversion.uf"));
    }

    #[test]
    fn reject_empty_budget() {
        let err = AuditConfig::from_toml("[search]\nmax_candidates = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_candidates"));
    }
}
