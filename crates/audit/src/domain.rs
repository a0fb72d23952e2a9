//! Coverage-domain resolution and the item filter each domain implies.

use crate::model::{CodeClass, CoverageDomain};
use crate::vocab::{
    self, ItemTraits, CODE_PREFIXES, DOMAIN_KEYWORDS, FEE_TERMS, GENERIC_CODES, IMAGING_TERMS,
    LABORATORY_TERMS, MATERIAL_CODES, MEDICATION_CODES, PAVILION_TERMS, WARD_TERMS,
};

/// Map a procedure code and its description to a coverage domain.
///
/// Known catch codes first, then numeric prefixes, then keywords over the
/// code text and description together (symbolic codes like `"medications"`).
pub fn resolve_domain(code: &str, description: &str) -> CoverageDomain {
    let code = code.trim();
    if GENERIC_CODES.contains(&code) {
        return CoverageDomain::Generic;
    }
    if MEDICATION_CODES.contains(&code) {
        return CoverageDomain::Medications;
    }
    if MATERIAL_CODES.contains(&code) {
        return CoverageDomain::Materials;
    }

    let digits: String = code.chars().filter(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() && digits.len() == code.chars().filter(|c| !matches!(c, '-' | '.' | ' ')).count() {
        if let Some((_, domain)) = CODE_PREFIXES.iter().find(|(prefix, _)| digits.starts_with(prefix)) {
            return *domain;
        }
    }

    let text = vocab::normalize(&format!("{code} {description}"));
    DOMAIN_KEYWORDS
        .iter()
        .find(|(_, table)| table.matches(&text))
        .map(|(domain, _)| *domain)
        .unwrap_or(CoverageDomain::Other)
}

pub fn code_class(domain: CoverageDomain) -> CodeClass {
    match domain {
        CoverageDomain::Generic => CodeClass::GenericCatchAll,
        CoverageDomain::Medications => CodeClass::MedicationCatch,
        CoverageDomain::Materials => CodeClass::MaterialCatch,
        _ => CodeClass::Specific,
    }
}

/// Restriction applied to the candidate pool of the combinatorial search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainFilter {
    Restricted(CoverageDomain),
    /// Catch-all line: no restriction, resolved in the second pass.
    Generic,
    Unrestricted,
}

impl DomainFilter {
    pub fn for_domain(domain: CoverageDomain) -> Self {
        match domain {
            CoverageDomain::Generic => Self::Generic,
            CoverageDomain::Other => Self::Unrestricted,
            d => Self::Restricted(d),
        }
    }

    /// Medication and material catch codes never fall back to an unfiltered pool.
    pub fn is_strict(&self) -> bool {
        matches!(
            self,
            Self::Restricted(CoverageDomain::Medications) | Self::Restricted(CoverageDomain::Materials)
        )
    }

    pub fn is_restricted(&self) -> bool {
        matches!(self, Self::Restricted(_))
    }

    pub fn admits(&self, section: &str, description: &str) -> bool {
        let domain = match self {
            Self::Restricted(d) => *d,
            Self::Generic | Self::Unrestricted => return true,
        };
        let sec = vocab::normalize(section);
        let desc = vocab::normalize(description);
        let either = |table: &vocab::KeywordTable| table.matches(&sec) || table.matches(&desc);

        match domain {
            CoverageDomain::Medications => ItemTraits::of(section, description).drug,
            CoverageDomain::Materials => ItemTraits::of(section, description).material,
            CoverageDomain::Pavilion => {
                either(&PAVILION_TERMS) || ItemTraits::of(section, description).clinically_specific()
            }
            CoverageDomain::Hospitalization => either(&WARD_TERMS),
            CoverageDomain::ProfessionalFees => either(&FEE_TERMS),
            CoverageDomain::Laboratory => either(&LABORATORY_TERMS),
            CoverageDomain::Imaging => either(&IMAGING_TERMS),
            other => DOMAIN_KEYWORDS
                .iter()
                .filter(|(d, _)| *d == other)
                .any(|(_, table)| either(table)),
        }
    }
}
