//! Keyword vocabularies behind every text heuristic of the engine.
//!
//! Tables are plain data so they can be reviewed and unit-tested apart from
//! control flow. Terms are written already normalized (see [`normalize`]) and
//! match at word starts, so `"honorario"` also matches `"honorarios"`.
//! Bump [`VOCABULARY_VERSION`] whenever a table changes; results record it.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::CoverageDomain;

pub const VOCABULARY_VERSION: &str = "2026.10";

#[derive(Debug, Clone, Copy)]
pub struct KeywordTable {
    pub name: &'static str,
    pub terms: &'static [&'static str],
}

impl KeywordTable {
    /// First term found at a word start of an already-normalized text.
    pub fn first_match(&self, normalized: &str) -> Option<&'static str> {
        let padded = format!(" {normalized}");
        self.terms
            .iter()
            .find(|term| padded.contains(&format!(" {term}")))
            .copied()
    }

    pub fn matches(&self, normalized: &str) -> bool {
        self.first_match(normalized).is_some()
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Lowercase, fold Spanish accents, turn punctuation into single spaces.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars().flat_map(char::to_lowercase) {
        let folded = fold_accent(ch);
        if folded.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(folded);
        } else {
            pending_space = true;
        }
    }
    out
}

fn fold_accent(ch: char) -> char {
    match ch {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Sections and anchors
// ---------------------------------------------------------------------------

pub const SECTION_UNKNOWN: &str = "SIN SECCION";
pub const SECTION_WARD: &str = "DIA CAMA";
pub const SECTION_PAVILION: &str = "PABELLON";
pub const SECTION_FEES: &str = "HONORARIOS";

pub const WARD_TERMS: KeywordTable = KeywordTable {
    name: "ward",
    terms: &[
        "dia cama",
        "dias cama",
        "habitacion",
        "sala comun",
        "cama critica",
        "unidad de tratamiento intensivo",
        "intermedio",
        "hospitalizacion",
    ],
};

pub const PAVILION_TERMS: KeywordTable = KeywordTable {
    name: "pavilion",
    terms: &[
        "derecho de pabellon",
        "pabellon",
        "quirofano",
        "sala de recuperacion",
        "recuperacion anestesica",
    ],
};

pub const FEE_TERMS: KeywordTable = KeywordTable {
    name: "professional_fees",
    terms: &["honorario", "cirujano", "anestesista", "primer ayudante", "arsenalera", "equipo medico"],
};

/// Section label inferred from a description that signals a new block.
pub const SECTION_SIGNALS: &[(&str, KeywordTable)] = &[
    (SECTION_FEES, FEE_TERMS),
    (SECTION_PAVILION, PAVILION_TERMS),
    (SECTION_WARD, WARD_TERMS),
];

/// Items that locate the physical core of the episode on the bill.
pub const ANCHORS: KeywordTable = KeywordTable {
    name: "anchors",
    terms: &["derecho de pabellon", "pabellon", "dia cama", "dias cama", "quirofano"],
};

// ---------------------------------------------------------------------------
// Item vocabularies
// ---------------------------------------------------------------------------

pub const AMENITY: KeywordTable = KeywordTable {
    name: "amenity",
    terms: &[
        "kit de aseo",
        "kit aseo",
        "set de aseo",
        "cepillo dental",
        "pasta dental",
        "pantufla",
        "peineta",
        "shampoo",
        "jabon",
        "toalla humeda",
        "calzon",
        "television",
        "telefono",
        "estacionamiento",
        "alimentacion acompanante",
        "cama acompanante",
        "colacion",
        "confort",
        "termometro",
    ],
};

pub const ADMINISTRATIVE: KeywordTable = KeywordTable {
    name: "administrative",
    terms: &[
        "admision",
        "gasto administrativo",
        "gastos administrativos",
        "cargo administrativo",
        "fotocopia",
        "certificado",
        "copia de ficha",
        "informe medico",
        "tramite",
        "recargo",
        "apertura de cuenta",
        "custodia",
    ],
};

pub const NURSING_ACTS: KeywordTable = KeywordTable {
    name: "nursing_acts",
    terms: &[
        "curacion",
        "instalacion via venosa",
        "instalacion de via venosa",
        "via venosa",
        "instalacion de sonda",
        "sondeo",
        "control de signos vitales",
        "signos vitales",
        "administracion de medicamento",
        "toma de muestra",
        "aseo de paciente",
        "procedimiento de enfermeria",
        "atencion de enfermeria",
        "cambio de posicion",
        "fleboclisis",
        "hemoglucotest",
    ],
};

pub const ANESTHESIA_DRUGS: KeywordTable = KeywordTable {
    name: "anesthesia_drugs",
    terms: &[
        "propofol",
        "sevoflurano",
        "desflurano",
        "fentanilo",
        "remifentanilo",
        "rocuronio",
        "vecuronio",
        "atracurio",
        "succinilcolina",
        "midazolam",
        "ketamina",
        "bupivacaina",
        "lidocaina",
        "neostigmina",
        "sugammadex",
        "etomidato",
    ],
};

pub const SURGICAL_SUPPLIES: KeywordTable = KeywordTable {
    name: "surgical_supplies",
    terms: &[
        "sutura",
        "vicryl",
        "trocar",
        "bisturi",
        "hoja de bisturi",
        "engrapadora",
        "grapadora",
        "clip",
        "malla",
        "hemostatico",
        "electrobisturi",
        "campo quirurgico",
        "drenaje",
        "aposito quirurgico",
        "tubo endotraqueal",
        "mascara laringea",
    ],
};

pub const DRUG_FORMS: KeywordTable = KeywordTable {
    name: "drug_forms",
    terms: &[
        "ampolla",
        "amp",
        "comprimido",
        "comp",
        "capsula",
        "frasco",
        "vial",
        "jarabe",
        "inyectable",
        "sol iny",
        "suero",
        "solucion fisiologica",
    ],
};

/// Consumables that dosage-like text would otherwise read as drugs.
pub const NON_DRUG_MATERIALS: KeywordTable = KeywordTable {
    name: "non_drug_materials",
    terms: &[
        "jeringa",
        "aguja",
        "guante",
        "gasa",
        "algodon",
        "aposito",
        "torula",
        "mascarilla",
        "bajada",
        "llave de tres pasos",
        "llave 3 pasos",
        "electrodo",
        "branula",
        "cateter",
        "sonda",
        "bolsa",
        "equipo de fleboclisis",
        "tela adhesiva",
    ],
};

pub const PHARMACY_SECTIONS: KeywordTable = KeywordTable {
    name: "pharmacy_sections",
    terms: &["farmacia", "medicamento", "farmaco"],
};

pub const MATERIAL_SECTIONS: KeywordTable = KeywordTable {
    name: "material_sections",
    terms: &["material", "insumo"],
};

pub const LABORATORY_TERMS: KeywordTable = KeywordTable {
    name: "laboratory",
    terms: &[
        "laboratorio",
        "examen",
        "hemograma",
        "perfil bioquimico",
        "perfil lipidico",
        "orina completa",
        "creatinina",
        "electrolitos",
        "pcr",
        "cultivo",
        "gases arteriales",
    ],
};

pub const IMAGING_TERMS: KeywordTable = KeywordTable {
    name: "imaging",
    terms: &[
        "imagenologia",
        "imagen",
        "radiologia",
        "radiografia",
        "rx",
        "scanner",
        "tomografia",
        "ecografia",
        "ecotomografia",
        "resonancia",
        "mamografia",
    ],
};

/// Descriptions that say nothing about what was charged.
pub const GENERIC_DESCRIPTIONS: KeywordTable = KeywordTable {
    name: "generic_descriptions",
    terms: &[
        "gastos no cubiertos",
        "gasto no cubierto",
        "prestaciones no cubiertas",
        "prestacion no cubierta",
        "no arancelad",
        "otros",
        "varios",
        "cargos varios",
        "insumos varios",
        "sin codigo",
        "uncovered",
        "miscellaneous",
    ],
};

// Constant pattern compiled once; it cannot fail at runtime.
static DOSAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d+(?: \d+)? ?(?:mg|mcg|ug|gr|g|ml|ui|mui|meq)\b").expect("dosage pattern")
});

pub fn has_dosage(normalized: &str) -> bool {
    DOSAGE_RE.is_match(normalized)
}

// ---------------------------------------------------------------------------
// Codes → coverage domains
// ---------------------------------------------------------------------------

/// Catch-all codes whose lines go to the second pass.
pub const GENERIC_CODES: &[&str] = &["3201001", "3201002"];
/// The catch-all code whose autonomous-act test requires a nursing act.
pub const NURSING_CATCH_CODE: &str = "3201002";
pub const MEDICATION_CODES: &[&str] = &["3101001", "3101101"];
pub const MATERIAL_CODES: &[&str] = &["3101002", "3101102"];

/// Numeric code prefixes, longest first.
pub const CODE_PREFIXES: &[(&str, CoverageDomain)] = &[
    ("0101", CoverageDomain::Consultation),
    ("0202", CoverageDomain::Hospitalization),
    ("0203", CoverageDomain::Pavilion),
    ("03", CoverageDomain::Laboratory),
    ("04", CoverageDomain::Imaging),
    ("06", CoverageDomain::Rehabilitation),
    ("11", CoverageDomain::ProfessionalFees),
    ("12", CoverageDomain::ProfessionalFees),
    ("13", CoverageDomain::ProfessionalFees),
    ("14", CoverageDomain::ProfessionalFees),
    ("15", CoverageDomain::ProfessionalFees),
    ("16", CoverageDomain::ProfessionalFees),
    ("17", CoverageDomain::ProfessionalFees),
    ("18", CoverageDomain::ProfessionalFees),
    ("19", CoverageDomain::ProfessionalFees),
    ("20", CoverageDomain::ProfessionalFees),
    ("21", CoverageDomain::ProfessionalFees),
];

/// Keyword fallback over code text + description, in priority order.
pub const DOMAIN_KEYWORDS: &[(CoverageDomain, KeywordTable)] = &[
    (
        CoverageDomain::Generic,
        KeywordTable {
            name: "generic_domain",
            terms: &[
                "gastos no cubiertos",
                "gasto no cubierto",
                "prestaciones no cubiertas",
                "no arancelad",
                "cargos varios",
                "generic",
                "uncovered",
            ],
        },
    ),
    (
        CoverageDomain::Medications,
        KeywordTable { name: "medications_domain", terms: &["medicamento", "farmaco", "farmacia", "medication"] },
    ),
    (
        CoverageDomain::Materials,
        KeywordTable { name: "materials_domain", terms: &["material", "insumo"] },
    ),
    (CoverageDomain::ProfessionalFees, FEE_TERMS),
    (CoverageDomain::Pavilion, PAVILION_TERMS),
    (CoverageDomain::Hospitalization, WARD_TERMS),
    (CoverageDomain::Laboratory, LABORATORY_TERMS),
    (CoverageDomain::Imaging, IMAGING_TERMS),
    (
        CoverageDomain::Consultation,
        KeywordTable { name: "consultation_domain", terms: &["consulta", "consultation"] },
    ),
    (
        CoverageDomain::Rehabilitation,
        KeywordTable {
            name: "rehabilitation_domain",
            terms: &["kinesiologia", "kinesioterapia", "kinesica", "rehabilitacion", "fisioterapia", "terapia ocupacional"],
        },
    ),
    (
        CoverageDomain::Transport,
        KeywordTable { name: "transport_domain", terms: &["traslado", "ambulancia", "transporte"] },
    ),
    (
        CoverageDomain::Prosthetics,
        KeywordTable { name: "prosthetics_domain", terms: &["protesis", "ortesis", "endoprotesis"] },
    ),
];

// ---------------------------------------------------------------------------
// Item traits
// ---------------------------------------------------------------------------

/// Vocabulary hits of one bill item, computed once per item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemTraits {
    pub amenity: bool,
    pub administrative: bool,
    pub nursing_act: bool,
    pub anesthesia_drug: bool,
    pub surgical_supply: bool,
    pub drug: bool,
    pub material: bool,
}

impl ItemTraits {
    pub fn of(section: &str, description: &str) -> Self {
        let sec = normalize(section);
        let desc = normalize(description);

        let amenity = AMENITY.matches(&desc);
        let administrative = !amenity && ADMINISTRATIVE.matches(&desc);
        let anesthesia_drug = ANESTHESIA_DRUGS.matches(&desc);
        let surgical_supply = SURGICAL_SUPPLIES.matches(&desc);
        let non_drug = NON_DRUG_MATERIALS.matches(&desc);

        let drug_signal = PHARMACY_SECTIONS.matches(&sec) || has_dosage(&desc) || DRUG_FORMS.matches(&desc);
        let non_clinical = amenity || administrative;
        let drug = !non_clinical && !non_drug && !surgical_supply && (drug_signal || anesthesia_drug);
        let material = !non_clinical
            && !drug
            && (non_drug || surgical_supply || MATERIAL_SECTIONS.matches(&sec));

        Self {
            amenity,
            administrative,
            nursing_act: NURSING_ACTS.matches(&desc),
            anesthesia_drug,
            surgical_supply,
            drug,
            material,
        }
    }

    /// Surgical supplies and anesthesia drugs: only used inside a pavilion.
    pub fn clinically_specific(&self) -> bool {
        self.anesthesia_drug || self.surgical_supply
    }

    pub fn weakly_specific(&self) -> bool {
        self.drug || self.material
    }

    pub fn clinical_signal(&self) -> bool {
        self.clinically_specific() || self.weakly_specific()
    }

    pub fn non_clinical(&self) -> bool {
        (self.amenity || self.administrative) && !self.clinical_signal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_accents_and_punctuation() {
        assert_eq!(normalize("  Curación  Simple, (1 UN.) "), "curacion simple 1 un");
        assert_eq!(normalize("PABELLÓN - 2"), "pabellon 2");
        assert_eq!(normalize("Niño/Niña"), "nino nina");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn terms_match_at_word_start() {
        assert!(FEE_TERMS.matches("honorarios medicos"));
        assert!(!FEE_TERMS.matches("prehonorario"));
        assert_eq!(AMENITY.first_match("kit de aseo adulto"), Some("kit de aseo"));
    }

    #[test]
    fn dosage_pattern() {
        assert!(has_dosage(&normalize("Ceftriaxona 1 g fam")));
        assert!(has_dosage(&normalize("Paracetamol 500mg")));
        assert!(has_dosage(&normalize("Ketorolaco 30 MG/1ML")));
        assert!(!has_dosage(&normalize("Kit de aseo")));
    }

    #[test]
    fn traits_drug_vs_material() {
        let drug = ItemTraits::of("FARMACIA", "Cefazolina 1 g ampolla");
        assert!(drug.drug);
        assert!(!drug.material);

        let syringe = ItemTraits::of("FARMACIA", "Jeringa 10 ml");
        assert!(!syringe.drug, "syringes are not drugs even in the pharmacy section");
        assert!(syringe.material);

        let anesthetic = ItemTraits::of("PABELLON", "Propofol 1% 20 ml");
        assert!(anesthetic.anesthesia_drug);
        assert!(anesthetic.clinically_specific());
    }

    #[test]
    fn traits_amenity_and_admin() {
        let kit = ItemTraits::of("INSUMOS", "Kit de aseo personal");
        assert!(kit.amenity);
        assert!(!kit.material, "amenity wins over the insumos section");
        assert!(kit.non_clinical());

        let admission = ItemTraits::of("", "Cargo de admisión");
        assert!(admission.administrative);
        assert!(admission.non_clinical());

        let iv = ItemTraits::of("", "Instalación vía venosa");
        assert!(iv.nursing_act);
        assert!(!iv.clinical_signal());
    }
}
