use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// One bill line as delivered by the extraction adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBillItem {
    #[serde(default)]
    pub id: Option<String>,
    /// Physical position in the source document, when the adapter kept it.
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub section: Option<String>,
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit_price: i64,
    pub total: i64,
}

fn default_quantity() -> f64 {
    1.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bill {
    #[serde(default)]
    pub items: Vec<RawBillItem>,
}

/// A bill item after pre-processing: stable id, physical position and a
/// section label (explicit or inferred).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillItem {
    pub id: String,
    pub position: usize,
    pub section: String,
    pub section_inferred: bool,
    pub description: String,
    pub quantity: f64,
    pub unit_price: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAdjudicationLine {
    #[serde(default)]
    pub id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub value: i64,
    #[serde(default)]
    pub paid: i64,
    #[serde(default)]
    pub copay: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folio {
    pub folio: String,
    #[serde(default)]
    pub lines: Vec<RawAdjudicationLine>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Adjudication {
    #[serde(default)]
    pub folios: Vec<Folio>,
}

/// One insurer-approved payment record ("PAM line").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjudicationLine {
    pub id: String,
    pub folio: String,
    /// Position of the line across all folios, in document order.
    pub ordinal: usize,
    pub code: String,
    pub description: String,
    pub value: i64,
    pub paid: i64,
    pub copay: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageDomain {
    Hospitalization,
    Pavilion,
    ProfessionalFees,
    Medications,
    Materials,
    Laboratory,
    Imaging,
    Consultation,
    Rehabilitation,
    Transport,
    Prosthetics,
    Generic,
    Other,
}

impl CoverageDomain {
    /// Domains normally billed outside an inpatient episode.
    pub fn is_ambulatory(&self) -> bool {
        matches!(
            self,
            Self::Consultation | Self::Imaging | Self::Rehabilitation | Self::Transport | Self::Prosthetics
        )
    }
}

impl std::fmt::Display for CoverageDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Hospitalization => "hospitalization",
            Self::Pavilion => "pavilion",
            Self::ProfessionalFees => "professional_fees",
            Self::Medications => "medications",
            Self::Materials => "materials",
            Self::Laboratory => "laboratory",
            Self::Imaging => "imaging",
            Self::Consultation => "consultation",
            Self::Rehabilitation => "rehabilitation",
            Self::Transport => "transport",
            Self::Prosthetics => "prosthetics",
            Self::Generic => "generic",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// How specific an adjudication code is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeClass {
    /// "Uncovered expenses" style buckets; resolved in the second pass.
    GenericCatchAll,
    MedicationCatch,
    MaterialCatch,
    Specific,
}

impl CodeClass {
    pub fn is_catch_code(&self) -> bool {
        !matches!(self, Self::Specific)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    Currency,
    Uf,
    Utm,
    /// Insurer reference unit "AC2".
    Ac2,
    /// Insurer reference unit "veces arancel".
    Vam,
}

impl std::fmt::Display for CapKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Currency => write!(f, "currency"),
            Self::Uf => write!(f, "uf"),
            Self::Utm => write!(f, "utm"),
            Self::Ac2 => write!(f, "ac2"),
            Self::Vam => write!(f, "vam"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cap {
    pub kind: CapKind,
    /// `None` when the contract mentions a cap whose amount could not be read.
    #[serde(default)]
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRule {
    pub domain: CoverageDomain,
    #[serde(default)]
    pub coverage_pct: Option<f64>,
    #[serde(default)]
    pub cap: Option<Cap>,
    #[serde(default)]
    pub source_text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Contract {
    #[serde(default)]
    pub rules: Vec<ContractRule>,
}

/// The three canonical documents of one medical episode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditInput {
    #[serde(default)]
    pub bill: Bill,
    #[serde(default)]
    pub adjudication: Adjudication,
    #[serde(default)]
    pub contract: Contract,
}

impl AuditInput {
    pub fn from_json(input: &str) -> Result<Self, AuditError> {
        serde_json::from_str(input).map_err(|e| AuditError::InputParse(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Traceability {
    Strong,
    Weak,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Ok,
    Partial,
    Ambiguous,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolOrdering {
    Physical,
    SectionSorted,
    AmountDescending,
    NonClinicalFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    ExactAmount,
    Glosa,
    ContiguousWindow,
    SubtotalBlock,
    SubsetSum { ordering: PoolOrdering, relaxed: bool },
    ResidualSegment { segment: usize, ordering: PoolOrdering },
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactAmount => write!(f, "exact_amount"),
            Self::Glosa => write!(f, "glosa"),
            Self::ContiguousWindow => write!(f, "contiguous_window"),
            Self::SubtotalBlock => write!(f, "subtotal_block"),
            Self::SubsetSum { relaxed: false, .. } => write!(f, "subset_sum"),
            Self::SubsetSum { relaxed: true, .. } => write!(f, "subset_sum_relaxed"),
            Self::ResidualSegment { segment, .. } => write!(f, "residual_segment_{segment}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateSet {
    pub item_ids: Vec<String>,
    pub total: i64,
    pub score: i32,
}

/// One strategy's outcome for one line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceAttempt {
    pub strategy: Strategy,
    pub target: i64,
    pub status: AttemptStatus,
    pub traceability: Traceability,
    pub item_ids: Vec<String>,
    pub candidates: Vec<CandidateSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl TraceAttempt {
    pub fn fail(strategy: Strategy, target: i64, note: impl Into<String>) -> Self {
        Self {
            strategy,
            target,
            status: AttemptStatus::Fail,
            traceability: Traceability::None,
            item_ids: Vec::new(),
            candidates: Vec::new(),
            note: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    First,
    Second,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSummary {
    pub status: AttemptStatus,
    pub traceability: Traceability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub item_ids: Vec<String>,
    pub matched_total: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineTrace {
    pub pass: Pass,
    pub attempts: Vec<TraceAttempt>,
    pub summary: TraceSummary,
}

impl LineTrace {
    pub fn is_strong(&self) -> bool {
        self.summary.traceability == Traceability::Strong
    }
}

// ---------------------------------------------------------------------------
// Contract evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSelection {
    Single,
    Affinity,
    Conservative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ContractState {
    VerifiableOk,
    UnderCovered { shortfall: i64 },
    CapExceeded { cap: i64, withheld: i64 },
    CapUnverifiable { kind: CapKind },
    NotVerifiableByContract { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractEvaluation {
    pub domain: CoverageDomain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selection: Option<RuleSelection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_paid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_copay: Option<i64>,
    pub tolerance: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cap_amount: Option<i64>,
    pub state: ContractState,
}

// ---------------------------------------------------------------------------
// Episode
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    Pavilion,
    Ward,
}

impl std::fmt::Display for PackageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pavilion => write!(f, "pavilion"),
            Self::Ward => write!(f, "ward"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageEvidence {
    SectionText,
    AnesthesiaFingerprint,
    AdjudicationLine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectedPackage {
    pub kind: PackageKind,
    pub evidence: PackageEvidence,
    pub item_ids: Vec<String>,
}

/// What the bill says happened during the episode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal_act: Option<String>,
    pub packages: Vec<DetectedPackage>,
    pub hospitalization_active: bool,
    pub surgical_active: bool,
}

impl EventModel {
    pub fn package(&self, kind: PackageKind) -> Option<&DetectedPackage> {
        self.packages.iter().find(|p| p.kind == kind)
    }

    pub fn has_package(&self) -> bool {
        !self.packages.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Motor {
    M1,
    M2,
    M3,
    M4,
    M5,
}

impl Motor {
    pub fn label(&self) -> &'static str {
        match self {
            Self::M1 => "non-billable act",
            Self::M2 => "unbundling from mandatory package",
            Self::M3 => "non-clinical cost transfer",
            Self::M4 => "domain reclassification",
            Self::M5 => "contractual under/over-cap",
        }
    }
}

impl std::fmt::Display for Motor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::M1 => write!(f, "M1"),
            Self::M2 => write!(f, "M2"),
            Self::M3 => write!(f, "M3"),
            Self::M4 => write!(f, "M4"),
            Self::M5 => write!(f, "M5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NonBillableReason {
    AutonomousAct,
    NursingProcedure,
    UnexplainedRejection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTransferKind {
    AmenityDominant,
    AdministrativeDominant,
    Mixed,
    UnclassifiedGenericRejection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    NonBillableAct { reason: NonBillableReason, item_ids: Vec<String> },
    Unbundling { package: PackageKind, item_ids: Vec<String> },
    CostTransfer { subtype: CostTransferKind },
    DomainReclassification {
        from: CoverageDomain,
        to: CoverageDomain,
        current_pct: f64,
        better_pct: f64,
    },
    Contractual { state: ContractState },
    Correct,
    Unconfirmed,
    TotalOpacity,
}

impl Finding {
    pub fn motor(&self) -> Option<Motor> {
        match self {
            Self::NonBillableAct { .. } => Some(Motor::M1),
            Self::Unbundling { .. } => Some(Motor::M2),
            Self::CostTransfer { .. } => Some(Motor::M3),
            Self::DomainReclassification { .. } => Some(Motor::M4),
            Self::Contractual { .. } => Some(Motor::M5),
            Self::Correct | Self::Unconfirmed | Self::TotalOpacity => None,
        }
    }

    /// Whether the line belongs in the findings matrix.
    pub fn is_flagged(&self) -> bool {
        self.motor().is_some() || matches!(self, Self::TotalOpacity)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Correct => "correct".into(),
            Self::Unconfirmed => "unconfirmed".into(),
            Self::TotalOpacity => "total opacity".into(),
            other => match other.motor() {
                Some(m) => format!("{m} {}", m.label()),
                None => String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub finding: Finding,
    /// Every motor whose signature matched, in priority order.
    pub triggered: Vec<Motor>,
    pub impact: i64,
    pub rationale: String,
}

// ---------------------------------------------------------------------------
// Opacity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpacitySignal {
    GenericCode,
    GenericDescription,
    ZeroPayment,
    TraceFailure,
    WeakTrace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpacityPoint {
    pub signal: OpacitySignal,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpacityScore {
    pub score: u32,
    pub points: Vec<OpacityPoint>,
    pub opaque: bool,
}

// ---------------------------------------------------------------------------
// Rows + Output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedItem {
    pub id: String,
    pub position: usize,
    pub section: String,
    pub description: String,
    pub total: i64,
}

impl From<&BillItem> for MatchedItem {
    fn from(item: &BillItem) -> Self {
        Self {
            id: item.id.clone(),
            position: item.position,
            section: item.section.clone(),
            description: item.description.clone(),
            total: item.total,
        }
    }
}

/// Final record for one adjudication line. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRow {
    pub line: AdjudicationLine,
    pub domain: CoverageDomain,
    pub code_class: CodeClass,
    pub trace: LineTrace,
    pub matched_items: Vec<MatchedItem>,
    pub contract: ContractEvaluation,
    pub classification: Classification,
    pub opacity: OpacityScore,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    IncoherentLine { value: i64, paid: i64, copay: i64 },
    NegativeAmount { field: String, value: i64 },
    DuplicateItemId,
    NonPositiveItem { total: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputWarning {
    pub subject: String,
    #[serde(flatten)]
    pub kind: WarningKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FindingRow {
    pub line_id: String,
    pub folio: String,
    pub code: String,
    pub description: String,
    pub motor: String,
    pub copay: i64,
    pub impact: i64,
    pub evidence: Vec<String>,
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditSummary {
    pub lines_analyzed: usize,
    pub bill_items: usize,
    pub total_copay_analyzed: i64,
    pub total_copay_impacted: i64,
    pub flagged_lines: usize,
    pub strong_lines: usize,
    pub weak_lines: usize,
    pub untraced_lines: usize,
    pub motor_counts: BTreeMap<String, usize>,
    pub cost_transfer_ratio: f64,
    pub systemic_pattern: bool,
    pub opaque_lines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_opacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Completed,
    Rejected { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateOrigin {
    Configured,
    Fallback,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRate {
    pub unit: CapKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub origin: RateOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditMeta {
    pub config_name: String,
    pub engine_version: String,
    pub vocabulary_version: String,
    pub rates: Vec<ResolvedRate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rates_resolved_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditResult {
    pub meta: AuditMeta,
    pub outcome: AuditOutcome,
    pub warnings: Vec<InputWarning>,
    pub episode: EventModel,
    pub summary: AuditSummary,
    pub findings: Vec<FindingRow>,
    pub rows: Vec<AuditRow>,
    pub report: String,
    pub complaint: String,
}
