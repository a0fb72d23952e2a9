//! `pamtrace run` / `pamtrace validate`: file handling around the audit engine.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use pamtrace_audit::model::FindingRow;
use pamtrace_audit::{AuditConfig, AuditInput, AuditOutcome, AuditResult};

use crate::exit_codes::{
    EXIT_AUDIT_FINDINGS, EXIT_AUDIT_REJECTED, EXIT_AUDIT_SYSTEMIC, EXIT_INPUT_PARSE, EXIT_INVALID_CONFIG, EXIT_IO,
};
use crate::CliError;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Audit one episode: bill, adjudication and contract in a canonical JSON file
    #[command(after_help = "\
Examples:
  pamtrace run episode.json
  pamtrace run episode.json --config audit.toml --json
  pamtrace run episode.json --output result.json --report report.txt
  pamtrace run episode.json --findings-csv findings.csv --uf 39280.5")]
    Run {
        /// Canonical episode JSON (bill, adjudication, contract)
        input: PathBuf,

        /// Audit config TOML; defaults apply when omitted
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the forensic report to file
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write the complaint letter to file
        #[arg(long)]
        complaint: Option<PathBuf>,

        /// Write the findings matrix as CSV
        #[arg(long)]
        findings_csv: Option<PathBuf>,

        /// UF value in pesos, overriding the config
        #[arg(long, env = "PAMTRACE_UF")]
        uf: Option<f64>,

        /// UTM value in pesos, overriding the config
        #[arg(long, env = "PAMTRACE_UTM")]
        utm: Option<f64>,

        /// Where the overriding rates come from
        #[arg(long)]
        rate_source: Option<String>,
    },

    /// Check a config and/or an input file without auditing
    #[command(after_help = "\
Examples:
  pamtrace validate --config audit.toml
  pamtrace validate --input episode.json")]
    Validate {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        #[arg(long, short = 'i')]
        input: Option<PathBuf>,
    },
}

pub fn cmd_audit(cmd: AuditCommands) -> Result<(), CliError> {
    match cmd {
        AuditCommands::Run { input, config, json, output, report, complaint, findings_csv, uf, utm, rate_source } => {
            let outputs = Outputs { json, output, report, complaint, findings_csv };
            let rates = RateOverride { uf, utm, source: rate_source };
            cmd_run(input, config, rates, outputs)
        }
        AuditCommands::Validate { config, input } => cmd_validate(config, input),
    }
}

struct Outputs {
    json: bool,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    complaint: Option<PathBuf>,
    findings_csv: Option<PathBuf>,
}

struct RateOverride {
    uf: Option<f64>,
    utm: Option<f64>,
    source: Option<String>,
}

fn audit_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|e| audit_err(EXIT_IO, format!("cannot read {}: {e}", path.display())))
}

fn write(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents).map_err(|e| audit_err(EXIT_IO, format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AuditConfig, CliError> {
    match path {
        Some(path) => AuditConfig::from_toml(&read(path)?).map_err(|e| {
            audit_err(EXIT_INVALID_CONFIG, format!("{}: {e}", path.display()))
        }),
        None => {
            tracing::debug!("no config given, using defaults");
            Ok(AuditConfig::default())
        }
    }
}

fn load_input(path: &Path) -> Result<AuditInput, CliError> {
    AuditInput::from_json(&read(path)?).map_err(|e| {
        audit_err(EXIT_INPUT_PARSE, format!("{}: {e}", path.display()))
            .with_hint("expected {\"bill\": {...}, \"adjudication\": {...}, \"contract\": {...}}")
    })
}

fn apply_rates(config: &mut AuditConfig, rates: RateOverride) -> Result<(), CliError> {
    if rates.uf.is_none() && rates.utm.is_none() {
        return Ok(());
    }
    let conversion = &mut config.conversion;
    if rates.uf.is_some() {
        conversion.uf = rates.uf;
    }
    if rates.utm.is_some() {
        conversion.utm = rates.utm;
    }
    conversion.source = Some(rates.source.unwrap_or_else(|| "command line".into()));
    conversion.resolved_on = Some(chrono::Local::now().date_naive());
    tracing::info!(uf = ?conversion.uf, utm = ?conversion.utm, "rates overridden from the command line");
    config.validate().map_err(|e| audit_err(EXIT_INVALID_CONFIG, e.to_string()))
}

fn cmd_run(
    input_path: PathBuf,
    config_path: Option<PathBuf>,
    rates: RateOverride,
    outputs: Outputs,
) -> Result<(), CliError> {
    let mut config = load_config(config_path.as_deref())?;
    apply_rates(&mut config, rates)?;
    let input = load_input(&input_path)?;

    let result = pamtrace_audit::run(&config, &input);

    let json_str = serde_json::to_string_pretty(&result)
        .map_err(|e| audit_err(crate::exit_codes::EXIT_ERROR, format!("JSON serialization error: {e}")))?;
    if let Some(ref path) = outputs.output {
        write(path, &json_str)?;
    }
    if outputs.json {
        println!("{json_str}");
    }

    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    if let Some(ref path) = outputs.report {
        write(path, &format!("generated {stamp} from {}\n\n{}", input_path.display(), result.report))?;
    }
    if let Some(ref path) = outputs.complaint {
        write(path, &result.complaint)?;
    }
    if let Some(ref path) = outputs.findings_csv {
        write_findings_csv(&result.findings, path)?;
        eprintln!("wrote {}", path.display());
    }

    print_summary(&result);
    verdict(&result)
}

fn print_summary(result: &AuditResult) {
    if let AuditOutcome::Rejected { reason } = &result.outcome {
        eprintln!("audit rejected: {reason}");
        return;
    }
    let s = &result.summary;
    eprintln!(
        "audit: {} lines over {} items: {} strong, {} weak, {} untraced",
        s.lines_analyzed, s.bill_items, s.strong_lines, s.weak_lines, s.untraced_lines,
    );
    eprintln!(
        "findings: {} line(s), {} of {} copay impacted",
        s.flagged_lines,
        pamtrace_audit::report::money(s.total_copay_impacted),
        pamtrace_audit::report::money(s.total_copay_analyzed),
    );
    if !result.warnings.is_empty() {
        eprintln!("input warnings: {}", result.warnings.len());
    }
}

fn verdict(result: &AuditResult) -> Result<(), CliError> {
    if let AuditOutcome::Rejected { reason } = &result.outcome {
        return Err(audit_err(EXIT_AUDIT_REJECTED, reason.clone()));
    }
    let s = &result.summary;
    if s.systemic_pattern {
        return Err(audit_err(EXIT_AUDIT_SYSTEMIC, "systemic pattern across findings"));
    }
    if s.flagged_lines > 0 {
        return Err(audit_err(EXIT_AUDIT_FINDINGS, format!("{} flagged line(s)", s.flagged_lines)));
    }
    Ok(())
}

fn write_findings_csv(findings: &[FindingRow], path: &Path) -> Result<(), CliError> {
    let csv_err = |e: csv::Error| audit_err(EXIT_IO, format!("cannot write {}: {e}", path.display()));
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record(["line_id", "folio", "code", "description", "motor", "copay", "impact", "items", "rationale"])
        .map_err(csv_err)?;
    for f in findings {
        writer
            .write_record([
                f.line_id.as_str(),
                f.folio.as_str(),
                f.code.as_str(),
                f.description.as_str(),
                f.motor.as_str(),
                f.copay.to_string().as_str(),
                f.impact.to_string().as_str(),
                f.evidence.join(" ").as_str(),
                f.rationale.as_str(),
            ])
            .map_err(csv_err)?;
    }
    writer
        .flush()
        .map_err(|e| audit_err(EXIT_IO, format!("flush error: {e}")))
}

fn cmd_validate(config_path: Option<PathBuf>, input_path: Option<PathBuf>) -> Result<(), CliError> {
    if config_path.is_none() && input_path.is_none() {
        return Err(CliError::args("nothing to validate").with_hint("pass --config and/or --input"));
    }
    if let Some(ref path) = config_path {
        let config = load_config(Some(path))?;
        eprintln!("valid: config '{}'", config.name);
    }
    if let Some(ref path) = input_path {
        let input = load_input(path)?;
        let lines: usize = input.adjudication.folios.iter().map(|f| f.lines.len()).sum();
        eprintln!(
            "valid: input with {} bill item(s), {} adjudication line(s) in {} folio(s), {} contract rule(s)",
            input.bill.items.len(),
            lines,
            input.adjudication.folios.len(),
            input.contract.rules.len(),
        );
    }
    Ok(())
}
