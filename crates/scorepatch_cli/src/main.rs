//! scorepatch - notation vs. performance diff and repair tool.
//!
//! Subcommands:
//! - `diff`  - compare a MusicXML score against a MIDI performance and
//!   write a diff report
//! - `plan`  - turn a diff report into a patch plan
//! - `apply` - apply a patch plan to the score
//!
//! Surfaced errors print `error [CODE]: message` to stderr and exit
//! non-zero; operational no-ops (nothing to repair, already applied) are
//! not errors.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;

use scorepatch_core::align::{align, downgrade_for_unsupported};
use scorepatch_core::config::{ConfigError, ConfigManager, Settings};
use scorepatch_core::diff::{assemble_report, classify};
use scorepatch_core::logging::init_tracing;
use scorepatch_core::midi::{read_midi, MidiError};
use scorepatch_core::models::{DiffReport, PatchPlan};
use scorepatch_core::musicxml::{read_score, ScoreDocument, ScoreError};
use scorepatch_core::repair::{apply_plan, generate_plan, RepairError};
use scorepatch_core::validate::{validate_report, ValidationError};

#[derive(Parser)]
#[command(name = "scorepatch")]
#[command(about = "Score vs. performance diff and repair")]
#[command(version)]
struct Cli {
    /// Optional TOML settings file (created with defaults if missing).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compare a score against a performance and write a diff report.
    Diff {
        /// Path to the MusicXML score.
        #[arg(long)]
        xml: PathBuf,
        /// Path to the MIDI performance.
        #[arg(long)]
        midi: PathBuf,
        /// Path for the diff report JSON.
        #[arg(long)]
        out: PathBuf,
        /// Override tempo in BPM (default: infer from the inputs).
        #[arg(long)]
        tempo: Option<f64>,
    },
    /// Turn a diff report into a patch plan.
    Plan {
        /// Path to the diff report JSON.
        #[arg(long)]
        diff: PathBuf,
        /// Path to the MusicXML score the report was generated from.
        #[arg(long)]
        xml: PathBuf,
        /// Path for the patch plan JSON.
        #[arg(long)]
        out: PathBuf,
    },
    /// Apply a patch plan to a score.
    Apply {
        /// Path to the MusicXML score.
        #[arg(long)]
        xml: PathBuf,
        /// Path to the patch plan JSON.
        #[arg(long)]
        plan: PathBuf,
        /// Path for the repaired MusicXML (default: repaired.musicxml
        /// beside the input).
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed JSON artifact '{path}': {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Midi(#[from] MidiError),

    #[error(transparent)]
    Repair(#[from] RepairError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_NOT_FOUND",
            Self::Read { .. } | Self::Write { .. } => "E_IO",
            Self::Artifact { .. } => "E_VALIDATION",
            Self::Config(e) => e.code(),
            Self::Score(e) => e.code(),
            Self::Midi(e) => e.code(),
            Self::Repair(e) => e.code(),
            Self::Validation(e) => e.code(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error [{}]: {}", err.code(), err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let settings = load_settings(cli.config.as_deref())?;
    init_tracing(&settings.logging.level);

    match cli.command {
        Command::Diff {
            xml,
            midi,
            out,
            tempo,
        } => run_diff(&settings, &xml, &midi, &out, tempo),
        Command::Plan { diff, xml, out } => run_plan(&settings, &diff, &xml, &out),
        Command::Apply { xml, plan, out } => run_apply(&settings, &xml, &plan, out),
    }
}

fn load_settings(config: Option<&Path>) -> Result<Settings, CliError> {
    match config {
        Some(path) => {
            let mut manager = ConfigManager::new(path);
            manager.load_or_create()?;
            Ok(manager.settings().clone())
        }
        None => Ok(Settings::default()),
    }
}

fn run_diff(
    settings: &Settings,
    xml: &Path,
    midi: &Path,
    out: &Path,
    tempo: Option<f64>,
) -> Result<(), CliError> {
    let tempo_override = tempo.or(settings.diff.tempo_override);

    let parsed = read_score(xml)?;
    let (midi_events, midi_metadata) = read_midi(midi)?;

    let (pairs, mut summary, context) = align(
        &parsed.events,
        &midi_events,
        &parsed.metadata,
        &midi_metadata,
        tempo_override,
    );
    downgrade_for_unsupported(&mut summary, &parsed.unsupported_features);

    let mut warnings = parsed.warnings.clone();
    for feature in &parsed.unsupported_features {
        warnings.push(format!(
            "UNSUPPORTED_FEATURE: {} at measure {}",
            feature.feature.as_str(),
            feature.measure
        ));
    }

    let diffs = classify(&pairs, &parsed.unsupported_features, &context);
    let report = assemble_report(
        &xml.display().to_string(),
        &midi.display().to_string(),
        diffs,
        &parsed.metadata,
        summary,
        parsed.unsupported_features,
        warnings,
        context.tempo_bpm,
    );
    validate_report(&report)?;

    let out = resolve_out(settings, out);
    write_json(&out, &report, settings.diff.pretty)?;

    println!("Wrote diff report to {}", out.display());
    println!("  Total measures: {}", report.total_measures);
    println!("  Diffs found: {}", report.diffs.len());
    println!(
        "  Alignment confidence: {}",
        report.alignment_summary.alignment_confidence.as_str()
    );
    Ok(())
}

fn run_plan(settings: &Settings, diff: &Path, xml: &Path, out: &Path) -> Result<(), CliError> {
    let report: DiffReport = read_json(diff)?;
    let parsed = read_score(xml)?;

    let plan = generate_plan(&report, parsed.metadata.total_measures)?;

    let out = resolve_out(settings, out);
    write_json(&out, &plan, settings.diff.pretty)?;

    println!("Wrote patch plan to {}", out.display());
    println!("  Operations: {}", plan.operations.len());
    Ok(())
}

fn run_apply(
    settings: &Settings,
    xml: &Path,
    plan_path: &Path,
    out: Option<PathBuf>,
) -> Result<(), CliError> {
    let plan: PatchPlan = read_json(plan_path)?;
    let mut document = ScoreDocument::parse_file(xml)?;

    let report = apply_plan(&mut document, &plan)?;

    let out = match out {
        Some(path) => resolve_out(settings, &path),
        None => xml.with_file_name("repaired.musicxml"),
    };
    document.write_file(&out)?;

    println!("Wrote repaired MusicXML to {}", out.display());
    println!(
        "  Applied: {}  Skipped: {}",
        report.applied(),
        report.skipped()
    );
    Ok(())
}

/// Prepend the configured output folder to relative output paths.
fn resolve_out(settings: &Settings, path: &Path) -> PathBuf {
    if settings.paths.output_folder.is_empty() || path.is_absolute() {
        path.to_path_buf()
    } else {
        PathBuf::from(&settings.paths.output_folder).join(path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    if !path.exists() {
        return Err(CliError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Artifact {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<(), CliError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|source| CliError::Artifact {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_folder_prefixes_relative_paths() {
        let mut settings = Settings::default();
        assert_eq!(
            resolve_out(&settings, Path::new("diff.json")),
            PathBuf::from("diff.json")
        );

        settings.paths.output_folder = "artifacts".to_string();
        assert_eq!(
            resolve_out(&settings, Path::new("diff.json")),
            PathBuf::from("artifacts/diff.json")
        );
        // Absolute paths are never rewritten.
        assert_eq!(
            resolve_out(&settings, Path::new("/tmp/diff.json")),
            PathBuf::from("/tmp/diff.json")
        );
    }

    #[test]
    fn missing_artifact_maps_to_not_found() {
        let err = read_json::<PatchPlan>(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert_eq!(err.code(), "E_NOT_FOUND");
    }

    #[test]
    fn malformed_artifact_maps_to_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_json::<PatchPlan>(&path).unwrap_err();
        assert_eq!(err.code(), "E_VALIDATION");
    }
}
