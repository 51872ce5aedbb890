//! Simulation generators.
//!
//! When a project cannot run for real, its generator produces a clearly
//! labeled synthetic artifact instead: a `summary.json` with demo metrics and
//! a `predictions.csv` with one deterministic prediction per subject. Every
//! generated file and log line carries [`DISCLAIMER`].

pub mod synthetic;

use serde::Serialize;
use thiserror::Error;

use crate::domain::{GeneratedFile, ProjectId};

/// Label attached to every simulated artifact
pub const DISCLAIMER: &str = "SIMULATED RESULT: synthetic data generated because real execution \
     was not possible. These values were not produced by the project's code and are not a \
     clinical finding.";

/// Subjects used when none can be discovered from project data
pub fn default_subjects() -> Vec<String> {
    (1..=10).map(|i| format!("SUBJ{:03}", i)).collect()
}

/// Inputs to a generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationContext {
    pub project: ProjectId,

    /// Subject ids to predict for (never empty)
    pub subjects: Vec<String>,

    /// Why the project is being simulated
    pub reasons: Vec<String>,
}

impl SimulationContext {
    /// Context with discovered subjects, falling back to the defaults
    pub fn new(project: ProjectId, subjects: Vec<String>, reasons: Vec<String>) -> Self {
        let subjects = if subjects.is_empty() {
            default_subjects()
        } else {
            subjects
        };

        Self {
            project,
            subjects,
            reasons,
        }
    }
}

/// Text and files produced by a generator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedOutput {
    pub lines: Vec<String>,
    pub files: Vec<GeneratedFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SimulationError(pub String);

pub type SimulationFn = fn(&SimulationContext) -> Result<SimulatedOutput, SimulationError>;

/// Per-project shape of the synthetic output
struct Profile {
    seed: u64,
    base: f64,
    spread: f64,
    metrics: serde_json::Value,
    interpretation: &'static str,
}

#[derive(Debug, Serialize)]
struct SimulationSummary<'a> {
    project: ProjectId,
    simulated: bool,
    disclaimer: &'a str,
    interpretation: &'a str,
    metrics: &'a serde_json::Value,
    subjects: usize,
    reasons: &'a [String],
}

/// One row of `predictions.csv`
#[derive(Debug, Serialize)]
struct PredictionRow<'a> {
    subject_id: &'a str,
    predicted_label: &'static str,
    probability: f64,
}

fn predictions_csv(ctx: &SimulationContext, profile: &Profile) -> Result<String, SimulationError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for subject in &ctx.subjects {
        let prob = synthetic::probability(profile.seed, subject, profile.base, profile.spread);
        let probability = (prob * 1000.0).round() / 1000.0;
        writer
            .serialize(PredictionRow {
                subject_id: subject,
                predicted_label: if probability >= 0.5 { "AD" } else { "CN" },
                probability,
            })
            .map_err(|e| SimulationError(format!("failed to write predictions: {e}")))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| SimulationError(format!("failed to flush predictions: {e}")))?;
    String::from_utf8(bytes).map_err(|e| SimulationError(format!("predictions are not UTF-8: {e}")))
}

fn generate(ctx: &SimulationContext, profile: Profile) -> Result<SimulatedOutput, SimulationError> {
    let csv = predictions_csv(ctx, &profile)?;

    let summary = SimulationSummary {
        project: ctx.project,
        simulated: true,
        disclaimer: DISCLAIMER,
        interpretation: profile.interpretation,
        metrics: &profile.metrics,
        subjects: ctx.subjects.len(),
        reasons: &ctx.reasons,
    };
    let summary_json = serde_json::to_string_pretty(&summary)
        .map_err(|e| SimulationError(format!("failed to serialize summary: {e}")))?;

    let mut lines = vec![format!("[simulated] {}", DISCLAIMER)];
    lines.extend(ctx.reasons.iter().map(|r| format!("[simulated] reason: {}", r)));
    lines.push(format!(
        "[simulated] generated predictions for {} subjects",
        ctx.subjects.len()
    ));
    lines.push(format!("[simulated] {}", profile.interpretation));

    Ok(SimulatedOutput {
        lines,
        files: vec![
            GeneratedFile::new("summary.json", summary_json),
            GeneratedFile::new("predictions.csv", csv),
        ],
    })
}

/// AD-Biomarkers-Project (proteomics)
pub fn simulate_proteomics(ctx: &SimulationContext) -> Result<SimulatedOutput, SimulationError> {
    generate(
        ctx,
        Profile {
            seed: 46,
            base: 0.81,
            spread: 0.14,
            metrics: serde_json::json!({
                "accuracy": 0.81,
                "top_features": ["ProteinA", "ProteinB", "ProteinC", "ProteinD", "ProteinE"],
            }),
            interpretation: "Top 5 candidate biomarkers (demo): ProteinA, ProteinB, ProteinC, ProteinD, ProteinE",
        },
    )
}

/// ADNI
pub fn simulate_adni(ctx: &SimulationContext) -> Result<SimulatedOutput, SimulationError> {
    generate(
        ctx,
        Profile {
            seed: 44,
            base: 0.86,
            spread: 0.13,
            metrics: serde_json::json!({
                "accuracy": 0.84,
                "auc": 0.86,
                "confusion": {"tp": 40, "tn": 50, "fp": 6, "fn": 10},
            }),
            interpretation: "ADNI pipeline (demo): elevated conversion probability detected in holdout set.",
        },
    )
}

/// LEAD (EEG)
pub fn simulate_eeg(ctx: &SimulationContext) -> Result<SimulatedOutput, SimulationError> {
    generate(
        ctx,
        Profile {
            seed: 43,
            base: 0.77,
            spread: 0.15,
            metrics: serde_json::json!({"accuracy": 0.78, "f1": 0.75, "auc": 0.77}),
            interpretation: "EEG classifier (demo) suggests moderate AD risk (AUC ~0.77).",
        },
    )
}

/// TADPOLE
pub fn simulate_tadpole(ctx: &SimulationContext) -> Result<SimulatedOutput, SimulationError> {
    generate(
        ctx,
        Profile {
            seed: 45,
            base: 0.5,
            spread: 0.18,
            metrics: serde_json::json!({"mae": 4.1, "ranking": "below average"}),
            interpretation: "TADPOLE (demo): benchmark performance below average in this simulation.",
        },
    )
}

/// TransMF_AD (MRI+PET)
pub fn simulate_mri_pet(ctx: &SimulationContext) -> Result<SimulatedOutput, SimulationError> {
    generate(
        ctx,
        Profile {
            seed: 42,
            base: 0.90,
            spread: 0.12,
            metrics: serde_json::json!({
                "accuracy": 0.89,
                "auc": 0.90,
                "sensitivity": 0.85,
                "specificity": 0.88,
            }),
            interpretation: "MRI+PET fusion (demo) suggests strong discriminative power (AUC ~0.90).",
        },
    )
}
