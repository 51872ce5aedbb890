//! Reports over a finished run directory.
//!
//! - `final_summary`: one plain-language paragraph across projects
//! - `predict_subject`: weighted ensemble of per-project predictions for one
//!   subject, persisted as `subject_<id>_report.json`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Outcome, ProjectId, RunManifest, RunRecord};

/// Per-project predictions file
pub const PREDICTIONS_FILE: &str = "predictions.csv";

/// Per-project summary file
pub const SUMMARY_FILE: &str = "summary.json";

const PREDICTION_DISCLAIMER: &str =
    "This is a model output aggregated across projects, not a clinical diagnosis.";

/// Plain-language summary of a manifest
pub fn final_summary(manifest: &RunManifest) -> String {
    let mut parts = vec![format!(
        "{} project(s): {} executed, {} simulated, {} failed, {} skipped.",
        manifest.records.len(),
        manifest.count(Outcome::Executed),
        manifest.count(Outcome::Simulated),
        manifest.count(Outcome::Failed),
        manifest.count(Outcome::Skipped),
    )];

    for record in &manifest.records {
        parts.push(describe(&manifest.run_dir, record));
    }

    parts.join(" ")
}

fn describe(run_dir: &Path, record: &RunRecord) -> String {
    let id = record.project;
    match record.outcome {
        Outcome::Executed => format!(
            "{}: conservative command completed ({} file(s) collected).",
            id,
            record.files.len()
        ),
        Outcome::Simulated => {
            let interpretation = load_summary(&run_dir.join(id.as_str()))
                .and_then(|s| s.interpretation)
                .unwrap_or_else(|| "no interpretation available".to_string());
            format!("{}: SIMULATED, {}", id, interpretation)
        }
        Outcome::Failed => match record.failure {
            Some(ref failure) => format!("{}: no valid result ({}).", id, failure),
            None => format!("{}: no valid result.", id),
        },
        Outcome::Skipped => format!("{}: skipped.", id),
    }
}

/// The fields of summary.json this module reads
#[derive(Debug, Default, Deserialize)]
struct ProjectSummary {
    #[serde(default)]
    simulated: bool,

    interpretation: Option<String>,

    #[serde(default)]
    metrics: serde_json::Map<String, serde_json::Value>,
}

impl ProjectSummary {
    /// Ensemble weight: auc, then accuracy, then 1.0
    fn weight(&self) -> f64 {
        ["auc", "accuracy"]
            .iter()
            .find_map(|key| self.metrics.get(*key).and_then(|v| v.as_f64()))
            .filter(|w| *w > 0.0)
            .unwrap_or(1.0)
    }
}

fn load_summary(project_dir: &Path) -> Option<ProjectSummary> {
    let content = std::fs::read_to_string(project_dir.join(SUMMARY_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

#[derive(Debug, Deserialize)]
struct PredictionRow {
    subject_id: String,
    predicted_label: String,
    probability: f64,
}

fn find_prediction(path: &Path, subject: &str) -> Result<Option<PredictionRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open predictions: {}", path.display()))?;

    for row in reader.deserialize::<PredictionRow>() {
        let row = row.with_context(|| format!("Malformed predictions row in {}", path.display()))?;
        if row.subject_id == subject {
            return Ok(Some(row));
        }
    }
    Ok(None)
}

/// One project's contribution to a subject prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProjectPrediction {
    Ok {
        probability: f64,
        label: String,
        weight: f64,
        simulated: bool,
    },
    Missing {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ensemble {
    pub available: usize,

    pub missing: Vec<ProjectId>,

    /// Weighted mean probability; `None` when no project had a prediction
    pub probability: Option<f64>,

    /// `AD`, `CN`, or `unknown`
    pub label: String,
}

/// Persisted per-subject report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectPrediction {
    pub subject_id: String,

    pub threshold: f64,

    pub per_project: BTreeMap<ProjectId, ProjectPrediction>,

    pub ensemble: Ensemble,

    /// Whether any contributing prediction came from a simulation
    pub includes_simulated: bool,

    pub final_text: String,

    pub disclaimer: String,

    pub report_path: PathBuf,
}

/// Aggregate every project's prediction for `subject` in `run_dir` and
/// write `subject_<id>_report.json` there.
pub fn predict_subject(run_dir: &Path, subject: &str, threshold: f64) -> Result<SubjectPrediction> {
    if !run_dir.is_dir() {
        anyhow::bail!("Run directory not found: {}", run_dir.display());
    }
    if subject.is_empty() || subject.contains(['/', '\\']) {
        anyhow::bail!("Invalid subject id: '{}'", subject);
    }

    let mut per_project = BTreeMap::new();
    let mut missing = Vec::new();
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    let mut includes_simulated = false;

    for id in ProjectId::ALL {
        let project_dir = run_dir.join(id.as_str());
        let predictions = project_dir.join(PREDICTIONS_FILE);

        let found = if predictions.is_file() {
            find_prediction(&predictions, subject).map_err(|e| {
                warn!(project = %id, error = %format!("{e:#}"), "Ignoring unreadable predictions");
                format!("unreadable {}: {:#}", PREDICTIONS_FILE, e)
            })
        } else {
            Err(format!("no {}", PREDICTIONS_FILE))
        };

        let row = match found {
            Ok(Some(row)) => row,
            Ok(None) => {
                let reason = format!("subject not found in {}", PREDICTIONS_FILE);
                per_project.insert(id, ProjectPrediction::Missing { reason });
                missing.push(id);
                continue;
            }
            Err(reason) => {
                per_project.insert(id, ProjectPrediction::Missing { reason });
                missing.push(id);
                continue;
            }
        };

        let summary = load_summary(&project_dir).unwrap_or_default();
        let weight = summary.weight();
        weighted_sum += row.probability * weight;
        total_weight += weight;
        includes_simulated |= summary.simulated;

        per_project.insert(
            id,
            ProjectPrediction::Ok {
                probability: row.probability,
                label: row.predicted_label,
                weight,
                simulated: summary.simulated,
            },
        );
    }

    let probability = (total_weight > 0.0).then(|| weighted_sum / total_weight);
    let label = match probability {
        Some(p) if p >= threshold => "AD",
        Some(_) => "CN",
        None => "unknown",
    }
    .to_string();

    let final_text = match probability {
        None => format!("Subject {}: unknown (no project prediction available).", subject),
        Some(p) if label == "AD" => format!(
            "Subject {}: classified as Alzheimer's disease (probability {:.3}).",
            subject, p
        ),
        Some(p) => format!(
            "Subject {}: not classified as Alzheimer's disease (probability {:.3}).",
            subject, p
        ),
    };

    debug!(subject, available = per_project.len() - missing.len(), "Aggregated predictions");

    let report_path = run_dir.join(format!("subject_{}_report.json", subject));
    let prediction = SubjectPrediction {
        subject_id: subject.to_string(),
        threshold,
        ensemble: Ensemble {
            available: per_project.len() - missing.len(),
            missing,
            probability,
            label,
        },
        per_project,
        includes_simulated,
        final_text,
        disclaimer: PREDICTION_DISCLAIMER.to_string(),
        report_path: report_path.clone(),
    };

    let json = serde_json::to_string_pretty(&prediction)?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("Failed to write report: {}", report_path.display()))?;

    info!(subject, path = %report_path.display(), "Wrote subject report");
    Ok(prediction)
}
