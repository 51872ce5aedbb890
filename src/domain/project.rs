//! Project identifiers.
//!
//! The set of projects is closed: every identifier the runner accepts is a
//! variant of [`ProjectId`]. Per-project behavior lives in the registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the fixed external research codebases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProjectId {
    /// Proteomics biomarker notebooks
    #[serde(rename = "AD-Biomarkers-Project")]
    AdBiomarkers,

    /// ADNI R scripts and CNN models
    #[serde(rename = "ADNI")]
    Adni,

    /// LEAD EEG classifier
    #[serde(rename = "LEAD")]
    Lead,

    /// TADPOLE challenge helper scripts
    #[serde(rename = "TADPOLE")]
    Tadpole,

    /// TransMF MRI+PET transformer
    #[serde(rename = "TransMF_AD")]
    TransMfAd,
}

impl ProjectId {
    /// Every project, in registry order
    pub const ALL: [ProjectId; 5] = [
        ProjectId::AdBiomarkers,
        ProjectId::Adni,
        ProjectId::Lead,
        ProjectId::Tadpole,
        ProjectId::TransMfAd,
    ];

    /// Canonical identifier (also the project's directory name)
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectId::AdBiomarkers => "AD-Biomarkers-Project",
            ProjectId::Adni => "ADNI",
            ProjectId::Lead => "LEAD",
            ProjectId::Tadpole => "TADPOLE",
            ProjectId::TransMfAd => "TransMF_AD",
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectId {
    type Err = UnknownProjectError;

    /// Exact match first, then a case-insensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ProjectId::ALL
            .iter()
            .find(|id| id.as_str() == wanted)
            .or_else(|| {
                ProjectId::ALL
                    .iter()
                    .find(|id| id.as_str().eq_ignore_ascii_case(wanted))
            })
            .copied()
            .ok_or_else(|| UnknownProjectError(wanted.to_string()))
    }
}

/// An identifier outside the registry was supplied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown project '{0}' (available: AD-Biomarkers-Project, ADNI, LEAD, TADPOLE, TransMF_AD)")]
pub struct UnknownProjectError(pub String);

/// Parse a comma-separated selection. `all` (or an empty string) selects
/// every registered project.
pub fn parse_selection(list: &str) -> Result<Vec<ProjectId>, UnknownProjectError> {
    let trimmed = list.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return Ok(ProjectId::ALL.to_vec());
    }

    trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ProjectId::from_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for id in ProjectId::ALL {
            assert_eq!(id.as_str().parse::<ProjectId>().unwrap(), id);
        }
    }

    #[test]
    fn test_case_insensitive_parse() {
        assert_eq!("lead".parse::<ProjectId>().unwrap(), ProjectId::Lead);
        assert_eq!("transmf_ad".parse::<ProjectId>().unwrap(), ProjectId::TransMfAd);
    }

    #[test]
    fn test_unknown_project() {
        let err = "OASIS".parse::<ProjectId>().unwrap_err();
        assert_eq!(err, UnknownProjectError("OASIS".to_string()));
        assert!(err.to_string().contains("OASIS"));
    }

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("all").unwrap(), ProjectId::ALL.to_vec());
        assert_eq!(parse_selection("").unwrap(), ProjectId::ALL.to_vec());
        assert_eq!(
            parse_selection("LEAD, ADNI").unwrap(),
            vec![ProjectId::Lead, ProjectId::Adni]
        );
        assert!(parse_selection("ADNI,nope").is_err());
    }

    #[test]
    fn test_serde_uses_canonical_names() {
        let json = serde_json::to_string(&ProjectId::AdBiomarkers).unwrap();
        assert_eq!(json, "\"AD-Biomarkers-Project\"");
        let parsed: ProjectId = serde_json::from_str("\"TransMF_AD\"").unwrap();
        assert_eq!(parsed, ProjectId::TransMfAd);
    }
}
