//! Scoring rubric: weighted categories, each with named criteria.
//!
//! The rubric originates in a spreadsheet; the loader only sees the JSON
//! export, `{ "categories": [{ "name", "weight", "criteria": [...] }] }`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::DiligenceError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// What a top score looks like, shown to the scorer as calibration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring_guidance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriteriaCategory {
    pub name: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub criteria: Vec<CriterionDefinition>,
}

/// The active criteria set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DiligenceCriteria {
    #[serde(default)]
    pub categories: Vec<CriteriaCategory>,
}

impl DiligenceCriteria {
    /// Case-insensitive lookup by category name.
    pub fn find_category(&self, name: &str) -> Option<&CriteriaCategory> {
        let wanted = name.trim();
        self.categories
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(wanted))
    }

    pub fn total_weight(&self) -> f64 {
        self.categories.iter().map(|c| c.weight).sum()
    }

    /// Resolve a requested category to its canonical name, or fail with
    /// `UnknownCategory`.
    pub fn require_category(&self, name: &str) -> Result<&CriteriaCategory, DiligenceError> {
        self.find_category(name)
            .ok_or_else(|| DiligenceError::UnknownCategory(name.trim().to_string()))
    }
}

/// Parse a rubric JSON export and validate it.
pub fn parse_criteria(json: &str) -> Result<DiligenceCriteria, DiligenceError> {
    let criteria: DiligenceCriteria = serde_json::from_str(json).map_err(|e| {
        DiligenceError::ConfigurationError(format!("Failed to parse criteria: {}", e))
    })?;
    validate_criteria(&criteria)?;
    Ok(criteria)
}

/// Validate a rubric has usable categories.
pub fn validate_criteria(criteria: &DiligenceCriteria) -> Result<(), DiligenceError> {
    if criteria.categories.is_empty() {
        return Err(DiligenceError::ConfigurationError(
            "Criteria must define at least one category".into(),
        ));
    }
    let mut seen = HashSet::new();
    for category in &criteria.categories {
        let name = category.name.trim();
        if name.is_empty() {
            return Err(DiligenceError::ConfigurationError(
                "Criteria category name is required".into(),
            ));
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(DiligenceError::ConfigurationError(format!(
                "Duplicate criteria category: {}",
                name
            )));
        }
        if !category.weight.is_finite() || category.weight < 0.0 {
            return Err(DiligenceError::ConfigurationError(format!(
                "Invalid weight for category {}: {}",
                name, category.weight
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Three-category rubric used across module tests.
    pub fn sample_criteria() -> DiligenceCriteria {
        let category = |name: &str, weight: f64, criteria: &[&str]| CriteriaCategory {
            name: name.to_string(),
            weight,
            criteria: criteria
                .iter()
                .map(|c| CriterionDefinition {
                    name: c.to_string(),
                    description: None,
                    scoring_guidance: None,
                })
                .collect(),
        };
        DiligenceCriteria {
            categories: vec![
                category("Team", 40.0, &["Founder-market fit", "Execution speed"]),
                category("Market", 35.0, &["Market size", "Timing"]),
                category("Product", 25.0, &["Differentiation"]),
            ],
        }
    }
}
