//! Patient context retrieval: select the rows matching a set of filters and
//! summarize them as prompt context.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use polars::prelude::*;
use serde::Serialize;

use crate::dataset::{is_flag_dtype, Dataset};
use crate::describe::{describe, Description};
use crate::error::{AdvisorError, AdvisorResult};
use crate::records::{AGE_CATEGORY, DEFAULT_CONDITIONS, SMOKER_STATUS};

/// Filters chosen by the user.
///
/// A condition mapped to `true` requires that column to equal 1; `false`
/// or a missing entry leaves the column unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterCriteria {
    pub age_category: String,
    pub smoker_status: String,
    pub conditions: BTreeMap<String, bool>,
}

impl FilterCriteria {
    pub fn new(age_category: impl Into<String>, smoker_status: impl Into<String>) -> Self {
        FilterCriteria {
            age_category: age_category.into(),
            smoker_status: smoker_status.into(),
            conditions: BTreeMap::new(),
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>, required: bool) -> Self {
        self.conditions.insert(condition.into(), required);
        self
    }

    /// Record every default condition the dataset carries as unchecked,
    /// leaving conditions already set alone.
    pub fn with_unchecked_defaults(mut self, dataset: &Dataset) -> Self {
        for condition in DEFAULT_CONDITIONS.iter().filter(|c| dataset.has_column(c)) {
            self.conditions.entry(condition.to_string()).or_insert(false);
        }
        self
    }

    /// Conditions that actually narrow the selection.
    pub fn required_conditions(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .filter(|(_, required)| **required)
            .map(|(name, _)| name.as_str())
    }
}

/// Statistical digest of the rows matching a [`FilterCriteria`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSummary {
    pub criteria: FilterCriteria,
    pub description: Description,
    pub text: String,
}

impl ContextSummary {
    pub fn matched_rows(&self) -> usize {
        self.description.rows
    }

    pub fn is_empty(&self) -> bool {
        self.matched_rows() == 0
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for ContextSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Reject criteria referring to columns the dataset does not have.
///
/// Runs before any row is touched.
pub fn validate(dataset: &Dataset, criteria: &FilterCriteria) -> AdvisorResult<()> {
    for column in [AGE_CATEGORY, SMOKER_STATUS] {
        let spec = dataset
            .column(column)
            .ok_or_else(|| AdvisorError::missing_column(column))?;
        if spec.dtype != DataType::Utf8 {
            return Err(AdvisorError::SchemaMismatch {
                column: column.to_string(),
                reason: format!("filter column has non-string dtype {}", spec.dtype),
            });
        }
    }
    for condition in criteria.conditions.keys() {
        let spec = dataset
            .column(condition)
            .ok_or_else(|| AdvisorError::missing_column(condition))?;
        if !is_flag_dtype(&spec.dtype) {
            return Err(AdvisorError::SchemaMismatch {
                column: condition.clone(),
                reason: format!("condition column has non-numeric dtype {}", spec.dtype),
            });
        }
    }
    Ok(())
}

fn condition_predicate(dataset: &Dataset, condition: &str) -> Expr {
    let is_boolean = dataset
        .column(condition)
        .map(|c| matches!(c.dtype, DataType::Boolean))
        .unwrap_or(false);
    if is_boolean {
        col(condition).eq(lit(true))
    } else {
        col(condition).eq(lit(1))
    }
}

fn base_predicate(criteria: &FilterCriteria) -> Expr {
    col(AGE_CATEGORY)
        .eq(lit(criteria.age_category.as_str()))
        .and(col(SMOKER_STATUS).eq(lit(criteria.smoker_status.as_str())))
}

/// Rows matching `criteria`, as a new frame. The dataset itself is untouched.
pub fn select(dataset: &Dataset, criteria: &FilterCriteria) -> AdvisorResult<DataFrame> {
    validate(dataset, criteria)?;

    let predicate = criteria
        .required_conditions()
        .fold(base_predicate(criteria), |acc, condition| {
            acc.and(condition_predicate(dataset, condition))
        });

    let subset = dataset.frame().clone().lazy().filter(predicate).collect()?;
    debug!(
        "criteria {:?} matched {} of {} rows",
        criteria,
        subset.height(),
        dataset.height()
    );
    Ok(subset)
}

pub fn build_context_for(dataset: &Dataset, criteria: &FilterCriteria) -> AdvisorResult<ContextSummary> {
    let subset = select(dataset, criteria)?;
    let description = describe(&subset, dataset.columns())?;
    let text = description.render();
    Ok(ContextSummary {
        criteria: criteria.clone(),
        description,
        text,
    })
}

/// Filter `dataset` and summarize the matching patients.
///
/// Unknown age or smoker values simply match nothing. Unknown condition
/// identifiers fail with [`AdvisorError::SchemaMismatch`].
pub fn build_context(
    dataset: &Dataset,
    age_category: &str,
    smoker_status: &str,
    conditions: &BTreeMap<String, bool>,
) -> AdvisorResult<ContextSummary> {
    let criteria = FilterCriteria {
        age_category: age_category.to_string(),
        smoker_status: smoker_status.to_string(),
        conditions: conditions.clone(),
    };
    build_context_for(dataset, &criteria)
}
