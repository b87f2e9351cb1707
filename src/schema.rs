// Shape Layer - Schema Validation
// Checks an untyped candidate document before it may reach the store

use crate::attributes::{FieldRegistry, FieldType};
use crate::record::{StartupRecord, Status};
use chrono::{Datelike, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

pub const MIN_FOUNDED_YEAR: i64 = 1900;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// Which rule a field broke
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Missing,
    WrongType { expected: &'static str },
    OutOfRange { min: i64, max: i64 },
    Negative,
    NotAllowed { allowed: Vec<&'static str> },
    Blank,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Missing => write!(f, "required field is missing"),
            Constraint::WrongType { expected } => write!(f, "expected {}", expected),
            Constraint::OutOfRange { min, max } => write!(f, "must be between {} and {}", min, max),
            Constraint::Negative => write!(f, "must not be negative"),
            Constraint::NotAllowed { allowed } => write!(f, "must be one of {}", allowed.join(", ")),
            Constraint::Blank => write!(f, "must not be blank"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {constraint} ({detail})")]
pub struct ValidationError {
    /// Field path, e.g. `status` or `funding_rounds[2].date`
    pub field: String,
    pub constraint: Constraint,
    /// Offending value or other context
    pub detail: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, constraint: Constraint, detail: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            constraint,
            detail: detail.into(),
        }
    }

    fn wrong_type(field: impl Into<String>, expected: &'static str, got: &Value) -> Self {
        ValidationError::new(field, Constraint::WrongType { expected }, format!("got {}", got))
    }
}

pub type ValidationResult = Result<StartupRecord, ValidationError>;

/// Outcome of validating many candidates
#[derive(Debug, Default)]
pub struct BatchValidation {
    pub accepted: Vec<StartupRecord>,
    /// Index into the input slice and the first violation found
    pub rejected: Vec<(usize, ValidationError)>,
}

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

pub struct SchemaValidator {
    registry: FieldRegistry,
    /// Fixed upper year bound; `None` reads the clock on every check
    pinned_year: Option<i64>,
}

impl SchemaValidator {
    /// Validator whose upper year bound is the year at the time of each check
    pub fn new() -> Self {
        SchemaValidator {
            registry: FieldRegistry::new(),
            pinned_year: None,
        }
    }

    /// Validator with a fixed upper year bound
    pub fn with_current_year(current_year: i64) -> Self {
        SchemaValidator {
            pinned_year: Some(current_year),
            ..SchemaValidator::new()
        }
    }

    pub fn current_year(&self) -> i64 {
        self.pinned_year.unwrap_or_else(|| i64::from(Utc::now().year()))
    }

    /// Validate one candidate document, failing on the first violation.
    ///
    /// Stages run in a fixed order: required presence, field types, founding
    /// year range, non-negative total funding, status enumeration, then the
    /// remaining value rules. JSON `null` counts as absent.
    pub fn validate(&self, candidate: &Value) -> ValidationResult {
        let doc = candidate
            .as_object()
            .ok_or_else(|| ValidationError::wrong_type("document", "object", candidate))?;

        self.check_required(doc)?;
        self.check_types(doc)?;
        self.check_founded_year(doc)?;
        self.check_total_funding(doc)?;
        self.check_status(doc)?;
        self.check_values(doc)?;

        self.build(doc)
    }

    /// Validate a batch; one bad record never stops the others
    pub fn validate_batch(&self, candidates: &[Value]) -> BatchValidation {
        let mut outcome = BatchValidation::default();

        for (index, candidate) in candidates.iter().enumerate() {
            match self.validate(candidate) {
                Ok(record) => outcome.accepted.push(record),
                Err(err) => outcome.rejected.push((index, err)),
            }
        }

        outcome
    }

    // ========================================================================
    // STAGES
    // ========================================================================

    fn check_required(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        for field in self.registry.required_fields() {
            if present(doc, &field.name).is_none() {
                return Err(ValidationError::new(&field.name, Constraint::Missing, field.description.as_str()));
            }
        }
        Ok(())
    }

    fn check_types(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        for field in self.registry.fields() {
            let Some(value) = present(doc, &field.name) else {
                continue;
            };

            if !field.field_type.matches(value) {
                return Err(ValidationError::wrong_type(&field.name, field.field_type.name(), value));
            }

            if field.field_type == FieldType::FundingRounds {
                check_rounds_shape(&field.name, value)?;
            }
        }
        Ok(())
    }

    fn check_founded_year(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        let value = &doc["founded_year"];
        let current_year = self.current_year();
        let in_range = value
            .as_i64()
            .map_or(false, |year| (MIN_FOUNDED_YEAR..=current_year).contains(&year));

        if in_range {
            Ok(())
        } else {
            Err(ValidationError::new(
                "founded_year",
                Constraint::OutOfRange {
                    min: MIN_FOUNDED_YEAR,
                    max: current_year,
                },
                format!("got {}", value),
            ))
        }
    }

    fn check_total_funding(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        let value = &doc["total_funding_usd"];
        match value.as_f64() {
            Some(amount) if amount >= 0.0 => Ok(()),
            _ => Err(ValidationError::new(
                "total_funding_usd",
                Constraint::Negative,
                format!("got {}", value),
            )),
        }
    }

    fn check_status(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        let value = doc["status"].as_str().unwrap_or_default();
        value.parse::<Status>().map(|_| ()).map_err(|_| {
            ValidationError::new(
                "status",
                Constraint::NotAllowed {
                    allowed: Status::allowed(),
                },
                format!("got '{}'", value),
            )
        })
    }

    fn check_values(&self, doc: &Map<String, Value>) -> Result<(), ValidationError> {
        if doc["name"].as_str().map_or(true, |name| name.trim().is_empty()) {
            return Err(ValidationError::new("name", Constraint::Blank, "empty name"));
        }

        if let Some(count) = present(doc, "employee_count") {
            if count.as_i64().map_or(false, |c| c < 0) {
                return Err(ValidationError::new(
                    "employee_count",
                    Constraint::Negative,
                    format!("got {}", count),
                ));
            }
        }

        if let Some(rounds) = present(doc, "funding_rounds").and_then(Value::as_array) {
            for (i, round) in rounds.iter().enumerate() {
                let amount = &round["amount_usd"];
                if amount.as_f64().map_or(false, |a| a < 0.0) {
                    return Err(ValidationError::new(
                        format!("funding_rounds[{}].amount_usd", i),
                        Constraint::Negative,
                        format!("got {}", amount),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Typed record from a document that passed every stage. Registry
    /// fields only; absent fields take their registry default.
    fn build(&self, doc: &Map<String, Value>) -> ValidationResult {
        let cleaned: Map<String, Value> = self
            .registry
            .fields()
            .iter()
            .filter_map(|field| {
                let value = present(doc, &field.name).or(field.default_value.as_ref())?;
                Some((field.name.clone(), value.clone()))
            })
            .collect();

        serde_json::from_value(Value::Object(cleaned))
            .map_err(|e| ValidationError::new("document", Constraint::WrongType { expected: "startup record" }, e.to_string()))
    }
}

impl Default for SchemaValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Field value unless absent or null
fn present<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    doc.get(field).filter(|v| !v.is_null())
}

fn check_rounds_shape(field: &str, value: &Value) -> Result<(), ValidationError> {
    let rounds = value.as_array().map(Vec::as_slice).unwrap_or_default();

    for (i, round) in rounds.iter().enumerate() {
        let path = format!("{}[{}]", field, i);
        let Some(obj) = round.as_object() else {
            return Err(ValidationError::wrong_type(path, "object", round));
        };

        match obj.get("round") {
            Some(Value::String(_)) => {}
            other => {
                return Err(ValidationError::wrong_type(
                    format!("{}.round", path),
                    "string",
                    other.unwrap_or(&Value::Null),
                ))
            }
        }

        match obj.get("amount_usd") {
            Some(v) if v.is_number() => {}
            other => {
                return Err(ValidationError::wrong_type(
                    format!("{}.amount_usd", path),
                    "number",
                    other.unwrap_or(&Value::Null),
                ))
            }
        }

        let date = obj.get("date");
        let is_iso = date
            .and_then(Value::as_str)
            .map_or(false, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok());
        if !is_iso {
            return Err(ValidationError::wrong_type(
                format!("{}.date", path),
                "ISO date (YYYY-MM-DD)",
                date.unwrap_or(&Value::Null),
            ));
        }
    }

    Ok(())
}
