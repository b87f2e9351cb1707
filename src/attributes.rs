// Field registry for startup documents
// Declares every field once: semantic type, whether it is required, default

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// FIELD TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    /// Whole number; `2015.0` does not count
    Integer,
    Number,
    StringList,
    /// Array of `{round, amount_usd, date}` objects
    FundingRounds,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::StringList => "array of strings",
            FieldType::FundingRounds => "array of funding rounds",
        }
    }

    /// Shallow type check; funding rounds are inspected element by element by the validator
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Number => value.is_number(),
            FieldType::StringList => value
                .as_array()
                .map_or(false, |items| items.iter().all(Value::is_string)),
            FieldType::FundingRounds => value.is_array(),
        }
    }
}

// ============================================================================
// FIELD DEFINITION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    /// Shown in the validator's missing-field errors
    pub description: String,
    /// Value the validator fills in when the field is absent
    pub default_value: Option<Value>,
}

impl FieldDefinition {
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.into(),
            field_type,
            required: true,
            description: String::new(),
            default_value: None,
        }
    }

    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldDefinition {
            required: false,
            ..FieldDefinition::required(name, field_type)
        }
    }

    /// Builder: add description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: add default value
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }
}

// ============================================================================
// FIELD REGISTRY
// ============================================================================

/// Ordered catalog of startup fields.
///
/// Declaration order is the order in which the validator reports violations,
/// so it is part of the contract: the first missing required field named is
/// always the earliest one declared here.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    fields: Vec<FieldDefinition>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        let fields = vec![
            FieldDefinition::required("name", FieldType::String)
                .with_description("Company name, unique within the store"),
            FieldDefinition::required("founded_year", FieldType::Integer)
                .with_description("Year of founding, 1900 through the current year"),
            FieldDefinition::required("country", FieldType::String)
                .with_description("Country of headquarters"),
            FieldDefinition::optional("city", FieldType::String)
                .with_description("City of headquarters"),
            FieldDefinition::optional("industry", FieldType::StringList)
                .with_description("Industry tags, order preserved")
                .with_default(Value::Array(Vec::new())),
            FieldDefinition::optional("funding_rounds", FieldType::FundingRounds)
                .with_description("Funding rounds with label, amount and ISO date")
                .with_default(Value::Array(Vec::new())),
            FieldDefinition::optional("investors", FieldType::StringList)
                .with_description("Investor names")
                .with_default(Value::Array(Vec::new())),
            FieldDefinition::required("total_funding_usd", FieldType::Number)
                .with_description("Total funding raised in USD, never negative"),
            FieldDefinition::optional("employee_count", FieldType::Integer)
                .with_description("Headcount, never negative")
                .with_default(Value::from(0)),
            FieldDefinition::required("status", FieldType::String)
                .with_description("Operating, Acquired, Closed or IPO"),
        ];

        FieldRegistry { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// All fields in declaration order
    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.required)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_order() {
        let registry = FieldRegistry::new();
        let required: Vec<&str> = registry.required_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(
            required,
            vec!["name", "founded_year", "country", "total_funding_usd", "status"]
        );
    }

    #[test]
    fn test_type_matching() {
        assert!(FieldType::Integer.matches(&json!(2015)));
        assert!(!FieldType::Integer.matches(&json!(2015.5)));
        assert!(!FieldType::Integer.matches(&json!("2015")));
        assert!(FieldType::Number.matches(&json!(12.5)));
        assert!(FieldType::Number.matches(&json!(0)));
        assert!(FieldType::StringList.matches(&json!(["AI", "FinTech"])));
        assert!(FieldType::StringList.matches(&json!([])));
        assert!(!FieldType::StringList.matches(&json!(["AI", 3])));
        assert!(!FieldType::StringList.matches(&json!("AI")));
    }

    #[test]
    fn test_defaults() {
        let registry = FieldRegistry::new();
        assert_eq!(registry.get("employee_count").unwrap().default_value, Some(json!(0)));
        assert_eq!(registry.get("industry").unwrap().default_value, Some(json!([])));
        assert!(registry.get("city").unwrap().default_value.is_none());
        assert!(!registry.is_known("valuation"));
    }
}
