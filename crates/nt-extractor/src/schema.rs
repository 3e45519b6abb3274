//! Candidate validation
//!
//! Checks raw structured text against the filter schema: JSON object,
//! known keys, value types, closed vocabularies and the structural
//! invariants. Missing keys mean absent.

use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use nt_core::{
    DateEventType, FilterObject, InvariantViolation, LogisticsStatus, OperationCode,
    PerformanceStatus, SortColumn, SortDirection, StateCode,
};

static FINAL_MARKER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)JSON\s+FINAL\s*:?").ok());

/// Why a candidate was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("not valid JSON: {0}")]
    NotJson(String),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("'{value}' is not an allowed value for '{field}'")]
    NotInVocabulary { field: &'static str, value: String },

    #[error("'{value}' in '{field}' is not a date in AAAA-MM-DD format")]
    BadDate { field: &'static str, value: String },

    #[error("'{0}' is not an 8-digit CNPJ root")]
    BadCnpjRoot(String),

    #[error("invariant violated: {0}")]
    Invariant(#[from] InvariantViolation),
}

/// Validates raw candidate text into a typed value
pub trait CandidateValidator: Send + Sync {
    type Output;

    /// Parse and validate a raw candidate
    fn validate(&self, raw: &str) -> Result<Self::Output, ValidationError>;

    /// Schema description handed to a repairer
    fn describe(&self) -> String;
}

/// The part of a model answer holding the JSON object.
///
/// Chain-of-thought answers end with a `JSON FINAL` marker; the text after
/// the last marker wins. Within that text the span from the first `{` to the
/// last `}` is taken.
pub fn isolate_json(raw: &str) -> Option<&str> {
    let tail = FINAL_MARKER
        .as_ref()
        .and_then(|marker| marker.find_iter(raw).last())
        .map_or(raw, |found| &raw[found.end()..]);

    let start = tail.find('{')?;
    let end = tail.rfind('}')?;
    (start < end).then(|| &tail[start..=end])
}

/// Schema of [`FilterObject`]
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterSchema;

impl FilterSchema {
    /// Validate an already parsed JSON value
    pub fn validate_value(&self, value: &Value) -> Result<FilterObject, ValidationError> {
        let filter = self.validate_fields(value)?;
        filter.check_invariants()?;
        Ok(filter)
    }

    /// Check keys, types and vocabularies without the structural invariants
    pub fn validate_fields(&self, value: &Value) -> Result<FilterObject, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        if let Some(unknown) = object
            .keys()
            .find(|key| !FilterObject::FIELD_NAMES.contains(&key.as_str()))
        {
            return Err(ValidationError::UnknownField(unknown.clone()));
        }

        Ok(FilterObject {
            invoice_number: invoice_number(object)?,
            date_from: date(object, "DE")?,
            date_to: date(object, "ATE")?,
            date_event: vocabulary::<DateEventType>(object, "TipoData")?,
            client: text(object, "Cliente")?,
            carrier: text(object, "Transportadora")?,
            destination_state: vocabulary::<StateCode>(object, "UFDestino")?,
            destination_city: text(object, "CidadeDestino")?,
            operation: vocabulary::<OperationCode>(object, "Operacao")?,
            logistics_status: vocabulary::<LogisticsStatus>(object, "SituacaoNF")?,
            performance_status: vocabulary::<PerformanceStatus>(object, "StatusAnaliseData")?,
            carrier_cnpj_root: cnpj_root(object)?,
            sort_column: vocabulary::<SortColumn>(object, "SortColumn")?,
            sort_direction: vocabulary::<SortDirection>(object, "SortDirection")?,
        })
    }
}

impl CandidateValidator for FilterSchema {
    type Output = FilterObject;

    fn validate(&self, raw: &str) -> Result<FilterObject, ValidationError> {
        let json = isolate_json(raw)
            .ok_or_else(|| ValidationError::NotJson("no JSON object found".to_string()))?;
        let value: Value =
            serde_json::from_str(json).map_err(|e| ValidationError::NotJson(e.to_string()))?;
        self.validate_value(&value)
    }

    fn describe(&self) -> String {
        fn values<T: std::fmt::Display>(all: &[T]) -> String {
            all.iter()
                .map(|v| format!("\"{v}\""))
                .collect::<Vec<_>>()
                .join(", ")
        }

        format!(
            "A single JSON object with exactly these keys (use null when absent):\n\
             - \"NF\": integer or null\n\
             - \"DE\", \"ATE\": \"AAAA-MM-DD\" or null; both set or both null; DE <= ATE\n\
             - \"TipoData\": one of {} or null\n\
             - \"Cliente\", \"Transportadora\", \"CidadeDestino\": string or null\n\
             - \"UFDestino\": one of {} or null\n\
             - \"Operacao\": one of {} or null\n\
             - \"SituacaoNF\": one of {} or null\n\
             - \"StatusAnaliseData\": one of {} or null\n\
             - \"CNPJRaizTransp\": string of 8 digits or null\n\
             - \"SortColumn\": one of {} or null\n\
             - \"SortDirection\": one of {} or null\n\
             Rules: when NF is set every other key is null; StatusAnaliseData and \
             SituacaoNF are never both set; SortColumn and SortDirection are set together \
             or both null.",
            values(DateEventType::ALL),
            values(StateCode::ALL),
            values(OperationCode::ALL),
            values(LogisticsStatus::ALL),
            values(PerformanceStatus::ALL),
            values(SortColumn::ALL),
            values(SortDirection::ALL),
        )
    }
}

// ============================================================================
// Field readers
// ============================================================================

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    object.get(name).filter(|value| !value.is_null())
}

fn string<'a>(
    object: &'a Map<String, Value>,
    name: &'static str,
) -> Result<Option<&'a str>, ValidationError> {
    match field(object, name) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ValidationError::WrongType {
            field: name,
            expected: "a string or null",
        }),
    }
}

fn invoice_number(object: &Map<String, Value>) -> Result<Option<u64>, ValidationError> {
    match field(object, "NF") {
        None => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or(ValidationError::WrongType {
            field: "NF",
            expected: "a non-negative integer or null",
        }),
    }
}

fn date(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<NaiveDate>, ValidationError> {
    let Some(raw) = string(object, name)? else {
        return Ok(None);
    };
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| ValidationError::BadDate {
            field: name,
            value: raw.to_string(),
        })
}

fn vocabulary<T: FromStr>(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<T>, ValidationError> {
    let Some(raw) = string(object, name)? else {
        return Ok(None);
    };
    raw.parse().map(Some).map_err(|_| ValidationError::NotInVocabulary {
        field: name,
        value: raw.to_string(),
    })
}

/// Free text; a blank string counts as absent
fn text(
    object: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<String>, ValidationError> {
    Ok(string(object, name)?
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn cnpj_root(object: &Map<String, Value>) -> Result<Option<String>, ValidationError> {
    let Some(raw) = string(object, "CNPJRaizTransp")? else {
        return Ok(None);
    };
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        Ok(Some(raw.to_string()))
    } else {
        Err(ValidationError::BadCnpjRoot(raw.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(raw: &str) -> Result<FilterObject, ValidationError> {
        FilterSchema.validate(raw)
    }

    #[test]
    fn test_round_trips_serialized_filter() {
        let filter = FilterObject {
            date_from: NaiveDate::from_ymd_opt(2025, 10, 19),
            date_to: NaiveDate::from_ymd_opt(2025, 10, 19),
            date_event: Some(DateEventType::Delivered),
            destination_city: Some("Manaus".to_string()),
            destination_state: Some(StateCode::AM),
            ..Default::default()
        };
        let raw = serde_json::to_string(&filter).unwrap();
        assert_eq!(validate(&raw), Ok(filter));
    }

    #[test]
    fn test_missing_keys_are_absent() {
        let filter = validate(r#"{"SituacaoNF": "TRÂNSITO"}"#).unwrap();
        assert_eq!(filter.logistics_status, Some(LogisticsStatus::InTransit));
        assert_eq!(filter.populated_fields(), 1);
        assert!(validate("{}").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_candidates() {
        assert!(matches!(validate("not json"), Err(ValidationError::NotJson(_))));
        assert!(matches!(validate(r#"{"NF": 1"#), Err(ValidationError::NotJson(_))));
        assert_eq!(
            validate(r#"{"Status": "x"}"#),
            Err(ValidationError::UnknownField("Status".to_string()))
        );
        assert_eq!(
            validate(r#"{"NF": "54321"}"#),
            Err(ValidationError::WrongType {
                field: "NF",
                expected: "a non-negative integer or null"
            })
        );
        assert_eq!(
            validate(r#"{"SituacaoNF": "EM TRÂNSITO"}"#),
            Err(ValidationError::NotInVocabulary {
                field: "SituacaoNF",
                value: "EM TRÂNSITO".to_string()
            })
        );
        assert!(matches!(
            validate(r#"{"DE": "19/10/2025", "ATE": "2025-10-19"}"#),
            Err(ValidationError::BadDate { field: "DE", .. })
        ));
        assert_eq!(
            validate(r#"{"CNPJRaizTransp": "12.345.678"}"#),
            Err(ValidationError::BadCnpjRoot("12.345.678".to_string()))
        );
    }

    #[test]
    fn test_rejects_invariant_violations() {
        assert_eq!(
            validate(r#"{"NF": 54321, "Cliente": "ACME"}"#),
            Err(ValidationError::Invariant(InvariantViolation::InvoiceNotExclusive))
        );
        assert_eq!(
            validate(r#"{"SortColumn": "valor_nf", "SortDirection": null}"#),
            Err(ValidationError::Invariant(InvariantViolation::PartialSort))
        );
        assert_eq!(
            validate(r#"{"SituacaoNF": "RETIDA", "StatusAnaliseData": "ATRASO"}"#),
            Err(ValidationError::Invariant(
                InvariantViolation::PerformanceWithLogistics
            ))
        );
    }

    #[test]
    fn test_field_check_skips_invariants() {
        let value: Value = serde_json::from_str(r#"{"NF": 54321, "Cliente": "ACME"}"#).unwrap();
        let filter = FilterSchema.validate_fields(&value).unwrap();
        assert_eq!(filter.populated_fields(), 2);
        assert!(FilterSchema.validate_value(&value).is_err());
    }

    #[test]
    fn test_isolate_json() {
        assert_eq!(
            isolate_json("Passo 1: {rascunho}\nJSON FINAL:\n```json\n{\"NF\": 1}\n```"),
            Some("{\"NF\": 1}")
        );
        assert_eq!(isolate_json("aqui está: {\"a\": {\"b\": 1}} ok"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(isolate_json("sem objeto"), None);
        assert_eq!(isolate_json("} {"), None);
    }

    #[test]
    fn test_blank_text_is_absent() {
        let filter = validate(r#"{"Cliente": "  ", "Transportadora": " Veloz "}"#).unwrap();
        assert_eq!(filter.client, None);
        assert_eq!(filter.carrier.as_deref(), Some("Veloz"));
    }

    #[test]
    fn test_describe_lists_vocabularies() {
        let description = FilterSchema.describe();
        assert!(description.contains("\"PREVISTO PARA 2 DIAS\""));
        assert!(description.contains("\"OutBound-BAR-MAT.PRIMA\""));
        assert!(description.contains("\"valor_nf\""));
    }
}
