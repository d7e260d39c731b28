//! Structural schema: ranges, types, completeness.
//!
//! Everything here is pure. Limits live in [`EntitySchema`] so callers can
//! tighten them without touching the checks.

use crate::entities::GenerationParameter;
use crate::request::{AgentDraft, PersonalityDraft, RoleDraft};
use crate::traits::{PersonalityTrait, PersonalityTraits, TRAIT_MAX, TRAIT_MIN};
use crate::validation::{ErrorCode, ValidationError, ValidationResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// Default maximum decimal places accepted at an input surface.
pub const DEFAULT_MAX_DECIMALS: u32 = 2;

// ============================================================================
// TRAIT VALUES
// ============================================================================

/// Why a raw trait value was rejected.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraitValueError {
    #[error("must be a number")]
    InvalidType,

    #[error("must be between {min} and {max} (got {value})")]
    OutOfRange { value: f64, min: u8, max: u8 },

    #[error("must be an integer (got {value})")]
    NotInteger { value: f64 },

    #[error("has more than {max_decimals} decimal places (got {value})")]
    PrecisionExceeded { value: f64, max_decimals: u32 },
}

impl TraitValueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TraitValueError::InvalidType => ErrorCode::TraitInvalidType,
            TraitValueError::OutOfRange { .. } => ErrorCode::TraitOutOfRange,
            TraitValueError::NotInteger { .. } => ErrorCode::TraitNotInteger,
            TraitValueError::PrecisionExceeded { .. } => ErrorCode::TraitPrecisionExceeded,
        }
    }
}

/// Number of digits after the decimal point in the shortest representation.
fn decimal_places(value: f64) -> u32 {
    let repr = value.to_string();
    match repr.split_once('.') {
        Some((_, frac)) => frac.len() as u32,
        None => 0,
    }
}

fn check_range(value: f64) -> Result<(), TraitValueError> {
    if !value.is_finite() || value < f64::from(TRAIT_MIN) || value > f64::from(TRAIT_MAX) {
        return Err(TraitValueError::OutOfRange {
            value,
            min: TRAIT_MIN,
            max: TRAIT_MAX,
        });
    }
    Ok(())
}

/// Normalize a decimal value from an input surface (e.g. a slider) to the
/// canonical integer form. Rejects values outside [0, 100] and values with
/// more than two decimal places; otherwise rounds to the nearest integer.
pub fn normalize_surface_value(value: f64) -> Result<u8, TraitValueError> {
    check_range(value)?;
    if decimal_places(value) > DEFAULT_MAX_DECIMALS {
        return Err(TraitValueError::PrecisionExceeded {
            value,
            max_decimals: DEFAULT_MAX_DECIMALS,
        });
    }
    Ok(value.round() as u8)
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Structural limits. Defaults match the documented entity contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitySchema {
    pub max_trait_decimals: u32,
    pub max_name_len: usize,
    pub max_description_len: usize,
    pub max_custom_instructions_len: usize,
    pub temperature: (f64, f64),
    pub top_p: (f64, f64),
    pub max_tokens: (u32, u32),
    pub penalty: (f64, f64),
}

impl Default for EntitySchema {
    fn default() -> Self {
        Self {
            max_trait_decimals: DEFAULT_MAX_DECIMALS,
            max_name_len: 100,
            max_description_len: 1000,
            max_custom_instructions_len: 4000,
            temperature: (0.0, 2.0),
            top_p: (0.0, 1.0),
            max_tokens: (1, 200_000),
            penalty: (-2.0, 2.0),
        }
    }
}

impl EntitySchema {
    /// Parse one raw trait value into its canonical integer.
    ///
    /// Order: type, range, precision, integrality. A whole float such as
    /// `50.0` is accepted as `50`.
    pub fn parse_trait_value(&self, value: &Value) -> Result<u8, TraitValueError> {
        let number = match value {
            Value::Number(n) => n.as_f64().ok_or(TraitValueError::InvalidType)?,
            _ => return Err(TraitValueError::InvalidType),
        };
        check_range(number)?;
        if decimal_places(number) > self.max_trait_decimals {
            return Err(TraitValueError::PrecisionExceeded {
                value: number,
                max_decimals: self.max_trait_decimals,
            });
        }
        if number.fract() != 0.0 {
            return Err(TraitValueError::NotInteger { value: number });
        }
        Ok(number as u8)
    }

    /// Resolve a raw trait map into typed traits. Omitted behavioral traits
    /// take the neutral value; unknown keys are ignored here (the owning
    /// domain service reports them).
    pub fn resolve_traits(
        &self,
        raw: &BTreeMap<String, Value>,
    ) -> Result<PersonalityTraits, ValidationResult> {
        let result = self.check_traits(raw);
        if !result.is_valid {
            return Err(result);
        }
        let mut traits = PersonalityTraits::neutral();
        for (key, value) in raw {
            if let Ok(t) = PersonalityTrait::from_str(key) {
                if let Ok(v) = self.parse_trait_value(value) {
                    traits.set(t, v);
                }
            }
        }
        Ok(traits)
    }

    fn check_traits(&self, raw: &BTreeMap<String, Value>) -> ValidationResult {
        let mut result = ValidationResult::valid();

        for t in PersonalityTrait::BIG_FIVE {
            if !raw.contains_key(t.as_str()) {
                result.push(ValidationError::new(
                    trait_field(t),
                    ErrorCode::TraitRequired,
                    format!("{} is required", t),
                ));
            }
        }

        for (key, value) in raw {
            let Ok(t) = PersonalityTrait::from_str(key) else {
                continue;
            };
            if let Err(e) = self.parse_trait_value(value) {
                result.push(ValidationError::new(
                    trait_field(t),
                    e.code(),
                    format!("{} {}", t, e),
                ));
            }
        }

        result
    }

    /// Structural check of a personality draft.
    pub fn check_personality(&self, draft: &PersonalityDraft) -> ValidationResult {
        let mut result = ValidationResult::valid();
        self.check_name(&mut result, "personality.name", &draft.name);
        self.check_len(
            &mut result,
            "personality.description",
            draft.description.as_deref(),
            self.max_description_len,
            ErrorCode::DescriptionTooLong,
        );
        self.check_len(
            &mut result,
            "personality.customInstructions",
            draft.custom_instructions.as_deref(),
            self.max_custom_instructions_len,
            ErrorCode::CustomInstructionsTooLong,
        );
        result.merge(self.check_traits(&draft.traits));
        result
    }

    /// Structural check of a role draft. Capabilities must be non-empty.
    pub fn check_role(&self, draft: &RoleDraft) -> ValidationResult {
        let mut result = ValidationResult::valid();
        self.check_name(&mut result, "role.name", &draft.name);
        self.check_len(
            &mut result,
            "role.description",
            draft.description.as_deref(),
            self.max_description_len,
            ErrorCode::DescriptionTooLong,
        );
        if draft.capabilities.iter().all(|c| c.trim().is_empty()) {
            result.push(ValidationError::new(
                "role.capabilities",
                ErrorCode::RoleCapabilitiesRequired,
                "Role must grant at least one capability",
            ));
        }

        let req = &draft.requirements;
        for (label, bounds) in [("minTraits", &req.min_traits), ("maxTraits", &req.max_traits)] {
            for (t, v) in bounds {
                if *v > TRAIT_MAX {
                    result.push(ValidationError::new(
                        format!("role.requirements.{}.{}", label, t),
                        ErrorCode::TraitOutOfRange,
                        format!("{} bound must be between 0 and 100 (got {})", t, v),
                    ));
                }
            }
        }
        for (t, min) in &req.min_traits {
            if let Some(max) = req.max_traits.get(t) {
                if min > max {
                    result.push(ValidationError::new(
                        format!("role.requirements.minTraits.{}", t),
                        ErrorCode::TraitOutOfRange,
                        format!("{} minimum {} exceeds maximum {}", t, min, max),
                    ));
                }
            }
        }
        for (p, range) in &req.parameter_ranges {
            if !range.is_well_formed() {
                result.push(ValidationError::new(
                    format!("role.requirements.parameterRanges.{}", p),
                    ErrorCode::ParameterOutOfRange,
                    format!("{} range {} is not a valid range", p, range),
                ));
            }
        }
        result
    }

    /// Structural check of an agent draft.
    pub fn check_agent(&self, draft: &AgentDraft) -> ValidationResult {
        let mut result = ValidationResult::valid();
        self.check_name(&mut result, "agent.name", &draft.name);
        self.check_len(
            &mut result,
            "agent.description",
            draft.description.as_deref(),
            self.max_description_len,
            ErrorCode::DescriptionTooLong,
        );
        if draft.model_id.trim().is_empty() {
            result.push(ValidationError::new(
                "agent.modelId",
                ErrorCode::ModelIdRequired,
                "Model id is required",
            ));
        }

        let s = &draft.settings;
        let (lo, hi) = self.max_tokens;
        if s.max_tokens < lo || s.max_tokens > hi {
            result.push(param_error(
                GenerationParameter::MaxTokens,
                f64::from(s.max_tokens),
                f64::from(lo),
                f64::from(hi),
            ));
        }
        let float_params = [
            (GenerationParameter::Temperature, Some(s.temperature), self.temperature),
            (GenerationParameter::TopP, Some(s.top_p), self.top_p),
            (GenerationParameter::FrequencyPenalty, s.frequency_penalty, self.penalty),
            (GenerationParameter::PresencePenalty, s.presence_penalty, self.penalty),
        ];
        for (p, value, (lo, hi)) in float_params {
            if let Some(v) = value {
                if !v.is_finite() || v < lo || v > hi {
                    result.push(param_error(p, v, lo, hi));
                }
            }
        }
        result
    }

    fn check_name(&self, result: &mut ValidationResult, field: &str, name: &str) {
        if name.trim().is_empty() {
            result.push(ValidationError::new(
                field,
                ErrorCode::NameRequired,
                "Name is required",
            ));
        } else if name.chars().count() > self.max_name_len {
            result.push(ValidationError::new(
                field,
                ErrorCode::NameTooLong,
                format!("Name must be at most {} characters", self.max_name_len),
            ));
        }
    }

    fn check_len(
        &self,
        result: &mut ValidationResult,
        field: &str,
        value: Option<&str>,
        max: usize,
        code: ErrorCode,
    ) {
        if let Some(v) = value {
            if v.chars().count() > max {
                result.push(ValidationError::new(
                    field,
                    code,
                    format!("Must be at most {} characters", max),
                ));
            }
        }
    }
}

/// Field name for a trait, e.g. `personality.openness`.
pub fn trait_field(t: PersonalityTrait) -> String {
    format!("personality.{}", t)
}

fn param_error(p: GenerationParameter, value: f64, lo: f64, hi: f64) -> ValidationError {
    ValidationError::new(
        format!("agent.settings.{}", p),
        ErrorCode::ParameterOutOfRange,
        format!("{} must be between {} and {} (got {})", p, lo, hi, value),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn complete_draft() -> PersonalityDraft {
        PersonalityDraft::new("Muse").with_traits(&PersonalityTraits::neutral())
    }

    #[test]
    fn test_parse_trait_value_cases() {
        let s = EntitySchema::default();
        assert_eq!(s.parse_trait_value(&json!(0)), Ok(0));
        assert_eq!(s.parse_trait_value(&json!(100)), Ok(100));
        assert_eq!(s.parse_trait_value(&json!(50.0)), Ok(50));
        assert_eq!(s.parse_trait_value(&json!("50")), Err(TraitValueError::InvalidType));
        assert_eq!(s.parse_trait_value(&json!(null)), Err(TraitValueError::InvalidType));
        assert_eq!(
            s.parse_trait_value(&json!(101)).unwrap_err().code(),
            ErrorCode::TraitOutOfRange
        );
        assert_eq!(
            s.parse_trait_value(&json!(-1)).unwrap_err().code(),
            ErrorCode::TraitOutOfRange
        );
        assert_eq!(
            s.parse_trait_value(&json!(50.5)).unwrap_err().code(),
            ErrorCode::TraitNotInteger
        );
        assert_eq!(
            s.parse_trait_value(&json!(50.123)).unwrap_err().code(),
            ErrorCode::TraitPrecisionExceeded
        );
    }

    #[test]
    fn test_normalize_surface_value() {
        assert_eq!(normalize_surface_value(49.5), Ok(50));
        assert_eq!(normalize_surface_value(72.25), Ok(72));
        assert_eq!(normalize_surface_value(100.0), Ok(100));
        assert!(matches!(
            normalize_surface_value(72.255),
            Err(TraitValueError::PrecisionExceeded { .. })
        ));
        assert!(matches!(
            normalize_surface_value(100.5),
            Err(TraitValueError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_missing_big_five_named_exactly() {
        let s = EntitySchema::default();
        let draft = complete_draft()
            .without_trait(PersonalityTrait::Openness)
            .without_trait(PersonalityTrait::Neuroticism);
        let result = s.check_personality(&draft);
        let required: Vec<_> = result
            .errors
            .iter()
            .filter(|e| e.code == ErrorCode::TraitRequired)
            .map(|e| e.field.as_str())
            .collect();
        assert_eq!(required, vec!["personality.openness", "personality.neuroticism"]);
    }

    #[test]
    fn test_behavioral_traits_optional_and_default_neutral() {
        let s = EntitySchema::default();
        let mut draft = PersonalityDraft::new("Muse");
        for t in PersonalityTrait::BIG_FIVE {
            draft = draft.with_trait(t, 80);
        }
        assert!(s.check_personality(&draft).is_valid);
        let traits = s.resolve_traits(&draft.traits).unwrap();
        assert_eq!(traits.openness, 80);
        assert_eq!(traits.humor, 50);
    }

    #[test]
    fn test_unknown_trait_keys_ignored_structurally() {
        let s = EntitySchema::default();
        let draft = complete_draft().with_raw_trait("charisma", json!(500));
        assert!(s.check_personality(&draft).is_valid);
    }

    #[test]
    fn test_role_requires_capabilities() {
        let s = EntitySchema::default();
        let result = s.check_role(&RoleDraft::new("Empty"));
        assert!(result.has_code(ErrorCode::RoleCapabilitiesRequired));
        let ok = s.check_role(&RoleDraft::new("Writer").with_capabilities(["write"]));
        assert!(ok.is_valid);
    }

    #[test]
    fn test_agent_settings_ranges() {
        let s = EntitySchema::default();
        let mut draft = AgentDraft::new("Scribe", "claude-sonnet").with_temperature(2.5);
        draft.settings.max_tokens = 0;
        draft.settings.presence_penalty = Some(-3.0);
        let result = s.check_agent(&draft);
        assert_eq!(result.count_code(ErrorCode::ParameterOutOfRange), 3);
        assert!(result.errors_for("agent.settings.temperature").next().is_some());
    }

    #[test]
    fn test_name_checks() {
        let s = EntitySchema::default();
        let blank = s.check_agent(&AgentDraft::new("  ", "m"));
        assert!(blank.has_code(ErrorCode::NameRequired));
        let long = s.check_agent(&AgentDraft::new("x".repeat(101), "m"));
        assert!(long.has_code(ErrorCode::NameTooLong));
    }
}
