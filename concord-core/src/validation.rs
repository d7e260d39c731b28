//! Validation error model.
//!
//! Validation, business-rule and compatibility problems are returned as
//! data. Infrastructure failures use [`crate::ServiceError`] instead.

use crate::entities::{EntityKind, ServiceName};
use crate::CorrelationId;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODES
// ============================================================================

/// Machine-readable validation error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Structural
    TraitOutOfRange,
    TraitNotInteger,
    TraitPrecisionExceeded,
    TraitInvalidType,
    TraitRequired,
    TraitUnknown,
    NameRequired,
    NameTooLong,
    DescriptionTooLong,
    CustomInstructionsTooLong,
    ModelIdRequired,
    ParameterOutOfRange,
    RoleCapabilitiesRequired,
    CapabilityInvalidFormat,
    TagInvalid,

    // Business
    TraitCombinationImplausible,
    NameReserved,
    TooManyTags,

    // Security
    PermissionDenied,
    InstructionsUnsafe,

    // Uniqueness
    NameNotUnique,
    IdNotUnique,
    ConfigurationAlreadyExists,

    // Dependency
    EntityNotFound,
    ReferenceNotFound,
    ReferenceMismatch,
    ModelNotFound,
    ModelUnavailable,

    // Compatibility
    PersonalityRoleIncompatible,
    ModelParameterOutOfRange,
    ModelConfigIncompatible,
    PersonalityModelIncompatible,
    CapabilityRoleMismatch,

    // Correlation
    UpstreamValidationFailed,
}

/// Coarse grouping of error codes, used for routing and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Structural,
    Business,
    Security,
    Uniqueness,
    Dependency,
    Compatibility,
    Correlation,
}

impl ErrorCode {
    pub fn class(&self) -> ErrorClass {
        use ErrorCode::*;
        match self {
            TraitOutOfRange
            | TraitNotInteger
            | TraitPrecisionExceeded
            | TraitInvalidType
            | TraitRequired
            | TraitUnknown
            | NameRequired
            | NameTooLong
            | DescriptionTooLong
            | CustomInstructionsTooLong
            | ModelIdRequired
            | ParameterOutOfRange
            | RoleCapabilitiesRequired
            | CapabilityInvalidFormat
            | TagInvalid => ErrorClass::Structural,
            TraitCombinationImplausible | NameReserved | TooManyTags => ErrorClass::Business,
            PermissionDenied | InstructionsUnsafe => ErrorClass::Security,
            NameNotUnique | IdNotUnique | ConfigurationAlreadyExists => ErrorClass::Uniqueness,
            EntityNotFound | ReferenceNotFound | ReferenceMismatch | ModelNotFound
            | ModelUnavailable => ErrorClass::Dependency,
            PersonalityRoleIncompatible
            | ModelParameterOutOfRange
            | ModelConfigIncompatible
            | PersonalityModelIncompatible
            | CapabilityRoleMismatch => ErrorClass::Compatibility,
            UpstreamValidationFailed => ErrorClass::Correlation,
        }
    }

    /// Wire form of the code, e.g. `TRAIT_OUT_OF_RANGE`.
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            TraitOutOfRange => "TRAIT_OUT_OF_RANGE",
            TraitNotInteger => "TRAIT_NOT_INTEGER",
            TraitPrecisionExceeded => "TRAIT_PRECISION_EXCEEDED",
            TraitInvalidType => "TRAIT_INVALID_TYPE",
            TraitRequired => "TRAIT_REQUIRED",
            TraitUnknown => "TRAIT_UNKNOWN",
            NameRequired => "NAME_REQUIRED",
            NameTooLong => "NAME_TOO_LONG",
            DescriptionTooLong => "DESCRIPTION_TOO_LONG",
            CustomInstructionsTooLong => "CUSTOM_INSTRUCTIONS_TOO_LONG",
            ModelIdRequired => "MODEL_ID_REQUIRED",
            ParameterOutOfRange => "PARAMETER_OUT_OF_RANGE",
            RoleCapabilitiesRequired => "ROLE_CAPABILITIES_REQUIRED",
            CapabilityInvalidFormat => "CAPABILITY_INVALID_FORMAT",
            TagInvalid => "TAG_INVALID",
            TraitCombinationImplausible => "TRAIT_COMBINATION_IMPLAUSIBLE",
            NameReserved => "NAME_RESERVED",
            TooManyTags => "TOO_MANY_TAGS",
            PermissionDenied => "PERMISSION_DENIED",
            InstructionsUnsafe => "INSTRUCTIONS_UNSAFE",
            NameNotUnique => "NAME_NOT_UNIQUE",
            IdNotUnique => "ID_NOT_UNIQUE",
            ConfigurationAlreadyExists => "CONFIGURATION_ALREADY_EXISTS",
            EntityNotFound => "ENTITY_NOT_FOUND",
            ReferenceNotFound => "REFERENCE_NOT_FOUND",
            ReferenceMismatch => "REFERENCE_MISMATCH",
            ModelNotFound => "MODEL_NOT_FOUND",
            ModelUnavailable => "MODEL_UNAVAILABLE",
            PersonalityRoleIncompatible => "PERSONALITY_ROLE_INCOMPATIBLE",
            ModelParameterOutOfRange => "MODEL_PARAMETER_OUT_OF_RANGE",
            ModelConfigIncompatible => "MODEL_CONFIG_INCOMPATIBLE",
            PersonalityModelIncompatible => "PERSONALITY_MODEL_INCOMPATIBLE",
            CapabilityRoleMismatch => "CAPABILITY_ROLE_MISMATCH",
            UpstreamValidationFailed => "UPSTREAM_VALIDATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// One field-level problem. Always resolvable to a field and a readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub originating_service: Option<ServiceName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    /// Set when this error only exists because an upstream domain failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<EntityKind>,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
            originating_service: None,
            correlation_id: None,
            blocked_by: None,
        }
    }

    /// Error emitted for a stage that could not run because `upstream` failed.
    pub fn upstream_blocked(
        field: impl Into<String>,
        upstream: EntityKind,
        correlation_id: CorrelationId,
    ) -> Self {
        Self {
            field: field.into(),
            message: format!(
                "Compatibility check blocked by upstream {} failure, correlation {}",
                upstream, correlation_id
            ),
            code: ErrorCode::UpstreamValidationFailed,
            originating_service: Some(ServiceName::CompatibilityChecker),
            correlation_id: Some(correlation_id),
            blocked_by: Some(upstream),
        }
    }

    pub fn with_service(mut self, service: ServiceName) -> Self {
        self.originating_service = Some(service);
        self
    }

    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.field, self.message, self.code)
    }
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

/// Aggregated outcome of one or more validation calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A passing result with no errors.
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
        }
    }

    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn push(&mut self, error: ValidationError) {
        self.is_valid = false;
        self.errors.push(error);
    }

    /// Concatenate another result's errors onto this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.is_valid = self.errors.is_empty();
    }

    pub fn merged(results: impl IntoIterator<Item = ValidationResult>) -> Self {
        let mut out = Self::valid();
        for r in results {
            out.merge(r);
        }
        out
    }

    /// Stamp every error with `id`.
    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        for e in &mut self.errors {
            e.correlation_id = Some(id);
        }
        self
    }

    /// Attribute unattributed errors to `service`.
    pub fn attributed_to(mut self, service: ServiceName) -> Self {
        for e in &mut self.errors {
            if e.originating_service.is_none() {
                e.originating_service = Some(service);
            }
        }
        self
    }

    pub fn has_code(&self, code: ErrorCode) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    pub fn count_code(&self, code: ErrorCode) -> usize {
        self.errors.iter().filter(|e| e.code == code).count()
    }

    pub fn errors_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a ValidationError> {
        self.errors.iter().filter(move |e| e.field == field)
    }

    pub fn has_class(&self, class: ErrorClass) -> bool {
        self.errors.iter().any(|e| e.class() == class)
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::valid()
    }
}

impl From<Vec<ValidationError>> for ValidationResult {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::from_errors(errors)
    }
}

// ============================================================================
// TESTS
// ============================================================================
