//! Domain-owned validation shared by the in-memory services.
//!
//! These are the checks each domain service contributes on top of the
//! structural schema: vocabulary and format rules that belong to the domain.

use concord_core::{
    AgentDraft, ErrorCode, PersonalityDraft, PersonalityTrait, RoleDraft, ServiceName,
    ValidationError, ValidationResult,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::str::FromStr;

static CAPABILITY_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_.:-]{0,63}$").ok());

static TAG_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,31}$").ok());

pub fn is_valid_capability(cap: &str) -> bool {
    CAPABILITY_RE.as_ref().is_some_and(|re| re.is_match(cap))
}

pub fn is_valid_tag(tag: &str) -> bool {
    TAG_RE.as_ref().is_some_and(|re| re.is_match(tag))
}

fn check_capabilities(result: &mut ValidationResult, field: &str, caps: &[String]) {
    for cap in caps {
        if !is_valid_capability(cap) {
            result.push(ValidationError::new(
                field,
                ErrorCode::CapabilityInvalidFormat,
                format!(
                    "Capability '{}' must be lowercase and start with a letter",
                    cap
                ),
            ));
        }
    }
}

/// Trait keys must belong to the personality vocabulary.
pub fn validate_personality(draft: &PersonalityDraft) -> ValidationResult {
    let mut result = ValidationResult::valid();
    for key in draft.traits.keys() {
        if PersonalityTrait::from_str(key).is_err() {
            result.push(ValidationError::new(
                format!("personality.{}", key),
                ErrorCode::TraitUnknown,
                format!("'{}' is not a personality trait", key),
            ));
        }
    }
    result.attributed_to(ServiceName::PersonalityService)
}

pub fn validate_role(draft: &RoleDraft) -> ValidationResult {
    let mut result = ValidationResult::valid();
    check_capabilities(&mut result, "role.capabilities", &draft.capabilities);
    result.attributed_to(ServiceName::RoleService)
}

pub fn validate_agent(draft: &AgentDraft) -> ValidationResult {
    let mut result = ValidationResult::valid();
    check_capabilities(&mut result, "agent.capabilities", &draft.capabilities);
    let mut seen = HashSet::new();
    for tag in &draft.tags {
        if !is_valid_tag(tag) {
            result.push(ValidationError::new(
                "agent.tags",
                ErrorCode::TagInvalid,
                format!("Tag '{}' must be lowercase alphanumeric with dashes", tag),
            ));
        } else if !seen.insert(tag.as_str()) {
            result.push(ValidationError::new(
                "agent.tags",
                ErrorCode::TagInvalid,
                format!("Tag '{}' is listed more than once", tag),
            ));
        }
    }
    result.attributed_to(ServiceName::AgentService)
}
