//! Business rules: policy that is not expressible as a simple range.

use crate::EntityPayload;
use concord_core::{
    EntitySchema, ErrorCode, PersonalityDraft, PersonalityTrait, ValidationError,
    ValidationResult, NEUTRAL_TRAIT_VALUE,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraitBound {
    AtLeast,
    AtMost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitCondition {
    #[serde(rename = "trait")]
    pub personality_trait: PersonalityTrait,
    pub bound: TraitBound,
    pub value: u8,
}

impl TraitCondition {
    pub fn at_least(t: PersonalityTrait, value: u8) -> Self {
        Self {
            personality_trait: t,
            bound: TraitBound::AtLeast,
            value,
        }
    }

    pub fn at_most(t: PersonalityTrait, value: u8) -> Self {
        Self {
            personality_trait: t,
            bound: TraitBound::AtMost,
            value,
        }
    }

    fn holds(&self, v: u8) -> bool {
        match self.bound {
            TraitBound::AtLeast => v >= self.value,
            TraitBound::AtMost => v <= self.value,
        }
    }
}

/// Combination that is implausible when every condition holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitCombinationRule {
    pub id: String,
    pub conditions: Vec<TraitCondition>,
    pub message: String,
}

/// Business rule table. Plain data; read-only at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessRules {
    pub trait_combinations: Vec<TraitCombinationRule>,
    pub reserved_names: Vec<String>,
    pub max_tags: usize,
}

impl Default for BusinessRules {
    fn default() -> Self {
        use PersonalityTrait::*;
        Self {
            trait_combinations: vec![
                TraitCombinationRule {
                    id: "brief-storyteller".into(),
                    conditions: vec![
                        TraitCondition::at_least(Brevity, 90),
                        TraitCondition::at_least(Storytelling, 90),
                    ],
                    message: "Extreme brevity and extreme storytelling cannot both hold".into(),
                },
                TraitCombinationRule {
                    id: "hostile-cheerleader".into(),
                    conditions: vec![
                        TraitCondition::at_most(Agreeableness, 10),
                        TraitCondition::at_least(Encouragement, 90),
                    ],
                    message: "Very low agreeableness conflicts with very high encouragement"
                        .into(),
                },
                TraitCombinationRule {
                    id: "agreeable-contrarian".into(),
                    conditions: vec![
                        TraitCondition::at_least(Contrarianism, 90),
                        TraitCondition::at_least(Agreeableness, 90),
                    ],
                    message: "Very high contrarianism conflicts with very high agreeableness"
                        .into(),
                },
            ],
            reserved_names: vec![
                "system".into(),
                "admin".into(),
                "root".into(),
                "concord".into(),
            ],
            max_tags: 20,
        }
    }
}

impl BusinessRules {
    pub fn check(&self, entity: EntityPayload<'_>) -> ValidationResult {
        let mut result = ValidationResult::valid();
        let kind = entity.kind();
        let name = match entity {
            EntityPayload::Personality(p) => &p.name,
            EntityPayload::Role(r) => &r.name,
            EntityPayload::Agent(a) => &a.name,
        };
        if self.is_reserved(name) {
            result.push(ValidationError::new(
                format!("{}.name", kind),
                ErrorCode::NameReserved,
                format!("'{}' is a reserved name", name.trim()),
            ));
        }

        match entity {
            EntityPayload::Personality(p) => self.check_combinations(&mut result, p),
            EntityPayload::Agent(a) if a.tags.len() > self.max_tags => {
                result.push(ValidationError::new(
                    "agent.tags",
                    ErrorCode::TooManyTags,
                    format!("At most {} tags are allowed (got {})", self.max_tags, a.tags.len()),
                ));
            }
            _ => {}
        }
        result.attributed_to(kind.owner())
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        let name = name.trim();
        self.reserved_names
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name))
    }

    /// Combinations are judged on whatever traits parse; malformed values are
    /// the schema's to report.
    fn check_combinations(&self, result: &mut ValidationResult, draft: &PersonalityDraft) {
        let schema = EntitySchema::default();
        let value_of = |t: PersonalityTrait| -> Option<u8> {
            match draft.traits.get(t.as_str()) {
                Some(raw) => schema.parse_trait_value(raw).ok(),
                None if t.is_big_five() => None,
                None => Some(NEUTRAL_TRAIT_VALUE),
            }
        };
        for rule in &self.trait_combinations {
            let all_hold = rule.conditions.iter().all(|c| {
                value_of(c.personality_trait).is_some_and(|v| c.holds(v))
            });
            if all_hold && !rule.conditions.is_empty() {
                let traits: Vec<&str> = rule
                    .conditions
                    .iter()
                    .map(|c| c.personality_trait.as_str())
                    .collect();
                result.push(ValidationError::new(
                    "personality.traits",
                    ErrorCode::TraitCombinationImplausible,
                    format!("{} ({})", rule.message, traits.join(", ")),
                ));
            }
        }
    }
}
