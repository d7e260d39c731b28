//! Personality trait vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lower bound of every trait value (inclusive).
pub const TRAIT_MIN: u8 = 0;

/// Upper bound of every trait value (inclusive).
pub const TRAIT_MAX: u8 = 100;

/// Value used for behavioral traits omitted from a draft.
pub const NEUTRAL_TRAIT_VALUE: u8 = 50;

/// One of the 19 personality dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PersonalityTrait {
    // Big Five
    Openness,
    Conscientiousness,
    Extraversion,
    Agreeableness,
    Neuroticism,
    // Behavioral
    Formality,
    Humor,
    Assertiveness,
    Empathy,
    Storytelling,
    Brevity,
    Imagination,
    Playfulness,
    Dramaticism,
    AnalyticalDepth,
    Contrarianism,
    Encouragement,
    Curiosity,
    Patience,
}

impl PersonalityTrait {
    pub const BIG_FIVE: [PersonalityTrait; 5] = [
        PersonalityTrait::Openness,
        PersonalityTrait::Conscientiousness,
        PersonalityTrait::Extraversion,
        PersonalityTrait::Agreeableness,
        PersonalityTrait::Neuroticism,
    ];

    pub const BEHAVIORAL: [PersonalityTrait; 14] = [
        PersonalityTrait::Formality,
        PersonalityTrait::Humor,
        PersonalityTrait::Assertiveness,
        PersonalityTrait::Empathy,
        PersonalityTrait::Storytelling,
        PersonalityTrait::Brevity,
        PersonalityTrait::Imagination,
        PersonalityTrait::Playfulness,
        PersonalityTrait::Dramaticism,
        PersonalityTrait::AnalyticalDepth,
        PersonalityTrait::Contrarianism,
        PersonalityTrait::Encouragement,
        PersonalityTrait::Curiosity,
        PersonalityTrait::Patience,
    ];

    /// All traits, Big Five first.
    pub fn all() -> impl Iterator<Item = PersonalityTrait> {
        Self::BIG_FIVE.into_iter().chain(Self::BEHAVIORAL)
    }

    pub fn is_big_five(&self) -> bool {
        Self::BIG_FIVE.contains(self)
    }

    /// Wire name of the trait (camelCase).
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonalityTrait::Openness => "openness",
            PersonalityTrait::Conscientiousness => "conscientiousness",
            PersonalityTrait::Extraversion => "extraversion",
            PersonalityTrait::Agreeableness => "agreeableness",
            PersonalityTrait::Neuroticism => "neuroticism",
            PersonalityTrait::Formality => "formality",
            PersonalityTrait::Humor => "humor",
            PersonalityTrait::Assertiveness => "assertiveness",
            PersonalityTrait::Empathy => "empathy",
            PersonalityTrait::Storytelling => "storytelling",
            PersonalityTrait::Brevity => "brevity",
            PersonalityTrait::Imagination => "imagination",
            PersonalityTrait::Playfulness => "playfulness",
            PersonalityTrait::Dramaticism => "dramaticism",
            PersonalityTrait::AnalyticalDepth => "analyticalDepth",
            PersonalityTrait::Contrarianism => "contrarianism",
            PersonalityTrait::Encouragement => "encouragement",
            PersonalityTrait::Curiosity => "curiosity",
            PersonalityTrait::Patience => "patience",
        }
    }
}

impl fmt::Display for PersonalityTrait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonalityTrait {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PersonalityTrait::all()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown personality trait '{}'", s))
    }
}

/// Canonical stored trait values. Every value is an integer in [0, 100].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalityTraits {
    pub openness: u8,
    pub conscientiousness: u8,
    pub extraversion: u8,
    pub agreeableness: u8,
    pub neuroticism: u8,
    pub formality: u8,
    pub humor: u8,
    pub assertiveness: u8,
    pub empathy: u8,
    pub storytelling: u8,
    pub brevity: u8,
    pub imagination: u8,
    pub playfulness: u8,
    pub dramaticism: u8,
    pub analytical_depth: u8,
    pub contrarianism: u8,
    pub encouragement: u8,
    pub curiosity: u8,
    pub patience: u8,
}

impl PersonalityTraits {
    /// Every trait at the neutral midpoint.
    pub fn neutral() -> Self {
        let n = NEUTRAL_TRAIT_VALUE;
        Self {
            openness: n,
            conscientiousness: n,
            extraversion: n,
            agreeableness: n,
            neuroticism: n,
            formality: n,
            humor: n,
            assertiveness: n,
            empathy: n,
            storytelling: n,
            brevity: n,
            imagination: n,
            playfulness: n,
            dramaticism: n,
            analytical_depth: n,
            contrarianism: n,
            encouragement: n,
            curiosity: n,
            patience: n,
        }
    }

    pub fn get(&self, t: PersonalityTrait) -> u8 {
        match t {
            PersonalityTrait::Openness => self.openness,
            PersonalityTrait::Conscientiousness => self.conscientiousness,
            PersonalityTrait::Extraversion => self.extraversion,
            PersonalityTrait::Agreeableness => self.agreeableness,
            PersonalityTrait::Neuroticism => self.neuroticism,
            PersonalityTrait::Formality => self.formality,
            PersonalityTrait::Humor => self.humor,
            PersonalityTrait::Assertiveness => self.assertiveness,
            PersonalityTrait::Empathy => self.empathy,
            PersonalityTrait::Storytelling => self.storytelling,
            PersonalityTrait::Brevity => self.brevity,
            PersonalityTrait::Imagination => self.imagination,
            PersonalityTrait::Playfulness => self.playfulness,
            PersonalityTrait::Dramaticism => self.dramaticism,
            PersonalityTrait::AnalyticalDepth => self.analytical_depth,
            PersonalityTrait::Contrarianism => self.contrarianism,
            PersonalityTrait::Encouragement => self.encouragement,
            PersonalityTrait::Curiosity => self.curiosity,
            PersonalityTrait::Patience => self.patience,
        }
    }

    /// Set a trait value. Callers are expected to have range-checked `value`.
    pub fn set(&mut self, t: PersonalityTrait, value: u8) {
        let slot = match t {
            PersonalityTrait::Openness => &mut self.openness,
            PersonalityTrait::Conscientiousness => &mut self.conscientiousness,
            PersonalityTrait::Extraversion => &mut self.extraversion,
            PersonalityTrait::Agreeableness => &mut self.agreeableness,
            PersonalityTrait::Neuroticism => &mut self.neuroticism,
            PersonalityTrait::Formality => &mut self.formality,
            PersonalityTrait::Humor => &mut self.humor,
            PersonalityTrait::Assertiveness => &mut self.assertiveness,
            PersonalityTrait::Empathy => &mut self.empathy,
            PersonalityTrait::Storytelling => &mut self.storytelling,
            PersonalityTrait::Brevity => &mut self.brevity,
            PersonalityTrait::Imagination => &mut self.imagination,
            PersonalityTrait::Playfulness => &mut self.playfulness,
            PersonalityTrait::Dramaticism => &mut self.dramaticism,
            PersonalityTrait::AnalyticalDepth => &mut self.analytical_depth,
            PersonalityTrait::Contrarianism => &mut self.contrarianism,
            PersonalityTrait::Encouragement => &mut self.encouragement,
            PersonalityTrait::Curiosity => &mut self.curiosity,
            PersonalityTrait::Patience => &mut self.patience,
        };
        *slot = value;
    }

    /// Builder-style setter.
    pub fn with(mut self, t: PersonalityTrait, value: u8) -> Self {
        self.set(t, value);
        self
    }

    /// Iterate over (trait, value) pairs, Big Five first.
    pub fn iter(&self) -> impl Iterator<Item = (PersonalityTrait, u8)> + '_ {
        PersonalityTrait::all().map(move |t| (t, self.get(t)))
    }
}

impl Default for PersonalityTraits {
    fn default() -> Self {
        Self::neutral()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trait_counts() {
        assert_eq!(PersonalityTrait::all().count(), 19);
        assert_eq!(
            PersonalityTrait::all().filter(|t| t.is_big_five()).count(),
            5
        );
    }

    #[test]
    fn test_trait_names_round_trip_through_from_str() {
        for t in PersonalityTrait::all() {
            assert_eq!(t.as_str().parse::<PersonalityTrait>(), Ok(t));
        }
        assert!("charisma".parse::<PersonalityTrait>().is_err());
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        let json = serde_json::to_string(&PersonalityTrait::AnalyticalDepth).unwrap();
        assert_eq!(json, "\"analyticalDepth\"");
    }

    #[test]
    fn test_get_set() {
        let mut traits = PersonalityTraits::neutral();
        traits.set(PersonalityTrait::Patience, 91);
        assert_eq!(traits.get(PersonalityTrait::Patience), 91);
        assert_eq!(traits.get(PersonalityTrait::Openness), NEUTRAL_TRAIT_VALUE);
        assert_eq!(traits.iter().count(), 19);
    }
}
