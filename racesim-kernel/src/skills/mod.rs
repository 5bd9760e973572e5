//! Skill definitions, the compiled catalog and the per-runner effect engine.
pub mod conditions;
pub mod engine;
pub mod parser;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::runner::{RunnerConfig, RunnerConfigError};

pub use conditions::{ArmedCondition, Condition, ConditionSource, ConditionVar};
pub use engine::{
    ActivationContext, ActivationCounters, EffectCommand, EffectModifiers, OutboundEffect,
    SkillActivation, SkillBook, SkillStreams, StatKind, TickEffects,
};
pub use parser::{ConditionParseError, parse_condition};

const DEFAULT_SKILL_DATA: &str = include_str!("../../data/skills.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    White,
    Gold,
    Unique,
    Evolution,
}

impl Rarity {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::White => 1,
            Self::Gold => 2,
            Self::Unique => 3,
            Self::Evolution => 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectType {
    Noop,
    SpeedUp,
    StaminaUp,
    PowerUp,
    GutsUp,
    WisdomUp,
    Recovery,
    MultiplyStartDelay,
    SetStartDelay,
    CurrentSpeed,
    CurrentSpeedWithNaturalDeceleration,
    TargetSpeed,
    LaneMovementSpeed,
    Accel,
    ChangeLane,
    ActivateRandomGold,
    ExtendEvolvedDuration,
}

impl EffectType {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Noop => 0,
            Self::SpeedUp => 1,
            Self::StaminaUp => 2,
            Self::PowerUp => 3,
            Self::GutsUp => 4,
            Self::WisdomUp => 5,
            Self::Recovery => 9,
            Self::MultiplyStartDelay => 10,
            Self::SetStartDelay => 14,
            Self::CurrentSpeed => 21,
            Self::CurrentSpeedWithNaturalDeceleration => 22,
            Self::TargetSpeed => 27,
            Self::LaneMovementSpeed => 28,
            Self::Accel => 31,
            Self::ChangeLane => 35,
            Self::ActivateRandomGold => 37,
            Self::ExtendEvolvedDuration => 42,
        }
    }

    /// Passive stat bonus.
    #[must_use]
    pub const fn is_stat_up(self) -> bool {
        matches!(
            self,
            Self::SpeedUp | Self::StaminaUp | Self::PowerUp | Self::GutsUp | Self::WisdomUp
        )
    }

    /// Applied once on activation rather than held for a duration.
    #[must_use]
    pub const fn is_instant(self) -> bool {
        matches!(
            self,
            Self::Recovery
                | Self::MultiplyStartDelay
                | Self::SetStartDelay
                | Self::CurrentSpeedWithNaturalDeceleration
                | Self::ActivateRandomGold
                | Self::ExtendEvolvedDuration
                | Self::Noop
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectTarget {
    #[default]
    #[serde(rename = "self")]
    Own,
    All,
    InFov,
    AheadOfPosition,
    AheadOfSelf,
    BehindSelf,
    AllAllies,
    EnemyStrategy,
    KakariAhead,
    KakariBehind,
    KakariStrategy,
    UmaId,
    UsedRecovery,
}

impl EffectTarget {
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Own => 1,
            Self::All => 2,
            Self::InFov => 4,
            Self::AheadOfPosition => 7,
            Self::AheadOfSelf => 9,
            Self::BehindSelf => 10,
            Self::AllAllies => 11,
            Self::EnemyStrategy => 18,
            Self::KakariAhead => 19,
            Self::KakariBehind => 20,
            Self::KakariStrategy => 21,
            Self::UmaId => 22,
            Self::UsedRecovery => 23,
        }
    }
}

/// Whose point of view an activation record is written from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Perspective {
    #[serde(rename = "self")]
    Own,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    #[serde(default)]
    pub modifier: f64,
    #[serde(default)]
    pub target: EffectTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeDefinition {
    #[serde(default)]
    pub precondition: String,
    #[serde(default)]
    pub condition: String,
    /// Seconds at 1000 m; non-positive means instant or permanent.
    #[serde(default)]
    pub base_duration: f64,
    pub effects: Vec<EffectDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub rarity: Rarity,
    #[serde(default = "SkillDefinition::default_max_activations")]
    pub max_activations: u32,
    pub alternatives: Vec<AlternativeDefinition>,
}

impl SkillDefinition {
    const fn default_max_activations() -> u32 {
        1
    }
}

/// Alternative with both expressions compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledAlternative {
    pub precondition: Condition,
    pub condition: Condition,
    pub base_duration: f64,
    pub effects: SmallVec<[EffectDefinition; 4]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSkill {
    pub id: String,
    pub name: String,
    pub rarity: Rarity,
    pub max_activations: u32,
    pub alternatives: Vec<CompiledAlternative>,
}

impl CompiledSkill {
    /// Skills whose every effect is a stat bonus skip the wit check.
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.alternatives
            .iter()
            .flat_map(|alt| alt.effects.iter())
            .all(|effect| effect.effect_type.is_stat_up())
    }

    /// Gold-tier skill eligible for random activation.
    #[must_use]
    pub fn is_random_gold_candidate(&self) -> bool {
        matches!(self.rarity, Rarity::Gold | Rarity::Evolution)
            && self
                .alternatives
                .iter()
                .flat_map(|alt| alt.effects.iter())
                .all(|effect| effect.effect_type.code() > EffectType::WisdomUp.code())
    }

    /// Numeric form of the id used by `is_used_skill_id`.
    #[must_use]
    pub fn numeric_id(&self) -> Option<i64> {
        self.id.split('-').next()?.parse().ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    skills: Vec<SkillDefinition>,
}

/// Every skill compiled once and shared read-only across trials.
#[derive(Debug, Clone, Default)]
pub struct SkillCatalog {
    skills: BTreeMap<String, Arc<CompiledSkill>>,
}

impl SkillCatalog {
    /// Embedded default catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the bundled data fails to parse or compile.
    pub fn load_from_static() -> Result<Self, CatalogError> {
        Self::from_json(DEFAULT_SKILL_DATA)
    }

    /// Parse and compile a catalog from JSON (`{"skills": [...]}`).
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for malformed JSON, duplicate ids or a
    /// condition that fails to compile.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|err| CatalogError::Json(err.to_string()))?;
        Self::from_definitions(file.skills)
    }

    /// Compile definitions.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` naming the skill and alternative that failed.
    pub fn from_definitions(
        definitions: impl IntoIterator<Item = SkillDefinition>,
    ) -> Result<Self, CatalogError> {
        let mut skills = BTreeMap::new();
        for definition in definitions {
            let compiled = compile_skill(definition)?;
            if skills.contains_key(&compiled.id) {
                return Err(CatalogError::Duplicate {
                    skill_id: compiled.id,
                });
            }
            skills.insert(compiled.id.clone(), Arc::new(compiled));
        }
        log::debug!("compiled {} skills", skills.len());
        Ok(Self { skills })
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<CompiledSkill>> {
        self.skills.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.skills.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.skills.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.skills.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Check that every skill a runner lists exists.
    ///
    /// # Errors
    ///
    /// Returns `RunnerConfigError::UnknownSkill` for the first missing id.
    pub fn check_runner(&self, runner: &RunnerConfig) -> Result<(), RunnerConfigError> {
        match runner.skills.iter().find(|id| !self.contains(id)) {
            Some(missing) => Err(RunnerConfigError::UnknownSkill {
                skill_id: missing.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Resolve a runner's skill list, skipping unknown ids.
    #[must_use]
    pub fn resolve(&self, runner: &RunnerConfig) -> Vec<Arc<CompiledSkill>> {
        runner
            .skills
            .iter()
            .filter_map(|id| self.get(id).cloned())
            .collect()
    }
}

fn compile_skill(definition: SkillDefinition) -> Result<CompiledSkill, CatalogError> {
    if definition.alternatives.is_empty() {
        return Err(CatalogError::NoAlternatives {
            skill_id: definition.id,
        });
    }
    let mut alternatives = Vec::with_capacity(definition.alternatives.len());
    for (index, alt) in definition.alternatives.into_iter().enumerate() {
        let compile = |field: &'static str, text: &str| {
            parse_condition(text).map_err(|source| CatalogError::Condition {
                skill_id: definition.id.clone(),
                alternative: index,
                field,
                source,
            })
        };
        alternatives.push(CompiledAlternative {
            precondition: compile("precondition", &alt.precondition)?,
            condition: compile("condition", &alt.condition)?,
            base_duration: alt.base_duration,
            effects: alt.effects.into_iter().collect(),
        });
    }
    Ok(CompiledSkill {
        id: definition.id,
        name: definition.name,
        rarity: definition.rarity,
        max_activations: definition.max_activations.max(1),
        alternatives,
    })
}

/// Errors raised while loading the skill catalog.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("catalog JSON is malformed: {0}")]
    Json(String),
    #[error("skill `{skill_id}` is defined twice")]
    Duplicate { skill_id: String },
    #[error("skill `{skill_id}` has no alternatives")]
    NoAlternatives { skill_id: String },
    #[error("skill `{skill_id}` alternative {alternative} {field}: {source}")]
    Condition {
        skill_id: String,
        alternative: usize,
        field: &'static str,
        #[source]
        source: ConditionParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_compiles() {
        let catalog = SkillCatalog::load_from_static().expect("embedded catalog compiles");
        assert!(!catalog.is_empty());
        assert!(catalog.contains("200331"));
    }

    #[test]
    fn bad_condition_names_skill_and_alternative() {
        let json = r#"{"skills":[{"id":"9","rarity":"white","alternatives":[
            {"condition":"phase==1","effects":[{"type":"target_speed","modifier":0.15}]},
            {"condition":"phase=>1","effects":[{"type":"target_speed","modifier":0.15}]}
        ]}]}"#;
        let err = SkillCatalog::from_json(json).expect_err("second alternative is malformed");
        match err {
            CatalogError::Condition {
                skill_id,
                alternative,
                field,
                ..
            } => {
                assert_eq!(skill_id, "9");
                assert_eq!(alternative, 1);
                assert_eq!(field, "condition");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn duplicates_and_empty_skills_are_rejected() {
        let skill = SkillDefinition {
            id: "1".into(),
            name: String::new(),
            rarity: Rarity::White,
            max_activations: 1,
            alternatives: vec![],
        };
        assert!(matches!(
            SkillCatalog::from_definitions([skill]),
            Err(CatalogError::NoAlternatives { .. })
        ));

        let alt = AlternativeDefinition {
            precondition: String::new(),
            condition: String::new(),
            base_duration: 0.0,
            effects: vec![],
        };
        let skill = SkillDefinition {
            id: "1".into(),
            name: String::new(),
            rarity: Rarity::White,
            max_activations: 1,
            alternatives: vec![alt],
        };
        assert!(matches!(
            SkillCatalog::from_definitions([skill.clone(), skill]),
            Err(CatalogError::Duplicate { .. })
        ));
    }

    #[test]
    fn green_and_gold_classification() {
        let catalog = SkillCatalog::load_from_static().expect("catalog");
        let green = catalog.get("200012").expect("green skill present");
        assert!(green.is_green());
        let gold = catalog.get("200331").expect("gold skill present");
        assert!(!gold.is_green());
        assert!(gold.is_random_gold_candidate());
        assert_eq!(gold.numeric_id(), Some(200_331));
    }

    #[test]
    fn unknown_runner_skill_is_reported() {
        let catalog = SkillCatalog::load_from_static().expect("catalog");
        let runner: RunnerConfig = serde_json::from_str(
            r#"{"strategy":"pace_chaser","stats":{"speed":1000,"stamina":800,"power":800,"guts":400,"wit":400},"skills":["missing"]}"#,
        )
        .expect("runner parses");
        assert_eq!(
            catalog.check_runner(&runner),
            Err(RunnerConfigError::UnknownSkill {
                skill_id: "missing".into()
            })
        );
    }
}
