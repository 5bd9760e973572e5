//! Per-runner skill state: pending triggers, active effects and records.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::conditions::{ArmedCondition, ConditionSource};
use super::{CompiledSkill, EffectDefinition, EffectTarget, EffectType, Perspective, Rarity};
use crate::course::CourseData;
use crate::numbers::{CompensatedAccumulator, Timer};
use crate::rng::{Prng, Stream};

/// One effect taking force, as recorded for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillActivation {
    pub execution_id: u64,
    pub skill_id: String,
    pub runner: usize,
    pub perspective: Perspective,
    pub effect_type: EffectType,
    pub effect_target: EffectTarget,
    pub tick: u32,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatKind {
    Speed,
    Stamina,
    Power,
    Guts,
    Wit,
}

impl StatKind {
    const fn from_effect(effect_type: EffectType) -> Option<Self> {
        match effect_type {
            EffectType::SpeedUp => Some(Self::Speed),
            EffectType::StaminaUp => Some(Self::Stamina),
            EffectType::PowerUp => Some(Self::Power),
            EffectType::GutsUp => Some(Self::Guts),
            EffectType::WisdomUp => Some(Self::Wit),
            _ => None,
        }
    }
}

/// Side effects the runner applies to state the skill book does not own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectCommand {
    StatUp { stat: StatKind, amount: f64 },
    Recover(f64),
    MultiplyStartDelay(f64),
    SetStartDelay(f64),
}

/// Effect aimed at other runners, delivered by the race loop.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEffect {
    pub execution_id: u64,
    pub skill_id: String,
    pub source: usize,
    pub source_position: f64,
    pub effect: EffectDefinition,
    pub duration: f64,
}

#[derive(Debug, Clone, Default)]
pub struct TickEffects {
    pub commands: SmallVec<[EffectCommand; 4]>,
    pub outbound: Vec<OutboundEffect>,
}

/// Sums of every held effect, by kind.
#[derive(Debug, Clone, Default)]
pub struct EffectModifiers {
    pub target_speed: CompensatedAccumulator,
    pub current_speed: CompensatedAccumulator,
    pub accel: CompensatedAccumulator,
    pub lane_movement: CompensatedAccumulator,
    pub one_frame_accel: f64,
    change_lane: u32,
    lane_movement_skills: u32,
    speed_skills: u32,
}

impl EffectModifiers {
    #[must_use]
    pub const fn change_lane_active(&self) -> bool {
        self.change_lane > 0
    }

    #[must_use]
    pub const fn lane_movement_active(&self) -> bool {
        self.lane_movement_skills > 0
    }

    #[must_use]
    pub const fn speed_skills_active(&self) -> bool {
        self.speed_skills > 0
    }

    fn hold(&mut self, effect: &EffectDefinition, sign: f64, out: &mut SmallVec<[EffectCommand; 4]>) {
        let m = effect.modifier * sign;
        let count = |counter: &mut u32| {
            if sign > 0.0 {
                *counter += 1;
            } else {
                *counter = counter.saturating_sub(1);
            }
        };
        match effect.effect_type {
            EffectType::TargetSpeed => {
                self.target_speed.add(m);
                if effect.modifier > 0.0 {
                    count(&mut self.speed_skills);
                }
            }
            EffectType::CurrentSpeed => {
                self.current_speed.add(m);
                if effect.modifier > 0.0 {
                    count(&mut self.speed_skills);
                }
            }
            EffectType::Accel => self.accel.add(m),
            EffectType::LaneMovementSpeed => {
                self.lane_movement.add(m);
                count(&mut self.lane_movement_skills);
            }
            EffectType::ChangeLane => count(&mut self.change_lane),
            other => {
                if let Some(stat) = StatKind::from_effect(other) {
                    out.push(EffectCommand::StatUp { stat, amount: m });
                }
            }
        }
    }
}

/// Activation tallies read by the `activate_count_*` conditions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationCounters {
    pub all: u32,
    pub start: u32,
    pub middle: u32,
    pub end_after: u32,
    pub heal: u32,
}

impl ActivationCounters {
    fn record(&mut self, phase: usize) {
        self.all += 1;
        match phase {
            0 => self.start += 1,
            1 => self.middle += 1,
            _ => self.end_after += 1,
        }
    }
}

/// Per-tick inputs to skill activation.
#[derive(Debug, Clone, Copy)]
pub struct ActivationContext {
    pub tick: u32,
    pub position: f64,
    pub phase: usize,
    pub distance: f64,
    pub wit_checks: bool,
    pub base_wit: f64,
}

/// Streams consumed by activation.
pub struct SkillStreams<'a> {
    pub wit: &'a mut Stream,
    pub gold: &'a mut Stream,
}

#[derive(Debug, Clone)]
struct Alternative {
    precondition: ArmedCondition,
    condition: ArmedCondition,
    latched: bool,
    was_true: bool,
    dropped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    Active,
    Exhausted,
}

#[derive(Debug, Clone)]
struct Slot {
    skill: Arc<CompiledSkill>,
    alternatives: SmallVec<[Alternative; 2]>,
    state: SlotState,
    activations: u32,
}

#[derive(Debug, Clone)]
struct ActiveEffect {
    slot: Option<usize>,
    record: usize,
    effect: EffectDefinition,
    rarity: Rarity,
    timer: Timer,
    permanent: bool,
}

/// Skills owned by one runner for one trial.
#[derive(Debug, Clone)]
pub struct SkillBook {
    runner: usize,
    slots: Vec<Slot>,
    active: Vec<ActiveEffect>,
    activations: Vec<SkillActivation>,
    used: Vec<i64>,
    counters: ActivationCounters,
    modifiers: EffectModifiers,
    next_execution: u32,
    evolved_scale: f64,
}

impl SkillBook {
    /// Arm every alternative, drawing sampled trigger points from `rng`.
    #[must_use]
    pub fn new(
        runner: usize,
        skills: &[Arc<CompiledSkill>],
        course: &CourseData,
        rng: &mut Stream,
    ) -> Self {
        let slots = skills
            .iter()
            .map(|skill| Slot {
                skill: Arc::clone(skill),
                alternatives: skill
                    .alternatives
                    .iter()
                    .map(|alt| Alternative {
                        precondition: alt.precondition.arm(course, rng),
                        condition: alt.condition.arm(course, rng),
                        latched: false,
                        was_true: false,
                        dropped: false,
                    })
                    .collect(),
                state: SlotState::Pending,
                activations: 0,
            })
            .collect();
        Self {
            runner,
            slots,
            active: Vec::new(),
            activations: Vec::new(),
            used: Vec::new(),
            counters: ActivationCounters::default(),
            modifiers: EffectModifiers::default(),
            next_execution: 0,
            evolved_scale: 1.0,
        }
    }

    /// Drop alternatives whose static terms can never hold in this race.
    pub fn drop_statically_false(&mut self, src: &dyn ConditionSource) {
        for slot in &mut self.slots {
            for alt in &mut slot.alternatives {
                alt.dropped = alt.precondition.evaluate_static(src) == Some(false)
                    || alt.condition.evaluate_static(src) == Some(false);
            }
            if slot.alternatives.iter().all(|alt| alt.dropped) {
                log::debug!("skill {} can never activate here", slot.skill.id);
                slot.state = SlotState::Exhausted;
            }
        }
    }

    #[must_use]
    pub const fn modifiers(&self) -> &EffectModifiers {
        &self.modifiers
    }

    pub fn clear_one_frame_accel(&mut self) {
        self.modifiers.one_frame_accel = 0.0;
    }

    #[must_use]
    pub const fn counters(&self) -> &ActivationCounters {
        &self.counters
    }

    #[must_use]
    pub fn activations(&self) -> &[SkillActivation] {
        &self.activations
    }

    #[must_use]
    pub fn into_activations(self) -> Vec<SkillActivation> {
        self.activations
    }

    #[must_use]
    pub fn used_skill(&self, id: i64) -> bool {
        self.used.contains(&id)
    }

    /// Numeric ids of every skill fired so far, in firing order.
    #[must_use]
    pub fn used_skills(&self) -> &[i64] {
        &self.used
    }

    /// Whether the runner still holds a skill with `id` that has not fired.
    #[must_use]
    pub fn has_pending(&self, id: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.skill.id == id && slot.state == SlotState::Pending)
    }

    /// Advance timers and release effects whose duration ran out.
    pub fn expire(&mut self, dt: f64, position: f64) -> SmallVec<[EffectCommand; 4]> {
        let mut out = SmallVec::new();
        let mut freed_slots: SmallVec<[usize; 4]> = SmallVec::new();
        let mut index = 0;
        while index < self.active.len() {
            let effect = &mut self.active[index];
            if effect.permanent {
                index += 1;
                continue;
            }
            effect.timer.tick(dt);
            if !effect.timer.is_expired() {
                index += 1;
                continue;
            }
            let expired = self.active.swap_remove(index);
            self.modifiers.hold(&expired.effect, -1.0, &mut out);
            self.activations[expired.record].end = position;
            if let Some(slot) = expired.slot {
                freed_slots.push(slot);
            }
        }
        for slot_index in freed_slots {
            if self.active.iter().any(|e| e.slot == Some(slot_index)) {
                continue;
            }
            let slot = &mut self.slots[slot_index];
            if slot.state == SlotState::Active {
                slot.state = if slot.activations < slot.skill.max_activations {
                    SlotState::Pending
                } else {
                    SlotState::Exhausted
                };
            }
        }
        out
    }

    /// Fire every pending skill whose condition rose this tick.
    pub fn evaluate(
        &mut self,
        src: &dyn ConditionSource,
        ctx: &ActivationContext,
        streams: &mut SkillStreams<'_>,
    ) -> TickEffects {
        let mut out = TickEffects::default();
        for slot_index in 0..self.slots.len() {
            let slot = &mut self.slots[slot_index];
            if slot.state != SlotState::Pending {
                continue;
            }
            if slot
                .alternatives
                .iter()
                .all(|alt| alt.dropped || !alt.condition.can_still_fire(ctx.position))
            {
                slot.state = SlotState::Exhausted;
                continue;
            }
            let mut fired = None;
            for (alt_index, alt) in slot.alternatives.iter_mut().enumerate() {
                if alt.dropped {
                    continue;
                }
                if !alt.latched {
                    alt.latched = alt.precondition.evaluate(src);
                    if !alt.latched {
                        continue;
                    }
                }
                let now = alt.condition.evaluate(src);
                let rising = now && !alt.was_true;
                alt.was_true = now;
                if rising && fired.is_none() {
                    fired = Some(alt_index);
                }
            }
            let Some(alt_index) = fired else {
                continue;
            };
            let skill = &slot.skill;
            let checked = ctx.wit_checks && !skill.is_green() && skill.rarity != Rarity::Unique;
            if checked {
                let threshold = (100.0 - 9000.0 / ctx.base_wit).max(20.0) * 0.01;
                if streams.wit.random() > threshold {
                    log::trace!("runner {} failed wit check for {}", self.runner, skill.id);
                    slot.state = SlotState::Exhausted;
                    continue;
                }
            }
            self.activate(slot_index, alt_index, ctx, streams, &mut out);
        }
        out
    }

    /// Apply an effect another runner aimed at this one.
    pub fn receive(
        &mut self,
        incoming: &OutboundEffect,
        ctx: &ActivationContext,
    ) -> SmallVec<[EffectCommand; 4]> {
        let mut out = SmallVec::new();
        self.apply(
            incoming.execution_id,
            &incoming.skill_id,
            Rarity::White,
            None,
            &incoming.effect,
            incoming.duration,
            Perspective::Other,
            ctx,
            &mut out,
        );
        out
    }

    /// Close the records of effects still in force when the race ends.
    pub fn close(&mut self, position: f64) {
        for effect in &self.active {
            self.activations[effect.record].end = position;
        }
    }

    fn activate(
        &mut self,
        slot_index: usize,
        alt_index: usize,
        ctx: &ActivationContext,
        streams: &mut SkillStreams<'_>,
        out: &mut TickEffects,
    ) {
        let skill = Arc::clone(&self.slots[slot_index].skill);
        let Some(alt) = skill.alternatives.get(alt_index) else {
            return;
        };
        self.slots[slot_index].activations += 1;
        self.counters.record(ctx.phase);
        if let Some(id) = skill.numeric_id() {
            self.used.push(id);
        }
        let execution_id = self.next_execution_id();
        let duration = self.scaled_duration(alt.base_duration, skill.rarity, ctx.distance);
        log::trace!(
            "runner {} activates {} at {:.1} m",
            self.runner,
            skill.id,
            ctx.position
        );

        let mut timed = false;
        let mut extend = None;
        let mut random_gold = 0.0;
        for effect in &alt.effects {
            if effect.target != EffectTarget::Own {
                out.outbound.push(OutboundEffect {
                    execution_id,
                    skill_id: skill.id.clone(),
                    source: self.runner,
                    source_position: ctx.position,
                    effect: *effect,
                    duration,
                });
                self.push_record(execution_id, &skill.id, Perspective::Own, effect, ctx);
                continue;
            }
            match effect.effect_type {
                EffectType::ExtendEvolvedDuration => {
                    self.push_record(execution_id, &skill.id, Perspective::Own, effect, ctx);
                    extend = Some(effect.modifier);
                }
                EffectType::ActivateRandomGold => {
                    self.push_record(execution_id, &skill.id, Perspective::Own, effect, ctx);
                    random_gold += effect.modifier;
                }
                _ => {
                    timed |= self.apply(
                        execution_id,
                        &skill.id,
                        skill.rarity,
                        Some(slot_index),
                        effect,
                        duration,
                        Perspective::Own,
                        ctx,
                        &mut out.commands,
                    );
                }
            }
        }
        if let Some(scale) = extend {
            self.extend_evolved(scale);
        }

        let slot = &mut self.slots[slot_index];
        slot.state = if timed {
            SlotState::Active
        } else if slot.activations < skill.max_activations {
            SlotState::Pending
        } else {
            SlotState::Exhausted
        };

        if random_gold > 0.0 {
            self.activate_random_gold(random_gold, ctx, streams, out);
        }
    }

    /// Returns true when the effect stays in force for a duration.
    #[allow(clippy::too_many_arguments)]
    fn apply(
        &mut self,
        execution_id: u64,
        skill_id: &str,
        rarity: Rarity,
        slot: Option<usize>,
        effect: &EffectDefinition,
        duration: f64,
        perspective: Perspective,
        ctx: &ActivationContext,
        out: &mut SmallVec<[EffectCommand; 4]>,
    ) -> bool {
        let record = self.push_record(execution_id, skill_id, perspective, effect, ctx);
        match effect.effect_type {
            EffectType::Recovery => {
                if effect.modifier > 0.0 && perspective == Perspective::Own {
                    self.counters.heal += 1;
                }
                out.push(EffectCommand::Recover(effect.modifier));
                return false;
            }
            EffectType::MultiplyStartDelay => {
                out.push(EffectCommand::MultiplyStartDelay(effect.modifier));
                return false;
            }
            EffectType::SetStartDelay => {
                out.push(EffectCommand::SetStartDelay(effect.modifier));
                return false;
            }
            EffectType::CurrentSpeedWithNaturalDeceleration => {
                self.modifiers.one_frame_accel += effect.modifier;
                return false;
            }
            EffectType::Noop
            | EffectType::ActivateRandomGold
            | EffectType::ExtendEvolvedDuration => return false,
            _ => {}
        }
        let permanent = effect.effect_type.is_stat_up() && duration <= 0.0;
        if !permanent && duration <= 0.0 {
            return false;
        }
        self.modifiers.hold(effect, 1.0, out);
        self.active.push(ActiveEffect {
            slot,
            record,
            effect: *effect,
            rarity,
            timer: Timer::countdown(duration),
            permanent,
        });
        true
    }

    fn activate_random_gold(
        &mut self,
        count: f64,
        ctx: &ActivationContext,
        streams: &mut SkillStreams<'_>,
        out: &mut TickEffects,
    ) {
        let mut candidates: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.state == SlotState::Pending && slot.skill.is_random_gold_candidate()
            })
            .map(|(index, _)| index)
            .collect();
        for i in (1..candidates.len()).rev() {
            let upper = u32::try_from(i + 1).unwrap_or(u32::MAX);
            let j = usize::try_from(streams.gold.uniform(upper)).unwrap_or(0);
            candidates.swap(i, j);
        }
        let take = crate::numbers::floor_f64_to_usize(count);
        for slot_index in candidates.into_iter().take(take) {
            let alt_index = self.slots[slot_index]
                .alternatives
                .iter()
                .position(|alt| !alt.dropped)
                .unwrap_or(0);
            self.activate(slot_index, alt_index, ctx, streams, out);
        }
    }

    fn extend_evolved(&mut self, scale: f64) {
        self.evolved_scale = scale;
        for effect in &mut self.active {
            if effect.rarity == Rarity::Evolution && !effect.permanent {
                effect.timer.set(effect.timer.value() * scale);
            }
        }
    }

    fn scaled_duration(&self, base: f64, rarity: Rarity, distance: f64) -> f64 {
        let scale = if rarity == Rarity::Evolution {
            self.evolved_scale
        } else {
            1.0
        };
        base * (distance / 1000.0) * scale
    }

    fn next_execution_id(&mut self) -> u64 {
        self.next_execution += 1;
        let runner = u64::try_from(self.runner).unwrap_or(0);
        (runner << 32) | u64::from(self.next_execution)
    }

    fn push_record(
        &mut self,
        execution_id: u64,
        skill_id: &str,
        perspective: Perspective,
        effect: &EffectDefinition,
        ctx: &ActivationContext,
    ) -> usize {
        self.activations.push(SkillActivation {
            execution_id,
            skill_id: skill_id.to_string(),
            runner: self.runner,
            perspective,
            effect_type: effect.effect_type,
            effect_target: effect.target,
            tick: ctx.tick,
            start: ctx.position,
            end: ctx.position,
        });
        self.activations.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::CountingRng;
    use crate::skills::{ConditionVar, SkillCatalog};
    use std::collections::HashMap;

    const DT: f64 = 1.0 / 15.0;

    struct Race {
        values: HashMap<ConditionVar, f64>,
        position: f64,
    }

    impl ConditionSource for Race {
        fn value(&self, var: ConditionVar) -> Option<f64> {
            self.values.get(&var).copied()
        }

        fn used_skill(&self, _id: i64) -> bool {
            false
        }

        fn position(&self) -> f64 {
            self.position
        }
    }

    fn catalog() -> SkillCatalog {
        SkillCatalog::from_json(
            r#"{"skills":[
            {"id":"1","rarity":"white","max_activations":3,"alternatives":[
                {"condition":"always==1","base_duration":1.0,"effects":[{"type":"target_speed","modifier":0.2}]}]},
            {"id":"2","rarity":"white","alternatives":[
                {"condition":"phase==9","base_duration":1.0,"effects":[{"type":"accel","modifier":0.2}]}]},
            {"id":"3","rarity":"white","max_activations":5,"alternatives":[
                {"condition":"corner!=0","base_duration":0.5,"effects":[{"type":"accel","modifier":0.1}]}]},
            {"id":"4","rarity":"white","alternatives":[
                {"precondition":"weather==3","condition":"always==1","base_duration":1.0,"effects":[{"type":"accel","modifier":0.1}]}]},
            {"id":"5","rarity":"white","alternatives":[
                {"condition":"always==1","effects":[{"type":"recovery","modifier":-0.02,"target":"all"}]}]},
            {"id":"6","rarity":"gold","alternatives":[
                {"condition":"phase==9","base_duration":1.0,"effects":[{"type":"target_speed","modifier":0.35}]}]},
            {"id":"7","rarity":"white","alternatives":[
                {"condition":"always==1","effects":[{"type":"activate_random_gold","modifier":1}]}]},
            {"id":"8","rarity":"white","alternatives":[
                {"condition":"always==1","effects":[{"type":"speed_up","modifier":40}]}]}
        ]}"#,
        )
        .expect("test catalog compiles")
    }

    fn book(ids: &[&str], seed: u64) -> SkillBook {
        let catalog = catalog();
        let course = CourseData::load_from_static().expect("course");
        let skills: Vec<_> = ids
            .iter()
            .map(|id| Arc::clone(catalog.get(id).expect("skill")))
            .collect();
        SkillBook::new(0, &skills, &course, &mut CountingRng::new(seed))
    }

    fn ctx(tick: u32, position: f64) -> ActivationContext {
        ActivationContext {
            tick,
            position,
            phase: 1,
            distance: 1000.0,
            wit_checks: false,
            base_wit: 1000.0,
        }
    }

    fn race(pairs: &[(ConditionVar, f64)]) -> Race {
        Race {
            values: pairs.iter().copied().collect(),
            position: 0.0,
        }
    }

    fn run(book: &mut SkillBook, race: &mut Race, ticks: u32, corner_at: impl Fn(u32) -> bool) {
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        for tick in 0..ticks {
            let position = f64::from(tick);
            race.position = position;
            race.values
                .insert(ConditionVar::Corner, if corner_at(tick) { 1.0 } else { 0.0 });
            book.expire(DT, position);
            let mut streams = SkillStreams {
                wit: &mut wit,
                gold: &mut gold,
            };
            book.evaluate(race, &ctx(tick, position), &mut streams);
        }
    }

    #[test]
    fn never_true_condition_records_nothing() {
        let mut b = book(&["2"], 1);
        run(&mut b, &mut race(&[(ConditionVar::Phase, 1.0)]), 300, |_| false);
        assert!(b.activations().is_empty());
        assert_eq!(b.counters().all, 0);
    }

    #[test]
    fn always_true_fires_once_without_falling_edge() {
        let mut b = book(&["1"], 1);
        run(&mut b, &mut race(&[(ConditionVar::Always, 1.0)]), 300, |_| false);
        assert_eq!(b.activations().len(), 1);
        assert!(b.modifiers().target_speed.value().abs() < 1e-12);
    }

    #[test]
    fn rearmed_activations_are_spaced_by_duration() {
        let mut b = book(&["3"], 1);
        // corner flag toggles every 3 ticks; duration is 0.5 s = 7.5 ticks
        run(&mut b, &mut race(&[]), 200, |tick| (tick / 3) % 2 == 0);
        let starts: Vec<u32> = b.activations().iter().map(|a| a.tick).collect();
        assert!(starts.len() >= 2);
        assert!(starts.len() <= 5);
        for pair in starts.windows(2) {
            let gap = f64::from(pair[1] - pair[0]) * DT;
            assert!(gap >= 0.5 - 1e-9, "activations {pair:?} closer than duration");
        }
    }

    #[test]
    fn modifiers_release_on_expiry() {
        let mut b = book(&["1"], 1);
        let src = race(&[(ConditionVar::Always, 1.0)]);
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        let mut streams = SkillStreams {
            wit: &mut wit,
            gold: &mut gold,
        };
        b.evaluate(&src, &ctx(0, 0.0), &mut streams);
        assert!((b.modifiers().target_speed.value() - 0.2).abs() < 1e-12);
        assert!(b.modifiers().speed_skills_active());
        for tick in 1..=16 {
            b.expire(DT, f64::from(tick));
        }
        assert!(b.modifiers().target_speed.value().abs() < 1e-12);
        assert!(!b.modifiers().speed_skills_active());
        assert!(b.activations()[0].end >= 15.0);
    }

    #[test]
    fn statically_false_precondition_is_dropped() {
        let mut b = book(&["4"], 1);
        let src = race(&[(ConditionVar::Weather, 1.0), (ConditionVar::Always, 1.0)]);
        b.drop_statically_false(&src);
        assert!(!b.has_pending("4"));
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        let mut streams = SkillStreams {
            wit: &mut wit,
            gold: &mut gold,
        };
        let out = b.evaluate(&src, &ctx(0, 0.0), &mut streams);
        assert!(out.outbound.is_empty());
        assert!(b.activations().is_empty());
    }

    #[test]
    fn debuffs_are_sent_and_received_as_other() {
        let mut sender = book(&["5"], 1);
        let src = race(&[(ConditionVar::Always, 1.0)]);
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        let mut streams = SkillStreams {
            wit: &mut wit,
            gold: &mut gold,
        };
        let out = sender.evaluate(&src, &ctx(3, 10.0), &mut streams);
        assert_eq!(out.outbound.len(), 1);
        assert!(out.commands.is_empty());
        assert_eq!(sender.activations()[0].perspective, Perspective::Own);

        let mut receiver = SkillBook::new(
            1,
            &[],
            &CourseData::load_from_static().expect("course"),
            &mut CountingRng::new(3),
        );
        let commands = receiver.receive(&out.outbound[0], &ctx(3, 12.0));
        assert_eq!(commands.as_slice(), &[EffectCommand::Recover(-0.02)]);
        let record = &receiver.activations()[0];
        assert_eq!(record.perspective, Perspective::Other);
        assert_eq!(record.effect_target, EffectTarget::All);
        assert_eq!(record.execution_id, out.outbound[0].execution_id);
    }

    #[test]
    fn random_gold_fires_a_pending_gold() {
        let mut b = book(&["6", "7"], 1);
        let src = race(&[(ConditionVar::Always, 1.0), (ConditionVar::Phase, 1.0)]);
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        let mut streams = SkillStreams {
            wit: &mut wit,
            gold: &mut gold,
        };
        b.evaluate(&src, &ctx(0, 0.0), &mut streams);
        assert!(b.activations().iter().any(|a| a.skill_id == "6"));
        assert!((b.modifiers().target_speed.value() - 0.35).abs() < 1e-12);
    }

    #[test]
    fn green_skill_is_permanent_stat_command() {
        let mut b = book(&["8"], 1);
        let src = race(&[(ConditionVar::Always, 1.0)]);
        let mut wit = CountingRng::new(1);
        let mut gold = CountingRng::new(2);
        let mut streams = SkillStreams {
            wit: &mut wit,
            gold: &mut gold,
        };
        let out = b.evaluate(&src, &ctx(0, 0.0), &mut streams);
        assert_eq!(
            out.commands.as_slice(),
            &[EffectCommand::StatUp {
                stat: StatKind::Speed,
                amount: 40.0
            }]
        );
        assert!(b.expire(100.0, 50.0).is_empty());
    }

    #[test]
    fn wit_check_failures_consume_the_skill() {
        let mut passed = 0;
        let mut failed = 0;
        for seed in 0..60 {
            let mut b = book(&["1"], seed);
            let src = race(&[(ConditionVar::Always, 1.0)]);
            let mut wit = CountingRng::new(seed + 100);
            let mut gold = CountingRng::new(seed + 200);
            let mut streams = SkillStreams {
                wit: &mut wit,
                gold: &mut gold,
            };
            let context = ActivationContext {
                wit_checks: true,
                base_wit: 100.0,
                ..ctx(0, 0.0)
            };
            b.evaluate(&src, &context, &mut streams);
            if b.activations().is_empty() {
                failed += 1;
                assert!(!b.has_pending("1"));
            } else {
                passed += 1;
            }
        }
        assert!(passed > 0 && failed > 0, "passed {passed} failed {failed}");
    }
}
