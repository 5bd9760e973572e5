//! Per-runner race behaviours rolled from their own streams: rushing,
//! downhill accel mode, dueling and the lead-competition spot struggle.
use serde::{Deserialize, Serialize};

use crate::numbers::{Timer, floor_f64_to_usize};
use crate::rng::{Prng, Stream};
use crate::strategy::Strategy;

const RUSHED_MAX_SECONDS: f64 = 12.0;
const RUSHED_RECOVERY_CHANCE: f64 = 0.55;
const RUSHED_RECOVERY_PERIOD: f64 = 3.0;
const DUEL_RETRY_SECONDS: f64 = 2.0;
const DUEL_START_CHANCE: f64 = 0.4;
const SPOT_STRUGGLE_START: f64 = 150.0;

/// Distance travelled while a behaviour held.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub start: f64,
    pub end: f64,
}

impl Span {
    #[must_use]
    pub const fn open(start: f64) -> Self {
        Self { start, end: start }
    }

    #[must_use]
    pub fn length(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// `(6.5 / log10(0.1 * wit + 1))^2 %`.
#[must_use]
pub fn rushed_chance(wit: f64) -> f64 {
    (6.5 / (0.1 * wit + 1.0).log10()).powi(2) / 100.0
}

/// Once-per-race loss of composure.
#[derive(Debug, Clone)]
pub struct Rushed {
    enter_at: Option<f64>,
    active: bool,
    timer: Timer,
    resume: Option<Strategy>,
    span: Option<Span>,
}

impl Rushed {
    /// Decide up front whether and where the runner will get rushed.
    #[must_use]
    pub fn roll(enabled: bool, chance: f64, section_length: f64, rng: &mut Stream) -> Self {
        let enter_at = (enabled && rng.random() < chance)
            .then(|| section_length * f64::from(2 + rng.uniform(8)));
        Self {
            enter_at,
            active: false,
            timer: Timer::default(),
            resume: None,
            span: None,
        }
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn enter_at(&self) -> Option<f64> {
        self.enter_at
    }

    #[must_use]
    pub const fn span(&self) -> Option<Span> {
        self.span
    }

    /// Enter or leave the state; returns the strategy to keep position as
    /// when it changes.
    pub fn update(
        &mut self,
        dt: f64,
        position: f64,
        strategy: Strategy,
        keep_strategy: Strategy,
        rng: &mut Stream,
    ) -> Option<Strategy> {
        if self.active {
            self.timer.tick(dt);
        }
        if !self.active && self.span.is_none() {
            let Some(enter_at) = self.enter_at else {
                return None;
            };
            if position < enter_at {
                return None;
            }
            self.active = true;
            self.timer = Timer::default();
            self.resume = Some(keep_strategy);
            self.span = Some(Span::open(position));
            log::trace!("rushed at {position:.1}");
            return Some(strategy.rushed_position_keep(rng.random()));
        }
        if !self.active {
            return None;
        }
        let t = self.timer.value();
        let boundary =
            (t / RUSHED_RECOVERY_PERIOD).floor() > ((t - dt) / RUSHED_RECOVERY_PERIOD).floor();
        if t > 0.0 && boundary && rng.random() < RUSHED_RECOVERY_CHANCE {
            return self.leave(position);
        }
        if t >= RUSHED_MAX_SECONDS {
            return self.leave(position);
        }
        None
    }

    pub fn close(&mut self, position: f64) {
        if self.active {
            self.active = false;
            if let Some(span) = &mut self.span {
                span.end = position;
            }
        }
    }

    fn leave(&mut self, position: f64) -> Option<Strategy> {
        self.close(position);
        self.resume.take()
    }
}

/// Accel mode entered on downhills, rolled on the last frame of each second.
#[derive(Debug, Clone, Default)]
pub struct Downhill {
    active: bool,
    last_check: Option<usize>,
    spans: Vec<Span>,
}

impl Downhill {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn update(
        &mut self,
        enabled: bool,
        slope: f64,
        elapsed: f64,
        wit: f64,
        position: f64,
        rng: &mut Stream,
    ) {
        if !enabled || slope >= 0.0 {
            self.close(position);
            return;
        }
        let frame = floor_f64_to_usize(elapsed * 15.0);
        if frame % 15 != 14 || self.last_check == Some(frame) {
            return;
        }
        self.last_check = Some(frame);
        let roll = rng.random();
        if !self.active {
            if roll < wit * 0.0004 {
                self.active = true;
                self.spans.push(Span::open(position));
            }
        } else if roll > 0.8 {
            self.close(position);
        }
    }

    pub fn close(&mut self, position: f64) {
        if self.active {
            self.active = false;
            if let Some(span) = self.spans.last_mut() {
                span.end = position;
            }
        }
    }
}

/// What the dueling check reads from the runner.
#[derive(Debug, Clone, Copy)]
pub struct DuelCheck {
    pub enabled: bool,
    pub keep_strategy: Strategy,
    pub hp_ratio: f64,
    pub on_final_straight: bool,
    /// Percent chance the runner is willing to duel at all.
    pub rate: f64,
    pub position: f64,
}

/// Head-to-head duel on the final straight, approximated for two runners.
#[derive(Debug, Clone)]
pub struct Dueling {
    willing: Option<bool>,
    active: bool,
    timer: Timer,
    span: Option<Span>,
}

impl Default for Dueling {
    fn default() -> Self {
        Self {
            willing: None,
            active: false,
            timer: Timer::default(),
            span: None,
        }
    }
}

impl Dueling {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn span(&self) -> Option<Span> {
        self.span
    }

    pub fn update(&mut self, dt: f64, check: &DuelCheck, rng: &mut Stream) {
        self.timer.tick(dt);
        if !check.enabled {
            return;
        }
        if self.active {
            if check.hp_ratio <= 0.05 {
                self.close(check.position);
            }
            return;
        }
        if self.span.is_some()
            || check.keep_strategy.is_front()
            || check.hp_ratio < 0.15
            || !check.on_final_straight
        {
            return;
        }
        let willing = if let Some(willing) = self.willing {
            willing
        } else {
            let willing = rng.random() < check.rate / 100.0;
            self.willing = Some(willing);
            self.timer = Timer::default();
            willing
        };
        if !willing || self.timer.value() < DUEL_RETRY_SECONDS {
            return;
        }
        if rng.random() <= DUEL_START_CHANCE {
            self.active = true;
            self.span = Some(Span::open(check.position));
        } else {
            self.timer = Timer::default();
        }
    }

    pub fn close(&mut self, position: f64) {
        if self.active {
            self.active = false;
            if let Some(span) = &mut self.span {
                span.end = position;
            }
        }
    }
}

/// Front-runner lead competition early in the race.
#[derive(Debug, Clone)]
pub struct SpotStruggle {
    active: bool,
    timer: Timer,
    end_at: f64,
    span: Option<Span>,
}

impl Default for SpotStruggle {
    fn default() -> Self {
        Self {
            active: false,
            timer: Timer::default(),
            end_at: 0.0,
            span: None,
        }
    }
}

impl SpotStruggle {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub const fn span(&self) -> Option<Span> {
        self.span
    }

    /// Gap within which two front runners start competing, by distance then lane.
    #[must_use]
    pub const fn gaps(keep_strategy: Strategy) -> (f64, f64) {
        match keep_strategy {
            Strategy::FrontRunner => (3.75, 0.165),
            _ => (5.0, 0.416),
        }
    }

    /// Whether the runner may still be drawn into a struggle here.
    #[must_use]
    pub fn eligible(&self, position: f64, section_length: f64, keep_strategy: Strategy) -> bool {
        self.span.is_none()
            && keep_strategy.is_front()
            && position >= SPOT_STRUGGLE_START
            && position <= (section_length * 5.0).floor()
    }

    pub fn start(&mut self, position: f64, section_length: f64) {
        self.active = true;
        self.timer = Timer::default();
        self.end_at = position + (section_length * 8.0).floor();
        self.span = Some(Span::open(position));
        log::trace!("spot struggle from {position:.1}");
    }

    pub fn update(&mut self, dt: f64, position: f64, guts: f64) {
        if !self.active {
            return;
        }
        self.timer.tick(dt);
        let limit = (700.0 * guts).sqrt() * 0.012;
        if self.timer.value() >= limit || position >= self.end_at {
            self.close(position);
        }
    }

    pub fn close(&mut self, position: f64) {
        if self.active {
            self.active = false;
            if let Some(span) = &mut self.span {
                span.end = position;
            }
        }
    }
}
