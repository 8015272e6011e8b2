//! Probability rolls that decide which triggers fire on a tick.

use rand::Rng;
use tracing::debug;

use crate::error::{RollError, RollResult};

/// Likelihood of a trigger firing.
///
/// Built only through [`Chance::percent`] or [`Chance::fraction`], which
/// reject out-of-range input instead of clamping it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chance(Repr);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repr {
    Percent(u8),
    Fraction(f64),
}

impl Chance {
    /// Whole percentage in `0..=100`.
    pub fn percent(value: u32) -> RollResult<Self> {
        match u8::try_from(value) {
            Ok(p) if p <= 100 => Ok(Self(Repr::Percent(p))),
            _ => Err(RollError::InvalidChance(format!(
                "percentage {value} outside 0..=100"
            ))),
        }
    }

    /// Probability in `0.0..=1.0`.
    pub fn fraction(value: f64) -> RollResult<Self> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(Repr::Fraction(value)))
        } else {
            Err(RollError::InvalidChance(format!(
                "fraction {value} outside 0.0..=1.0"
            )))
        }
    }

    /// Relative weight on a common 0..=1 scale.
    pub fn weight(self) -> f64 {
        match self.0 {
            Repr::Percent(p) => f64::from(p) / 100.0,
            Repr::Fraction(f) => f,
        }
    }
}

/// How a set of targets is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollMode {
    /// Every target rolls on its own.
    #[default]
    Independent,
    /// Exactly one target is picked, weighted by chance.
    Exclusive,
}

/// A candidate action and its chance of firing.
pub struct RollTarget<'a> {
    action: Box<dyn FnMut() + 'a>,
    chance: Chance,
}

impl<'a> RollTarget<'a> {
    pub fn new(chance: Chance, action: impl FnMut() + 'a) -> Self {
        Self {
            action: Box::new(action),
            chance,
        }
    }

    fn fire(&mut self) {
        (self.action)()
    }
}

/// Rolls once against `chance`.
///
/// Percentages draw an integer in `1..=100` and succeed when the draw is at
/// most the percentage, so 0 never fires and 100 always does. Fractions draw
/// from `[0, 1)` and succeed when the draw is at most the fraction.
pub fn roll(chance: Chance, rng: &mut impl Rng) -> bool {
    match chance.0 {
        Repr::Percent(p) => rng.random_range(1..=100u8) <= p,
        Repr::Fraction(f) => rng.random::<f64>() <= f,
    }
}

/// Evaluates `targets`, invokes the actions that fire and returns their
/// indices in input order.
pub fn roll_targets(
    targets: &mut [RollTarget<'_>],
    mode: RollMode,
    rng: &mut impl Rng,
) -> Vec<usize> {
    match mode {
        RollMode::Independent => {
            let mut fired = Vec::new();
            for (idx, target) in targets.iter_mut().enumerate() {
                if roll(target.chance, rng) {
                    target.fire();
                    fired.push(idx);
                }
            }
            debug!("Independent roll fired {:?}", fired);
            fired
        }
        RollMode::Exclusive => {
            let Some(idx) = choose_weighted(targets, rng) else {
                return Vec::new();
            };
            targets[idx].fire();
            debug!("Exclusive roll picked target {}", idx);
            vec![idx]
        }
    }
}

/// Picks one index with probability proportional to its weight.
///
/// When every weight is zero the first target wins, so exclusive dispatch
/// always yields an action for a non-empty set.
fn choose_weighted(targets: &[RollTarget<'_>], rng: &mut impl Rng) -> Option<usize> {
    if targets.is_empty() {
        return None;
    }

    let total: f64 = targets.iter().map(|t| t.chance.weight()).sum();
    if total <= 0.0 {
        debug!("All weights are zero, falling back to first target");
        return Some(0);
    }

    let draw = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for (idx, target) in targets.iter().enumerate() {
        cumulative += target.chance.weight();
        if draw < cumulative {
            return Some(idx);
        }
    }

    Some(0)
}
