use super::{BounceActionTunneler, DominantTemperatureSettings};
use crate::constants::{
    maximum_power_of_natural_exponent, LN_OF_THERMAL_INTEGRATION_FACTOR,
    MAXIMUM_ALLOWED_TEMPERATURE, NOT_CALCULATED, SATURATED_DECAY_WIDTH, THERMAL_SEED_COEFFICIENT,
};
use crate::error::{VacuumError, VacuumResult};
use crate::minimum::PotentialMinimum;
use crate::traits::{BounceActionSolver, GradientMinimizer, PotentialFunction};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A bracket `low ≤ T_crit ≤ high` in GeV.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub low: f64,
    pub high: f64,
}

impl TemperatureRange {
    pub fn at(temperature: f64) -> Self {
        Self {
            low: temperature,
            high: temperature,
        }
    }
}

/// True while `vacuum` is still deeper than the field origin at `temperature`.
pub fn below_critical_temperature(
    potential: &dyn PotentialFunction,
    vacuum: &PotentialMinimum,
    temperature: f64,
) -> bool {
    potential.evaluate(vacuum.field_configuration(), temperature)
        < potential.evaluate(potential.field_values_origin(), temperature)
}

/// Brackets the temperature at which a monotone predicate stops holding.
///
/// Doubles `seed` while `below_critical` holds (returning `(cap, cap)` if it
/// still holds at `cap`), halves until it holds again, then takes
/// `accuracy` geometric-mean bisection steps. Returns `None` for a seed
/// that is not finite and positive, or if `max_halvings` halvings never
/// reach a temperature where the predicate holds.
pub fn bracket_critical_temperature<P>(
    seed: f64,
    cap: f64,
    accuracy: u32,
    max_halvings: usize,
    mut below_critical: P,
) -> Option<TemperatureRange>
where
    P: FnMut(f64) -> bool,
{
    if !(seed.is_finite() && seed > 0.0) {
        return None;
    }
    let mut guess = seed.min(cap);
    log::debug!("Trying {guess} GeV.");
    while below_critical(guess) {
        guess += guess;
        if guess >= cap {
            guess = cap;
            log::debug!("... too low. Trying the cap: {guess} GeV.");
            if below_critical(guess) {
                log::debug!("... too low. The vacuum persists up to {cap} GeV.");
                return Some(TemperatureRange::at(cap));
            }
            break;
        }
        log::debug!("... too low. Trying {guess} GeV.");
    }

    let mut halvings = 1usize;
    guess *= 0.5;
    while !below_critical(guess) {
        if halvings >= max_halvings || guess == 0.0 {
            return None;
        }
        halvings += 1;
        guess *= 0.5;
        log::debug!("... too high. Trying {guess} GeV.");
    }

    let mut range = TemperatureRange {
        low: guess,
        high: guess + guess,
    };
    for _ in 0..accuracy {
        let midpoint = (range.low * range.high).sqrt();
        if below_critical(midpoint) {
            range.low = midpoint;
        } else {
            range.high = midpoint;
        }
    }
    log::debug!(
        "Temperature lies between {} GeV and {} GeV.",
        range.low,
        range.high
    );
    Some(range)
}

/// Temperature dominating the thermal decay, with the action there.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantTemperature {
    pub temperature: f64,
    /// The O(3) action S₃ at `temperature` (GeV).
    pub action: f64,
}

/// Minimises `S₃(T)/T + ln T` over `[low, high]`.
///
/// Samples the window geometrically, then refines around the best sample by
/// golden-section search in `ln T`. Non-finite actions are skipped. Returns
/// `None` if every sample is non-finite.
pub fn find_dominant_temperature<A>(
    low: f64,
    high: f64,
    settings: &DominantTemperatureSettings,
    mut action: A,
) -> Result<Option<DominantTemperature>>
where
    A: FnMut(f64) -> Result<f64>,
{
    let ln_low = low.ln();
    let ln_high = high.ln();
    let samples = settings.samples.max(2);
    let step = (ln_high - ln_low) / (samples - 1) as f64;

    let mut evaluate = |ln_t: f64| -> Result<(f64, f64)> {
        let temperature = ln_t.exp();
        let s3 = action(temperature)?;
        let objective = s3 / temperature + ln_t;
        Ok((if objective.is_finite() { objective } else { f64::INFINITY }, s3))
    };

    let mut best: Option<(usize, f64, f64, f64)> = None;
    for k in 0..samples {
        let ln_t = ln_low + step * k as f64;
        let (objective, s3) = evaluate(ln_t)?;
        if objective.is_finite() && best.map_or(true, |(_, _, b, _)| objective < b) {
            best = Some((k, ln_t, objective, s3));
        }
    }
    let Some((k, mut best_ln_t, mut best_objective, mut best_action)) = best else {
        return Ok(None);
    };

    let mut a = ln_low + step * k.saturating_sub(1) as f64;
    let mut b = (ln_low + step * (k + 1) as f64).min(ln_high);
    const INVERSE_GOLDEN: f64 = 0.618_033_988_749_894_9;
    let mut c = b - INVERSE_GOLDEN * (b - a);
    let mut d = a + INVERSE_GOLDEN * (b - a);
    let (mut fc, mut sc) = evaluate(c)?;
    let (mut fd, mut sd) = evaluate(d)?;
    for _ in 0..settings.refinement_steps {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            sd = sc;
            c = b - INVERSE_GOLDEN * (b - a);
            (fc, sc) = evaluate(c)?;
        } else {
            a = c;
            c = d;
            fc = fd;
            sc = sd;
            d = a + INVERSE_GOLDEN * (b - a);
            (fd, sd) = evaluate(d)?;
        }
    }
    for (ln_t, objective, s3) in [(c, fc, sc), (d, fd, sd)] {
        if objective < best_objective {
            best_ln_t = ln_t;
            best_objective = objective;
            best_action = s3;
        }
    }
    Ok(Some(DominantTemperature {
        temperature: best_ln_t.exp(),
        action: best_action,
    }))
}

/// S₃ at `temperature` between the minima that `false_vacuum` and
/// `true_vacuum` roll to at that temperature.
///
/// The action is `+∞` when either roll fails numerically, or when the two
/// rolled minima lie within `separation_fraction` of the zero-temperature
/// separation of each other: one of the vacua has evaporated.
fn thermal_bounce_action<B, M>(
    solver: &mut B,
    minimizer: &mut M,
    potential: &dyn PotentialFunction,
    false_vacuum: &PotentialMinimum,
    true_vacuum: &PotentialMinimum,
    temperature: f64,
    separation_fraction: f64,
) -> Result<f64>
where
    B: BounceActionSolver,
    M: GradientMinimizer,
{
    minimizer.set_temperature(temperature);
    let thermal_false = minimizer.minimize(potential, false_vacuum.field_configuration())?;
    let thermal_true = minimizer.minimize(potential, true_vacuum.field_configuration())?;
    if !(thermal_false.is_finite() && thermal_true.is_finite()) {
        log::debug!("Could not follow both vacua to T = {temperature} GeV.");
        return Ok(f64::INFINITY);
    }
    let merged_distance_squared =
        separation_fraction * separation_fraction * false_vacuum.square_distance_to(true_vacuum);
    if thermal_false.square_distance_to(&thermal_true) <= merged_distance_squared {
        log::debug!("The vacua have merged at T = {temperature} GeV.");
        return Ok(f64::INFINITY);
    }
    log::debug!(
        "Vacua at T = {temperature} GeV: {:?} and {:?}",
        thermal_false.field_configuration(),
        thermal_true.field_configuration()
    );
    solver.bounce_action(potential, &thermal_false, &thermal_true, temperature)
}

impl<B: BounceActionSolver, M: GradientMinimizer> BounceActionTunneler<B, M> {
    /// Brackets the highest temperature at which `vacuum` is still deeper than
    /// the origin, starting from `(0.2·ΔV)^¼` with ΔV its depth below the
    /// origin at zero temperature.
    pub fn find_max_tunneling_temperature(
        &self,
        potential: &dyn PotentialFunction,
        vacuum: &PotentialMinimum,
        potential_at_origin_at_zero_temperature: f64,
    ) -> VacuumResult<TemperatureRange> {
        let depth = potential_at_origin_at_zero_temperature
            - potential.evaluate(vacuum.field_configuration(), 0.0);
        let seed = (THERMAL_SEED_COEFFICIENT * depth).powf(0.25);
        if !(seed.is_finite() && seed > 0.0) {
            self.warnings.log_warning(format!(
                "The vacuum at {} is not deeper than the origin at zero temperature, so it has \
                 no critical temperature.",
                potential.field_configuration_description(vacuum.field_configuration())
            ));
            return Ok(TemperatureRange::at(0.0));
        }
        let max_halvings = self.settings.max_temperature_halvings;
        bracket_critical_temperature(
            seed,
            MAXIMUM_ALLOWED_TEMPERATURE,
            self.settings.temperature_accuracy,
            max_halvings,
            |temperature| below_critical_temperature(potential, vacuum, temperature),
        )
        .ok_or_else(|| VacuumError::CriticalTemperatureNotBracketed {
            vacuum: vacuum.field_configuration().to_vec(),
            halvings: max_halvings,
        })
    }

    pub(super) fn calculate_thermal_tunneling(
        &mut self,
        potential: &dyn PotentialFunction,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
    ) -> VacuumResult<()> {
        let fraction = self.settings.vacuum_separation_fraction;
        let threshold_separation_squared =
            fraction * fraction * false_vacuum.square_distance_to(true_vacuum);
        let false_vacuum_at_origin = false_vacuum.length_squared() < threshold_separation_squared;
        let potential_at_origin = potential.evaluate(potential.field_values_origin(), 0.0);

        if potential.evaluate(false_vacuum.field_configuration(), 0.0) > potential_at_origin
            && !false_vacuum_at_origin
        {
            self.result.dominant_temperature = 0.0;
            self.result.thermal_survival_probability = 0.0;
            self.log_of_minus_log_of_thermal_probability = f64::INFINITY;
            self.warnings.log_warning(
                "DSB vacuum has higher energy density than the field origin! Assuming that the \
                 Universe could not have cooled into this false vacuum from the symmetric phase, \
                 and setting the thermal survival probability to zero.",
            );
            return Ok(());
        }

        let false_range = if false_vacuum_at_origin {
            TemperatureRange::at(MAXIMUM_ALLOWED_TEMPERATURE)
        } else {
            self.find_max_tunneling_temperature(potential, false_vacuum, potential_at_origin)?
        };
        let true_range =
            self.find_max_tunneling_temperature(potential, true_vacuum, potential_at_origin)?;
        log::info!(
            "Critical temperatures: origin to false vacuum in [{}, {}] GeV, origin to true \
             vacuum in [{}, {}] GeV",
            false_range.low,
            false_range.high,
            true_range.low,
            true_range.high
        );

        let top = false_range.low.min(true_range.low);
        if !(top > 0.0) {
            self.warnings.log_warning(
                "No temperature window in which the true vacuum is deeper than the origin, so \
                 there is no thermal tunneling.",
            );
            self.result.dominant_temperature = 0.0;
            self.result.thermal_survival_probability = 1.0;
            self.result.partial_thermal_decay_width = 0.0;
            self.log_of_minus_log_of_thermal_probability = f64::NEG_INFINITY;
            return Ok(());
        }
        let bottom = self.settings.dominant_temperature.lowest_fraction * top;

        let settings = self.settings.dominant_temperature;
        let separation_fraction = self.settings.vacuum_separation_fraction;
        let solver = &mut self.solver;
        let minimizer = &mut self.thermal_minimizer;
        let dominant = find_dominant_temperature(bottom, top, &settings, |temperature| {
            thermal_bounce_action(
                solver,
                minimizer,
                potential,
                false_vacuum,
                true_vacuum,
                temperature,
                separation_fraction,
            )
        })?;
        let Some(dominant) = dominant else {
            self.warnings.log_warning(format!(
                "Every thermal bounce action between {bottom} GeV and {top} GeV was non-finite, \
                 so there is no thermal tunneling and the thermal survival probability is one."
            ));
            self.result.dominant_temperature = 0.0;
            self.result.thermal_survival_probability = 1.0;
            self.result.partial_thermal_decay_width = 0.0;
            self.log_of_minus_log_of_thermal_probability = f64::NEG_INFINITY;
            return Ok(());
        };

        let exponent = dominant.action / dominant.temperature;
        self.log_of_minus_log_of_thermal_probability =
            LN_OF_THERMAL_INTEGRATION_FACTOR - exponent - dominant.temperature.ln();
        self.result.dominant_temperature = dominant.temperature;
        self.set_thermal_survival_probability();
        self.set_partial_thermal_decay_width(dominant.temperature.powi(4) * (-exponent).exp());
        log::info!(
            "Thermal tunneling: dominant temperature {} GeV, S3 = {}, survival probability = {}",
            dominant.temperature,
            dominant.action,
            self.result.thermal_survival_probability
        );
        Ok(())
    }

    /// Converts `ln(−ln P)` into the thermal survival probability, clamping
    /// where an exponential would overflow.
    pub fn set_thermal_survival_probability(&mut self) {
        let limit = maximum_power_of_natural_exponent();
        let log_log = self.log_of_minus_log_of_thermal_probability;
        self.result.thermal_survival_probability = if log_log >= limit {
            self.warnings.log_warning(
                "The thermal decay exponent is so large and positive that exponentiating it \
                 would overflow, so setting the thermal survival probability to zero.",
            );
            0.0
        } else if log_log <= -limit {
            self.warnings.log_warning(
                "The thermal decay exponent is so large and negative that exponentiating it \
                 would overflow, so setting the thermal survival probability to one.",
            );
            1.0
        } else if log_log.exp() >= limit {
            self.warnings.log_warning(
                "The integrated thermal decay width is so large that exponentiating it would \
                 overflow, so setting the thermal survival probability to zero.",
            );
            0.0
        } else {
            (-log_log.exp()).exp()
        };
    }

    /// Stores `raw_width`, unless the survival probability was clamped, in
    /// which case the width follows the same clamp.
    pub fn set_partial_thermal_decay_width(&mut self, raw_width: f64) {
        let limit = maximum_power_of_natural_exponent();
        let log_log = self.log_of_minus_log_of_thermal_probability;
        self.result.partial_thermal_decay_width = if log_log >= limit {
            NOT_CALCULATED
        } else if log_log <= -limit {
            0.0
        } else if log_log.exp() >= limit {
            SATURATED_DECAY_WIDTH
        } else {
            raw_width
        };
    }

    #[cfg(test)]
    pub(crate) fn set_log_of_minus_log_of_thermal_probability(&mut self, value: f64) {
        self.log_of_minus_log_of_thermal_probability = value;
    }
}
