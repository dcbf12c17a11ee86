//! Thin-wall estimate of the bounce action along the straight path between
//! two vacua.

use crate::minimum::PotentialMinimum;
use crate::traits::{BounceActionSolver, PotentialFunction};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThinWallSettings {
    /// Simpson segments along the path; rounded up to an even number.
    pub segments: usize,
}

impl Default for ThinWallSettings {
    fn default() -> Self {
        Self { segments: 64 }
    }
}

/// Bounce action in the thin-wall approximation.
///
/// The wall tension is `σ = ∫ √(2 (V − V_false)) dφ` along the straight line
/// from the false to the true vacuum, with negative `V − V_false` counted as
/// zero. With `ε = V_false − V_true` the action is `27π²σ⁴ / (2ε³)` at zero
/// temperature and `16πσ³ / (3ε²)` otherwise. If the true vacuum is not
/// deeper at the requested temperature the action is `+∞`.
#[derive(Debug, Clone, Default)]
pub struct ThinWallBounceAction {
    settings: ThinWallSettings,
}

impl ThinWallBounceAction {
    pub fn new(settings: ThinWallSettings) -> Self {
        Self { settings }
    }

    /// `σ` at the given temperature.
    pub fn wall_tension(
        &self,
        potential: &dyn PotentialFunction,
        false_vacuum: &[f64],
        true_vacuum: &[f64],
        temperature: f64,
    ) -> f64 {
        let false_value = potential.evaluate(false_vacuum, temperature);
        let delta: Vec<f64> = true_vacuum
            .iter()
            .zip(false_vacuum)
            .map(|(t, f)| t - f)
            .collect();
        let length = delta.iter().map(|d| d * d).sum::<f64>().sqrt();
        let n = (self.settings.segments.max(2) + 1) & !1;
        let mut point = vec![0.0; false_vacuum.len()];
        let mut integrand = |s: f64| {
            for (i, p) in point.iter_mut().enumerate() {
                *p = false_vacuum[i] + s * delta[i];
            }
            let barrier = potential.evaluate(&point, temperature) - false_value;
            (2.0 * barrier.max(0.0)).sqrt()
        };
        let h = 1.0 / n as f64;
        let mut sum = integrand(0.0) + integrand(1.0);
        for k in 1..n {
            let weight = if k % 2 == 1 { 4.0 } else { 2.0 };
            sum += weight * integrand(k as f64 * h);
        }
        length * sum * h / 3.0
    }
}

impl BounceActionSolver for ThinWallBounceAction {
    fn bounce_action(
        &mut self,
        potential: &dyn PotentialFunction,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
        temperature: f64,
    ) -> Result<f64> {
        let dim = potential.number_of_fields();
        if false_vacuum.number_of_fields() != dim || true_vacuum.number_of_fields() != dim {
            bail!(
                "Vacuum dimension mismatch. Expected {}, got {} and {}.",
                dim,
                false_vacuum.number_of_fields(),
                true_vacuum.number_of_fields()
            );
        }
        let false_fields = false_vacuum.field_configuration();
        let true_fields = true_vacuum.field_configuration();
        let epsilon = potential.evaluate(false_fields, temperature)
            - potential.evaluate(true_fields, temperature);
        if epsilon.is_nan() {
            bail!("Potential is NaN at one of the vacua at T = {temperature} GeV.");
        }
        if epsilon <= 0.0 || false_vacuum.square_distance_to(true_vacuum) == 0.0 {
            return Ok(f64::INFINITY);
        }

        let sigma = self.wall_tension(potential, false_fields, true_fields, temperature);
        if !sigma.is_finite() {
            bail!("Wall tension is not finite at T = {temperature} GeV.");
        }
        let action = if temperature > 0.0 {
            16.0 * PI * sigma.powi(3) / (3.0 * epsilon * epsilon)
        } else {
            27.0 * PI * PI * sigma.powi(4) / (2.0 * epsilon.powi(3))
        };
        log::debug!(
            "thin-wall action at T = {temperature}: sigma = {sigma}, epsilon = {epsilon}, S = {action}"
        );
        Ok(action)
    }
}
