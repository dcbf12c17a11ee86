//! Gradient-based minimizer used to roll starting points into minima.

use crate::minimum::PotentialMinimum;
use crate::traits::{GradientMinimizer, PotentialFunction};
use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DescentSettings {
    pub max_iterations: usize,
    /// Converged once the gradient norm falls below this, relative to the
    /// potential's natural scale `1 + |V|`.
    pub gradient_tolerance: f64,
    /// Converged once the estimated distance to minimum falls below this,
    /// relative to `1 + |V|`.
    pub edm_tolerance: f64,
    /// First trial step for steepest descent, relative to `1 + ‖x‖`.
    pub initial_step: f64,
    /// Backtracking gives up below this fraction of the first trial step.
    pub min_step_fraction: f64,
}

impl Default for DescentSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            gradient_tolerance: 1e-10,
            edm_tolerance: 1e-12,
            initial_step: 0.1,
            min_step_fraction: 1e-12,
        }
    }
}

const ARMIJO_FRACTION: f64 = 1e-4;

/// Newton steps where the Hessian is positive definite, steepest descent with
/// backtracking otherwise, and a push along the most negative curvature
/// direction when started exactly on a maximum or saddle.
///
/// The reported function error is the estimated distance to the minimum,
/// `½ gᵀH⁻¹g`, or the last decrease in V when the Hessian was not usable.
#[derive(Debug, Clone)]
pub struct DescentMinimizer {
    settings: DescentSettings,
    temperature: f64,
}

impl DescentMinimizer {
    pub fn new(settings: DescentSettings) -> Self {
        Self {
            settings,
            temperature: 0.0,
        }
    }

    pub fn settings(&self) -> &DescentSettings {
        &self.settings
    }

    fn validate(&self) -> Result<()> {
        if self.settings.max_iterations == 0 {
            bail!("max_iterations must be greater than zero.");
        }
        if self.settings.gradient_tolerance <= 0.0 || self.settings.edm_tolerance <= 0.0 {
            bail!("tolerances must be positive.");
        }
        if self.settings.initial_step <= 0.0 {
            bail!("initial_step must be positive.");
        }
        if !(self.settings.min_step_fraction > 0.0 && self.settings.min_step_fraction < 1.0) {
            bail!("min_step_fraction must lie in (0, 1).");
        }
        Ok(())
    }
}

impl Default for DescentMinimizer {
    fn default() -> Self {
        Self::new(DescentSettings::default())
    }
}

impl GradientMinimizer for DescentMinimizer {
    fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    fn temperature(&self) -> f64 {
        self.temperature
    }

    fn minimize(
        &self,
        potential: &dyn PotentialFunction,
        starting_point: &[f64],
    ) -> Result<PotentialMinimum> {
        self.validate()?;
        let dim = potential.number_of_fields();
        if starting_point.len() != dim {
            bail!(
                "Starting point dimension mismatch. Expected {}, got {}.",
                dim,
                starting_point.len()
            );
        }

        let t = self.temperature;
        let mut x = DVector::from_column_slice(starting_point);
        let mut value = potential.evaluate(x.as_slice(), t);
        let mut grad_buf = vec![0.0; dim];
        let mut error = f64::NAN;

        for iteration in 0..self.settings.max_iterations {
            if !value.is_finite() {
                return Ok(failed_minimum(x));
            }
            potential.gradient(x.as_slice(), t, &mut grad_buf);
            let grad = DVector::from_column_slice(&grad_buf);
            if grad.iter().any(|g| !g.is_finite()) {
                return Ok(failed_minimum(x));
            }
            let scale = 1.0 + value.abs();
            let hessian = potential.hessian(x.as_slice(), t);

            let newton = newton_direction(&hessian, &grad);
            if let Some((_, edm)) = &newton {
                error = *edm;
                if *edm <= self.settings.edm_tolerance * scale {
                    log::debug!("descent converged on EDM after {iteration} iterations");
                    return Ok(PotentialMinimum::new(x.iter().cloned().collect(), value, error));
                }
            }

            let grad_norm = grad.norm();
            let used_newton = newton.is_some();
            let direction = match newton {
                Some((step, _)) => step,
                None if grad_norm <= self.settings.gradient_tolerance * scale => {
                    match negative_curvature_direction(&hessian) {
                        Some(dir) => dir * (self.settings.initial_step * (1.0 + x.norm())),
                        None => {
                            if error.is_nan() {
                                error = 0.0;
                            }
                            return Ok(PotentialMinimum::new(
                                x.iter().cloned().collect(),
                                value,
                                error,
                            ));
                        }
                    }
                }
                None => -&grad * (self.settings.initial_step * (1.0 + x.norm()) / grad_norm),
            };

            match self.line_search(potential, &x, value, &grad, &direction) {
                Some((next_x, next_value)) => {
                    if !used_newton {
                        error = value - next_value;
                    }
                    x = next_x;
                    value = next_value;
                }
                None => {
                    // No decrease along the chosen direction: try plain descent once.
                    let fallback = if grad_norm > 0.0 {
                        -&grad * (self.settings.initial_step * (1.0 + x.norm()) / grad_norm)
                    } else {
                        DVector::zeros(dim)
                    };
                    match self.line_search(potential, &x, value, &grad, &fallback) {
                        Some((next_x, next_value)) => {
                            error = value - next_value;
                            x = next_x;
                            value = next_value;
                        }
                        None => {
                            if error.is_nan() {
                                error = 0.0;
                            }
                            log::debug!("descent stalled after {iteration} iterations");
                            return Ok(PotentialMinimum::new(
                                x.iter().cloned().collect(),
                                value,
                                error,
                            ));
                        }
                    }
                }
            }
        }

        log::debug!(
            "descent hit max_iterations ({}) at {:?}",
            self.settings.max_iterations,
            x.as_slice()
        );
        if error.is_nan() {
            error = 0.0;
        }
        Ok(PotentialMinimum::new(x.iter().cloned().collect(), value, error.abs()))
    }
}

impl DescentMinimizer {
    /// Backtracking line search with the Armijo sufficient-decrease condition.
    /// Directions that do not point downhill are accepted on plain decrease.
    fn line_search(
        &self,
        potential: &dyn PotentialFunction,
        x: &DVector<f64>,
        value: f64,
        grad: &DVector<f64>,
        direction: &DVector<f64>,
    ) -> Option<(DVector<f64>, f64)> {
        let slope = grad.dot(direction).min(0.0);
        let mut alpha = 1.0;
        while alpha >= self.settings.min_step_fraction {
            let trial = x + direction * alpha;
            let trial_value = potential.evaluate(trial.as_slice(), self.temperature);
            if trial_value.is_finite()
                && trial_value < value
                && trial_value <= value + ARMIJO_FRACTION * alpha * slope
            {
                return Some((trial, trial_value));
            }
            alpha *= 0.5;
        }
        None
    }
}

/// Newton step and EDM when the Hessian is positive definite.
fn newton_direction(hessian: &DMatrix<f64>, grad: &DVector<f64>) -> Option<(DVector<f64>, f64)> {
    if hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let cholesky = hessian.clone().cholesky()?;
    let step = cholesky.solve(grad);
    let edm = 0.5 * grad.dot(&step);
    if !edm.is_finite() || edm < 0.0 {
        return None;
    }
    Some((-step, edm))
}

/// Unit eigenvector of the most negative Hessian eigenvalue, if any.
fn negative_curvature_direction(hessian: &DMatrix<f64>) -> Option<DVector<f64>> {
    if hessian.nrows() == 0 || hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let eig = SymmetricEigen::new(hessian.clone());
    let (idx, &lowest) = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    if lowest >= 0.0 {
        return None;
    }
    let vec = eig.eigenvectors.column(idx).into_owned();
    let norm = vec.norm();
    if norm == 0.0 {
        return None;
    }
    Some(vec / norm)
}

fn failed_minimum(x: DVector<f64>) -> PotentialMinimum {
    PotentialMinimum::new(x.iter().cloned().collect(), f64::NAN, f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::ExpressionPotential;

    fn potential(expr: &str, fields: &[&str], dsb: Vec<f64>) -> ExpressionPotential {
        ExpressionPotential::new(
            expr,
            fields.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            Vec::new(),
            dsb,
        )
        .expect("potential should build")
    }

    #[test]
    fn rolls_into_nearest_well_of_double_well() {
        let v = potential("(x^2 - 4)^2 + 0.5 * x", &["x"], vec![2.0]);
        let minimizer = DescentMinimizer::default();
        let right = minimizer.minimize(&v, &[1.0]).expect("minimize");
        let left = minimizer.minimize(&v, &[-1.0]).expect("minimize");
        assert!(right.field_configuration()[0] > 1.9 && right.field_configuration()[0] < 2.0);
        assert!(left.field_configuration()[0] < -2.0 && left.field_configuration()[0] > -2.1);
        assert!(left.function_value() < right.function_value());
        assert!(right.function_error() >= 0.0 && right.function_error() < 1e-8);
    }

    #[test]
    fn escapes_from_a_maximum() {
        let v = potential("(x^2 + y^2 - 1)^2", &["x", "y"], vec![1.0, 0.0]);
        let minimizer = DescentMinimizer::default();
        let minimum = minimizer.minimize(&v, &[0.0, 0.0]).expect("minimize");
        let radius_squared = minimum.length_squared();
        assert!((radius_squared - 1.0).abs() < 1e-4);
        assert!(minimum.function_value() < 1e-8);
    }

    #[test]
    fn temperature_shifts_the_minimum() {
        let v = potential("(x^2 - 4)^2 + T^2 * x^2", &["x"], vec![2.0]);
        let mut minimizer = DescentMinimizer::default();
        minimizer.set_temperature(4.0);
        assert_eq!(minimizer.temperature(), 4.0);
        let minimum = minimizer.minimize(&v, &[1.5]).expect("minimize");
        assert!(minimum.field_configuration()[0].abs() < 1e-5);
    }

    #[test]
    fn non_finite_potential_reports_nan_minimum() {
        let v = potential("ln(x)", &["x"], vec![1.0]);
        let minimum = DescentMinimizer::default()
            .minimize(&v, &[-1.0])
            .expect("minimize");
        assert!(!minimum.is_finite());
    }

    #[test]
    fn rejects_wrong_dimension_and_bad_settings() {
        let v = potential("x^2", &["x"], vec![0.0]);
        let err = DescentMinimizer::default()
            .minimize(&v, &[1.0, 2.0])
            .expect_err("dimension mismatch");
        assert!(format!("{err}").contains("Expected 1, got 2"));

        let bad = DescentMinimizer::new(DescentSettings {
            max_iterations: 0,
            ..DescentSettings::default()
        });
        assert!(bad.minimize(&v, &[1.0]).is_err());
    }
}
