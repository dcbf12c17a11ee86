use crate::minimum::PotentialMinimum;
use anyhow::Result;
use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars when evaluating potentials.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// Relative step used by the finite-difference derivatives.
const DIFFERENCE_STEP: f64 = 1e-5;

/// A scalar-field potential, possibly temperature dependent.
///
/// Implementations may cache scale-dependent coefficients behind interior
/// mutability, so `&self` methods are not assumed safe to share across threads.
pub trait PotentialFunction {
    /// Names of the fields, in the order used by every field configuration.
    fn field_names(&self) -> &[String];

    fn number_of_fields(&self) -> usize {
        self.field_names().len()
    }

    /// Energy density (GeV⁴) at the given field values (GeV) and temperature (GeV).
    fn evaluate(&self, field_configuration: &[f64], temperature: f64) -> f64;

    fn field_values_origin(&self) -> &[f64];

    /// The field values of the vacuum whose stability is being tested.
    fn dsb_field_values(&self) -> &[f64];

    /// Square of the scale (GeV²) relevant to tunneling between the two minima.
    fn scale_squared_relevant_to_tunneling(
        &self,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
    ) -> f64;

    /// Gradient at the given point. Defaults to central differences.
    fn gradient(&self, field_configuration: &[f64], temperature: f64, out: &mut [f64]) {
        let mut shifted = field_configuration.to_vec();
        for i in 0..shifted.len() {
            let h = difference_step(shifted[i]);
            let base = shifted[i];
            shifted[i] = base + h;
            let up = self.evaluate(&shifted, temperature);
            shifted[i] = base - h;
            let down = self.evaluate(&shifted, temperature);
            shifted[i] = base;
            out[i] = (up - down) / (2.0 * h);
        }
    }

    /// Hessian at the given point. Defaults to central differences.
    fn hessian(&self, field_configuration: &[f64], temperature: f64) -> DMatrix<f64> {
        let dim = field_configuration.len();
        let mut hessian = DMatrix::zeros(dim, dim);
        let mut shifted = field_configuration.to_vec();
        let centre = self.evaluate(&shifted, temperature);
        for i in 0..dim {
            let hi = difference_step(shifted[i]);
            let base_i = shifted[i];
            shifted[i] = base_i + hi;
            let up = self.evaluate(&shifted, temperature);
            shifted[i] = base_i - hi;
            let down = self.evaluate(&shifted, temperature);
            shifted[i] = base_i;
            hessian[(i, i)] = (up - 2.0 * centre + down) / (hi * hi);
            for j in (i + 1)..dim {
                let hj = difference_step(shifted[j]);
                let base_j = shifted[j];
                let mut corner = |si: f64, sj: f64| {
                    shifted[i] = base_i + si * hi;
                    shifted[j] = base_j + sj * hj;
                    let value = self.evaluate(&shifted, temperature);
                    shifted[i] = base_i;
                    shifted[j] = base_j;
                    value
                };
                let mixed = (corner(1.0, 1.0) - corner(1.0, -1.0) - corner(-1.0, 1.0)
                    + corner(-1.0, -1.0))
                    / (4.0 * hi * hj);
                hessian[(i, j)] = mixed;
                hessian[(j, i)] = mixed;
            }
        }
        hessian
    }

    /// Renders a field configuration as `{ name -> value, ... }` for diagnostics.
    fn field_configuration_description(&self, field_configuration: &[f64]) -> String {
        let names = self.field_names();
        let parts: Vec<String> = field_configuration
            .iter()
            .enumerate()
            .map(|(i, v)| match names.get(i) {
                Some(name) => format!("{name} -> {v}"),
                None => format!("f{i} -> {v}"),
            })
            .collect();
        format!("{{ {} }}", parts.join(", "))
    }
}

fn difference_step(value: f64) -> f64 {
    DIFFERENCE_STEP * value.abs().max(1.0)
}

/// Rolls a starting point down the potential to a local minimum.
pub trait GradientMinimizer {
    /// Temperature at which subsequent minimizations evaluate the potential.
    fn set_temperature(&mut self, temperature: f64);

    fn temperature(&self) -> f64;

    /// Returns the minimum reached from `starting_point`. A minimum with a
    /// non-finite value or error signals a numerical failure that the caller
    /// may retry; `Err` is reserved for failures a retry cannot fix.
    fn minimize(
        &self,
        potential: &dyn PotentialFunction,
        starting_point: &[f64],
    ) -> Result<PotentialMinimum>;
}

/// Produces the candidate field configurations that get rolled to minima.
pub trait StartingPointFinder {
    fn find_starting_points(&mut self, potential: &dyn PotentialFunction)
        -> Result<Vec<Vec<f64>>>;
}

/// Computes bounce actions between two vacua.
pub trait BounceActionSolver {
    /// Called once per tunneling request before any action is computed, e.g. to
    /// materialise the potential for an external program.
    fn prepare_common_extras(&mut self, _potential: &dyn PotentialFunction) -> Result<()> {
        Ok(()) // Default no-op
    }

    /// The dimensionless O(4) action at zero temperature, or the dimensionful
    /// O(3) action (GeV) at a non-zero temperature.
    fn bounce_action(
        &mut self,
        potential: &dyn PotentialFunction,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
        temperature: f64,
    ) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bowl {
        names: Vec<String>,
        origin: Vec<f64>,
    }

    impl PotentialFunction for Bowl {
        fn field_names(&self) -> &[String] {
            &self.names
        }
        fn evaluate(&self, x: &[f64], temperature: f64) -> f64 {
            x[0] * x[0] + 3.0 * x[0] * x[1] + 2.0 * x[1] * x[1] * x[1] + temperature
        }
        fn field_values_origin(&self) -> &[f64] {
            &self.origin
        }
        fn dsb_field_values(&self) -> &[f64] {
            &self.origin
        }
        fn scale_squared_relevant_to_tunneling(
            &self,
            _false_vacuum: &PotentialMinimum,
            _true_vacuum: &PotentialMinimum,
        ) -> f64 {
            1.0
        }
    }

    fn bowl() -> Bowl {
        Bowl {
            names: vec!["x".to_string(), "y".to_string()],
            origin: vec![0.0, 0.0],
        }
    }

    #[test]
    fn finite_difference_gradient_matches_analytic() {
        let potential = bowl();
        let mut grad = vec![0.0; 2];
        potential.gradient(&[1.0, 2.0], 0.0, &mut grad);
        assert!((grad[0] - 8.0).abs() < 1e-6);
        assert!((grad[1] - 27.0).abs() < 1e-5);
    }

    #[test]
    fn finite_difference_hessian_is_symmetric() {
        let potential = bowl();
        let hessian = potential.hessian(&[1.0, 2.0], 0.0);
        assert!((hessian[(0, 0)] - 2.0).abs() < 1e-3);
        assert!((hessian[(0, 1)] - 3.0).abs() < 1e-3);
        assert!((hessian[(1, 0)] - 3.0).abs() < 1e-3);
        assert!((hessian[(1, 1)] - 24.0).abs() < 1e-3);
    }

    #[test]
    fn description_names_fields() {
        let potential = bowl();
        assert_eq!(
            potential.field_configuration_description(&[1.0, -2.5]),
            "{ x -> 1, y -> -2.5 }"
        );
    }
}
