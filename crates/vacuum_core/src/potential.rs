//! Potentials written as expressions over named fields.

use crate::autodiff::{seed_pair, HyperDual};
use crate::equation_engine::{compile_expression, Bytecode, VM};
use crate::minimum::PotentialMinimum;
use crate::traits::PotentialFunction;
use anyhow::{bail, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// How the scale entering the quantum tunneling prefactor is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunnelingScale {
    /// The larger squared distance of the two vacua from the origin.
    LargerVacuumLength,
    /// A fixed squared scale in GeV².
    Fixed { scale_squared: f64 },
}

impl Default for TunnelingScale {
    fn default() -> Self {
        TunnelingScale::LargerVacuumLength
    }
}

/// Smallest squared tunneling scale handed out (GeV²).
const MINIMUM_SCALE_SQUARED: f64 = 1.0;

/// A potential compiled from an expression such as
/// `lambda * (x^2 - v^2)^2 + c * T^2 * x^2`, where `T` is the temperature.
///
/// Derivatives are exact, computed with hyper-dual numbers through the same
/// bytecode. The evaluation stacks live behind `RefCell`, which makes the
/// potential `!Sync`: give each thread its own copy.
pub struct ExpressionPotential {
    expression: String,
    bytecode: Bytecode,
    field_names: Vec<String>,
    param_names: Vec<String>,
    params: Vec<f64>,
    dual_params: Vec<HyperDual>,
    dsb_field_values: Vec<f64>,
    field_origin: Vec<f64>,
    tunneling_scale: TunnelingScale,
    stack: RefCell<Vec<f64>>,
    dual_stack: RefCell<Vec<HyperDual>>,
}

impl ExpressionPotential {
    pub fn new(
        expression: &str,
        field_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        dsb_field_values: Vec<f64>,
    ) -> Result<Self> {
        if field_names.is_empty() {
            bail!("Potential needs at least one field.");
        }
        if dsb_field_values.len() != field_names.len() {
            bail!(
                "DSB field values dimension mismatch. Expected {}, got {}.",
                field_names.len(),
                dsb_field_values.len()
            );
        }
        if params.len() != param_names.len() {
            bail!(
                "Parameter count mismatch. Expected {}, got {}.",
                param_names.len(),
                params.len()
            );
        }
        let bytecode = compile_expression(expression, &field_names, &param_names)?;
        let dual_params = params.iter().map(|&p| HyperDual::constant(p)).collect();
        let field_origin = vec![0.0; field_names.len()];
        Ok(Self {
            expression: expression.to_string(),
            bytecode,
            field_names,
            param_names,
            params,
            dual_params,
            dsb_field_values,
            field_origin,
            tunneling_scale: TunnelingScale::default(),
            stack: RefCell::new(Vec::with_capacity(64)),
            dual_stack: RefCell::new(Vec::with_capacity(64)),
        })
    }

    pub fn with_tunneling_scale(mut self, tunneling_scale: TunnelingScale) -> Self {
        self.tunneling_scale = tunneling_scale;
        self
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    /// Replaces the parameter values, e.g. when moving to a new parameter point.
    pub fn set_params(&mut self, params: Vec<f64>) -> Result<()> {
        if params.len() != self.param_names.len() {
            bail!(
                "Parameter count mismatch. Expected {}, got {}.",
                self.param_names.len(),
                params.len()
            );
        }
        self.dual_params = params.iter().map(|&p| HyperDual::constant(p)).collect();
        self.params = params;
        Ok(())
    }

    pub fn set_dsb_field_values(&mut self, dsb_field_values: Vec<f64>) -> Result<()> {
        if dsb_field_values.len() != self.field_names.len() {
            bail!(
                "DSB field values dimension mismatch. Expected {}, got {}.",
                self.field_names.len(),
                dsb_field_values.len()
            );
        }
        self.dsb_field_values = dsb_field_values;
        Ok(())
    }

    fn evaluate_dual(&self, fields: &[HyperDual], temperature: f64) -> HyperDual {
        let mut stack = self.dual_stack.borrow_mut();
        VM::execute(
            &self.bytecode,
            fields,
            &self.dual_params,
            HyperDual::constant(temperature),
            &mut stack,
        )
    }
}

impl PotentialFunction for ExpressionPotential {
    fn field_names(&self) -> &[String] {
        &self.field_names
    }

    fn evaluate(&self, field_configuration: &[f64], temperature: f64) -> f64 {
        if field_configuration.len() != self.field_names.len() {
            return f64::NAN;
        }
        let mut stack = self.stack.borrow_mut();
        VM::execute(
            &self.bytecode,
            field_configuration,
            &self.params,
            temperature,
            &mut stack,
        )
    }

    fn field_values_origin(&self) -> &[f64] {
        &self.field_origin
    }

    fn dsb_field_values(&self) -> &[f64] {
        &self.dsb_field_values
    }

    fn scale_squared_relevant_to_tunneling(
        &self,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
    ) -> f64 {
        match self.tunneling_scale {
            TunnelingScale::LargerVacuumLength => false_vacuum
                .length_squared()
                .max(true_vacuum.length_squared())
                .max(MINIMUM_SCALE_SQUARED),
            TunnelingScale::Fixed { scale_squared } => scale_squared,
        }
    }

    fn gradient(&self, field_configuration: &[f64], temperature: f64, out: &mut [f64]) {
        let dim = self.field_names.len();
        let mut seeded = vec![HyperDual::constant(0.0); dim];
        for i in 0..dim {
            seed_pair(field_configuration, i, i, &mut seeded);
            out[i] = self.evaluate_dual(&seeded, temperature).e1;
        }
    }

    fn hessian(&self, field_configuration: &[f64], temperature: f64) -> DMatrix<f64> {
        let dim = self.field_names.len();
        let mut hessian = DMatrix::zeros(dim, dim);
        let mut seeded = vec![HyperDual::constant(0.0); dim];
        for i in 0..dim {
            for j in i..dim {
                seed_pair(field_configuration, i, j, &mut seeded);
                let value = self.evaluate_dual(&seeded, temperature).e12;
                hessian[(i, j)] = value;
                hessian[(j, i)] = value;
            }
        }
        hessian
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn mexican_hat() -> ExpressionPotential {
        ExpressionPotential::new(
            "lambda * (h^2 + s^2 - v^2)^2 + 0.1 * T^2 * (h^2 + s^2)",
            names(&["h", "s"]),
            names(&["lambda", "v"]),
            vec![0.5, 2.0],
            vec![2.0, 0.0],
        )
        .expect("potential should build")
    }

    #[test]
    fn evaluates_with_temperature() {
        let potential = mexican_hat();
        assert_eq!(potential.evaluate(&[2.0, 0.0], 0.0), 0.0);
        assert_eq!(potential.evaluate(&[0.0, 0.0], 0.0), 8.0);
        assert!((potential.evaluate(&[2.0, 0.0], 10.0) - 40.0).abs() < 1e-12);
    }

    #[test]
    fn exact_gradient_and_hessian() {
        let potential = mexican_hat();
        let point = [1.0, 1.0];
        let mut grad = vec![0.0; 2];
        potential.gradient(&point, 0.0, &mut grad);
        // dV/dh = 4 lambda h (h^2 + s^2 - v^2) = 2 * (2 - 4) = -4
        assert!((grad[0] + 4.0).abs() < 1e-12);
        assert!((grad[1] + 4.0).abs() < 1e-12);
        let hessian = potential.hessian(&point, 0.0);
        // d2V/dh2 = 2 lambda (3h^2 + s^2 - v^2) * 2 / 2 = 2 * (3 + 1 - 4) = 0
        assert!(hessian[(0, 0)].abs() < 1e-12);
        // d2V/dh ds = 8 lambda h s = 4
        assert!((hessian[(0, 1)] - 4.0).abs() < 1e-12);
        assert_eq!(hessian[(0, 1)], hessian[(1, 0)]);
    }

    #[test]
    fn tunneling_scale_uses_larger_vacuum() {
        let potential = mexican_hat();
        let a = PotentialMinimum::new(vec![2.0, 0.0], 0.0, 0.0);
        let b = PotentialMinimum::new(vec![0.0, 3.0], -1.0, 0.0);
        assert_eq!(potential.scale_squared_relevant_to_tunneling(&a, &b), 9.0);
        let fixed = mexican_hat().with_tunneling_scale(TunnelingScale::Fixed {
            scale_squared: 100.0,
        });
        assert_eq!(fixed.scale_squared_relevant_to_tunneling(&a, &b), 100.0);
    }

    #[test]
    fn rejects_mismatched_inputs() {
        let err = ExpressionPotential::new("x", names(&["x"]), vec![], vec![], vec![1.0, 2.0])
            .err()
            .expect("dimension mismatch");
        assert!(format!("{err}").contains("Expected 1, got 2"));
        assert!(ExpressionPotential::new("x + y", names(&["x"]), vec![], vec![], vec![1.0]).is_err());
    }

    #[test]
    fn set_params_changes_evaluation() {
        let mut potential = mexican_hat();
        potential.set_params(vec![1.0, 2.0]).expect("params");
        assert_eq!(potential.evaluate(&[0.0, 0.0], 0.0), 16.0);
        assert!(potential.set_params(vec![1.0]).is_err());
    }

    #[test]
    fn wrong_length_configuration_is_nan() {
        assert!(mexican_hat().evaluate(&[1.0], 0.0).is_nan());
    }
}
