//! Stability runner exposed to JavaScript.

use anyhow::{Context, Result};
use serde_wasm_bindgen::{from_value, to_value};
use vacuum_core::bounce::ThinWallBounceAction;
use vacuum_core::minimizer::DescentMinimizer;
use vacuum_core::potential::ExpressionPotential;
use vacuum_core::selector::PanicVacuumChoice;
use vacuum_core::starting_points::StationaryPointScan;
use vacuum_core::traits::PotentialFunction;
use vacuum_core::tunneling::TunnelingStrategy;
use vacuum_core::warnings::WarningLog;
use vacuum_core::{StabilitySettings, VacuumStability};
use wasm_bindgen::prelude::*;

type StockStability = VacuumStability<StationaryPointScan, DescentMinimizer, ThinWallBounceAction>;

#[wasm_bindgen]
pub struct WasmVacuumStability {
    potential: ExpressionPotential,
    engine: StockStability,
}

impl WasmVacuumStability {
    fn build(
        expression: &str,
        field_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        dsb_field_values: Vec<f64>,
        settings: StabilitySettings,
    ) -> Result<Self> {
        let potential =
            ExpressionPotential::new(expression, field_names, param_names, params, dsb_field_values)
                .context("Invalid potential")?;
        Ok(Self {
            potential,
            engine: VacuumStability::from_settings(&settings, WarningLog::new()),
        })
    }

    fn update_params(&mut self, params: Vec<f64>) -> Result<()> {
        self.potential.set_params(params)?;
        self.engine.reset_for_new_point();
        Ok(())
    }

    fn update_dsb_field_values(&mut self, dsb_field_values: Vec<f64>) -> Result<()> {
        self.potential.set_dsb_field_values(dsb_field_values)?;
        self.engine.reset_for_new_point();
        Ok(())
    }
}

fn to_js<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

#[wasm_bindgen]
impl WasmVacuumStability {
    /// `settings` may be `undefined`, in which case the defaults are used.
    #[wasm_bindgen(constructor)]
    pub fn new(
        expression: &str,
        field_names: Vec<String>,
        param_names: Vec<String>,
        params: Vec<f64>,
        dsb_field_values: Vec<f64>,
        settings: JsValue,
    ) -> Result<WasmVacuumStability, JsValue> {
        console_error_panic_hook::set_once();

        let settings: StabilitySettings = if settings.is_undefined() || settings.is_null() {
            StabilitySettings::default()
        } else {
            from_value(settings).map_err(|e| JsValue::from_str(&format!("Invalid settings: {}", e)))?
        };
        Self::build(
            expression,
            field_names,
            param_names,
            params,
            dsb_field_values,
            settings,
        )
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))
    }

    /// Moves to a new parameter point; cached starting points are dropped.
    pub fn set_params(&mut self, params: Vec<f64>) -> Result<(), JsValue> {
        self.update_params(params)
            .map_err(|e| JsValue::from_str(&format!("{}", e)))
    }

    pub fn set_dsb_field_values(&mut self, dsb_field_values: Vec<f64>) -> Result<(), JsValue> {
        self.update_dsb_field_values(dsb_field_values)
            .map_err(|e| JsValue::from_str(&format!("{}", e)))
    }

    /// Unknown names select no tunneling calculation at all.
    pub fn set_strategy(&mut self, name: &str) {
        self.engine
            .tunneler_mut()
            .set_strategy(TunnelingStrategy::from_name(name));
    }

    pub fn set_global_is_panic(&mut self, global_is_panic: bool) {
        self.engine
            .selector_mut()
            .set_panic_vacuum_choice(PanicVacuumChoice::from_global_flag(global_is_panic));
    }

    pub fn evaluate_potential(&self, fields: Vec<f64>, temperature: f64) -> Result<f64, JsValue> {
        let dim = self.potential.number_of_fields();
        if fields.len() != dim {
            return Err(JsValue::from_str(&format!(
                "Field dimension mismatch. Expected {}, got {}.",
                dim,
                fields.len()
            )));
        }
        Ok(self.potential.evaluate(&fields, temperature))
    }

    pub fn find_minima(&mut self, temperature: f64) -> Result<JsValue, JsValue> {
        let classification = self
            .engine
            .selector_mut()
            .find_minima(&self.potential, temperature)
            .map_err(|e| JsValue::from_str(&format!("Minimum search failed: {}", e)))?;
        to_js(&classification)
    }

    pub fn evaluate(&mut self) -> Result<JsValue, JsValue> {
        let report = self
            .engine
            .evaluate(&self.potential)
            .map_err(|e| JsValue::from_str(&format!("Stability evaluation failed: {}", e)))?;
        to_js(&report)
    }

    /// Warnings not yet collected by `evaluate`.
    pub fn warnings(&self) -> Vec<String> {
        self.engine.warnings().entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacuum_core::Verdict;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn build_runner(dsb: f64) -> WasmVacuumStability {
        WasmVacuumStability::build(
            "l * (x^4 / 4 + 100 * x^3 / 3 - 10000 * x^2) + c * T^2 * x^2",
            names(&["x"]),
            names(&["l", "c"]),
            vec![1e-6, 1e-3],
            vec![dsb],
            StabilitySettings::default(),
        )
        .expect("runner")
    }

    #[test]
    fn build_rejects_bad_expression() {
        let err = WasmVacuumStability::build(
            "x *",
            names(&["x"]),
            vec![],
            vec![],
            vec![0.0],
            StabilitySettings::default(),
        )
        .err()
        .expect("parse failure");
        assert!(format!("{:#}", err).contains("Invalid potential"));
    }

    #[test]
    fn update_params_resets_the_cache() {
        let mut runner = build_runner(-200.0);
        runner.engine.evaluate(&runner.potential).expect("report");
        assert!(runner.engine.selector().starting_points().is_some());

        runner.update_params(vec![1e-6, 2e-3]).expect("params");
        assert!(runner.engine.selector().starting_points().is_none());
        assert!(runner.update_params(vec![1.0]).is_err());
    }

    #[test]
    fn stock_engine_reports_a_verdict() {
        let mut runner = build_runner(100.0);
        runner.update_dsb_field_values(vec![-200.0]).expect("dsb");
        let report = runner.engine.evaluate(&runner.potential).expect("report");
        assert_eq!(report.verdict, Verdict::Stable);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn constructor_rejects_dsb_dimension_mismatch() {
        let result = WasmVacuumStability::new(
            "x^2",
            vec!["x".to_string()],
            vec![],
            vec![],
            vec![0.0, 1.0],
            JsValue::UNDEFINED,
        );
        let message = result
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("DSB field values dimension mismatch"));
    }

    #[wasm_bindgen_test]
    fn evaluate_potential_checks_dimension() {
        let runner = WasmVacuumStability::new(
            "x^2",
            vec!["x".to_string()],
            vec![],
            vec![],
            vec![0.0],
            JsValue::UNDEFINED,
        )
        .expect("runner");
        assert_eq!(runner.evaluate_potential(vec![3.0], 0.0).expect("value"), 9.0);
        assert!(runner.evaluate_potential(vec![], 0.0).is_err());
    }
}
