//! Tunneling from a false vacuum into a deeper one, quantum and thermal.
//!
//! [`BounceActionTunneler`] holds the results of the last request. Every
//! request starts by resetting them to [`NOT_CALCULATED`], so a failed
//! request never leaks numbers into the next one.

mod quantum;
mod thermal;

pub use quantum::{quantum_decay, QuantumDecay};
pub use thermal::{
    bracket_critical_temperature, below_critical_temperature, find_dominant_temperature,
    DominantTemperature, TemperatureRange,
};

use crate::constants::NOT_CALCULATED;
use crate::error::{VacuumError, VacuumResult};
use crate::minimum::PotentialMinimum;
use crate::traits::{BounceActionSolver, GradientMinimizer, PotentialFunction};
use crate::warnings::WarningLog;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TunnelingStrategy {
    NoTunneling,
    JustQuantum,
    JustThermal,
    /// Thermal tunneling only runs if the quantum survival probability is
    /// above the threshold.
    QuantumThenThermal,
    /// Quantum tunneling only runs if the thermal survival probability is
    /// above the threshold.
    ThermalThenQuantum,
    /// No valid strategy was given. Behaves as `NoTunneling` with a warning.
    Unset,
}

impl TunnelingStrategy {
    /// Parses a strategy name; anything unrecognized becomes `Unset`.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "NoTunneling" => TunnelingStrategy::NoTunneling,
            "JustQuantum" | "QuantumOnly" => TunnelingStrategy::JustQuantum,
            "JustThermal" | "ThermalOnly" => TunnelingStrategy::JustThermal,
            "QuantumThenThermal" => TunnelingStrategy::QuantumThenThermal,
            "ThermalThenQuantum" => TunnelingStrategy::ThermalThenQuantum,
            _ => TunnelingStrategy::Unset,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TunnelingStrategy::NoTunneling => "NoTunneling",
            TunnelingStrategy::JustQuantum => "JustQuantum",
            TunnelingStrategy::JustThermal => "JustThermal",
            TunnelingStrategy::QuantumThenThermal => "QuantumThenThermal",
            TunnelingStrategy::ThermalThenQuantum => "ThermalThenQuantum",
            TunnelingStrategy::Unset => "Unset",
        }
    }
}

impl FromStr for TunnelingStrategy {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl fmt::Display for TunnelingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Default for TunnelingStrategy {
    fn default() -> Self {
        TunnelingStrategy::QuantumThenThermal
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DominantTemperatureSettings {
    /// Temperatures sampled geometrically across the thermal window.
    pub samples: usize,
    /// Lower end of the window as a fraction of its upper end.
    pub lowest_fraction: f64,
    /// Golden-section steps around the best sample.
    pub refinement_steps: usize,
}

impl Default for DominantTemperatureSettings {
    fn default() -> Self {
        Self {
            samples: 8,
            lowest_fraction: 0.01,
            refinement_steps: 12,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TunnelingSettings {
    pub strategy: TunnelingStrategy,
    pub survival_probability_threshold: f64,
    /// Geometric bisection steps when bracketing a critical temperature.
    pub temperature_accuracy: u32,
    /// A false vacuum closer to the origin than this fraction of its distance
    /// to the true vacuum counts as sitting at the origin.
    pub vacuum_separation_fraction: f64,
    pub max_temperature_halvings: usize,
    pub dominant_temperature: DominantTemperatureSettings,
}

impl Default for TunnelingSettings {
    fn default() -> Self {
        Self {
            strategy: TunnelingStrategy::default(),
            survival_probability_threshold: 0.01,
            temperature_accuracy: 7,
            vacuum_separation_fraction: 0.2,
            max_temperature_halvings: 200,
            dominant_temperature: DominantTemperatureSettings::default(),
        }
    }
}

impl TunnelingSettings {
    fn validate(&self) -> VacuumResult<()> {
        let invalid = |message: &str| Err(VacuumError::InvalidSettings(message.to_string()));
        if !(0.0..=1.0).contains(&self.survival_probability_threshold) {
            return invalid("survival_probability_threshold must lie in [0, 1].");
        }
        if !(self.vacuum_separation_fraction >= 0.0) {
            return invalid("vacuum_separation_fraction must be non-negative.");
        }
        if self.max_temperature_halvings == 0 {
            return invalid("max_temperature_halvings must be greater than zero.");
        }
        if self.dominant_temperature.samples < 2 {
            return invalid("dominant_temperature.samples must be at least 2.");
        }
        let fraction = self.dominant_temperature.lowest_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return invalid("dominant_temperature.lowest_fraction must lie in (0, 1).");
        }
        Ok(())
    }
}

/// Results of one tunneling request. Anything not calculated is −1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TunnelingResult {
    pub quantum_survival_probability: f64,
    pub quantum_lifetime_seconds: f64,
    pub thermal_survival_probability: f64,
    /// Decay rate per unit volume at the dominant temperature (GeV⁴).
    pub partial_thermal_decay_width: f64,
    pub dominant_temperature: f64,
}

impl TunnelingResult {
    pub fn not_calculated() -> Self {
        Self {
            quantum_survival_probability: NOT_CALCULATED,
            quantum_lifetime_seconds: NOT_CALCULATED,
            thermal_survival_probability: NOT_CALCULATED,
            partial_thermal_decay_width: NOT_CALCULATED,
            dominant_temperature: NOT_CALCULATED,
        }
    }

    /// The survival probabilities that were actually calculated.
    pub fn calculated_survival_probabilities(&self) -> Vec<f64> {
        [
            self.quantum_survival_probability,
            self.thermal_survival_probability,
        ]
        .into_iter()
        .filter(|p| *p != NOT_CALCULATED)
        .collect()
    }
}

impl Default for TunnelingResult {
    fn default() -> Self {
        Self::not_calculated()
    }
}

/// Turns bounce actions from a [`BounceActionSolver`] into survival
/// probabilities according to a [`TunnelingStrategy`].
///
/// The minimizer follows both vacua to their minima at each temperature the
/// thermal calculation samples; the solver only ever sees vacua that are
/// minima at the temperature it is asked about.
pub struct BounceActionTunneler<B, M> {
    settings: TunnelingSettings,
    solver: B,
    thermal_minimizer: M,
    warnings: WarningLog,
    result: TunnelingResult,
    log_of_minus_log_of_thermal_probability: f64,
}

impl<B: BounceActionSolver, M: GradientMinimizer> BounceActionTunneler<B, M> {
    pub fn new(
        settings: TunnelingSettings,
        solver: B,
        thermal_minimizer: M,
        warnings: WarningLog,
    ) -> Self {
        Self {
            settings,
            solver,
            thermal_minimizer,
            warnings,
            result: TunnelingResult::not_calculated(),
            log_of_minus_log_of_thermal_probability: f64::NAN,
        }
    }

    pub fn settings(&self) -> &TunnelingSettings {
        &self.settings
    }

    pub fn set_strategy(&mut self, strategy: TunnelingStrategy) {
        self.settings.strategy = strategy;
    }

    pub fn solver(&self) -> &B {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut B {
        &mut self.solver
    }

    pub fn thermal_minimizer(&self) -> &M {
        &self.thermal_minimizer
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    pub fn result(&self) -> &TunnelingResult {
        &self.result
    }

    pub fn quantum_survival_probability(&self) -> f64 {
        self.result.quantum_survival_probability
    }

    pub fn quantum_lifetime_seconds(&self) -> f64 {
        self.result.quantum_lifetime_seconds
    }

    pub fn thermal_survival_probability(&self) -> f64 {
        self.result.thermal_survival_probability
    }

    pub fn partial_thermal_decay_width(&self) -> f64 {
        self.result.partial_thermal_decay_width
    }

    pub fn dominant_temperature(&self) -> f64 {
        self.result.dominant_temperature
    }

    /// `ln(−ln P_thermal)` from the last thermal calculation, kept consistent
    /// with the survival probability: `+∞` when the false vacuum could not
    /// have been reached from the symmetric phase (P = 0), `−∞` when there
    /// is no thermal tunneling (P = 1), NaN if no thermal calculation ran.
    pub fn log_of_minus_log_of_thermal_probability(&self) -> f64 {
        self.log_of_minus_log_of_thermal_probability
    }

    /// Calculates tunneling from `false_vacuum` to `true_vacuum` with the
    /// configured strategy.
    ///
    /// Fails with [`VacuumError::InvalidTunnelingRequest`] unless the true
    /// vacuum is strictly deeper at zero temperature.
    pub fn calculate_tunneling(
        &mut self,
        potential: &dyn PotentialFunction,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
    ) -> VacuumResult<TunnelingResult> {
        let dim = potential.number_of_fields();
        for vacuum in [false_vacuum, true_vacuum] {
            if vacuum.number_of_fields() != dim {
                return Err(VacuumError::DimensionMismatch {
                    expected: dim,
                    got: vacuum.number_of_fields(),
                });
            }
        }
        let false_value = potential.evaluate(false_vacuum.field_configuration(), 0.0);
        let true_value = potential.evaluate(true_vacuum.field_configuration(), 0.0);
        if !(true_value < false_value) {
            return Err(VacuumError::InvalidTunnelingRequest {
                false_vacuum: false_vacuum.field_configuration().to_vec(),
                true_vacuum: true_vacuum.field_configuration().to_vec(),
                false_value,
                true_value,
            });
        }

        self.result = TunnelingResult::not_calculated();
        self.log_of_minus_log_of_thermal_probability = f64::NAN;
        self.settings.validate()?;

        let threshold = self.settings.survival_probability_threshold;
        match self.settings.strategy {
            TunnelingStrategy::NoTunneling => {
                log::info!("Not tunneling as tunneling strategy is \"NoTunneling\".");
                return Ok(self.result);
            }
            TunnelingStrategy::Unset => {
                self.warnings.log_warning(
                    "No valid tunneling strategy was set, so treating it as \"NoTunneling\".",
                );
                return Ok(self.result);
            }
            _ => {}
        }

        self.solver.prepare_common_extras(potential)?;
        match self.settings.strategy {
            TunnelingStrategy::JustQuantum => {
                self.calculate_quantum_tunneling(potential, false_vacuum, true_vacuum)?;
            }
            TunnelingStrategy::JustThermal => {
                self.calculate_thermal_tunneling(potential, false_vacuum, true_vacuum)?;
            }
            TunnelingStrategy::QuantumThenThermal => {
                self.calculate_quantum_tunneling(potential, false_vacuum, true_vacuum)?;
                if self.result.quantum_survival_probability > threshold {
                    self.calculate_thermal_tunneling(potential, false_vacuum, true_vacuum)?;
                }
            }
            TunnelingStrategy::ThermalThenQuantum => {
                self.calculate_thermal_tunneling(potential, false_vacuum, true_vacuum)?;
                if self.result.thermal_survival_probability > threshold {
                    self.calculate_quantum_tunneling(potential, false_vacuum, true_vacuum)?;
                }
            }
            TunnelingStrategy::NoTunneling | TunnelingStrategy::Unset => {}
        }
        Ok(self.result)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{FrozenVacua, Quadratic, ScriptedBounce};
    use super::*;

    fn vacua() -> (PotentialMinimum, PotentialMinimum) {
        (
            PotentialMinimum::new(vec![0.0], 0.0, 0.0),
            PotentialMinimum::new(vec![1.0], -1.0, 0.0),
        )
    }

    // V(0) = 0 and V(1) = -1 at T = 0.
    fn tilted() -> Quadratic {
        Quadratic::new(0.0, -1.0, 0.0, 0.0)
    }

    fn tunneler(
        strategy: TunnelingStrategy,
        action: fn(f64) -> f64,
    ) -> BounceActionTunneler<ScriptedBounce, FrozenVacua> {
        let settings = TunnelingSettings {
            strategy,
            ..TunnelingSettings::default()
        };
        BounceActionTunneler::new(
            settings,
            ScriptedBounce::new(action),
            FrozenVacua::default(),
            WarningLog::new(),
        )
    }

    #[test]
    fn no_tunneling_leaves_every_result_unset() {
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::NoTunneling, |_| 100.0);
        let result = tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert_eq!(result, TunnelingResult::not_calculated());
        assert_eq!(tunneler.quantum_survival_probability(), -1.0);
        assert_eq!(tunneler.quantum_lifetime_seconds(), -1.0);
        assert_eq!(tunneler.thermal_survival_probability(), -1.0);
        assert_eq!(tunneler.partial_thermal_decay_width(), -1.0);
        assert_eq!(*tunneler.solver().prepared.borrow(), 0);
        assert!(tunneler.solver().temperatures.borrow().is_empty());
    }

    #[test]
    fn equal_depth_is_a_fatal_error() {
        let flat = Quadratic::new(0.0, 0.0, 0.0, 0.0);
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::JustQuantum, |_| 100.0);
        let err = tunneler
            .calculate_tunneling(&flat, &false_vacuum, &true_vacuum)
            .expect_err("equal depth");
        assert!(matches!(err, VacuumError::InvalidTunnelingRequest { .. }));
        assert!(tunneler.solver().temperatures.borrow().is_empty());
    }

    #[test]
    fn unset_strategy_warns_and_does_nothing() {
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::from_name("Sideways"), |_| 100.0);
        let result = tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert_eq!(result, TunnelingResult::not_calculated());
        assert_eq!(tunneler.warnings().len(), 1);
    }

    #[test]
    fn prepare_hook_runs_once_per_request() {
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::JustQuantum, |_| 100.0);
        tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("first");
        tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("second");
        assert_eq!(*tunneler.solver().prepared.borrow(), 2);
        assert_eq!(*tunneler.solver().temperatures.borrow(), vec![0.0, 0.0]);
    }

    #[test]
    fn quantum_then_thermal_skips_thermal_when_quantum_is_fatal() {
        let (false_vacuum, true_vacuum) = vacua();
        // A tiny action means the quantum decay already happened.
        let mut tunneler = tunneler(TunnelingStrategy::QuantumThenThermal, |_| 10.0);
        let result = tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert_eq!(result.quantum_survival_probability, 0.0);
        assert_eq!(result.thermal_survival_probability, -1.0);
        assert_eq!(result.dominant_temperature, -1.0);
        assert_eq!(tunneler.solver().temperatures.borrow().len(), 1);
    }

    #[test]
    fn quantum_then_thermal_runs_thermal_when_quantum_survives() {
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::QuantumThenThermal, |_| 1000.0);
        let result = tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert_eq!(result.quantum_survival_probability, 1.0);
        assert!(result.thermal_survival_probability >= 0.0);
        assert!(tunneler.solver().temperatures.borrow().len() > 1);
    }

    #[test]
    fn thermal_then_quantum_skips_quantum_when_thermal_is_fatal() {
        let (_, true_vacuum) = vacua();
        // False vacuum above the origin at T = 0: thermal survival is zero.
        let raised = Quadratic::new(0.0, -1.0, 0.0, 0.0);
        let false_vacuum = PotentialMinimum::new(vec![-5.0], 5.0, 0.0);
        let mut tunneler = tunneler(TunnelingStrategy::ThermalThenQuantum, |_| 1000.0);
        let result = tunneler
            .calculate_tunneling(&raised, &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert_eq!(result.thermal_survival_probability, 0.0);
        assert_eq!(result.dominant_temperature, 0.0);
        assert_eq!(result.quantum_survival_probability, -1.0);
        assert!(tunneler.solver().temperatures.borrow().is_empty());
    }

    #[test]
    fn thermal_then_quantum_runs_quantum_when_thermal_survives() {
        // V = −φ + T²φ²/100 and S = 3000 at every temperature: S₃/T ≥ 300 in the
        // window below T = 10, so the thermal survival probability is close to one.
        let potential = Quadratic::new(0.0, -1.0, 0.01, 0.0);
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::ThermalThenQuantum, |_| 3000.0);
        let result = tunneler
            .calculate_tunneling(&potential, &false_vacuum, &true_vacuum)
            .expect("tunneling");
        assert!(result.thermal_survival_probability > 0.99);
        assert_eq!(result.quantum_survival_probability, 1.0);
        assert_eq!(result.quantum_lifetime_seconds, 1e100);
        let temperatures = tunneler.solver().temperatures.borrow();
        assert_eq!(temperatures.last(), Some(&0.0));
        assert!(temperatures[..temperatures.len() - 1].iter().all(|&t| t > 0.0));
    }

    #[test]
    fn results_are_reset_between_requests() {
        let (false_vacuum, true_vacuum) = vacua();
        let mut tunneler = tunneler(TunnelingStrategy::JustQuantum, |_| 1000.0);
        tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("quantum");
        assert_eq!(tunneler.quantum_survival_probability(), 1.0);
        tunneler.set_strategy(TunnelingStrategy::NoTunneling);
        tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect("none");
        assert_eq!(tunneler.quantum_survival_probability(), -1.0);
    }

    #[test]
    fn strategy_names_round_trip() {
        for strategy in [
            TunnelingStrategy::NoTunneling,
            TunnelingStrategy::JustQuantum,
            TunnelingStrategy::JustThermal,
            TunnelingStrategy::QuantumThenThermal,
            TunnelingStrategy::ThermalThenQuantum,
        ] {
            assert_eq!(strategy.name().parse::<TunnelingStrategy>(), Ok(strategy));
        }
        assert_eq!(TunnelingStrategy::from_name(""), TunnelingStrategy::Unset);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let (false_vacuum, true_vacuum) = vacua();
        let settings = TunnelingSettings {
            survival_probability_threshold: 2.0,
            ..TunnelingSettings::default()
        };
        let mut tunneler = BounceActionTunneler::new(
            settings,
            ScriptedBounce::new(|_| 1.0),
            FrozenVacua::default(),
            WarningLog::new(),
        );
        let err = tunneler
            .calculate_tunneling(&tilted(), &false_vacuum, &true_vacuum)
            .expect_err("bad threshold");
        assert!(format!("{err}").contains("survival_probability_threshold"));
    }
}
