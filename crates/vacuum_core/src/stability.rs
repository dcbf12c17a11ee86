//! Full evaluation of one parameter point: find the vacua, then tunnel from
//! the DSB vacuum to the active panic vacuum if there is one.

use crate::bounce::{ThinWallBounceAction, ThinWallSettings};
use crate::error::VacuumResult;
use crate::minimizer::{DescentMinimizer, DescentSettings};
use crate::minimum::PotentialMinimum;
use crate::selector::{SelectorSettings, VacuumClassification, VacuumSelector};
use crate::starting_points::{ScanSettings, StationaryPointScan};
use crate::traits::{BounceActionSolver, GradientMinimizer, PotentialFunction, StartingPointFinder};
use crate::tunneling::{BounceActionTunneler, TunnelingResult, TunnelingSettings};
use crate::warnings::WarningLog;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// No minimum deeper than the DSB vacuum was found.
    Stable,
    /// Deeper minima exist but every calculated survival probability is above
    /// the threshold.
    Metastable,
    ShortLived,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityReport {
    pub reference_vacuum: PotentialMinimum,
    pub reference_at_origin: bool,
    pub panic_vacua: Vec<PotentialMinimum>,
    pub active_panic_vacuum: Option<PotentialMinimum>,
    pub tunneling: TunnelingResult,
    pub verdict: Verdict,
    /// Warnings recorded since the previous report.
    pub warnings: Vec<String>,
}

/// Settings for the stock pipeline built by [`VacuumStability::from_settings`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilitySettings {
    pub selector: SelectorSettings,
    pub tunneling: TunnelingSettings,
    pub descent: DescentSettings,
    pub scan: ScanSettings,
    pub thin_wall: ThinWallSettings,
}

pub struct VacuumStability<F, M, B> {
    selector: VacuumSelector<F, M>,
    tunneler: BounceActionTunneler<B, M>,
    warnings: WarningLog,
}

impl VacuumStability<StationaryPointScan, DescentMinimizer, ThinWallBounceAction> {
    /// Stationary-point scan, descent minimizer and thin-wall actions.
    pub fn from_settings(settings: &StabilitySettings, warnings: WarningLog) -> Self {
        Self::new(
            settings.selector,
            settings.tunneling,
            StationaryPointScan::new(settings.scan),
            DescentMinimizer::new(settings.descent),
            ThinWallBounceAction::new(settings.thin_wall),
            warnings,
        )
    }
}

impl Default for VacuumStability<StationaryPointScan, DescentMinimizer, ThinWallBounceAction> {
    /// Stock pipeline with default settings, reporting to [`WarningLog::global`].
    fn default() -> Self {
        Self::from_settings(&StabilitySettings::default(), WarningLog::global().clone())
    }
}

impl<F, M, B> VacuumStability<F, M, B>
where
    F: StartingPointFinder,
    M: GradientMinimizer + Clone,
    B: BounceActionSolver,
{
    /// The tunneler gets its own copy of `minimizer` to follow the vacua to
    /// finite temperature.
    pub fn new(
        selector_settings: SelectorSettings,
        tunneling_settings: TunnelingSettings,
        finder: F,
        minimizer: M,
        solver: B,
        warnings: WarningLog,
    ) -> Self {
        Self {
            tunneler: BounceActionTunneler::new(
                tunneling_settings,
                solver,
                minimizer.clone(),
                warnings.clone(),
            ),
            selector: VacuumSelector::new(selector_settings, finder, minimizer, warnings.clone()),
            warnings,
        }
    }

    pub fn selector(&self) -> &VacuumSelector<F, M> {
        &self.selector
    }

    pub fn selector_mut(&mut self) -> &mut VacuumSelector<F, M> {
        &mut self.selector
    }

    pub fn tunneler(&self) -> &BounceActionTunneler<B, M> {
        &self.tunneler
    }

    pub fn tunneler_mut(&mut self) -> &mut BounceActionTunneler<B, M> {
        &mut self.tunneler
    }

    pub fn warnings(&self) -> &WarningLog {
        &self.warnings
    }

    /// Drops the cached starting points and any pending warnings before moving
    /// to another potential.
    pub fn reset_for_new_point(&mut self) {
        self.selector.reset_for_new_point();
        self.warnings.drain();
    }

    /// Warnings raised by a point that fails are discarded with it; they have
    /// already gone out through `log::warn!`.
    pub fn evaluate(&mut self, potential: &dyn PotentialFunction) -> VacuumResult<StabilityReport> {
        let outcome = self.classify_and_tunnel(potential);
        let warnings = self.warnings.drain();
        let (classification, tunneling, verdict) = outcome?;
        log::info!("Verdict: {verdict:?}");

        Ok(StabilityReport {
            reference_vacuum: classification.reference_vacuum,
            reference_at_origin: classification.reference_at_origin,
            panic_vacua: classification.panic_vacua,
            active_panic_vacuum: classification.active_panic_vacuum,
            tunneling,
            verdict,
            warnings,
        })
    }

    fn classify_and_tunnel(
        &mut self,
        potential: &dyn PotentialFunction,
    ) -> VacuumResult<(VacuumClassification, TunnelingResult, Verdict)> {
        let classification = self.selector.find_minima(potential, 0.0)?;

        let (tunneling, verdict) = match &classification.active_panic_vacuum {
            None => (TunnelingResult::not_calculated(), Verdict::Stable),
            Some(panic_vacuum) => {
                let result = self.tunneler.calculate_tunneling(
                    potential,
                    &classification.reference_vacuum,
                    panic_vacuum,
                )?;
                let threshold = self.tunneler.settings().survival_probability_threshold;
                let survives = result
                    .calculated_survival_probabilities()
                    .iter()
                    .all(|p| *p > threshold);
                let verdict = if survives {
                    Verdict::Metastable
                } else {
                    Verdict::ShortLived
                };
                (result, verdict)
            }
        };
        Ok((classification, tunneling, verdict))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::potential::ExpressionPotential;
    use crate::tunneling::TunnelingStrategy;
    use anyhow::Result;

    /// Minima at x = 100 (V ≈ −41.7) and x = −200 (V ≈ −266.7) with a maximum
    /// at the origin; `c·T²·x²` lifts both as the temperature rises.
    fn asymmetric_well(dsb: f64) -> ExpressionPotential {
        ExpressionPotential::new(
            "l * (x^4 / 4 + 100 * x^3 / 3 - 10000 * x^2) + c * T^2 * x^2",
            vec!["x".to_string()],
            vec!["l".to_string(), "c".to_string()],
            vec![1e-6, 1e-3],
            vec![dsb],
        )
        .expect("potential")
    }

    #[test]
    fn deepest_dsb_vacuum_is_stable() {
        let mut stability =
            VacuumStability::from_settings(&StabilitySettings::default(), WarningLog::new());
        let report = stability.evaluate(&asymmetric_well(-200.0)).expect("report");
        assert_eq!(report.verdict, Verdict::Stable);
        assert!(report.panic_vacua.is_empty());
        assert!((report.reference_vacuum.field_configuration()[0] + 200.0).abs() < 1e-6);
        assert_eq!(report.tunneling, TunnelingResult::not_calculated());
    }

    #[test]
    fn thick_barrier_is_metastable() {
        let mut stability =
            VacuumStability::from_settings(&StabilitySettings::default(), WarningLog::new());
        let report = stability.evaluate(&asymmetric_well(100.0)).expect("report");
        assert_eq!(report.verdict, Verdict::Metastable);
        let panic_vacuum = report.active_panic_vacuum.as_ref().expect("panic vacuum");
        assert!((panic_vacuum.field_configuration()[0] + 200.0).abs() < 1e-6);
        assert_eq!(report.tunneling.quantum_survival_probability, 1.0);
        assert_eq!(report.tunneling.quantum_lifetime_seconds, 1e100);
        assert_eq!(report.tunneling.thermal_survival_probability, 1.0);
        assert!(report.tunneling.dominant_temperature > 0.0);
        assert!(report.tunneling.dominant_temperature < 2.1);
        // Both clamps were reported.
        assert!(report.warnings.len() >= 2);
        assert!(stability.warnings().is_empty());
    }

    struct FixedAction(f64);

    impl BounceActionSolver for FixedAction {
        fn bounce_action(
            &mut self,
            _potential: &dyn PotentialFunction,
            _false_vacuum: &PotentialMinimum,
            _true_vacuum: &PotentialMinimum,
            _temperature: f64,
        ) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn small_action_is_short_lived() {
        let settings = StabilitySettings::default();
        let mut stability = VacuumStability::new(
            settings.selector,
            TunnelingSettings {
                strategy: TunnelingStrategy::JustQuantum,
                ..settings.tunneling
            },
            StationaryPointScan::new(settings.scan),
            DescentMinimizer::new(settings.descent),
            FixedAction(10.0),
            WarningLog::new(),
        );
        let report = stability.evaluate(&asymmetric_well(100.0)).expect("report");
        assert_eq!(report.verdict, Verdict::ShortLived);
        assert_eq!(report.tunneling.quantum_survival_probability, 0.0);
        assert_eq!(report.tunneling.thermal_survival_probability, -1.0);
    }

    #[test]
    fn reset_allows_a_new_point() {
        let mut stability =
            VacuumStability::from_settings(&StabilitySettings::default(), WarningLog::new());
        stability.evaluate(&asymmetric_well(-200.0)).expect("first point");
        assert!(stability.selector().starting_points().is_some());
        stability.reset_for_new_point();
        assert!(stability.selector().starting_points().is_none());
        let report = stability.evaluate(&asymmetric_well(100.0)).expect("second point");
        assert!(report
            .panic_vacua
            .iter()
            .all(|m| (m.field_configuration()[0] + 200.0).abs() < 1e-6));
        assert!(!report.panic_vacua.is_empty());
    }

    struct CrashingSolver(WarningLog);

    impl BounceActionSolver for CrashingSolver {
        fn bounce_action(
            &mut self,
            _potential: &dyn PotentialFunction,
            _false_vacuum: &PotentialMinimum,
            _true_vacuum: &PotentialMinimum,
            _temperature: f64,
        ) -> Result<f64> {
            self.0.log_warning("path deformation did not settle");
            anyhow::bail!("solver crashed")
        }
    }

    #[test]
    fn failed_point_leaves_no_warnings_behind() {
        let settings = StabilitySettings::default();
        let warnings = WarningLog::new();
        let mut stability = VacuumStability::new(
            settings.selector,
            TunnelingSettings {
                strategy: TunnelingStrategy::JustQuantum,
                ..settings.tunneling
            },
            StationaryPointScan::new(settings.scan),
            DescentMinimizer::new(settings.descent),
            CrashingSolver(warnings.clone()),
            warnings,
        );
        let err = stability
            .evaluate(&asymmetric_well(100.0))
            .expect_err("solver failure is fatal");
        assert!(format!("{err}").contains("solver crashed"));
        assert!(stability.warnings().is_empty());

        stability.reset_for_new_point();
        let report = stability.evaluate(&asymmetric_well(-200.0)).expect("next point");
        assert_eq!(report.verdict, Verdict::Stable);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn reset_discards_pending_warnings() {
        let mut stability =
            VacuumStability::from_settings(&StabilitySettings::default(), WarningLog::new());
        stability.warnings().log_warning("left over");
        stability.reset_for_new_point();
        assert!(stability.warnings().is_empty());
    }

    #[test]
    fn default_pipeline_reports_to_the_process_wide_log() {
        let stability = VacuumStability::default();
        stability
            .warnings()
            .log_warning("default pipeline reports to the process-wide log");
        assert!(WarningLog::global()
            .entries()
            .iter()
            .any(|w| w == "default pipeline reports to the process-wide log"));
    }

    #[test]
    fn dsb_at_the_origin_still_finds_a_distant_deeper_minimum() {
        let potential = ExpressionPotential::new(
            "0.01 * x^2 * (x - 10)^2 - 0.1 * x",
            vec!["x".to_string()],
            Vec::new(),
            Vec::new(),
            vec![0.0],
        )
        .expect("potential");
        let mut stability =
            VacuumStability::from_settings(&StabilitySettings::default(), WarningLog::new());
        let report = stability.evaluate(&potential).expect("report");
        assert_ne!(report.verdict, Verdict::Stable);
        let panic_vacuum = report.active_panic_vacuum.as_ref().expect("panic vacuum");
        assert!(panic_vacuum.field_configuration()[0] > 9.0);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let json = r#"{
            "tunneling": {
                "strategy": "JustThermal",
                "survival_probability_threshold": 0.1,
                "temperature_accuracy": 7,
                "vacuum_separation_fraction": 0.2,
                "max_temperature_halvings": 200,
                "dominant_temperature": { "samples": 4, "lowest_fraction": 0.1, "refinement_steps": 3 }
            }
        }"#;
        let settings: StabilitySettings = serde_json::from_str(json).expect("settings");
        assert_eq!(settings.tunneling.strategy, TunnelingStrategy::JustThermal);
        assert_eq!(settings.tunneling.dominant_temperature.samples, 4);
        assert_eq!(settings.selector.max_nan_retries, 8);
    }
}
