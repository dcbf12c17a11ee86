use super::BounceActionTunneler;
use crate::constants::{
    maximum_power_of_natural_exponent, AGE_OF_KNOWN_UNIVERSE_IN_INVERSE_GEV,
    AGE_OF_KNOWN_UNIVERSE_IN_SECONDS, CAPPED_LIFETIME_IN_SECONDS, FLOORED_LIFETIME_IN_SECONDS,
    HBAR_IN_GEV_SECONDS,
};
use crate::error::{VacuumError, VacuumResult};
use crate::minimum::PotentialMinimum;
use crate::traits::{BounceActionSolver, GradientMinimizer, PotentialFunction};
use crate::warnings::WarningLog;
use anyhow::anyhow;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantumDecay {
    pub lifetime_seconds: f64,
    pub survival_probability: f64,
}

/// Lifetime and survival probability for an O(4) bounce action `action`,
/// with `scale_squared` the squared scale of the solitonic prefactor.
///
/// Exponents that would overflow are clamped and reported to `warnings`.
pub fn quantum_decay(action: f64, scale_squared: f64, warnings: &WarningLog) -> QuantumDecay {
    let limit = maximum_power_of_natural_exponent();
    if action >= limit {
        warnings.log_warning(format!(
            "The bounce action {action} is too large and positive to exponentiate, so capping \
             the lifetime at {CAPPED_LIFETIME_IN_SECONDS:e} seconds and setting the survival \
             probability to one."
        ));
        return QuantumDecay {
            lifetime_seconds: CAPPED_LIFETIME_IN_SECONDS,
            survival_probability: 1.0,
        };
    }
    if action <= -limit {
        warnings.log_warning(format!(
            "The bounce action {action} is too large and negative to exponentiate, so capping \
             the lifetime at {FLOORED_LIFETIME_IN_SECONDS} seconds and setting the survival \
             probability to zero."
        ));
        return QuantumDecay {
            lifetime_seconds: FLOORED_LIFETIME_IN_SECONDS,
            survival_probability: 0.0,
        };
    }

    let scale_to_the_fourth = scale_squared * scale_squared;
    let lifetime_seconds = action.exp() * HBAR_IN_GEV_SECONDS
        / (AGE_OF_KNOWN_UNIVERSE_IN_INVERSE_GEV.powi(3) * scale_to_the_fourth);
    let survival_exponent = AGE_OF_KNOWN_UNIVERSE_IN_SECONDS / lifetime_seconds;
    let survival_probability = if survival_exponent >= limit {
        warnings.log_warning(
            "The decay width is so large that exponentiating it would overflow, so setting the \
             quantum survival probability to zero.",
        );
        0.0
    } else {
        (-survival_exponent).exp()
    };
    QuantumDecay {
        lifetime_seconds,
        survival_probability,
    }
}

impl<B: BounceActionSolver, M: GradientMinimizer> BounceActionTunneler<B, M> {
    pub(super) fn calculate_quantum_tunneling(
        &mut self,
        potential: &dyn PotentialFunction,
        false_vacuum: &PotentialMinimum,
        true_vacuum: &PotentialMinimum,
    ) -> VacuumResult<()> {
        let action = self
            .solver
            .bounce_action(potential, false_vacuum, true_vacuum, 0.0)?;
        if action.is_nan() {
            return Err(VacuumError::Collaborator(anyhow!(
                "bounce action solver returned NaN at zero temperature"
            )));
        }
        let scale_squared = potential.scale_squared_relevant_to_tunneling(false_vacuum, true_vacuum);
        let decay = quantum_decay(action, scale_squared, &self.warnings);
        log::info!(
            "Quantum tunneling: S4 = {action}, lifetime = {:e} s, survival probability = {}",
            decay.lifetime_seconds,
            decay.survival_probability
        );
        self.result.quantum_lifetime_seconds = decay.lifetime_seconds;
        self.result.quantum_survival_probability = decay.survival_probability;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunneling::test_support::{FrozenVacua, Quadratic, ScriptedBounce};
    use crate::tunneling::{TunnelingSettings, TunnelingStrategy};
    use proptest::prelude::*;

    #[test]
    fn huge_action_caps_the_lifetime() {
        let warnings = WarningLog::new();
        let decay = quantum_decay(maximum_power_of_natural_exponent(), 1.0, &warnings);
        assert_eq!(decay.survival_probability, 1.0);
        assert_eq!(decay.lifetime_seconds, 1e100);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn hugely_negative_action_floors_the_lifetime() {
        let warnings = WarningLog::new();
        let decay = quantum_decay(-maximum_power_of_natural_exponent(), 1.0, &warnings);
        assert_eq!(decay.survival_probability, 0.0);
        assert_eq!(decay.lifetime_seconds, 0.1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn moderate_action_gives_a_probability() {
        let warnings = WarningLog::new();
        // Lifetime equal to the age of the Universe gives exp(-1).
        let scale_squared = 100.0f64;
        let target = AGE_OF_KNOWN_UNIVERSE_IN_SECONDS;
        let action = (target * AGE_OF_KNOWN_UNIVERSE_IN_INVERSE_GEV.powi(3) * scale_squared.powi(2)
            / HBAR_IN_GEV_SECONDS)
            .ln();
        let decay = quantum_decay(action, scale_squared, &warnings);
        assert!((decay.lifetime_seconds / target - 1.0).abs() < 1e-10);
        assert!((decay.survival_probability - (-1.0f64).exp()).abs() < 1e-10);
        assert!(warnings.is_empty());
    }

    #[test]
    fn short_lifetime_clamps_survival_to_zero() {
        let warnings = WarningLog::new();
        let decay = quantum_decay(0.0, 1.0, &warnings);
        assert_eq!(decay.survival_probability, 0.0);
        assert!(decay.lifetime_seconds > 0.0);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn nan_action_is_a_collaborator_error() {
        let potential = Quadratic::new(0.0, -1.0, 0.0, 0.0);
        let settings = TunnelingSettings {
            strategy: TunnelingStrategy::JustQuantum,
            ..TunnelingSettings::default()
        };
        let mut tunneler = BounceActionTunneler::new(
            settings,
            ScriptedBounce::new(|_| f64::NAN),
            FrozenVacua::default(),
            WarningLog::new(),
        );
        let err = tunneler
            .calculate_tunneling(
                &potential,
                &PotentialMinimum::new(vec![0.0], 0.0, 0.0),
                &PotentialMinimum::new(vec![1.0], -1.0, 0.0),
            )
            .expect_err("NaN action");
        assert!(matches!(err, VacuumError::Collaborator(_)));
    }

    proptest! {
        #[test]
        fn clamps_hold_for_any_large_action(excess in 0.0f64..1e6, scale in 1e-3f64..1e12) {
            let warnings = WarningLog::new();
            let limit = maximum_power_of_natural_exponent();
            let above = quantum_decay(limit + excess, scale, &warnings);
            prop_assert_eq!(above.survival_probability, 1.0);
            prop_assert_eq!(above.lifetime_seconds, 1e100);
            let below = quantum_decay(-limit - excess, scale, &warnings);
            prop_assert_eq!(below.survival_probability, 0.0);
            prop_assert_eq!(below.lifetime_seconds, 0.1);
        }

        #[test]
        fn survival_is_a_probability(action in -700.0f64..700.0, scale in 1e-3f64..1e12) {
            let decay = quantum_decay(action, scale, &WarningLog::new());
            prop_assert!((0.0..=1.0).contains(&decay.survival_probability));
        }
    }
}
