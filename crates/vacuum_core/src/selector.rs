//! Rolls starting points to minima and decides which of them threaten the
//! DSB vacuum.

use crate::constants::{NAN_RETRY_DAMPING, SAME_VACUUM_THRESHOLD_OFFSET};
use crate::error::{VacuumError, VacuumResult};
use crate::minimum::PotentialMinimum;
use crate::traits::{GradientMinimizer, PotentialFunction, StartingPointFinder};
use crate::warnings::WarningLog;
use serde::{Deserialize, Serialize};

/// Which panic vacuum the tunneling calculation is pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PanicVacuumChoice {
    /// The panic vacuum closest in field space to the DSB vacuum.
    Nearest,
    /// The deepest panic vacuum.
    Global,
}

impl PanicVacuumChoice {
    pub fn from_global_flag(global_is_panic: bool) -> Self {
        if global_is_panic {
            PanicVacuumChoice::Global
        } else {
            PanicVacuumChoice::Nearest
        }
    }
}

impl Default for PanicVacuumChoice {
    fn default() -> Self {
        PanicVacuumChoice::Nearest
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectorSettings {
    /// Minima closer to the DSB vacuum than this fraction of its length are
    /// taken to be the DSB vacuum itself.
    pub extremum_separation_threshold_fraction: f64,
    /// Factor applied to a non-DSB starting point that rolled to the DSB vacuum
    /// before it is rolled a second time.
    pub non_dsb_rolling_to_dsb_scaling_factor: f64,
    pub panic_vacuum_choice: PanicVacuumChoice,
    /// How often a non-finite minimization is retried from a point pulled
    /// further towards the origin.
    pub max_nan_retries: usize,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            extremum_separation_threshold_fraction: 0.05,
            non_dsb_rolling_to_dsb_scaling_factor: 4.0,
            panic_vacuum_choice: PanicVacuumChoice::default(),
            max_nan_retries: 8,
        }
    }
}

impl SelectorSettings {
    fn validate(&self) -> VacuumResult<()> {
        if !(self.extremum_separation_threshold_fraction >= 0.0) {
            return Err(VacuumError::InvalidSettings(
                "extremum_separation_threshold_fraction must be non-negative.".into(),
            ));
        }
        if !self.non_dsb_rolling_to_dsb_scaling_factor.is_finite() {
            return Err(VacuumError::InvalidSettings(
                "non_dsb_rolling_to_dsb_scaling_factor must be finite.".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of one `find_minima` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VacuumClassification {
    pub temperature: f64,
    pub reference_vacuum: PotentialMinimum,
    /// The DSB input rolled to within the separation threshold of the origin.
    pub reference_at_origin: bool,
    /// Every minimum reached, in starting-point order.
    pub found_minima: Vec<PotentialMinimum>,
    pub panic_vacua: Vec<PotentialMinimum>,
    pub panic_vacuum_global: Option<PotentialMinimum>,
    pub panic_vacuum_nearest: Option<PotentialMinimum>,
    pub active_panic_vacuum: Option<PotentialMinimum>,
}

impl VacuumClassification {
    pub fn has_panic_vacuum(&self) -> bool {
        !self.panic_vacua.is_empty()
    }
}

/// The deepest candidate; the first one wins ties.
pub fn deepest_minimum(candidates: &[PotentialMinimum]) -> Option<&PotentialMinimum> {
    candidates.iter().fold(None, |best, candidate| match best {
        Some(current) if candidate.function_value() >= current.function_value() => Some(current),
        _ => Some(candidate),
    })
}

/// The candidate closest to `reference`; the first one wins ties.
pub fn nearest_minimum<'a>(
    reference: &PotentialMinimum,
    candidates: &'a [PotentialMinimum],
) -> Option<&'a PotentialMinimum> {
    candidates
        .iter()
        .fold(None, |best: Option<(&PotentialMinimum, f64)>, candidate| {
            let distance = candidate.square_distance_to(reference);
            match best {
                Some((current, best_distance)) if distance >= best_distance => {
                    Some((current, best_distance))
                }
                _ => Some((candidate, distance)),
            }
        })
        .map(|(minimum, _)| minimum)
}

/// True if every field of `candidate` matches the corresponding field of
/// `reference` up to sign, within `threshold`.
pub fn is_sign_flip_of(
    reference: &PotentialMinimum,
    candidate: &PotentialMinimum,
    threshold: f64,
) -> bool {
    reference.number_of_fields() == candidate.number_of_fields()
        && reference
            .field_configuration()
            .iter()
            .zip(candidate.field_configuration())
            .all(|(a, b)| (a.abs() - b.abs()).abs() <= threshold)
}

struct Thresholds {
    squared: f64,
    linear: f64,
}

impl Thresholds {
    fn collapsed(&self, reference: &PotentialMinimum, candidate: &PotentialMinimum) -> bool {
        candidate.square_distance_to(reference) < self.squared
            || is_sign_flip_of(reference, candidate, self.linear)
    }
}

/// Finds the DSB vacuum and every deeper ("panic") vacuum by rolling a set of
/// starting points down the potential.
///
/// Starting points are requested from the finder once and cached, so calls at
/// several temperatures reuse them. Everything else is rebuilt per call.
pub struct VacuumSelector<F, M> {
    settings: SelectorSettings,
    finder: F,
    minimizer: M,
    warnings: WarningLog,
    starting_points: Option<Vec<Vec<f64>>>,
    classification: Option<VacuumClassification>,
}

impl<F: StartingPointFinder, M: GradientMinimizer> VacuumSelector<F, M> {
    pub fn new(settings: SelectorSettings, finder: F, minimizer: M, warnings: WarningLog) -> Self {
        Self {
            settings,
            finder,
            minimizer,
            warnings,
            starting_points: None,
            classification: None,
        }
    }

    pub fn settings(&self) -> &SelectorSettings {
        &self.settings
    }

    /// Changes which panic vacuum becomes active from the next call on.
    pub fn set_panic_vacuum_choice(&mut self, choice: PanicVacuumChoice) {
        self.settings.panic_vacuum_choice = choice;
    }

    pub fn minimizer(&self) -> &M {
        &self.minimizer
    }

    pub fn finder(&self) -> &F {
        &self.finder
    }

    pub fn starting_points(&self) -> Option<&[Vec<f64>]> {
        self.starting_points.as_deref()
    }

    /// Forgets the cached starting points and the last classification.
    pub fn reset_for_new_point(&mut self) {
        self.starting_points = None;
        self.classification = None;
    }

    pub fn classification(&self) -> Option<&VacuumClassification> {
        self.classification.as_ref()
    }

    pub fn reference_vacuum(&self) -> Option<&PotentialMinimum> {
        self.classification.as_ref().map(|c| &c.reference_vacuum)
    }

    pub fn panic_vacua(&self) -> &[PotentialMinimum] {
        self.classification
            .as_ref()
            .map(|c| c.panic_vacua.as_slice())
            .unwrap_or(&[])
    }

    pub fn active_panic_vacuum(&self) -> Option<&PotentialMinimum> {
        self.classification
            .as_ref()
            .and_then(|c| c.active_panic_vacuum.as_ref())
    }

    pub fn find_minima(
        &mut self,
        potential: &dyn PotentialFunction,
        temperature: f64,
    ) -> VacuumResult<VacuumClassification> {
        self.classification = None;
        self.settings.validate()?;
        let dim = potential.number_of_fields();
        let dsb_input = potential.dsb_field_values();
        if dsb_input.len() != dim {
            return Err(VacuumError::DimensionMismatch {
                expected: dim,
                got: dsb_input.len(),
            });
        }
        let names = potential.field_names();

        self.minimizer.set_temperature(temperature);
        log::info!(
            "DSB vacuum input: {}",
            potential.field_configuration_description(dsb_input)
        );
        let reference = self.roll_with_retries(potential, dsb_input)?;
        log::info!("Rolled to: {}", reference.describe(names));

        let fraction = self.settings.extremum_separation_threshold_fraction;
        let squared =
            fraction * fraction * reference.length_squared() + SAME_VACUUM_THRESHOLD_OFFSET;
        let thresholds = Thresholds {
            squared,
            linear: squared.sqrt(),
        };

        let reference_at_origin = reference.length_squared() < thresholds.squared;
        if reference_at_origin {
            self.warnings.log_warning(format!(
                "DSB vacuum input rolled to the origin (|v|² = {}, threshold {}); tunneling \
                 will be calculated from the origin to the panic vacuum.",
                reference.length_squared(),
                thresholds.squared
            ));
        }

        if self.starting_points.is_none() {
            let points = self.finder.find_starting_points(potential)?;
            if let Some(bad) = points.iter().find(|p| p.len() != dim) {
                return Err(VacuumError::DimensionMismatch {
                    expected: dim,
                    got: bad.len(),
                });
            }
            self.starting_points = Some(points);
        }
        let starting_points = self.starting_points.as_deref().unwrap_or(&[]);

        let mut found_minima = Vec::with_capacity(starting_points.len());
        let mut panic_vacua = Vec::new();
        for start in starting_points {
            log::debug!(
                "Starting point: {}",
                potential.field_configuration_description(start)
            );
            let mut minimum = self.roll_with_retries(potential, start)?;
            log::debug!("Rolled to: {}", minimum.describe(names));
            let mut collapsed = thresholds.collapsed(&reference, &minimum);

            if collapsed && reference.square_distance_to_point(start) > thresholds.squared {
                let start_length_squared: f64 = start.iter().map(|x| x * x).sum();
                if start_length_squared > thresholds.squared {
                    let factor = self.settings.non_dsb_rolling_to_dsb_scaling_factor;
                    let scaled: Vec<f64> = start.iter().map(|x| x * factor).collect();
                    log::debug!(
                        "Non-DSB starting point rolled to the DSB vacuum or a sign flip of it; \
                         trying {}",
                        potential.field_configuration_description(&scaled)
                    );
                    minimum = self.roll_with_retries(potential, &scaled)?;
                    log::debug!("Rolled to: {}", minimum.describe(names));
                    collapsed = thresholds.collapsed(&reference, &minimum);
                }
            }

            if !collapsed && minimum.is_deeper_than(&reference) {
                panic_vacua.push(minimum.clone());
            }
            found_minima.push(minimum);
        }

        let panic_vacuum_global = deepest_minimum(&panic_vacua).cloned();
        let panic_vacuum_nearest = nearest_minimum(&reference, &panic_vacua).cloned();
        let active_panic_vacuum = match self.settings.panic_vacuum_choice {
            PanicVacuumChoice::Global => panic_vacuum_global.clone(),
            PanicVacuumChoice::Nearest => panic_vacuum_nearest.clone(),
        };

        log::info!("DSB vacuum = {}", reference.describe(names));
        match &active_panic_vacuum {
            None => log::info!("DSB vacuum is stable as far as the potential allows."),
            Some(active) => log::info!(
                "There are {} panic vacua. Panic vacuum used in tunneling = {}",
                panic_vacua.len(),
                active.describe(names)
            ),
        }

        let classification = VacuumClassification {
            temperature,
            reference_vacuum: reference,
            reference_at_origin,
            found_minima,
            panic_vacua,
            panic_vacuum_global,
            panic_vacuum_nearest,
            active_panic_vacuum,
        };
        self.classification = Some(classification.clone());
        Ok(classification)
    }

    /// Minimizes from `start`, pulling the start towards the origin by a
    /// compounding factor while the result is non-finite.
    fn roll_with_retries(
        &self,
        potential: &dyn PotentialFunction,
        start: &[f64],
    ) -> VacuumResult<PotentialMinimum> {
        let mut minimum = self.minimizer.minimize(potential, start)?;
        let mut point = start.to_vec();
        let mut attempts = 0usize;
        while !minimum.is_finite() {
            if attempts >= self.settings.max_nan_retries {
                return Err(VacuumError::MinimizerRetriesExhausted {
                    starting_point: start.to_vec(),
                    attempts,
                });
            }
            attempts += 1;
            point.iter_mut().for_each(|x| *x *= NAN_RETRY_DAMPING);
            log::debug!(
                "Minimizer hit numerical issues; retry {attempts} from {:?}",
                point
            );
            minimum = self.minimizer.minimize(potential, &point)?;
        }
        Ok(minimum)
    }
}
