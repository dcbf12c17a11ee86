//! Starting-point finders for the vacuum selector.

use crate::traits::{PotentialFunction, StartingPointFinder};
use anyhow::{anyhow, bail, Context, Result};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

/// Result of one Newton solve of ∇V = 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationaryPoint {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
}

/// Damped Newton iteration on the gradient of the potential.
pub fn solve_stationary_point(
    potential: &dyn PotentialFunction,
    temperature: f64,
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<StationaryPoint> {
    let dim = potential.number_of_fields();
    if dim == 0 {
        bail!("Potential has zero fields.");
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess dimension mismatch. Expected {}, got {}.",
            dim,
            initial_guess.len()
        );
    }
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.damping <= 0.0 {
        bail!("damping must be positive.");
    }
    if settings.tolerance <= 0.0 {
        bail!("tolerance must be positive.");
    }

    let mut state = initial_guess.to_vec();
    let mut residual = vec![0.0; dim];
    potential.gradient(&state, temperature, &mut residual);
    let mut residual_norm = l2_norm(&residual);
    let mut iterations = 0usize;

    loop {
        if !residual_norm.is_finite() {
            bail!("Gradient became non-finite at {:?}.", state);
        }
        if residual_norm <= settings.tolerance {
            break;
        }

        if iterations >= settings.max_steps {
            bail!(
                "Newton solver failed to converge in {} steps (‖∇V‖ = {}).",
                settings.max_steps,
                residual_norm
            );
        }

        let hessian = potential.hessian(&state, temperature);
        let rhs = DVector::from_column_slice(&residual);
        let delta = hessian
            .lu()
            .solve(&rhs)
            .ok_or_else(|| anyhow!("Hessian is singular."))
            .context("Failed to solve linear system during Newton iteration.")?;

        for i in 0..dim {
            state[i] -= settings.damping * delta[i];
        }

        iterations += 1;
        potential.gradient(&state, temperature, &mut residual);
        residual_norm = l2_norm(&residual);
    }

    Ok(StationaryPoint {
        state,
        residual_norm,
        iterations,
    })
}

fn l2_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// A fixed, caller-supplied list of starting points.
#[derive(Debug, Clone, Default)]
pub struct FixedStartingPoints {
    points: Vec<Vec<f64>>,
}

impl FixedStartingPoints {
    pub fn new(points: Vec<Vec<f64>>) -> Self {
        Self { points }
    }
}

impl StartingPointFinder for FixedStartingPoints {
    fn find_starting_points(
        &mut self,
        potential: &dyn PotentialFunction,
    ) -> Result<Vec<Vec<f64>>> {
        let dim = potential.number_of_fields();
        if let Some(bad) = self.points.iter().find(|p| p.len() != dim) {
            bail!(
                "Starting point dimension mismatch. Expected {}, got {}.",
                dim,
                bad.len()
            );
        }
        Ok(self.points.clone())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Seeds per field axis; the grid has `points_per_axis^fields` seeds.
    pub points_per_axis: usize,
    /// Half-width of the seeded box as a multiple of the largest DSB field value.
    pub extent_factor: f64,
    /// Smallest half-width of the box (GeV), used when the DSB values are tiny.
    pub minimum_extent: f64,
    /// Two solutions closer than this fraction of the box half-width are merged.
    pub duplicate_fraction: f64,
    /// Upper bound on the number of seeds, to keep many-field models tractable.
    pub max_seeds: usize,
    /// The box half-width is multiplied by this after each round of seeds.
    pub widening_factor: f64,
    /// Widening stops after this many rounds, or earlier once a round finds
    /// no stationary point that was not already known.
    pub max_widenings: usize,
    pub newton: NewtonSettings,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            points_per_axis: 5,
            extent_factor: 2.0,
            minimum_extent: 1.0,
            duplicate_fraction: 1e-3,
            max_seeds: 4096,
            widening_factor: 4.0,
            max_widenings: 8,
            newton: NewtonSettings::default(),
        }
    }
}

/// Finds the stationary points of the zero-temperature potential by running
/// Newton's method on ∇V = 0 from a regular grid of seeds, and returns them
/// as starting points together with the DSB field values and the origin.
///
/// The grid starts in a box around the DSB values and is widened
/// geometrically until a wider box turns up nothing new, so minima far from
/// a DSB vacuum at or near the origin are still seeded.
///
/// Seeds that fail to converge are skipped; saddles and maxima are kept
/// because the minimizer rolls them to whichever minima lie nearby.
#[derive(Debug, Clone, Default)]
pub struct StationaryPointScan {
    settings: ScanSettings,
}

impl StationaryPointScan {
    pub fn new(settings: ScanSettings) -> Self {
        Self { settings }
    }

    fn seeds(&self, dim: usize, extent: f64) -> Result<Vec<Vec<f64>>> {
        let n = self.settings.points_per_axis;
        let total = (n as u128).checked_pow(dim as u32).unwrap_or(u128::MAX);
        if total > self.settings.max_seeds as u128 {
            bail!(
                "Grid of {}^{} seeds exceeds max_seeds = {}.",
                n,
                dim,
                self.settings.max_seeds
            );
        }
        let axis: Vec<f64> = if n == 1 {
            vec![0.0]
        } else {
            (0..n)
                .map(|k| -extent + 2.0 * extent * (k as f64) / ((n - 1) as f64))
                .collect()
        };
        let mut seeds = Vec::with_capacity(total as usize);
        let mut index = vec![0usize; dim];
        loop {
            seeds.push(index.iter().map(|&k| axis[k]).collect());
            let mut carry = 0;
            while carry < dim {
                index[carry] += 1;
                if index[carry] < n {
                    break;
                }
                index[carry] = 0;
                carry += 1;
            }
            if carry == dim {
                break;
            }
        }
        Ok(seeds)
    }
}

impl StartingPointFinder for StationaryPointScan {
    fn find_starting_points(
        &mut self,
        potential: &dyn PotentialFunction,
    ) -> Result<Vec<Vec<f64>>> {
        let dim = potential.number_of_fields();
        if dim == 0 {
            bail!("Potential has zero fields.");
        }
        if self.settings.points_per_axis == 0 {
            bail!("points_per_axis must be greater than zero.");
        }
        if self.settings.max_widenings > 0 && !(self.settings.widening_factor > 1.0) {
            bail!("widening_factor must be greater than one.");
        }
        let largest_dsb = potential
            .dsb_field_values()
            .iter()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let mut extent =
            (self.settings.extent_factor * largest_dsb).max(self.settings.minimum_extent);

        let mut found: Vec<Vec<f64>> = Vec::new();
        let push_unique = |point: Vec<f64>, found: &mut Vec<Vec<f64>>, merge_distance: f64| {
            let duplicate = found.iter().any(|existing| {
                existing
                    .iter()
                    .zip(&point)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    <= merge_distance * merge_distance
            });
            if !duplicate {
                found.push(point);
            }
            !duplicate
        };

        let initial_merge = self.settings.duplicate_fraction * extent;
        push_unique(potential.dsb_field_values().to_vec(), &mut found, initial_merge);
        push_unique(potential.field_values_origin().to_vec(), &mut found, initial_merge);

        let mut round = 0usize;
        loop {
            let merge_distance = self.settings.duplicate_fraction * extent;
            let seeds = self.seeds(dim, extent)?;
            let mut converged = 0usize;
            let mut new_points = 0usize;
            for seed in &seeds {
                match solve_stationary_point(potential, 0.0, seed, self.settings.newton) {
                    Ok(point) => {
                        converged += 1;
                        if push_unique(point.state, &mut found, merge_distance) {
                            new_points += 1;
                        }
                    }
                    Err(err) => log::debug!("seed {:?} did not converge: {err:#}", seed),
                }
            }
            log::debug!(
                "box half-width {extent}: {converged} of {} seeds converged, {new_points} new",
                seeds.len()
            );
            if (round > 0 && new_points == 0) || round == self.settings.max_widenings {
                break;
            }
            round += 1;
            extent *= self.settings.widening_factor;
        }
        log::info!(
            "stationary-point scan: {} distinct starting points after {} widenings",
            found.len(),
            round
        );
        Ok(found)
    }
}
