pub mod autodiff;
pub mod bounce;
pub mod constants;
pub mod equation_engine;
pub mod error;
pub mod minimizer;
pub mod minimum;
pub mod potential;
pub mod selector;
pub mod stability;
pub mod starting_points;
/// The `vacuum_core` crate decides whether the vacuum a model is expected to
/// sit in survives tunneling to a deeper minimum.
///
/// Key components:
/// - **Traits**: `PotentialFunction`, `GradientMinimizer`, `StartingPointFinder`
///   and `BounceActionSolver`, the seams where other collaborators plug in.
/// - **Equation Engine**: A bytecode VM for evaluating user-defined potentials,
///   with hyper-dual numbers for exact gradients and Hessians.
/// - **Selector**: Finds the minima at a temperature and picks the DSB and panic vacua.
/// - **Tunneling**: Quantum and thermal survival probabilities, including the
///   critical temperature bracket and the dominant tunneling temperature.
pub mod traits;
pub mod tunneling;
pub mod warnings;

pub use error::{VacuumError, VacuumResult};
pub use minimum::PotentialMinimum;
pub use stability::{StabilityReport, StabilitySettings, VacuumStability, Verdict};
