//! Monte Carlo impact simulation
//!
//! `MonteCarloDriver` combines:
//! - Seeded per-iteration random streams
//! - Perturbed separation state and physical scalars
//! - RK4 ballistic propagation to the ground
//! - Stochastic breakup with Poisson fragment scatter

pub mod monte_carlo;
pub mod sampling;

pub use monte_carlo::{
    ImpactPointSet, ImpactStatistics, MonteCarloDriver, MonteCarloRun, RunDiagnostics,
    TrajectorySample,
};
pub use sampling::{stream_rng, stream_seed};
