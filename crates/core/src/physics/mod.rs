//! Re-entry physics: standard atmosphere and ballistic propagation

pub mod atmosphere;
pub mod integrator;

pub use atmosphere::{AtmosphereLayer, AtmosphereModel};
pub use integrator::{
    BallisticIntegrator, DivergenceReason, ImpactState, InitialState, PerturbedScalars,
    TrajectoryOutcome, STANDARD_GRAVITY,
};
