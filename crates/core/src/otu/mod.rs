//! Optimal Touchdown Unit scoring

pub mod index;

pub use index::{OtuIndexCalculator, OtuScores};
