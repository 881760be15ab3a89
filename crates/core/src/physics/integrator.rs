//! Fixed-step RK4 ballistic re-entry integrator
//!
//! Propagates a spent stage from separation to ground impact under
//! inverse-square gravity and quadratic aerodynamic drag:
//!
//! ```text
//! dv/dt = g(r) − ½·ρ(h)·Cd·A·|v − w|·(v − w)/m
//! dr/dt = v
//! ```
//!
//! The state lives in a Cartesian frame whose origin is the separation ground
//! point, axes east/north/up, with the Earth's centre at `(0, 0, −R)`. Gravity
//! points at the centre and altitude is measured from the spherical surface,
//! so long ground tracks follow the curvature. The wind `w` is a constant
//! horizontal vector; writing drag on the air-relative velocity is what makes
//! the wind accelerate the stage. Earth rotation is not modelled.
//!
//! The impact is reported as an arc length and bearing from the separation
//! ground point, which is exactly the azimuthal-equidistant metric frame used
//! by the rest of the pipeline.

use super::atmosphere::AtmosphereModel;
use crate::config::IntegratorSettings;
use crate::core_types::{MetricPoint, EARTH_RADIUS_KM};
use nalgebra::Vector3;
use std::fmt;

/// Standard gravity at the surface, m/s²
pub const STANDARD_GRAVITY: f64 = 9.80665;

const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// Stage state at separation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InitialState {
    /// Altitude above the surface, m
    pub altitude_m: f64,
    /// Speed, m/s
    pub velocity_m_s: f64,
    /// Flight-path angle above the local horizontal, degrees
    pub flight_path_angle_deg: f64,
    /// Heading, degrees clockwise from north
    pub azimuth_deg: f64,
}

/// Per-sample perturbed physical scalars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerturbedScalars {
    /// Drag coefficient
    pub cd: f64,
    /// Multiplier on the standard-atmosphere density
    pub density_factor: f64,
    /// Eastward wind, m/s
    pub wind_east_m_s: f64,
    /// Northward wind, m/s
    pub wind_north_m_s: f64,
    /// Stage mass, kg
    pub mass_kg: f64,
}

/// Ground impact of one trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactState {
    /// Impact position in the metric frame of the separation ground point, km
    pub offset_km: MetricPoint,
    /// Great-circle distance from the separation ground point, km
    pub ground_range_km: f64,
    /// Bearing from the separation ground point, degrees clockwise from north
    pub bearing_deg: f64,
    /// Time from separation to impact, s
    pub flight_time_s: f64,
    /// Speed at impact, m/s
    pub impact_speed_m_s: f64,
    /// Integration steps taken
    pub steps: usize,
}

/// Why a trajectory was abandoned
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DivergenceReason {
    /// The state became NaN or infinite
    NonFinite {
        /// Step at which it happened
        step: usize,
    },
    /// `max_steps` was reached without impact
    StepBudget {
        /// Steps taken
        steps: usize,
    },
    /// `max_flight_time_s` was reached without impact
    TimeBudget {
        /// Simulated time, s
        time_s: f64,
    },
    /// Input scalars cannot be integrated (non-positive mass, negative Cd…)
    InvalidInput,
}

impl fmt::Display for DivergenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivergenceReason::NonFinite { step } => write!(f, "non-finite state at step {step}"),
            DivergenceReason::StepBudget { steps } => write!(f, "no impact after {steps} steps"),
            DivergenceReason::TimeBudget { time_s } => write!(f, "no impact after {time_s:.0} s"),
            DivergenceReason::InvalidInput => write!(f, "invalid input scalars"),
        }
    }
}

/// Result of integrating one trajectory
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrajectoryOutcome {
    /// Reached the ground
    Impact(ImpactState),
    /// Integration diverged; the sample must be discarded and counted
    Diverged {
        /// What went wrong
        reason: DivergenceReason,
    },
}

impl TrajectoryOutcome {
    /// Impact state if the trajectory reached the ground
    #[must_use]
    pub fn impact(&self) -> Option<&ImpactState> {
        match self {
            TrajectoryOutcome::Impact(impact) => Some(impact),
            TrajectoryOutcome::Diverged { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct State {
    r: Vector3<f64>,
    v: Vector3<f64>,
}

/// Fixed-step RK4 integrator for a single drag-affected body
#[derive(Debug, Clone, Copy)]
pub struct BallisticIntegrator {
    atmosphere: AtmosphereModel,
    settings: IntegratorSettings,
    reference_area_m2: f64,
}

impl BallisticIntegrator {
    /// Create an integrator for a stage with the given drag reference area
    #[must_use]
    pub fn new(
        atmosphere: AtmosphereModel,
        settings: IntegratorSettings,
        reference_area_m2: f64,
    ) -> Self {
        Self {
            atmosphere,
            settings,
            reference_area_m2,
        }
    }

    /// Propagate from separation until impact or divergence.
    ///
    /// # Arguments
    ///
    /// * `initial` - Separation state
    /// * `scalars` - Perturbed drag, density, wind and mass for this sample
    ///
    /// # Returns
    ///
    /// [`TrajectoryOutcome::Impact`] when the altitude reaches zero (the last
    /// step is linearly interpolated to the surface), otherwise
    /// [`TrajectoryOutcome::Diverged`]. There are no retries.
    #[must_use]
    pub fn integrate(
        &self,
        initial: &InitialState,
        scalars: &PerturbedScalars,
    ) -> TrajectoryOutcome {
        if !(scalars.mass_kg > 0.0
            && scalars.cd >= 0.0
            && scalars.density_factor >= 0.0
            && initial.altitude_m.is_finite()
            && initial.velocity_m_s.is_finite())
        {
            return TrajectoryOutcome::Diverged {
                reason: DivergenceReason::InvalidInput,
            };
        }

        let gamma = initial.flight_path_angle_deg.to_radians();
        let psi = initial.azimuth_deg.to_radians();
        let v_h = initial.velocity_m_s * gamma.cos();
        let mut state = State {
            r: Vector3::new(0.0, 0.0, initial.altitude_m),
            v: Vector3::new(v_h * psi.sin(), v_h * psi.cos(), initial.velocity_m_s * gamma.sin()),
        };

        let wind = Vector3::new(scalars.wind_east_m_s, scalars.wind_north_m_s, 0.0);
        // Drag constant ½·Cd·A/m; density is applied per evaluation
        let drag_k = 0.5 * scalars.cd * self.reference_area_m2 / scalars.mass_kg;
        let accel = |s: &State| -> Vector3<f64> {
            let from_center = s.r + Vector3::new(0.0, 0.0, EARTH_RADIUS_M);
            let radius = from_center.norm();
            let altitude = radius - EARTH_RADIUS_M;
            let gravity = -from_center * (STANDARD_GRAVITY * EARTH_RADIUS_M * EARTH_RADIUS_M
                / (radius * radius * radius));
            let rho = self.atmosphere.density(altitude) * scalars.density_factor;
            let v_rel = s.v - wind;
            gravity - v_rel * (drag_k * rho * v_rel.norm())
        };

        let dt = self.settings.dt_s;
        let mut t = 0.0;
        let mut altitude = altitude_of(&state.r);

        for step in 1..=self.settings.max_steps {
            let next = rk4_step(&state, dt, &accel);
            let next_altitude = altitude_of(&next.r);

            if !(next_altitude.is_finite() && next.v.iter().all(|c| c.is_finite())) {
                return TrajectoryOutcome::Diverged {
                    reason: DivergenceReason::NonFinite { step },
                };
            }

            if next_altitude <= 0.0 {
                let frac = if altitude > next_altitude {
                    (altitude / (altitude - next_altitude)).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let r_impact = state.r + (next.r - state.r) * frac;
                let v_impact = state.v + (next.v - state.v) * frac;
                return TrajectoryOutcome::Impact(self.impact_from(
                    &r_impact,
                    v_impact.norm(),
                    t + frac * dt,
                    step,
                ));
            }

            state = next;
            altitude = next_altitude;
            t += dt;

            if t > self.settings.max_flight_time_s {
                return TrajectoryOutcome::Diverged {
                    reason: DivergenceReason::TimeBudget { time_s: t },
                };
            }
        }

        TrajectoryOutcome::Diverged {
            reason: DivergenceReason::StepBudget {
                steps: self.settings.max_steps,
            },
        }
    }

    fn impact_from(&self, r: &Vector3<f64>, speed: f64, time_s: f64, steps: usize) -> ImpactState {
        let from_center = r + Vector3::new(0.0, 0.0, EARTH_RADIUS_M);
        let horizontal = r.x.hypot(r.y);
        // Central angle between the launch radial (+z) and the impact radial
        let angle = horizontal.atan2(from_center.z);
        let ground_range_km = angle * EARTH_RADIUS_KM;
        let bearing = r.x.atan2(r.y);
        ImpactState {
            offset_km: MetricPoint::new(
                ground_range_km * bearing.sin(),
                ground_range_km * bearing.cos(),
            ),
            ground_range_km,
            bearing_deg: bearing.to_degrees().rem_euclid(360.0),
            flight_time_s: time_s,
            impact_speed_m_s: speed,
            steps,
        }
    }
}

fn altitude_of(r: &Vector3<f64>) -> f64 {
    (r + Vector3::new(0.0, 0.0, EARTH_RADIUS_M)).norm() - EARTH_RADIUS_M
}

fn rk4_step<F>(s: &State, dt: f64, accel: &F) -> State
where
    F: Fn(&State) -> Vector3<f64>,
{
    let k1_r = s.v;
    let k1_v = accel(s);

    let s2 = State {
        r: s.r + k1_r * (dt / 2.0),
        v: s.v + k1_v * (dt / 2.0),
    };
    let k2_r = s2.v;
    let k2_v = accel(&s2);

    let s3 = State {
        r: s.r + k2_r * (dt / 2.0),
        v: s.v + k2_v * (dt / 2.0),
    };
    let k3_r = s3.v;
    let k3_v = accel(&s3);

    let s4 = State {
        r: s.r + k3_r * dt,
        v: s.v + k3_v * dt,
    };
    let k4_r = s4.v;
    let k4_v = accel(&s4);

    State {
        r: s.r + (k1_r + k2_r * 2.0 + k3_r * 2.0 + k4_r) * (dt / 6.0),
        v: s.v + (k1_v + k2_v * 2.0 + k3_v * 2.0 + k4_v) * (dt / 6.0),
    }
}
