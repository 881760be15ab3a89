//! Monte Carlo impact dispersion
//!
//! Each iteration perturbs the separation state and the physical scalars,
//! integrates the primary trajectory, and then rolls for a stage breakup.
//! A breakup scatters a Poisson-distributed number of fragments around the
//! point at 70 % of the primary ground range, along and across the primary
//! ground track.
//!
//! Iterations share no mutable state. They run on the rayon pool and each
//! draws from its own seeded stream (see [`super::sampling::stream_rng`]), so
//! a fixed seed reproduces the run bit-for-bit on any number of threads.

use super::sampling::{
    sample_bernoulli, sample_gaussian, sample_normal_param, sample_perturbation, sample_poisson,
    sample_uniform, stream_rng,
};
use crate::config::{LaunchSite, SimulationConfig, StageParameters};
use crate::core_types::{GeoPoint, LocalFrame, MetricPoint};
use crate::error::CloudKind;
use crate::physics::{
    AtmosphereModel, BallisticIntegrator, DivergenceReason, InitialState, PerturbedScalars,
    TrajectoryOutcome,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lower bound on a perturbed mass, as a fraction of the nominal mass
const MIN_MASS_FRACTION: f64 = 0.01;

/// Outcome of one Monte Carlo draw for one body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Monte Carlo iteration that produced this sample
    pub iteration: usize,
    /// Impact position; NaN coordinates when `valid` is false
    pub impact: GeoPoint,
    /// Distance along the nominal azimuth from the launch site, km
    pub downrange_km: f64,
    /// Distance right of the nominal ground track, km
    pub crossrange_km: f64,
    /// Whether this is a breakup fragment
    pub is_fragment: bool,
    /// False if the integration diverged
    pub valid: bool,
    /// Separation-to-impact time for primary impacts, s
    pub flight_time_s: Option<f64>,
    /// Speed at impact for primary impacts, m/s
    pub impact_speed_m_s: Option<f64>,
}

impl TrajectorySample {
    fn diverged(iteration: usize) -> Self {
        Self {
            iteration,
            impact: GeoPoint {
                lat: f64::NAN,
                lon: f64::NAN,
            },
            downrange_km: f64::NAN,
            crossrange_km: f64::NAN,
            is_fragment: false,
            valid: false,
            flight_time_s: None,
            impact_speed_m_s: None,
        }
    }

    /// Downrange/crossrange offsets as a metric point (x = crossrange, y = downrange)
    #[must_use]
    pub fn track_offset(&self) -> MetricPoint {
        MetricPoint::new(self.crossrange_km, self.downrange_km)
    }
}

/// Valid impacts split into the primary and fragment clouds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactPointSet {
    /// Intact stage impacts
    pub primary: Vec<TrajectorySample>,
    /// Breakup fragment impacts
    pub fragment: Vec<TrajectorySample>,
}

impl ImpactPointSet {
    /// Samples belonging to one cloud
    #[must_use]
    pub fn cloud(&self, kind: CloudKind) -> &[TrajectorySample] {
        match kind {
            CloudKind::Primary => &self.primary,
            CloudKind::Fragment => &self.fragment,
        }
    }
}

/// Run-level counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Monte Carlo iterations drawn
    pub total_samples: usize,
    /// Primary trajectories that reached the ground
    pub valid_samples: usize,
    /// Primary trajectories that diverged
    pub invalid_samples: usize,
    /// Iterations in which the stage broke up
    pub breakups: usize,
    /// Fragment impact points produced
    pub fragment_points: usize,
    /// `invalid_samples / total_samples`
    pub invalid_fraction: f64,
    /// Set when the invalid fraction exceeds the configured threshold
    pub degraded: bool,
}

/// Summary statistics of one impact cloud in downrange/crossrange space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpactStatistics {
    /// Points in the cloud
    pub count: usize,
    /// Mean downrange, km
    pub mean_downrange_km: f64,
    /// Mean crossrange, km
    pub mean_crossrange_km: f64,
    /// Downrange standard deviation, km
    pub std_downrange_km: f64,
    /// Crossrange standard deviation, km
    pub std_crossrange_km: f64,
    /// Circular error probable about the mean point (median radius), km
    pub cep50_km: f64,
}

impl ImpactStatistics {
    /// Compute statistics for a cloud, `None` if it is empty
    #[must_use]
    pub fn from_samples(samples: &[TrajectorySample]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean_d = samples.iter().map(|s| s.downrange_km).sum::<f64>() / n;
        let mean_c = samples.iter().map(|s| s.crossrange_km).sum::<f64>() / n;
        let var_d = samples
            .iter()
            .map(|s| (s.downrange_km - mean_d).powi(2))
            .sum::<f64>()
            / n;
        let var_c = samples
            .iter()
            .map(|s| (s.crossrange_km - mean_c).powi(2))
            .sum::<f64>()
            / n;

        let mut radii: Vec<f64> = samples
            .iter()
            .map(|s| (s.downrange_km - mean_d).hypot(s.crossrange_km - mean_c))
            .collect();
        radii.sort_by(f64::total_cmp);
        let mid = radii.len() / 2;
        let cep50_km = if radii.len() % 2 == 0 {
            0.5 * (radii[mid - 1] + radii[mid])
        } else {
            radii[mid]
        };

        Some(Self {
            count: samples.len(),
            mean_downrange_km: mean_d,
            mean_crossrange_km: mean_c,
            std_downrange_km: var_d.sqrt(),
            std_crossrange_km: var_c.sqrt(),
            cep50_km,
        })
    }
}

/// Result of a Monte Carlo run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloRun {
    /// Valid impact clouds
    pub impacts: ImpactPointSet,
    /// Run-level counters
    pub diagnostics: RunDiagnostics,
}

/// Everything one iteration produced
#[derive(Debug, Clone)]
struct Draw {
    primary: TrajectorySample,
    divergence: Option<DivergenceReason>,
    breakup: bool,
    fragments: Vec<TrajectorySample>,
}

/// Draws perturbed trajectories and the breakup scatter
#[derive(Debug, Clone)]
pub struct MonteCarloDriver {
    stage: StageParameters,
    config: SimulationConfig,
    integrator: BallisticIntegrator,
    launch_frame: LocalFrame,
    separation_frame: LocalFrame,
    nominal_azimuth_deg: f64,
}

impl MonteCarloDriver {
    /// Create a driver for a validated stage and simulation configuration
    #[must_use]
    pub fn new(launch: &LaunchSite, stage: StageParameters, config: SimulationConfig) -> Self {
        let integrator = BallisticIntegrator::new(
            AtmosphereModel::standard(),
            config.integrator,
            stage.reference_area_m2,
        );
        let nominal_azimuth_deg = stage.separation.azimuth_deg.mean;
        let launch_frame = LocalFrame::new(launch.position());
        let separation_point =
            launch_frame.destination(nominal_azimuth_deg, stage.separation.downrange_m / 1000.0);
        Self {
            stage,
            config,
            integrator,
            launch_frame,
            separation_frame: LocalFrame::new(separation_point),
            nominal_azimuth_deg,
        }
    }

    /// Ground point below the nominal separation state
    #[must_use]
    pub fn separation_point(&self) -> GeoPoint {
        self.separation_frame.origin()
    }

    /// Run all iterations and aggregate the impact clouds
    #[must_use]
    pub fn run(&self) -> MonteCarloRun {
        let n = self.config.iterations;
        info!(
            iterations = n,
            seed = self.config.seed,
            stage = %self.stage.name,
            "Starting Monte Carlo dispersion run"
        );

        let draws: Vec<Draw> = (0..n).into_par_iter().map(|i| self.draw(i)).collect();

        let mut impacts = ImpactPointSet::default();
        let mut diagnostics = RunDiagnostics {
            total_samples: n,
            ..RunDiagnostics::default()
        };

        for draw in draws {
            if let Some(reason) = draw.divergence {
                diagnostics.invalid_samples += 1;
                debug!(iteration = draw.primary.iteration, %reason, "Trajectory diverged");
                continue;
            }
            diagnostics.valid_samples += 1;
            if draw.breakup {
                diagnostics.breakups += 1;
            }
            diagnostics.fragment_points += draw.fragments.len();
            impacts.primary.push(draw.primary);
            impacts.fragment.extend(draw.fragments);
        }

        diagnostics.invalid_fraction = diagnostics.invalid_samples as f64 / n.max(1) as f64;
        diagnostics.degraded = diagnostics.invalid_fraction > self.config.max_invalid_fraction;

        if diagnostics.degraded {
            warn!(
                invalid = diagnostics.invalid_samples,
                total = n,
                threshold = self.config.max_invalid_fraction,
                "Monte Carlo run degraded: too many divergent trajectories"
            );
        }
        info!(
            valid = diagnostics.valid_samples,
            invalid = diagnostics.invalid_samples,
            breakups = diagnostics.breakups,
            fragments = diagnostics.fragment_points,
            "Monte Carlo run complete"
        );

        MonteCarloRun {
            impacts,
            diagnostics,
        }
    }

    fn draw(&self, iteration: usize) -> Draw {
        let mut rng = stream_rng(self.config.seed, iteration as u64);
        let sep = &self.stage.separation;

        // Draw order is fixed; changing it changes every seeded run
        let initial = InitialState {
            altitude_m: sample_normal_param(&mut rng, &sep.altitude_m),
            velocity_m_s: sample_normal_param(&mut rng, &sep.velocity_m_s),
            flight_path_angle_deg: sample_normal_param(&mut rng, &sep.flight_path_angle_deg),
            azimuth_deg: sample_normal_param(&mut rng, &sep.azimuth_deg),
        };
        let cd = sample_uniform(&mut rng, self.stage.cd_min, self.stage.cd_max);
        let density_factor = sample_perturbation(&mut rng, &self.config.density_factor).max(0.0);
        let wind_east_m_s = sample_perturbation(&mut rng, &self.config.wind_east_m_s);
        let wind_north_m_s = sample_perturbation(&mut rng, &self.config.wind_north_m_s);
        let mass_kg = (self.stage.mass_kg * sample_perturbation(&mut rng, &self.config.mass_factor))
            .max(self.stage.mass_kg * MIN_MASS_FRACTION);

        let scalars = PerturbedScalars {
            cd,
            density_factor,
            wind_east_m_s,
            wind_north_m_s,
            mass_kg,
        };

        let impact = match self.integrator.integrate(&initial, &scalars) {
            TrajectoryOutcome::Impact(impact) => impact,
            TrajectoryOutcome::Diverged { reason } => {
                return Draw {
                    primary: TrajectorySample::diverged(iteration),
                    divergence: Some(reason),
                    breakup: false,
                    fragments: Vec::new(),
                };
            }
        };

        let primary_geo = self.separation_frame.to_geographic(&impact.offset_km);
        let primary = TrajectorySample {
            flight_time_s: Some(impact.flight_time_s),
            impact_speed_m_s: Some(impact.impact_speed_m_s),
            ..self.sample_at(iteration, primary_geo, false)
        };

        let p_breakup = self.config.breakup.probability(initial.altitude_m);
        let breakup = sample_bernoulli(&mut rng, p_breakup);
        let mut fragments = Vec::new();
        if breakup {
            let law = &self.config.fragments;
            let count = sample_poisson(&mut rng, law.poisson_lambda);
            let bearing = impact.bearing_deg.to_radians();
            let along = (bearing.sin(), bearing.cos());
            let cross = (bearing.cos(), -bearing.sin());
            let center = MetricPoint::new(
                impact.offset_km.x * law.range_fraction,
                impact.offset_km.y * law.range_fraction,
            );
            fragments.reserve(count);
            for _ in 0..count {
                let a = sample_gaussian(&mut rng, 0.0, law.along_track_sigma_km);
                let c = sample_gaussian(&mut rng, 0.0, law.cross_track_sigma_km);
                let offset = MetricPoint::new(
                    center.x + a * along.0 + c * cross.0,
                    center.y + a * along.1 + c * cross.1,
                );
                let geo = self.separation_frame.to_geographic(&offset);
                fragments.push(self.sample_at(iteration, geo, true));
            }
        }

        Draw {
            primary,
            divergence: None,
            breakup,
            fragments,
        }
    }

    /// Build a valid sample with downrange/crossrange relative to the launch site
    fn sample_at(&self, iteration: usize, impact: GeoPoint, is_fragment: bool) -> TrajectorySample {
        let m = self.launch_frame.to_metric(&impact);
        let az = self.nominal_azimuth_deg.to_radians();
        TrajectorySample {
            iteration,
            impact,
            downrange_km: m.x * az.sin() + m.y * az.cos(),
            crossrange_km: m.x * az.cos() - m.y * az.sin(),
            is_fragment,
            valid: true,
            flight_time_s: None,
            impact_speed_m_s: None,
        }
    }
}
