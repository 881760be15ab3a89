//! Validated run configuration
//!
//! Every input to the pipeline is an explicit struct with a `Default`, loaded
//! from JSON and checked by [`PipelineConfig::validate`] before any stage runs.
//! Missing sections in a config file fall back to their defaults, so a file
//! only needs to state what differs from the reference scenario.

use crate::core_types::{GeoPoint, Kilometers};
use crate::error::PipelineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Mean and standard deviation of a normally distributed input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalParam {
    /// Distribution mean
    pub mean: f64,
    /// Standard deviation (>= 0)
    pub std_dev: f64,
}

impl NormalParam {
    /// Create a new normal parameter pair
    #[must_use]
    pub const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    fn validate(&self, field: &'static str) -> Result<(), PipelineError> {
        check_finite(field, self.mean)?;
        check_non_negative(field, self.std_dev)
    }
}

/// Perturbation law for a scalar Monte Carlo input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "law", rename_all = "snake_case")]
pub enum Perturbation {
    /// Gaussian with the given mean and standard deviation
    Normal {
        /// Distribution mean
        mean: f64,
        /// Standard deviation (>= 0)
        std_dev: f64,
    },
    /// Uniform on the closed interval `[low, high]`
    Uniform {
        /// Lower bound
        low: f64,
        /// Upper bound (>= low)
        high: f64,
    },
    /// No perturbation
    Fixed {
        /// Constant value
        value: f64,
    },
}

impl Perturbation {
    /// Expected value of the law
    #[must_use]
    pub fn mean(&self) -> f64 {
        match *self {
            Perturbation::Normal { mean, .. } => mean,
            Perturbation::Uniform { low, high } => 0.5 * (low + high),
            Perturbation::Fixed { value } => value,
        }
    }

    fn validate(&self, field: &'static str) -> Result<(), PipelineError> {
        match *self {
            Perturbation::Normal { mean, std_dev } => {
                check_finite(field, mean)?;
                check_non_negative(field, std_dev)
            }
            Perturbation::Uniform { low, high } => {
                check_finite(field, low)?;
                check_finite(field, high)?;
                if low > high {
                    return Err(PipelineError::invalid_config(
                        field,
                        format!("uniform bounds out of order ({low} > {high})"),
                    ));
                }
                Ok(())
            }
            Perturbation::Fixed { value } => check_finite(field, value),
        }
    }
}

/// Launch site the stage flies away from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSite {
    /// Human-readable name for logs
    pub name: String,
    /// Latitude, degrees
    pub lat: f64,
    /// Longitude, degrees
    pub lon: f64,
}

impl Default for LaunchSite {
    fn default() -> Self {
        Self {
            name: "Baikonur".to_string(),
            lat: 45.965,
            lon: 63.305,
        }
    }
}

impl LaunchSite {
    /// Site position as a geographic point
    #[must_use]
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lon)
    }
}

/// Stage state at separation, each component independently normal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationState {
    /// Altitude above ground, m
    pub altitude_m: NormalParam,
    /// Inertial speed, m/s
    pub velocity_m_s: NormalParam,
    /// Flight-path angle above the local horizontal, degrees
    pub flight_path_angle_deg: NormalParam,
    /// Heading, degrees clockwise from north
    pub azimuth_deg: NormalParam,
    /// Ground distance from the launch site to the separation point along the
    /// nominal azimuth, m
    pub downrange_m: f64,
}

impl Default for SeparationState {
    fn default() -> Self {
        Self {
            altitude_m: NormalParam::new(45_000.0, 500.0),
            velocity_m_s: NormalParam::new(1_600.0, 20.0),
            flight_path_angle_deg: NormalParam::new(25.0, 0.5),
            azimuth_deg: NormalParam::new(63.0, 0.3),
            downrange_m: 60_000.0,
        }
    }
}

/// Physical description of the spent stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageParameters {
    /// Stage name for logs
    pub name: String,
    /// Nominal dry mass, kg
    pub mass_kg: f64,
    /// Drag reference area, m²
    pub reference_area_m2: f64,
    /// Lower bound of the drag coefficient range
    pub cd_min: f64,
    /// Upper bound of the drag coefficient range
    pub cd_max: f64,
    /// Separation state distribution
    pub separation: SeparationState,
}

impl Default for StageParameters {
    fn default() -> Self {
        Self {
            name: "first stage".to_string(),
            mass_kg: 30_600.0,
            reference_area_m2: 43.0,
            cd_min: 0.8,
            cd_max: 1.3,
            separation: SeparationState::default(),
        }
    }
}

impl StageParameters {
    /// Check every field against its physical range
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_positive("stage.mass_kg", self.mass_kg)?;
        check_positive("stage.reference_area_m2", self.reference_area_m2)?;
        check_positive("stage.cd_min", self.cd_min)?;
        check_positive("stage.cd_max", self.cd_max)?;
        if self.cd_min > self.cd_max {
            return Err(PipelineError::invalid_config(
                "stage.cd_min",
                format!("cd_min {} exceeds cd_max {}", self.cd_min, self.cd_max),
            ));
        }
        let sep = &self.separation;
        sep.altitude_m.validate("stage.separation.altitude_m")?;
        check_positive("stage.separation.altitude_m", sep.altitude_m.mean)?;
        sep.velocity_m_s.validate("stage.separation.velocity_m_s")?;
        check_positive("stage.separation.velocity_m_s", sep.velocity_m_s.mean)?;
        sep.flight_path_angle_deg
            .validate("stage.separation.flight_path_angle_deg")?;
        if sep.flight_path_angle_deg.mean.abs() >= 90.0 {
            return Err(PipelineError::invalid_config(
                "stage.separation.flight_path_angle_deg",
                "mean must lie strictly between -90 and 90 degrees",
            ));
        }
        sep.azimuth_deg.validate("stage.separation.azimuth_deg")?;
        check_non_negative("stage.separation.downrange_m", sep.downrange_m)
    }
}

/// Breakup probability law `P = max_probability · (1 − exp(−h0 / altitude_scale_m))`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakupLaw {
    /// Asymptotic breakup probability at high separation altitude
    pub max_probability: f64,
    /// Altitude scale of the saturation, m
    pub altitude_scale_m: f64,
}

impl Default for BreakupLaw {
    fn default() -> Self {
        Self {
            max_probability: 0.3,
            altitude_scale_m: 20_000.0,
        }
    }
}

impl BreakupLaw {
    /// Breakup probability for a given separation altitude
    #[must_use]
    pub fn probability(&self, altitude_m: f64) -> f64 {
        let p = self.max_probability * (1.0 - (-altitude_m.max(0.0) / self.altitude_scale_m).exp());
        p.clamp(0.0, 1.0)
    }
}

/// Fragment count and scatter law applied when a breakup occurs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FragmentLaw {
    /// Poisson mean of the fragment count
    pub poisson_lambda: f64,
    /// Scatter centre as a fraction of the primary ground range
    pub range_fraction: f64,
    /// Along-track scatter, km (1σ)
    pub along_track_sigma_km: f64,
    /// Cross-track scatter, km (1σ)
    pub cross_track_sigma_km: f64,
}

impl Default for FragmentLaw {
    fn default() -> Self {
        Self {
            poisson_lambda: 50.0,
            range_fraction: 0.7,
            along_track_sigma_km: 15.0,
            cross_track_sigma_km: 12.0,
        }
    }
}

/// Fixed-step integrator budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorSettings {
    /// RK4 step, s
    pub dt_s: f64,
    /// Maximum number of steps before the sample is declared divergent
    pub max_steps: usize,
    /// Maximum simulated flight time, s
    pub max_flight_time_s: f64,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            dt_s: 0.5,
            max_steps: 40_000,
            max_flight_time_s: 3_600.0,
        }
    }
}

/// Monte Carlo settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of Monte Carlo draws
    pub iterations: usize,
    /// Top-level RNG seed
    pub seed: u64,
    /// Multiplier applied to the nominal stage mass
    pub mass_factor: Perturbation,
    /// Multiplier applied to the standard-atmosphere density
    pub density_factor: Perturbation,
    /// Eastward wind, m/s
    pub wind_east_m_s: Perturbation,
    /// Northward wind, m/s
    pub wind_north_m_s: Perturbation,
    /// Breakup probability law
    pub breakup: BreakupLaw,
    /// Fragment count/scatter law
    pub fragments: FragmentLaw,
    /// Integrator step and budget
    pub integrator: IntegratorSettings,
    /// Invalid-sample fraction above which the run is flagged degraded
    pub max_invalid_fraction: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: 1_000,
            seed: 42,
            mass_factor: Perturbation::Normal {
                mean: 1.0,
                std_dev: 0.03,
            },
            density_factor: Perturbation::Normal {
                mean: 1.0,
                std_dev: 0.10,
            },
            wind_east_m_s: Perturbation::Normal {
                mean: 0.0,
                std_dev: 10.0,
            },
            wind_north_m_s: Perturbation::Normal {
                mean: 0.0,
                std_dev: 10.0,
            },
            breakup: BreakupLaw::default(),
            fragments: FragmentLaw::default(),
            integrator: IntegratorSettings::default(),
            max_invalid_fraction: 0.10,
        }
    }
}

impl SimulationConfig {
    /// Check every field against its allowed range
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.iterations == 0 {
            return Err(PipelineError::invalid_config(
                "simulation.iterations",
                "at least one iteration is required",
            ));
        }
        self.mass_factor.validate("simulation.mass_factor")?;
        check_positive("simulation.mass_factor", self.mass_factor.mean())?;
        self.density_factor.validate("simulation.density_factor")?;
        check_positive("simulation.density_factor", self.density_factor.mean())?;
        self.wind_east_m_s.validate("simulation.wind_east_m_s")?;
        self.wind_north_m_s.validate("simulation.wind_north_m_s")?;
        check_fraction("simulation.breakup.max_probability", self.breakup.max_probability)?;
        check_positive("simulation.breakup.altitude_scale_m", self.breakup.altitude_scale_m)?;
        check_non_negative("simulation.fragments.poisson_lambda", self.fragments.poisson_lambda)?;
        check_non_negative("simulation.fragments.range_fraction", self.fragments.range_fraction)?;
        check_non_negative(
            "simulation.fragments.along_track_sigma_km",
            self.fragments.along_track_sigma_km,
        )?;
        check_non_negative(
            "simulation.fragments.cross_track_sigma_km",
            self.fragments.cross_track_sigma_km,
        )?;
        check_positive("simulation.integrator.dt_s", self.integrator.dt_s)?;
        if self.integrator.max_steps == 0 {
            return Err(PipelineError::invalid_config(
                "simulation.integrator.max_steps",
                "must be at least 1",
            ));
        }
        check_positive(
            "simulation.integrator.max_flight_time_s",
            self.integrator.max_flight_time_s,
        )?;
        check_fraction("simulation.max_invalid_fraction", self.max_invalid_fraction)
    }
}

/// IQR outlier filter settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Fence multiplier `k` in `[Q1 − k·IQR, Q3 + k·IQR]`
    pub iqr_multiplier: f64,
    /// Minimum fraction of points that must survive filtering
    pub min_retained_fraction: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            iqr_multiplier: 1.5,
            min_retained_fraction: 0.5,
        }
    }
}

/// Dispersion ellipse settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EllipseConfig {
    /// Axis scale factor `s` (3 → 99.73 % per-axis confidence)
    pub sigma_level: f64,
    /// Number of vertices used when the ellipse is turned into a polygon
    pub polygon_vertices: usize,
}

impl Default for EllipseConfig {
    fn default() -> Self {
        Self {
            sigma_level: 3.0,
            polygon_vertices: 72,
        }
    }
}

/// Grid generator settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Side length of a square cell
    pub cell_size_km: Kilometers,
    /// Hard upper bound on accepted cells
    pub max_cells: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            cell_size_km: Kilometers::new(1.0),
            max_cells: 50_000,
        }
    }
}

/// External raster acquisition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Chunk side length in cells (chunks hold at most `n²` cells)
    pub chunk_cells_per_side: usize,
    /// Worker threads issuing provider requests
    pub max_concurrent_requests: usize,
    /// Per-request timeout, ms
    pub timeout_ms: u64,
    /// Retries after the first attempt for retryable failures
    pub max_retries: u32,
    /// Backoff before the first retry, doubled on each further retry, ms
    pub initial_backoff_ms: u64,
    /// Acquisition date passed to the provider and used in cache keys
    pub acquisition_date: NaiveDate,
    /// Optional JSON file backing the raster cache across runs
    pub cache_path: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_cells_per_side: 10,
            max_concurrent_requests: 4,
            timeout_ms: 30_000,
            max_retries: 3,
            initial_backoff_ms: 500,
            acquisition_date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap_or_default(),
            cache_path: None,
        }
    }
}

impl FetchConfig {
    /// Request timeout as a `Duration`
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before retry number `attempt` (1-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }

    /// Check every field against its allowed range
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_cells_per_side == 0 {
            return Err(PipelineError::invalid_config(
                "fetch.chunk_cells_per_side",
                "must be at least 1",
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(PipelineError::invalid_config(
                "fetch.max_concurrent_requests",
                "must be at least 1",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(PipelineError::invalid_config(
                "fetch.timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Composite index weights; must sum to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtuWeights {
    /// Vegetation weight
    pub k_vi: f64,
    /// Soil-structure weight
    pub k_si: f64,
    /// Soil-biology weight
    pub k_bi: f64,
}

impl Default for OtuWeights {
    fn default() -> Self {
        Self {
            k_vi: 0.35,
            k_si: 0.35,
            k_bi: 0.30,
        }
    }
}

impl OtuWeights {
    /// Tolerance on the weight sum
    pub const SUM_TOLERANCE: f64 = 1e-9;

    /// Check non-negativity and unit sum
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] if a weight is negative or the
    /// weights do not sum to 1
    pub fn validate(&self) -> Result<(), PipelineError> {
        check_fraction("otu.weights.k_vi", self.k_vi)?;
        check_fraction("otu.weights.k_si", self.k_si)?;
        check_fraction("otu.weights.k_bi", self.k_bi)?;
        let sum = self.k_vi + self.k_si + self.k_bi;
        if (sum - 1.0).abs() > Self::SUM_TOLERANCE {
            return Err(PipelineError::invalid_config(
                "otu.weights",
                format!("weights must sum to 1, got {sum}"),
            ));
        }
        Ok(())
    }
}

/// Inclusive `[min, max]` range used to normalise a raw field to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Raw value mapped to 0
    pub min: f64,
    /// Raw value mapped to 1
    pub max: f64,
}

impl ValueRange {
    /// Create a new range
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Linear normalisation clipped to [0, 1]
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        ((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0)
    }

    fn validate(&self, field: &'static str) -> Result<(), PipelineError> {
        check_finite(field, self.min)?;
        check_finite(field, self.max)?;
        if self.max <= self.min {
            return Err(PipelineError::invalid_config(
                field,
                format!("empty range [{}, {}]", self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// Normalisation ranges for the raw raster statistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRanges {
    /// NDVI
    pub ndvi: ValueRange,
    /// Bulk density, g/cm³
    pub bulk_density: ValueRange,
    /// Clay content, %
    pub clay: ValueRange,
    /// Soil organic carbon, g/kg
    pub soc: ValueRange,
    /// Total nitrogen, g/kg
    pub nitrogen: ValueRange,
}

impl Default for NormalizationRanges {
    fn default() -> Self {
        Self {
            ndvi: ValueRange::new(0.0, 1.0),
            bulk_density: ValueRange::new(1.0, 1.8),
            clay: ValueRange::new(0.0, 60.0),
            soc: ValueRange::new(0.0, 50.0),
            nitrogen: ValueRange::new(0.0, 5.0),
        }
    }
}

/// Shape of the relief modifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliefParams {
    /// Slopes at or below this angle are treated as flat, degrees
    pub flat_slope_deg: f64,
    /// Slopes at or above this angle score zero, degrees
    pub max_slope_deg: f64,
    /// Most stable aspect, degrees clockwise from north
    pub preferred_aspect_deg: f64,
    /// Largest reduction caused by facing away from the preferred aspect
    pub aspect_weight: f64,
    /// Water fraction at or above which the cell counts as water
    pub water_threshold: f64,
}

impl Default for ReliefParams {
    fn default() -> Self {
        Self {
            flat_slope_deg: 2.0,
            max_slope_deg: 30.0,
            preferred_aspect_deg: 0.0,
            aspect_weight: 0.2,
            water_threshold: 0.5,
        }
    }
}

/// OTU index settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtuConfig {
    /// Composite weights
    pub weights: OtuWeights,
    /// Raw field normalisation
    pub ranges: NormalizationRanges,
    /// Relief modifier shape
    pub relief: ReliefParams,
    /// Exponent `e` in `Q_Fire = 1 − Q_Vi^e`
    pub fire_exponent: f64,
}

impl Default for OtuConfig {
    fn default() -> Self {
        Self {
            weights: OtuWeights::default(),
            ranges: NormalizationRanges::default(),
            relief: ReliefParams::default(),
            fire_exponent: 1.0,
        }
    }
}

impl OtuConfig {
    /// Check weights, ranges and relief parameters
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.weights.validate()?;
        self.ranges.ndvi.validate("otu.ranges.ndvi")?;
        self.ranges.bulk_density.validate("otu.ranges.bulk_density")?;
        self.ranges.clay.validate("otu.ranges.clay")?;
        self.ranges.soc.validate("otu.ranges.soc")?;
        self.ranges.nitrogen.validate("otu.ranges.nitrogen")?;
        let r = &self.relief;
        check_non_negative("otu.relief.flat_slope_deg", r.flat_slope_deg)?;
        if r.max_slope_deg <= r.flat_slope_deg || r.max_slope_deg > 90.0 {
            return Err(PipelineError::invalid_config(
                "otu.relief.max_slope_deg",
                "must exceed flat_slope_deg and be at most 90",
            ));
        }
        check_finite("otu.relief.preferred_aspect_deg", r.preferred_aspect_deg)?;
        check_fraction("otu.relief.aspect_weight", r.aspect_weight)?;
        check_fraction("otu.relief.water_threshold", r.water_threshold)?;
        check_positive("otu.fire_exponent", self.fire_exponent)
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Launch site
    pub launch_site: LaunchSite,
    /// Stage description
    pub stage: StageParameters,
    /// Monte Carlo settings
    pub simulation: SimulationConfig,
    /// Outlier filter
    pub filter: FilterConfig,
    /// Dispersion ellipse
    pub ellipse: EllipseConfig,
    /// Grid generator
    pub grid: GridConfig,
    /// Raster acquisition
    pub fetch: FetchConfig,
    /// OTU scoring
    pub otu: OtuConfig,
}

impl PipelineConfig {
    /// Load a configuration from a JSON file and validate it
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] if the file cannot be read,
    /// parsed, or fails validation
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path.as_ref())
            .map_err(|e| PipelineError::invalid_config("config", format!("cannot read: {e}")))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PipelineError::invalid_config("config", format!("cannot parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidConfig`] naming the first bad field
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !self.launch_site.position().is_valid() {
            return Err(PipelineError::invalid_config(
                "launch_site",
                format!(
                    "invalid coordinates ({}, {})",
                    self.launch_site.lat, self.launch_site.lon
                ),
            ));
        }
        self.stage.validate()?;
        self.simulation.validate()?;
        check_positive("filter.iqr_multiplier", self.filter.iqr_multiplier)?;
        check_fraction("filter.min_retained_fraction", self.filter.min_retained_fraction)?;
        check_positive("ellipse.sigma_level", self.ellipse.sigma_level)?;
        if self.ellipse.polygon_vertices < 8 {
            return Err(PipelineError::invalid_config(
                "ellipse.polygon_vertices",
                "at least 8 vertices are required",
            ));
        }
        check_positive("grid.cell_size_km", *self.grid.cell_size_km)?;
        if self.grid.max_cells == 0 {
            return Err(PipelineError::invalid_config(
                "grid.max_cells",
                "must be at least 1",
            ));
        }
        self.fetch.validate()?;
        self.otu.validate()
    }
}

fn check_finite(field: &'static str, value: f64) -> Result<(), PipelineError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(field, format!("{value} is not finite")))
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), PipelineError> {
    check_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(field, format!("{value} must be positive")))
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), PipelineError> {
    check_finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(field, format!("{value} must not be negative")))
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), PipelineError> {
    check_finite(field, value)?;
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PipelineError::invalid_config(field, format!("{value} must lie in [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let mut config = PipelineConfig::default();
        config.otu.weights.k_bi = 0.4;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidConfig {
                field: "otu.weights",
                ..
            }
        ));
    }

    #[test]
    fn test_cd_range_order() {
        let mut stage = StageParameters::default();
        stage.cd_min = 1.5;
        stage.cd_max = 1.0;
        assert!(stage.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_iterations_and_bad_uniform() {
        let mut sim = SimulationConfig::default();
        sim.iterations = 0;
        assert!(sim.validate().is_err());

        let mut sim = SimulationConfig::default();
        sim.wind_east_m_s = Perturbation::Uniform {
            low: 5.0,
            high: -5.0,
        };
        assert!(sim.validate().is_err());
    }

    #[test]
    fn test_breakup_probability_law() {
        let law = BreakupLaw::default();
        assert_eq!(law.probability(0.0), 0.0);
        let p = law.probability(20_000.0);
        assert!((p - 0.3 * (1.0 - (-1.0f64).exp())).abs() < 1e-12);
        assert!(law.probability(1e7) <= 0.3);
    }

    #[test]
    fn test_backoff_doubles() {
        let fetch = FetchConfig {
            initial_backoff_ms: 100,
            ..FetchConfig::default()
        };
        assert_eq!(fetch.backoff(1), Duration::from_millis(100));
        assert_eq!(fetch.backoff(2), Duration::from_millis(200));
        assert_eq!(fetch.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "simulation": { "iterations": 200, "seed": 7 },
            "grid": { "cell_size_km": 2.0 },
            "fetch": { "acquisition_date": "2023-05-01" }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.simulation.iterations, 200);
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(*config.grid.cell_size_km, 2.0);
        assert_eq!(config.grid.max_cells, 50_000);
        assert_eq!(config.simulation.breakup.max_probability, 0.3);
        assert_eq!(
            config.fetch.acquisition_date,
            NaiveDate::from_ymd_opt(2023, 5, 1).unwrap()
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_perturbation_json_tagging() {
        let json = r#"{ "law": "uniform", "low": 0.9, "high": 1.1 }"#;
        let p: Perturbation = serde_json::from_str(json).unwrap();
        assert_eq!(p, Perturbation::Uniform { low: 0.9, high: 1.1 });
        assert!((p.mean() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_value_range_normalization_clips() {
        let r = ValueRange::new(1.0, 1.8);
        assert_eq!(r.normalize(0.5), 0.0);
        assert_eq!(r.normalize(2.0), 1.0);
        assert!((r.normalize(1.4) - 0.5).abs() < 1e-12);
        assert_eq!(r.normalize(f64::NAN), 0.0);
    }
}
