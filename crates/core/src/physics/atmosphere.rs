//! Piecewise-exponential standard atmosphere
//!
//! Density is tabulated at layer boundaries and interpolated log-linearly
//! inside each layer, i.e. every layer is an exponential with its own scale
//! height. Because the tabulated densities strictly decrease with altitude the
//! profile is continuous and monotonically decreasing.
//!
//! # Scientific References
//!
//! - U.S. Standard Atmosphere, 1976. NOAA/NASA/USAF, Washington D.C.
//! - Vallado, D.A. (2013). "Fundamentals of Astrodynamics and Applications",
//!   4th ed., Table 8-4 (exponential atmosphere above 100 km).

/// One tabulated boundary of the standard atmosphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtmosphereLayer {
    /// Base altitude of the layer, m
    pub base_altitude: f64,
    /// Density at the base altitude, kg/m³
    pub base_density: f64,
}

const fn layer(base_altitude: f64, base_density: f64) -> AtmosphereLayer {
    AtmosphereLayer {
        base_altitude,
        base_density,
    }
}

/// U.S. Standard Atmosphere 1976 densities up to 86 km, Vallado's
/// exponential table above.
const STANDARD_LAYERS: &[AtmosphereLayer] = &[
    layer(0.0, 1.2250),
    layer(5_000.0, 0.73643),
    layer(11_000.0, 0.36392),
    layer(15_000.0, 0.19476),
    layer(20_000.0, 0.088035),
    layer(25_000.0, 0.040084),
    layer(32_000.0, 0.013225),
    layer(40_000.0, 0.0039957),
    layer(47_000.0, 0.0014275),
    layer(51_000.0, 0.00086160),
    layer(60_000.0, 0.00028832),
    layer(71_000.0, 0.000064211),
    layer(86_000.0, 0.0000068458),
    layer(100_000.0, 5.297e-7),
    layer(110_000.0, 9.661e-8),
    layer(120_000.0, 2.438e-8),
    layer(130_000.0, 8.484e-9),
    layer(140_000.0, 3.845e-9),
    layer(150_000.0, 2.070e-9),
    layer(180_000.0, 5.464e-10),
    layer(200_000.0, 2.789e-10),
    layer(250_000.0, 7.248e-11),
    layer(300_000.0, 2.418e-11),
    layer(400_000.0, 3.725e-12),
    layer(500_000.0, 6.967e-13),
    layer(600_000.0, 1.454e-13),
    layer(700_000.0, 3.614e-14),
    layer(800_000.0, 1.170e-14),
    layer(900_000.0, 5.245e-15),
    layer(1_000_000.0, 3.019e-15),
];

/// Air density as a function of geometric altitude
#[derive(Debug, Clone, Copy)]
pub struct AtmosphereModel {
    layers: &'static [AtmosphereLayer],
}

impl Default for AtmosphereModel {
    fn default() -> Self {
        Self::standard()
    }
}

impl AtmosphereModel {
    /// Standard atmosphere, 0 – 1000 km
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            layers: STANDARD_LAYERS,
        }
    }

    /// Lowest tabulated altitude, m
    #[must_use]
    pub fn floor(&self) -> f64 {
        self.layers[0].base_altitude
    }

    /// Highest tabulated altitude, m
    #[must_use]
    pub fn ceiling(&self) -> f64 {
        self.layers[self.layers.len() - 1].base_altitude
    }

    /// Index of the layer containing `altitude_m` (after clamping)
    #[must_use]
    pub fn layer_index(&self, altitude_m: f64) -> usize {
        let h = self.clamp(altitude_m);
        // partition_point gives the first layer whose base lies above h
        let above = self.layers.partition_point(|l| l.base_altitude <= h);
        above.saturating_sub(1).min(self.layers.len() - 2)
    }

    /// Local scale height of the layer containing `altitude_m`, m
    #[must_use]
    pub fn scale_height_at(&self, altitude_m: f64) -> f64 {
        let i = self.layer_index(altitude_m);
        let (lo, hi) = (self.layers[i], self.layers[i + 1]);
        (hi.base_altitude - lo.base_altitude) / (lo.base_density / hi.base_density).ln()
    }

    /// Air density, kg/m³.
    ///
    /// Altitudes below the table floor or above its ceiling are clamped to the
    /// nearest boundary; this is not an error.
    #[must_use]
    pub fn density(&self, altitude_m: f64) -> f64 {
        let h = self.clamp(altitude_m);
        let i = self.layer_index(h);
        let (lo, hi) = (self.layers[i], self.layers[i + 1]);
        let t = (h - lo.base_altitude) / (hi.base_altitude - lo.base_altitude);
        // Log-linear interpolation: rho = rho_lo * (rho_hi / rho_lo)^t
        lo.base_density * (hi.base_density / lo.base_density).powf(t)
    }

    fn clamp(&self, altitude_m: f64) -> f64 {
        if altitude_m.is_nan() {
            return self.floor();
        }
        altitude_m.clamp(self.floor(), self.ceiling())
    }
}
