//! Image parameter records produced by the DL1 parameterization.
//!
//! All floating-point fields default to NaN and counts to zero; a record
//! stays in that state whenever the cleaned mask has fewer than three
//! surviving pixels or non-positive total intensity.

/// Second-moment ellipse description of a cleaned shower image.
#[derive(Clone, Copy, Debug)]
pub struct HillasParameters {
    /// Total image charge (photo-electrons).
    pub intensity: f64,
    /// Center of gravity x (camera-frame meters).
    pub x: f64,
    /// Center of gravity y (camera-frame meters).
    pub y: f64,
    /// Semi-major standard deviation.
    pub length: f64,
    /// Semi-minor standard deviation.
    pub width: f64,
    /// Major-axis orientation, reduced to (-pi/2, pi/2] (radians).
    pub psi: f64,
    /// Distance of the center of gravity from the camera center.
    pub r: f64,
    /// Azimuth of the center of gravity.
    pub phi: f64,
    /// Third moment along the major axis, normalized by length^3.
    pub skewness: f64,
    /// Fourth moment along the major axis, normalized by length^4.
    pub kurtosis: f64,
}

impl Default for HillasParameters {
    fn default() -> Self {
        Self {
            intensity: f64::NAN,
            x: f64::NAN,
            y: f64::NAN,
            length: f64::NAN,
            width: f64::NAN,
            psi: f64::NAN,
            r: f64::NAN,
            phi: f64::NAN,
            skewness: f64::NAN,
            kurtosis: f64::NAN,
        }
    }
}

/// Fraction of image charge and pixels on the camera border rings.
#[derive(Clone, Copy, Debug)]
pub struct LeakageParameters {
    /// Fraction of surviving pixels on the outermost ring.
    pub pixels_width_1: f64,
    /// Fraction of surviving pixels within one dilation of the edge.
    pub pixels_width_2: f64,
    /// Fraction of image charge on the outermost ring.
    pub intensity_width_1: f64,
    /// Fraction of image charge within one dilation of the edge.
    pub intensity_width_2: f64,
}

impl Default for LeakageParameters {
    fn default() -> Self {
        Self {
            pixels_width_1: f64::NAN,
            pixels_width_2: f64::NAN,
            intensity_width_1: f64::NAN,
            intensity_width_2: f64::NAN,
        }
    }
}

/// Charge concentration measures.
#[derive(Clone, Copy, Debug)]
pub struct ConcentrationParameters {
    /// Charge fraction within one `length` of the center of gravity.
    pub concentration_cog: f64,
    /// Charge fraction inside the Hillas ellipse.
    pub concentration_core: f64,
    /// Charge fraction in the brightest pixel.
    pub concentration_pixel: f64,
}

impl Default for ConcentrationParameters {
    fn default() -> Self {
        Self {
            concentration_cog: f64::NAN,
            concentration_core: f64::NAN,
            concentration_pixel: f64::NAN,
        }
    }
}

/// Connected-component statistics of the cleaning mask.
#[derive(Clone, Copy, Debug, Default)]
pub struct MorphologyParameters {
    /// Surviving pixel count.
    pub n_pixels: u32,
    /// Number of islands.
    pub n_islands: u32,
    /// Islands with 1-5 pixels.
    pub n_small_islands: u32,
    /// Islands with 6-50 pixels.
    pub n_medium_islands: u32,
    /// Islands with more than 50 pixels.
    pub n_large_islands: u32,
}

/// Unweighted moments of the surviving pixel charges.
#[derive(Clone, Copy, Debug)]
pub struct IntensityParameters {
    /// Largest single-pixel charge.
    pub intensity_max: f64,
    /// Mean pixel charge.
    pub intensity_mean: f64,
    /// Standard deviation of pixel charges.
    pub intensity_std: f64,
    /// Skewness of pixel charges.
    pub intensity_skewness: f64,
    /// Kurtosis of pixel charges.
    pub intensity_kurtosis: f64,
}

impl Default for IntensityParameters {
    fn default() -> Self {
        Self {
            intensity_max: f64::NAN,
            intensity_mean: f64::NAN,
            intensity_std: f64::NAN,
            intensity_skewness: f64::NAN,
            intensity_kurtosis: f64::NAN,
        }
    }
}

/// Truth-dependent parameters, filled only when simulation is available.
#[derive(Clone, Copy, Debug)]
pub struct ExtraParameters {
    /// Perpendicular distance of the major axis from the true source
    /// position in the camera.
    pub miss: f64,
    /// Distance from the center of gravity to the true source position.
    pub disp: f64,
    /// Angle between the major axis and the line to the true source.
    pub theta: f64,
    /// Orientation of the line from the center of gravity to the true
    /// source position.
    pub true_psi: f64,
    /// Distance between the measured and true-image centers of gravity.
    pub cog_err: f64,
    /// Angle between the measured and true-image major axes.
    pub beta_err: f64,
}

impl Default for ExtraParameters {
    fn default() -> Self {
        Self {
            miss: f64::NAN,
            disp: f64::NAN,
            theta: f64::NAN,
            true_psi: f64::NAN,
            cog_err: f64::NAN,
            beta_err: f64::NAN,
        }
    }
}

/// Full DL1 parameter set for one telescope image.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageParameters {
    pub hillas: HillasParameters,
    pub leakage: LeakageParameters,
    pub concentration: ConcentrationParameters,
    pub morphology: MorphologyParameters,
    pub intensity: IntensityParameters,
    /// Present only when simulation truth was available.
    pub extra: Option<ExtraParameters>,
}

impl ImageParameters {
    /// Look up a parameter by its flat query name, e.g.
    /// `"hillas_intensity"` or `"morphology_n_pixels"`.
    ///
    /// Counts are widened to `f64`. Returns `None` for unknown names,
    /// which lets predicate construction validate identifiers up front.
    #[must_use]
    pub fn value_of(&self, name: &str) -> Option<f64> {
        let value = match name {
            "hillas_intensity" => self.hillas.intensity,
            "hillas_x" => self.hillas.x,
            "hillas_y" => self.hillas.y,
            "hillas_length" => self.hillas.length,
            "hillas_width" => self.hillas.width,
            "hillas_psi" => self.hillas.psi,
            "hillas_r" => self.hillas.r,
            "hillas_phi" => self.hillas.phi,
            "hillas_skewness" => self.hillas.skewness,
            "hillas_kurtosis" => self.hillas.kurtosis,
            "leakage_pixels_width_1" => self.leakage.pixels_width_1,
            "leakage_pixels_width_2" => self.leakage.pixels_width_2,
            "leakage_intensity_width_1" => self.leakage.intensity_width_1,
            "leakage_intensity_width_2" => self.leakage.intensity_width_2,
            "concentration_cog" => self.concentration.concentration_cog,
            "concentration_core" => self.concentration.concentration_core,
            "concentration_pixel" => self.concentration.concentration_pixel,
            "morphology_n_pixels" => f64::from(self.morphology.n_pixels),
            "morphology_n_islands" => f64::from(self.morphology.n_islands),
            "morphology_n_small_islands" => f64::from(self.morphology.n_small_islands),
            "morphology_n_medium_islands" => f64::from(self.morphology.n_medium_islands),
            "morphology_n_large_islands" => f64::from(self.morphology.n_large_islands),
            "intensity_max" => self.intensity.intensity_max,
            "intensity_mean" => self.intensity.intensity_mean,
            "intensity_std" => self.intensity.intensity_std,
            "intensity_skewness" => self.intensity.intensity_skewness,
            "intensity_kurtosis" => self.intensity.intensity_kurtosis,
            _ => return None,
        };
        Some(value)
    }
}
