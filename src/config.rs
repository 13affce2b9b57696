//! Render parameters: raw user input and the frozen, normalized bundle the engine consumes.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Raw render parameters as given on the command line or in a preset file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderParams {
    /// Dot diameter budget per cell (pixels).
    pub dot_size: f32,
    /// Gap added to each cell (pixels).
    pub spacing: i32,
    /// Added to every color channel, -255..=255.
    pub brightness: f32,
    /// Multiplies every color channel, 0.0..=3.0.
    pub contrast: f32,
    /// 0.1..=10.0; 1.0 disables the gamma pass.
    pub gamma: f32,
    /// Channel-mix radius. Even values are bumped to the next odd one.
    pub blur_radius: i32,
    /// Output size relative to the input.
    pub size_scale: f32,
    /// Supersampling factor, clamped to 1..=3.
    pub aa_scale: i32,
    /// 0 keeps continuous tone; anything else binarizes dots against this radius.
    pub no_gradient_halftone_threshold: f32,
    /// White dots on black instead of black dots on white.
    pub is_opposition: bool,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            dot_size: 10.0,
            spacing: 2,
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
            blur_radius: 0,
            size_scale: 1.0,
            aa_scale: 2,
            no_gradient_halftone_threshold: 0.0,
            is_opposition: false,
        }
    }
}

impl RenderParams {
    /// Check every domain and freeze the parameters.
    pub fn build(&self) -> Result<RenderConfig> {
        if !self.dot_size.is_finite() || self.dot_size <= 0.0 {
            return Err(Error::invalid_argument(format!(
                "dot size must be > 0, got {}",
                self.dot_size
            )));
        }
        if self.spacing < 0 {
            return Err(Error::invalid_argument(format!(
                "spacing must be >= 0, got {}",
                self.spacing
            )));
        }
        check_range("brightness", self.brightness, -255.0, 255.0)?;
        check_range("contrast", self.contrast, 0.0, 3.0)?;
        check_range("gamma", self.gamma, 0.1, 10.0)?;
        if !self.size_scale.is_finite() || self.size_scale <= 0.0 {
            return Err(Error::invalid_argument(format!(
                "size scale must be > 0, got {}",
                self.size_scale
            )));
        }
        check_range(
            "no-gradient halftone threshold",
            self.no_gradient_halftone_threshold,
            0.0,
            1.0,
        )?;

        Ok(RenderConfig {
            dot_size: self.dot_size,
            spacing: self.spacing,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
            blur_radius: normalize_blur_radius(self.blur_radius),
            size_scale: self.size_scale,
            aa_scale: normalize_aa_scale(self.aa_scale),
            no_gradient_halftone_threshold: self.no_gradient_halftone_threshold,
            is_opposition: self.is_opposition,
        })
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<()> {
    if !(min..=max).contains(&value) {
        return Err(Error::invalid_argument(format!(
            "{name} must be within [{min}, {max}], got {value}"
        )));
    }
    Ok(())
}

/// Smallest odd value >= 1 reachable by adding 1 to an even radius.
pub fn normalize_blur_radius(radius: i32) -> i32 {
    let radius = radius.max(0);
    if radius % 2 == 0 { radius + 1 } else { radius }
}

pub fn normalize_aa_scale(scale: i32) -> i32 {
    scale.clamp(1, 3)
}

/// Frozen, normalized parameter bundle. Only obtainable through [`RenderParams::build`].
#[derive(Clone, Debug, PartialEq)]
pub struct RenderConfig {
    dot_size: f32,
    spacing: i32,
    brightness: f32,
    contrast: f32,
    gamma: f32,
    blur_radius: i32,
    size_scale: f32,
    aa_scale: i32,
    no_gradient_halftone_threshold: f32,
    is_opposition: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let p = RenderParams::default();
        Self {
            dot_size: p.dot_size,
            spacing: p.spacing,
            brightness: p.brightness,
            contrast: p.contrast,
            gamma: p.gamma,
            blur_radius: normalize_blur_radius(p.blur_radius),
            size_scale: p.size_scale,
            aa_scale: normalize_aa_scale(p.aa_scale),
            no_gradient_halftone_threshold: p.no_gradient_halftone_threshold,
            is_opposition: p.is_opposition,
        }
    }
}

impl RenderConfig {
    pub fn dot_size(&self) -> f32 {
        self.dot_size
    }

    pub fn spacing(&self) -> i32 {
        self.spacing
    }

    /// Cell pitch: always `dot_size + spacing`, never stored.
    pub fn grid_size(&self) -> f32 {
        self.dot_size + self.spacing as f32
    }

    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    pub fn contrast(&self) -> f32 {
        self.contrast
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn blur_radius(&self) -> i32 {
        self.blur_radius
    }

    pub fn size_scale(&self) -> f32 {
        self.size_scale
    }

    pub fn aa_scale(&self) -> u32 {
        self.aa_scale as u32
    }

    pub fn no_gradient_halftone_threshold(&self) -> f32 {
        self.no_gradient_halftone_threshold
    }

    pub fn is_opposition(&self) -> bool {
        self.is_opposition
    }

    /// Background color as RGBA (white, or black when inverted).
    pub fn bg_color(&self) -> [u8; 4] {
        if self.is_opposition {
            [0, 0, 0, 255]
        } else {
            [255, 255, 255, 255]
        }
    }

    /// Dot color as RGBA, always the inverse of the background.
    pub fn dot_color(&self) -> [u8; 4] {
        if self.is_opposition {
            [255, 255, 255, 255]
        } else {
            [0, 0, 0, 255]
        }
    }

    /// Back to editable parameters, e.g. to tweak one field and rebuild.
    pub fn to_params(&self) -> RenderParams {
        RenderParams {
            dot_size: self.dot_size,
            spacing: self.spacing,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
            blur_radius: self.blur_radius,
            size_scale: self.size_scale,
            aa_scale: self.aa_scale,
            no_gradient_halftone_threshold: self.no_gradient_halftone_threshold,
            is_opposition: self.is_opposition,
        }
    }
}
