//! Keyframed render parameters over a video's frame indices.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{RenderConfig, RenderParams};
use crate::error::{Error, Result};

/// Render parameters pinned to one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelinePreset {
    pub frame_num: i32,
    pub dot_size: f64,
    pub spacing: i32,
    pub brightness: f64,
    pub contrast: f64,
    pub gamma: f64,
    pub blur_radius: f64,
    pub size_scale: f64,
    pub aa_scale: i32,
    #[serde(alias = "noGradientHalftone")]
    pub no_gradient_halftone_threshold: f64,
    /// Held, never interpolated: taken from the nearest keyframe.
    #[serde(default)]
    pub is_opposition: bool,
}

impl Default for TimelinePreset {
    fn default() -> Self {
        Self::from_params(0, &RenderParams::default())
    }
}

impl TimelinePreset {
    pub fn from_params(frame_num: i32, p: &RenderParams) -> Self {
        Self {
            frame_num,
            dot_size: p.dot_size as f64,
            spacing: p.spacing,
            brightness: p.brightness as f64,
            contrast: p.contrast as f64,
            gamma: p.gamma as f64,
            blur_radius: p.blur_radius as f64,
            size_scale: p.size_scale as f64,
            aa_scale: p.aa_scale,
            no_gradient_halftone_threshold: p.no_gradient_halftone_threshold as f64,
            is_opposition: p.is_opposition,
        }
    }

    /// Blur radius is truncated toward zero; the config normalizes it afterwards.
    pub fn to_params(&self) -> RenderParams {
        RenderParams {
            dot_size: self.dot_size as f32,
            spacing: self.spacing,
            brightness: self.brightness as f32,
            contrast: self.contrast as f32,
            gamma: self.gamma as f32,
            blur_radius: self.blur_radius as i32,
            size_scale: self.size_scale as f32,
            aa_scale: self.aa_scale,
            no_gradient_halftone_threshold: self.no_gradient_halftone_threshold as f32,
            is_opposition: self.is_opposition,
        }
    }

    pub fn to_config(&self) -> Result<RenderConfig> {
        self.to_params().build()
    }

    fn at_frame(&self, frame_num: i32) -> Self {
        Self {
            frame_num,
            ..self.clone()
        }
    }
}

impl fmt::Display for TimelinePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {} - dot size: {} spacing: {} brightness: {:.2} contrast: {:.2} gamma: {:.2} \
             blur: {:.1} scale: {:.2} aa: {} threshold: {:.2}",
            self.frame_num,
            self.dot_size,
            self.spacing,
            self.brightness,
            self.contrast,
            self.gamma,
            self.blur_radius,
            self.size_scale,
            self.aa_scale,
            self.no_gradient_halftone_threshold,
        )?;
        if self.is_opposition {
            f.write_str(" inverted")?;
        }
        Ok(())
    }
}

/// Read a JSON array of presets.
pub fn load_presets(path: &Path) -> Result<Vec<TimelinePreset>> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Ties go to the even neighbor, so 2.5 -> 2 and 1.5 -> 2.
fn lerp_round(a: i32, b: i32, t: f64) -> i32 {
    lerp(a as f64, b as f64, t).round_ties_even() as i32
}

/// Immutable, sorted keyframes. Lookups are pure, so a shared reference can serve many threads.
#[derive(Clone, Debug)]
pub struct TimelinePresetInterpolator {
    presets: Vec<TimelinePreset>,
}

impl TimelinePresetInterpolator {
    pub fn new(presets: impl IntoIterator<Item = TimelinePreset>) -> Result<Self> {
        let mut presets: Vec<TimelinePreset> = presets.into_iter().collect();
        if presets.is_empty() {
            return Err(Error::invalid_argument("timeline needs at least one preset"));
        }
        presets.sort_by_key(|p| p.frame_num);
        if let Some(pair) = presets.windows(2).find(|w| w[0].frame_num == w[1].frame_num) {
            return Err(Error::DuplicateKey {
                frame: pair[0].frame_num,
            });
        }
        Ok(Self { presets })
    }

    pub fn presets(&self) -> &[TimelinePreset] {
        &self.presets
    }

    pub fn first_frame(&self) -> i32 {
        self.presets[0].frame_num
    }

    pub fn last_frame(&self) -> i32 {
        self.presets[self.presets.len() - 1].frame_num
    }

    /// Parameters for frame `n`: clamped outside the keyed range, linear between keys.
    pub fn preset_at_frame(&self, n: i32) -> Result<TimelinePreset> {
        let first = &self.presets[0];
        let last = &self.presets[self.presets.len() - 1];
        if n < first.frame_num {
            return Ok(first.at_frame(n));
        }
        if n > last.frame_num {
            return Ok(last.at_frame(n));
        }

        match self.presets.binary_search_by_key(&n, |p| p.frame_num) {
            Ok(i) => Ok(self.presets[i].at_frame(n)),
            Err(i) if i > 0 && i < self.presets.len() => {
                Ok(interpolate(&self.presets[i - 1], &self.presets[i], n))
            }
            Err(i) => Err(Error::internal(format!(
                "frame {n} fell outside keyframe bracket (insertion point {i})"
            ))),
        }
    }

    pub fn config_at_frame(&self, n: i32) -> Result<RenderConfig> {
        self.preset_at_frame(n)?.to_config()
    }
}

fn interpolate(prev: &TimelinePreset, next: &TimelinePreset, n: i32) -> TimelinePreset {
    let (n, lo, hi) = (n as i64, prev.frame_num as i64, next.frame_num as i64);
    let t = (n - lo) as f64 / (hi - lo) as f64;
    let is_opposition = if n - lo <= hi - n {
        prev.is_opposition
    } else {
        next.is_opposition
    };
    TimelinePreset {
        frame_num: n as i32,
        dot_size: lerp(prev.dot_size, next.dot_size, t),
        spacing: lerp_round(prev.spacing, next.spacing, t),
        brightness: lerp(prev.brightness, next.brightness, t),
        contrast: lerp(prev.contrast, next.contrast, t),
        gamma: lerp(prev.gamma, next.gamma, t),
        blur_radius: lerp(prev.blur_radius, next.blur_radius, t),
        size_scale: lerp(prev.size_scale, next.size_scale, t),
        aa_scale: lerp_round(prev.aa_scale, next.aa_scale, t),
        no_gradient_halftone_threshold: lerp(
            prev.no_gradient_halftone_threshold,
            next.no_gradient_halftone_threshold,
            t,
        ),
        is_opposition,
    }
}
