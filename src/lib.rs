//! Halftone "dot matrix" rendering of images and video frames, as raster or SVG.

pub mod config;
pub mod draw;
pub mod encode;
pub mod error;
pub mod grid;
pub mod pipeline;
pub mod svg;
pub mod timeline;
pub mod tone;
pub mod video;

pub use config::{RenderConfig, RenderParams};
pub use error::{Error, Result};
pub use pipeline::{process, process_frame, save_as_svg};
pub use timeline::{TimelinePreset, TimelinePresetInterpolator};
pub use video::{JobOptions, JobReport, pro_process_video, process_video};
