use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use dot_matrix_generator::pipeline::{load_image, process_svg};
use dot_matrix_generator::timeline::load_presets;
use dot_matrix_generator::video::probe_video;
use dot_matrix_generator::{
    JobOptions, JobReport, RenderParams, encode, pro_process_video, process, process_video,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dot-matrix-generator")]
#[command(about = "Turn images and video frames into halftone dot matrices (PNG or SVG)")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Render one image. An `.svg` output path writes vector output.
    Image(ImageArgs),
    /// Render one image as SVG.
    Svg(ImageArgs),
    /// Render every frame of a video with fixed parameters (requires ffmpeg).
    Video(VideoArgs),
    /// Render every frame of a video with parameters keyframed over the timeline.
    ProVideo(ProVideoArgs),
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Input image
    input: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    /// Resize the grayscale image to WIDTHxHEIGHT before rendering
    #[arg(long, value_parser = parse_resolution)]
    size: Option<(u32, u32)>,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct VideoArgs {
    /// Input video
    input: PathBuf,

    /// Output directory for frame_NNNN.png files
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    job: JobArgs,

    #[command(flatten)]
    render: RenderArgs,
}

#[derive(Args, Debug)]
struct ProVideoArgs {
    /// Input video
    input: PathBuf,

    /// Output directory for frame_NNNN.png files
    #[arg(short, long)]
    output: PathBuf,

    /// JSON array of timeline presets
    #[arg(long)]
    presets: PathBuf,

    #[command(flatten)]
    job: JobArgs,
}

#[derive(Args, Debug)]
struct JobArgs {
    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u32>,

    /// Also assemble the rendered frames into this MP4 file
    #[arg(long)]
    encode: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON file with render parameters; replaces the flags below
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dot size (pixels)
    #[arg(long, default_value_t = 10.0)]
    dot_size: f32,

    /// Spacing between dots (pixels)
    #[arg(long, default_value_t = 2)]
    spacing: i32,

    /// Brightness, -255 to 255
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    brightness: f32,

    /// Contrast, 0 to 3
    #[arg(long, default_value_t = 1.0)]
    contrast: f32,

    /// Gamma, 0.1 to 10
    #[arg(long, default_value_t = 1.0)]
    gamma: f32,

    /// Blur radius (even values are bumped to odd)
    #[arg(long, default_value_t = 0)]
    blur_radius: i32,

    /// Output size relative to the input
    #[arg(long, default_value_t = 1.0)]
    size_scale: f32,

    /// Anti-aliasing supersampling factor, 1 to 3
    #[arg(long, default_value_t = 2)]
    aa_scale: i32,

    /// Binarize dots against this radius (0 keeps gradients), 0 to 1
    #[arg(long, default_value_t = 0.0)]
    threshold: f32,

    /// White dots on a black background
    #[arg(long)]
    invert: bool,
}

impl RenderArgs {
    fn params(&self) -> Result<RenderParams, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(path) = &self.config {
            let text = std::fs::read_to_string(path)?;
            return Ok(serde_json::from_str(&text)?);
        }
        Ok(RenderParams {
            dot_size: self.dot_size,
            spacing: self.spacing,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
            blur_radius: self.blur_radius,
            size_scale: self.size_scale,
            aa_scale: self.aa_scale,
            no_gradient_halftone_threshold: self.threshold,
            is_opposition: self.invert,
        })
    }
}

fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err("size must be WIDTHxHEIGHT (e.g. 800x600)".to_string());
    }
    let w: u32 = parts[0].trim().parse().map_err(|_| "invalid width")?;
    let h: u32 = parts[1].trim().parse().map_err(|_| "invalid height")?;
    if w == 0 || h == 0 {
        return Err("width and height must be positive".to_string());
    }
    Ok((w, h))
}

fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

fn run_image(args: &ImageArgs, force_svg: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = args.render.params()?.build()?;
    let img = load_image(&args.input)?;
    println!("Loaded {:?} ({}x{})", args.input, img.width(), img.height());

    if force_svg || is_svg(&args.output) {
        let svg = process_svg(&img, args.size, &cfg)?;
        std::fs::write(&args.output, svg)?;
    } else {
        process(&img, args.size, &cfg)?.save(&args.output)?;
    }
    println!("Done: {:?}", args.output);
    Ok(())
}

fn finish_job(
    report: &JobReport,
    input: &Path,
    output_dir: &Path,
    job: &JobArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("Processed {} frames", report.processed);
    for e in &report.failed {
        eprintln!("  {e}");
    }
    if let Some(mp4) = &job.encode {
        encode::ensure_contiguous(report)?;
        let fps = probe_video(input)?.fps.unwrap_or(30.0);
        encode::encode_frames(output_dir, fps, u64::from(report.processed), mp4)?;
        println!("Encoded: {:?}", mp4);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.cmd {
        Cmd::Image(args) => run_image(args, false)?,
        Cmd::Svg(args) => run_image(args, true)?,
        Cmd::Video(args) => {
            let cfg = args.render.params()?.build()?;
            let opts = JobOptions {
                max_frames: args.job.max_frames,
            };
            let report = process_video(&args.input, &args.output, &cfg, &opts)?;
            finish_job(&report, &args.input, &args.output, &args.job)?;
        }
        Cmd::ProVideo(args) => {
            let presets = load_presets(&args.presets)?;
            println!("Loaded {} timeline presets", presets.len());
            for p in &presets {
                println!("  {p}");
            }
            let opts = JobOptions {
                max_frames: args.job.max_frames,
            };
            let report = pro_process_video(&args.input, &args.output, presets, &opts)?;
            finish_job(&report, &args.input, &args.output, &args.job)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_parses() {
        assert_eq!(parse_resolution("800x600"), Ok((800, 600)));
        assert!(parse_resolution("800").is_err());
        assert!(parse_resolution("0x600").is_err());
    }

    #[test]
    fn cli_defaults_match_render_defaults() {
        let cli = Cli::try_parse_from(["dot-matrix-generator", "image", "in.png", "-o", "out.png"]).unwrap();
        let Cmd::Image(args) = cli.cmd else {
            panic!("expected image subcommand");
        };
        assert_eq!(args.render.params().unwrap(), RenderParams::default());
    }

    #[test]
    fn negative_brightness_is_accepted() {
        let cli = Cli::try_parse_from([
            "dot-matrix-generator",
            "video",
            "in.mp4",
            "-o",
            "frames",
            "--brightness",
            "-40",
            "--max-frames",
            "5",
        ])
        .unwrap();
        let Cmd::Video(args) = cli.cmd else {
            panic!("expected video subcommand");
        };
        assert_eq!(args.render.brightness, -40.0);
        assert_eq!(args.job.max_frames, Some(5));
    }

    #[test]
    fn svg_extension_detected() {
        assert!(is_svg(Path::new("a/b.SVG")));
        assert!(!is_svg(Path::new("a/b.png")));
    }
}
