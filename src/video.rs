//! Video decoding (ffmpeg → raw RGBA frames) and frame-by-frame halftone jobs.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::mpsc::{Receiver, SyncSender, sync_channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use image::RgbaImage;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::pipeline::process_frame;
use crate::timeline::{TimelinePreset, TimelinePresetInterpolator};

/// Decoded frames buffered ahead of the renderer.
const FRAME_QUEUE_DEPTH: usize = 4;

#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    /// Container frame count, when ffprobe reports one.
    pub frame_count: Option<u64>,
    pub fps: Option<f64>,
}

/// One decoded frame, owned by whoever holds it.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub index: u32,
    pub image: RgbaImage,
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn parse_ff_ratio(s: &str) -> Option<f64> {
    let (num, den) = s.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 || num <= 0.0 {
        return None;
    }
    Some(num / den)
}

fn parse_probe_output(json: &[u8]) -> Result<VideoInfo> {
    #[derive(Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
    }
    #[derive(Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|e| Error::source_error(format!("ffprobe json parse failed: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::source_error("no video stream found"))?;
    let width = stream.width.unwrap_or(0);
    let height = stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(Error::source_error(format!(
            "video stream has invalid dimensions {width}x{height}"
        )));
    }

    Ok(VideoInfo {
        width,
        height,
        frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        fps: stream.r_frame_rate.as_deref().and_then(parse_ff_ratio),
    })
}

pub fn probe_video(path: &Path) -> Result<VideoInfo> {
    let out = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams"])
        .arg(path)
        .output()
        .map_err(|e| Error::source_error(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(Error::source_error(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    parse_probe_output(&out.stdout)
}

/// Fill `buf` from `r`; returns how many bytes arrived before EOF.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Keep the tail of ffmpeg's stderr for error messages.
fn drain_stderr(mut stderr: impl Read + Send + 'static) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = [0u8; 512];
        let mut tail = Vec::<u8>::new();
        while let Ok(n) = stderr.read(&mut buf) {
            if n == 0 {
                break;
            }
            tail.extend_from_slice(&buf[..n]);
            if tail.len() > 4096 {
                tail.drain(..tail.len() - 1024);
            }
        }
        String::from_utf8_lossy(&tail).trim().to_string()
    })
}

/// Raw RGBA at the coded size ffprobe reports. Display-matrix rotation would swap
/// width and height under the reader, so it is left off.
fn decoder_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "error", "-nostdin", "-noautorotate", "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args.extend(
        ["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"]
            .into_iter()
            .map(OsString::from),
    );
    args
}

/// Pull-based stream of decoded frames backed by an `ffmpeg` child process.
///
/// Dropping the stream (or calling [`FrameStream::stop`]) ends decoding: the
/// channel closes, the child is killed and the reader thread is joined.
pub struct FrameStream {
    info: VideoInfo,
    rx: Option<Receiver<Result<DecodedFrame>>>,
    child: Arc<Mutex<Child>>,
    reader: Option<JoinHandle<()>>,
}

impl FrameStream {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::invalid_argument(format!(
                "video file '{}' does not exist",
                path.display()
            )));
        }
        if !is_ffmpeg_on_path() {
            return Err(Error::source_error("ffmpeg not found. Please install ffmpeg and add it to your PATH."));
        }
        let info = probe_video(path)?;

        let mut child = Command::new("ffmpeg")
            .args(decoder_args(path))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::source_error(format!("failed to spawn ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::source_error("failed to take ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::source_error("failed to take ffmpeg stderr"))?;
        let stderr_tail = drain_stderr(stderr);

        let child = Arc::new(Mutex::new(child));
        let (tx, rx) = sync_channel(FRAME_QUEUE_DEPTH);
        let reader = {
            let child = Arc::clone(&child);
            let (w, h) = (info.width, info.height);
            std::thread::spawn(move || read_frames(stdout, w, h, tx, child, stderr_tail))
        };

        debug!(path = %path.display(), width = info.width, height = info.height, "ffmpeg decoder started");
        Ok(Self {
            info,
            rx: Some(rx),
            child,
            reader: Some(reader),
        })
    }

    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// End the sequence early and release the decoder.
    pub fn stop(self) {
        drop(self);
    }
}

impl Iterator for FrameStream {
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rx.as_ref()?.recv().ok()
    }
}

impl Drop for FrameStream {
    fn drop(&mut self) {
        self.rx.take();
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        if let Ok(mut child) = self.child.lock() {
            let _ = child.wait();
        }
    }
}

fn read_frames(
    mut stdout: ChildStdout,
    width: u32,
    height: u32,
    tx: SyncSender<Result<DecodedFrame>>,
    child: Arc<Mutex<Child>>,
    stderr_tail: JoinHandle<String>,
) {
    let frame_len = width as usize * height as usize * 4;
    let mut index = 0u32;
    loop {
        let mut buf = vec![0u8; frame_len];
        let item = match read_full(&mut stdout, &mut buf) {
            Ok(0) => break,
            Ok(n) if n < frame_len => Err(Error::source_error(format!(
                "truncated frame {index}: got {n} of {frame_len} bytes"
            ))),
            Ok(_) => RgbaImage::from_raw(width, height, buf)
                .map(|image| DecodedFrame { index, image })
                .ok_or_else(|| Error::internal("raw frame size mismatch")),
            Err(e) => Err(Error::source_error(format!("reading decoded frames failed: {e}"))),
        };
        let failed = item.is_err();
        if tx.send(item).is_err() || failed {
            return;
        }
        index += 1;
    }

    let status = child.lock().map(|mut c| c.wait());
    let tail = stderr_tail.join().unwrap_or_default();
    match status {
        Ok(Ok(s)) if s.success() => {}
        Ok(Ok(s)) => {
            let _ = tx.send(Err(Error::source_error(format!("ffmpeg exited with {s}: {tail}"))));
        }
        Ok(Err(e)) => {
            let _ = tx.send(Err(Error::source_error(format!("waiting for ffmpeg failed: {e}"))));
        }
        Err(_) => {
            let _ = tx.send(Err(Error::internal("decoder handle poisoned")));
        }
    }
}

/// Outcome of a finished video job.
#[derive(Debug, Default)]
pub struct JobReport {
    /// Frames rendered and saved.
    pub processed: u32,
    /// Frames that failed, with the reason. The job continued past each.
    pub failed: Vec<Error>,
}

pub fn frame_path(output_dir: &Path, index: u32) -> PathBuf {
    output_dir.join(format!("frame_{:04}.png", index))
}

#[derive(Clone, Debug, Default)]
pub struct JobOptions {
    /// End the frame sequence after this many frames.
    pub max_frames: Option<u32>,
}

pub fn frame_progress(len: Option<u64>) -> ProgressBar {
    match len {
        Some(len) => {
            let pb = ProgressBar::new(len);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames")
            {
                pb.set_style(style.progress_chars("=>-"));
            }
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("[{elapsed_precise}] {spinner} {pos} frames")
            {
                pb.set_style(style);
            }
            pb
        }
    }
}

fn render_frame<F>(frame: &DecodedFrame, output_dir: &Path, resolve: &mut F) -> Result<PathBuf>
where
    F: FnMut(u32) -> Result<RenderConfig>,
{
    let cfg = resolve(frame.index)?;
    let out = process_frame(&frame.image, &cfg)?;
    let path = frame_path(output_dir, frame.index);
    out.save(&path)?;
    Ok(path)
}

/// Render every frame of `frames` into `output_dir/frame_NNNN.png`.
///
/// Per-frame failures are collected in the report; a source error ends the
/// job and is returned.
pub fn run_job<I, F>(
    frames: I,
    output_dir: &Path,
    mut resolve: F,
    progress: &ProgressBar,
) -> Result<JobReport>
where
    I: IntoIterator<Item = Result<DecodedFrame>>,
    F: FnMut(u32) -> Result<RenderConfig>,
{
    std::fs::create_dir_all(output_dir)?;
    let mut report = JobReport::default();

    for item in frames {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) if e.is_terminal() => {
                error!(error = %e, "video source failed, stopping");
                progress.abandon_with_message("Video source failed");
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, "skipping undecodable frame");
                report.failed.push(e);
                progress.inc(1);
                continue;
            }
        };

        match render_frame(&frame, output_dir, &mut resolve) {
            Ok(path) => {
                debug!(index = frame.index, path = %path.display(), "frame written");
                report.processed += 1;
            }
            Err(e) => {
                let e = Error::frame(frame.index, e.to_string());
                warn!(error = %e, "frame failed");
                report.failed.push(e);
            }
        }
        progress.inc(1);
    }

    progress.finish_with_message(format!("{} frames processed", report.processed));
    Ok(report)
}

fn open_limited(
    video_path: &Path,
    opts: &JobOptions,
) -> Result<(impl Iterator<Item = Result<DecodedFrame>>, ProgressBar)> {
    let stream = FrameStream::open(video_path)?;
    let limit = opts.max_frames.map(u64::from);
    let len = match (stream.info().frame_count, limit) {
        (Some(n), Some(l)) => Some(n.min(l)),
        (n, l) => n.or(l),
    };
    let take = opts.max_frames.map_or(usize::MAX, |n| n as usize);
    Ok((stream.take(take), frame_progress(len)))
}

/// Every frame rendered with one fixed config.
pub fn process_video(
    video_path: &Path,
    output_dir: &Path,
    cfg: &RenderConfig,
    opts: &JobOptions,
) -> Result<JobReport> {
    info!(video = %video_path.display(), out = %output_dir.display(), "processing video");
    let (frames, pb) = open_limited(video_path, opts)?;
    let report = run_job(frames, output_dir, |_| Ok(cfg.clone()), &pb)?;
    info!(processed = report.processed, failed = report.failed.len(), "video done");
    Ok(report)
}

/// Every frame rendered with the config interpolated from `presets` at its index.
pub fn pro_process_video(
    video_path: &Path,
    output_dir: &Path,
    presets: Vec<TimelinePreset>,
    opts: &JobOptions,
) -> Result<JobReport> {
    if !video_path.is_file() {
        return Err(Error::invalid_argument(format!(
            "video file '{}' does not exist",
            video_path.display()
        )));
    }
    let timeline = TimelinePresetInterpolator::new(presets)?;
    info!(
        video = %video_path.display(),
        out = %output_dir.display(),
        keyframes = timeline.presets().len(),
        "processing video with timeline"
    );

    let (frames, pb) = open_limited(video_path, opts)?;
    let report = run_job(
        frames,
        output_dir,
        |index| {
            let n = i32::try_from(index)
                .map_err(|_| Error::invalid_argument(format!("frame index {index} out of range")))?;
            timeline.config_at_frame(n)
        },
        &pb,
    )?;
    info!(processed = report.processed, failed = report.failed.len(), "video done");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderParams;
    use image::Rgba;

    #[test]
    fn decoder_keeps_coded_orientation() {
        let args = decoder_args(Path::new("clip with spaces.mov"));
        let pos = |s: &str| args.iter().position(|a| a == s);
        let input = pos("-i").unwrap();
        assert!(pos("-noautorotate").unwrap() < input);
        assert_eq!(args[input + 1], OsString::from("clip with spaces.mov"));
        assert_eq!(
            &args[args.len() - 5..],
            ["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"].map(OsString::from)
        );
    }

    fn frames(n: u32, w: u32, h: u32) -> Vec<Result<DecodedFrame>> {
        (0..n)
            .map(|index| {
                Ok(DecodedFrame {
                    index,
                    image: RgbaImage::from_pixel(w, h, Rgba([(index * 40) as u8, 0, 0, 255])),
                })
            })
            .collect()
    }

    #[test]
    fn frame_names_are_zero_padded() {
        let p = frame_path(Path::new("out"), 7);
        assert_eq!(p, Path::new("out").join("frame_0007.png"));
        assert!(frame_path(Path::new("."), 12345).ends_with("frame_12345.png"));
    }

    #[test]
    fn job_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested").join("frames");
        let cfg = RenderConfig::default();
        let report = run_job(frames(3, 24, 24), &out, |_| Ok(cfg.clone()), &ProgressBar::hidden()).unwrap();
        assert_eq!(report.processed, 3);
        assert!(report.failed.is_empty());
        for i in 0..3 {
            let img = image::open(frame_path(&out, i)).unwrap();
            assert_eq!((img.width(), img.height()), (24, 24));
        }
    }

    #[test]
    fn per_frame_failure_does_not_stop_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = frames(3, 24, 24);
        input[1] = Ok(DecodedFrame {
            index: 1,
            image: RgbaImage::new(0, 0),
        });
        let cfg = RenderConfig::default();
        let report = run_job(input, dir.path(), |_| Ok(cfg.clone()), &ProgressBar::hidden()).unwrap();
        assert_eq!(report.processed, 2);
        assert_eq!(report.failed.len(), 1);
        assert!(matches!(report.failed[0], Error::Frame { index: 1, .. }));
        assert!(!frame_path(dir.path(), 1).exists());
        assert!(frame_path(dir.path(), 2).exists());
    }

    #[test]
    fn resolver_failure_is_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_job(
            frames(2, 12, 12),
            dir.path(),
            |i| {
                RenderParams {
                    contrast: if i == 0 { 9.0 } else { 1.0 },
                    ..RenderParams::default()
                }
                .build()
            },
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(report.processed, 1);
        assert!(report.failed[0].to_string().starts_with("frame 0:"));
    }

    #[test]
    fn source_error_aborts_job() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = frames(2, 12, 12);
        input.push(Err(Error::source_error("decoder crashed")));
        input.extend(frames(1, 12, 12));
        let cfg = RenderConfig::default();
        let err = run_job(input, dir.path(), |_| Ok(cfg.clone()), &ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, Error::Source(_)));
        assert!(frame_path(dir.path(), 1).exists());
    }

    #[test]
    fn ending_the_sequence_stops_processing() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = RenderConfig::default();
        let report = run_job(
            frames(10, 12, 12).into_iter().take(4),
            dir.path(),
            |_| Ok(cfg.clone()),
            &ProgressBar::hidden(),
        )
        .unwrap();
        assert_eq!(report.processed, 4);
        assert!(!frame_path(dir.path(), 4).exists());
    }

    #[test]
    fn timeline_drives_per_frame_config() {
        let dir = tempfile::tempdir().unwrap();
        let timeline = TimelinePresetInterpolator::new([
            TimelinePreset {
                frame_num: 0,
                ..TimelinePreset::default()
            },
            TimelinePreset {
                frame_num: 2,
                is_opposition: true,
                ..TimelinePreset::default()
            },
        ])
        .unwrap();
        let input: Vec<_> = (0..3)
            .map(|index| {
                Ok(DecodedFrame {
                    index,
                    image: RgbaImage::from_pixel(24, 24, Rgba([255, 255, 255, 255])),
                })
            })
            .collect();
        run_job(
            input,
            dir.path(),
            |i| timeline.config_at_frame(i as i32),
            &ProgressBar::hidden(),
        )
        .unwrap();
        let first = image::open(frame_path(dir.path(), 0)).unwrap().to_rgba8();
        let last = image::open(frame_path(dir.path(), 2)).unwrap().to_rgba8();
        assert!(first.get_pixel(12, 12)[0] > 250);
        assert!(last.get_pixel(12, 12)[0] < 5);
    }

    #[test]
    fn missing_video_is_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.mp4");
        let out = dir.path().join("out");
        let err = process_video(&missing, &out, &RenderConfig::default(), &JobOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = pro_process_video(&missing, &out, vec![TimelinePreset::default()], &JobOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!out.exists());
    }

    #[test]
    fn probe_json_is_parsed() {
        let json = br#"{"streams": [
            {"codec_type": "audio"},
            {"codec_type": "video", "width": 640, "height": 360,
             "r_frame_rate": "30000/1001", "nb_frames": "120"}
        ]}"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!((info.width, info.height), (640, 360));
        assert_eq!(info.frame_count, Some(120));
        assert!((info.fps.unwrap() - 29.97).abs() < 0.01);

        let err = parse_probe_output(br#"{"streams": [{"codec_type": "audio"}]}"#).unwrap_err();
        assert!(matches!(err, Error::Source(_)));
    }

    #[test]
    fn read_full_reports_short_reads() {
        let data = [1u8, 2, 3];
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut &data[..], &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &data);
    }
}
