//! Assemble rendered `frame_NNNN.png` files into an MP4 (ffmpeg).

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::error::{Error, Result};
use crate::video::{JobReport, is_ffmpeg_on_path};

/// Highest `frame=` counter found in a chunk of ffmpeg progress output.
fn last_frame_counter(s: &str) -> Option<u64> {
    s.match_indices("frame=")
        .filter_map(|(i, _)| {
            let num: String = s[i + 6..]
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == ' ')
                .filter(|c| *c != ' ')
                .collect();
            num.parse::<u64>().ok()
        })
        .max()
}

/// The image2 demuxer stops at the first missing `frame_NNNN.png`, so a job with
/// failed frames would encode into a silently truncated video.
pub fn ensure_contiguous(report: &JobReport) -> Result<()> {
    if report.failed.is_empty() {
        return Ok(());
    }
    let indices: Vec<String> = report
        .failed
        .iter()
        .map(|e| match e {
            Error::Frame { index, .. } => index.to_string(),
            other => other.to_string(),
        })
        .collect();
    Err(Error::invalid_argument(format!(
        "refusing to encode: {} frame(s) failed ({}), the video would stop at the first gap",
        report.failed.len(),
        indices.join(", ")
    )))
}

pub fn encode_frames(frames_dir: &Path, fps: f64, total_frames: u64, output: &Path) -> Result<()> {
    if !is_ffmpeg_on_path() {
        return Err(Error::invalid_argument(
            "ffmpeg not found. Please install ffmpeg and add it to your PATH.",
        ));
    }
    if !fps.is_finite() || fps <= 0.0 {
        return Err(Error::invalid_argument(format!("invalid frame rate {fps}")));
    }

    let pb = ProgressBar::new(total_frames);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.green/black} {pos}/{len} encoding")
    {
        pb.set_style(style.progress_chars("=>-"));
    }

    let mut child = Command::new("ffmpeg")
        .args(["-y", "-framerate", &format!("{fps}"), "-i"])
        .arg(frames_dir.join("frame_%04d.png"))
        .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
        .arg(output)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::internal("failed to take ffmpeg stderr"))?;
    let reader = {
        let pb = pb.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 512];
            let mut tail = Vec::<u8>::new();
            let mut last_pos = 0u64;
            while let Ok(n) = stderr.read(&mut buf) {
                if n == 0 {
                    break;
                }
                tail.extend_from_slice(&buf[..n]);
                if tail.len() > 4096 {
                    tail.drain(..tail.len() - 1024);
                }
                if let Some(pos) = last_frame_counter(&String::from_utf8_lossy(&tail)) {
                    let pos = pos.min(total_frames);
                    if pos > last_pos {
                        last_pos = pos;
                        pb.set_position(pos);
                    }
                }
            }
            String::from_utf8_lossy(&tail).trim().to_string()
        })
    };

    let status = child.wait()?;
    let tail = reader.join().unwrap_or_default();
    pb.finish_with_message("Encoding done");

    if !status.success() {
        return Err(Error::source_error(format!("ffmpeg encode failed ({status}): {tail}")));
    }
    info!(output = %output.display(), "encoded video");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_frames_block_encoding() {
        assert!(ensure_contiguous(&JobReport {
            processed: 3,
            failed: Vec::new(),
        })
        .is_ok());

        let report = JobReport {
            processed: 3,
            failed: vec![Error::frame(1, "bad pixels")],
        };
        let err = ensure_contiguous(&report).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("(1)"), "{err}");
    }

    #[test]
    fn frame_counter_picks_latest() {
        let s = "frame=   12 fps=0.0 q=0.0 size=0kB\rframe=  240 fps=60 q=28.0";
        assert_eq!(last_frame_counter(s), Some(240));
    }

    #[test]
    fn frame_counter_absent() {
        assert_eq!(last_frame_counter("Input #0, image2"), None);
        assert_eq!(last_frame_counter("frame=N/A"), None);
    }
}
