//! Video decoding through the `ffmpeg` and `ffprobe` executables.
//!
//! Frames are read from ffmpeg's stdout as raw `rgb24`, one
//! `width * height * 3` byte block per frame.

use anyhow::{anyhow, bail, Context, Result};
use image::RgbImage;
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use super::{VideoInfo, VideoSource};

#[derive(Debug, Deserialize)]
struct StreamReport {
    #[serde(default)]
    streams: Vec<StreamEntry>,
}

#[derive(Debug, Deserialize)]
struct StreamEntry {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Parses an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Extracts stream properties from `ffprobe -of json` output.
pub fn parse_stream_info(json: &str) -> Result<VideoInfo> {
    let report: StreamReport = serde_json::from_str(json).context("Invalid ffprobe output")?;
    let stream = report
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No video stream found"))?;

    let (Some(width), Some(height)) = (stream.width, stream.height) else {
        bail!("Video stream has no dimensions");
    };

    let frame_rate = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| anyhow!("Video stream has no usable frame rate"))?;

    let frame_count = stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .or_else(|| {
            let duration: f64 = stream.duration.as_deref()?.parse().ok()?;
            Some((duration * frame_rate).round() as u64)
        })
        .unwrap_or(0);

    Ok(VideoInfo {
        frame_rate,
        frame_count,
        width,
        height,
    })
}

/// Reads one raw rgb24 frame; `None` once the stream is exhausted.
pub fn read_raw_frame<R: Read>(reader: &mut R, width: u32, height: u32) -> Result<Option<RgbImage>> {
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    match reader.read_exact(&mut buffer) {
        Ok(()) => RgbImage::from_raw(width, height, buffer)
            .map(Some)
            .ok_or_else(|| anyhow!("Frame buffer size mismatch")),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e).context("Failed to read frame from ffmpeg"),
    }
}

fn command(exe: &str) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(exe);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        // CREATE_NO_WINDOW
        command.creation_flags(0x08000000);
    }

    command
}

/// A running ffmpeg decode; killed when dropped.
struct Decoder {
    child: Child,
    stdout: ChildStdout,
}

impl Drop for Decoder {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Video file decoded by ffmpeg child processes.
pub struct FfmpegVideo {
    path: PathBuf,
    ffmpeg_exe: String,
    info: VideoInfo,
    decoder: Option<Decoder>,
}

impl FfmpegVideo {
    /// Reads the metadata of `path` with ffprobe. Fails if the file can't be read as video.
    pub fn open(path: &Path, ffmpeg_exe: &str, ffprobe_exe: &str) -> Result<Self> {
        if !path.exists() {
            bail!("Video not found: {}", path.display());
        }

        let output = command(ffprobe_exe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate,nb_frames,duration",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .with_context(|| format!("Failed to run {}", ffprobe_exe))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffprobe failed on {}: {}", path.display(), stderr.trim());
        }

        let info = parse_stream_info(&String::from_utf8_lossy(&output.stdout))?;
        log::info!(
            "[ffmpeg] Opened {} ({}x{}, {:.3} fps, {} frames)",
            path.display(),
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            ffmpeg_exe: ffmpeg_exe.to_string(),
            info,
            decoder: None,
        })
    }

    /// Starts decoding at `start` seconds, optionally limited to `frames` frames.
    fn spawn_decoder(&self, start: Option<f64>, frames: Option<u64>) -> Result<Decoder> {
        let mut command = command(&self.ffmpeg_exe);
        command.args(["-v", "error"]);
        if let Some(start) = start {
            command.arg("-ss").arg(format!("{:.6}", start));
        }
        command.arg("-i").arg(&self.path);
        if let Some(frames) = frames {
            command.arg("-frames:v").arg(frames.to_string());
        }
        command.args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "pipe:1"]);

        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to run {}", self.ffmpeg_exe))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdout not captured"))?;

        Ok(Decoder { child, stdout })
    }
}

impl VideoSource for FfmpegVideo {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>> {
        let start = index as f64 / self.info.frame_rate;
        let mut decoder = self.spawn_decoder(Some(start), Some(1))?;
        read_raw_frame(&mut decoder.stdout, self.info.width, self.info.height)
    }

    fn rewind(&mut self) -> Result<()> {
        self.decoder = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.decoder.is_none() {
            self.decoder = Some(self.spawn_decoder(None, None)?);
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        read_raw_frame(&mut decoder.stdout, self.info.width, self.info.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_stream_info() {
        let json = r#"{
            "programs": [],
            "streams": [{
                "width": 1280,
                "height": 720,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "nb_frames": "900",
                "duration": "30.000000"
            }]
        }"#;
        let info = parse_stream_info(json).unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.frame_rate, 30.0);
        assert_eq!(info.frame_count, 900);
    }

    #[test]
    fn test_parse_stream_info_falls_back_to_duration() {
        // Matroska streams report no nb_frames and a 0/0 average rate
        let json = r#"{ "streams": [{
            "width": 640, "height": 480,
            "r_frame_rate": "25/1", "avg_frame_rate": "0/0",
            "duration": "4.0"
        }] }"#;
        let info = parse_stream_info(json).unwrap();
        assert_eq!(info.frame_rate, 25.0);
        assert_eq!(info.frame_count, 100);
    }

    #[test]
    fn test_parse_stream_info_without_stream() {
        assert!(parse_stream_info(r#"{ "streams": [] }"#).is_err());
        assert!(parse_stream_info("not json").is_err());
    }

    #[test]
    fn test_read_raw_frames() {
        // Two 2x1 frames followed by a truncated one
        let mut bytes: Vec<u8> = (0..12).collect();
        bytes.extend([1, 2, 3]);
        let mut reader = Cursor::new(bytes);

        let first = read_raw_frame(&mut reader, 2, 1).unwrap().unwrap();
        assert_eq!(first.get_pixel(1, 0).0, [3, 4, 5]);
        let second = read_raw_frame(&mut reader, 2, 1).unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0).0, [6, 7, 8]);
        assert!(read_raw_frame(&mut reader, 2, 1).unwrap().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        assert!(FfmpegVideo::open(Path::new("/no/such/video.mp4"), "ffmpeg", "ffprobe").is_err());
    }
}
