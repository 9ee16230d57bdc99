//! Offline video processing.
//!
//! Decoded frames advance a simulated clock by one frame duration each. A
//! dispatch cycle runs whenever the clock has moved at least one sample
//! interval past the previous emission, so a 30 fps video sampled at 10 Hz
//! processes every third frame.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{FfmpegVideo, VideoInfo, VideoSource};
use crate::config::AppConfig;
use crate::region::Readings;
use crate::session::Session;

/// Absorbs rounding when frame and sample intervals divide evenly.
const CLOCK_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoState {
    /// No video loaded yet
    Empty,
    Loaded,
    Processing,
    /// A processing run ended (end of stream or stop request)
    Stopped,
}

pub struct VideoSampler {
    source: Option<Box<dyn VideoSource>>,
    preview: Option<RgbImage>,
    sample_rate: f64,
    state: VideoState,
    stop: Arc<AtomicBool>,
}

impl VideoSampler {
    /// `sample_rate` is in output samples per second of video (<= 0: every frame).
    pub fn new(sample_rate: f64) -> Self {
        Self {
            source: None,
            preview: None,
            sample_rate,
            state: VideoState::Empty,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.video_sample_rate)
    }

    /// Loads a video and decodes its preview frame (the one at the midpoint).
    ///
    /// An unreadable video is rejected and the previously loaded one is kept.
    pub fn load(&mut self, mut source: Box<dyn VideoSource>) -> Result<()> {
        let info = source.info();
        if info.frame_rate.is_nan() || info.frame_rate <= 0.0 {
            return Err(anyhow!("Video has no usable frame rate"));
        }

        let preview = source
            .frame_at(info.frame_count / 2)?
            .ok_or_else(|| anyhow!("Couldn't read video"))?;

        self.source = Some(source);
        self.preview = Some(preview);
        self.state = VideoState::Loaded;
        log::info!(
            "[VideoSampler] Loaded video: {} frames at {:.3} fps",
            info.frame_count,
            info.frame_rate
        );
        Ok(())
    }

    /// Opens `path` with the ffmpeg decoder configured in `config`.
    pub fn open(&mut self, path: &Path, config: &AppConfig) -> Result<()> {
        let video = FfmpegVideo::open(path, &config.ffmpeg_exe, &config.ffprobe_exe)?;
        self.load(Box::new(video))
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Midpoint frame of the loaded video, decoded once at load time.
    pub fn preview_frame(&self) -> Option<&RgbImage> {
        self.preview.as_ref()
    }

    pub fn info(&self) -> Option<VideoInfo> {
        self.source.as_ref().map(|s| s.info())
    }

    pub fn state(&self) -> VideoState {
        self.state
    }

    /// Flag another thread can set to end a running `process_video`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Processes the loaded video from the start, recording into `session`.
    ///
    /// `callback(readings, [frame_index, frame_count])` runs after every
    /// processed frame. The stop flag is checked once per decoded frame. Returns
    /// the written CSV path, or `None` if no video is loaded.
    pub fn process_video<F>(&mut self, session: &mut Session, mut callback: F) -> Result<Option<PathBuf>>
    where
        F: FnMut(&Readings, [u64; 2]),
    {
        let Some(source) = self.source.as_mut() else {
            log::warn!("[VideoSampler] No valid video loaded");
            return Ok(None);
        };

        let info = source.info();
        source.rewind()?;

        let sample_interval = if self.sample_rate > 0.0 {
            1.0 / self.sample_rate
        } else {
            0.0
        };

        self.state = VideoState::Processing;
        session.recorder_mut().start_recording();

        let mut frame_idx: u64 = 0;
        let mut last_emit = 0.0;
        let mut processed = 0usize;

        let outcome = loop {
            if self.stop.load(Ordering::SeqCst) {
                log::info!("[VideoSampler] Stop requested at frame {}", frame_idx);
                break Ok(());
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break Ok(()),
                Err(e) => {
                    log::warn!("[VideoSampler] Decoding stopped at frame {}: {:#}", frame_idx, e);
                    break Ok(());
                }
            };
            frame_idx += 1;

            let t = frame_idx as f64 / info.frame_rate;
            if t - last_emit + CLOCK_EPSILON < sample_interval {
                continue;
            }
            last_emit = t;

            let readings = match session.cycle(&frame, Some(t)) {
                Ok(Some(readings)) => readings,
                Ok(None) => continue,
                Err(e) => break Err(e),
            };
            processed += 1;

            if info.frame_count > 0 {
                log::debug!(
                    "[{}/{}][{} %] {:?}",
                    frame_idx,
                    info.frame_count,
                    frame_idx * 100 / info.frame_count,
                    readings
                );
            }
            callback(&readings, [frame_idx, info.frame_count]);
        };

        self.state = VideoState::Stopped;
        self.stop.store(false, Ordering::SeqCst);

        let path = session.recorder_mut().stop_recording()?;
        log::info!(
            "[VideoSampler] Processed {} of {} decoded frames",
            processed,
            frame_idx
        );
        outcome?;
        Ok(Some(path))
    }
}
