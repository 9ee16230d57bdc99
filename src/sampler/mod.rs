//! Frame pacing.
//!
//! Two drivers feed frames into a `Session`:
//! - `RealtimeSampler` grabs a frame from a `FrameSource` on a wall-clock
//!   schedule.
//! - `VideoSampler` walks a `VideoSource` frame by frame and resamples it to a
//!   target output rate.

pub mod ffmpeg;
pub mod realtime;
pub mod video;

use anyhow::Result;
use image::RgbImage;

pub use ffmpeg::FfmpegVideo;
pub use realtime::{RealtimeSampler, RealtimeState};
pub use video::{VideoSampler, VideoState};

/// Produces full frames on demand. Failures are expected to be transient.
pub trait FrameSource {
    fn capture(&mut self) -> Result<RgbImage>;
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<RgbImage>,
{
    fn capture(&mut self) -> Result<RgbImage> {
        self()
    }
}

/// Stream properties reported by a video source.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoInfo {
    pub frame_rate: f64,
    /// Total frames (0 if the container doesn't say)
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

/// A seekable, decodable video.
pub trait VideoSource: Send {
    fn info(&self) -> VideoInfo;

    /// Decodes the frame at `index` (0-based) without moving the sequential cursor.
    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>>;

    /// Moves the sequential cursor back to the first frame.
    fn rewind(&mut self) -> Result<()>;

    /// Next frame in decode order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}
