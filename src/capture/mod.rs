//! Live screen capture through xcap.

use anyhow::{anyhow, Context, Result};
use image::{RgbImage, RgbaImage};
use xcap::Monitor;

use crate::sampler::FrameSource;

/// Captures one monitor per call.
pub struct ScreenSource {
    monitor_index: usize,
}

impl ScreenSource {
    /// `monitor_index` follows the order reported by the platform (0 = first).
    pub fn new(monitor_index: usize) -> Result<Self> {
        let count = Monitor::all().context("Failed to list monitors")?.len();
        if monitor_index >= count {
            return Err(anyhow!(
                "Monitor {} not found ({} detected)",
                monitor_index,
                count
            ));
        }
        log::info!("[Capture] Using monitor {} of {}", monitor_index, count);
        Ok(Self { monitor_index })
    }
}

impl FrameSource for ScreenSource {
    fn capture(&mut self) -> Result<RgbImage> {
        // Re-enumerated each call; a vanished monitor only fails this tick
        let monitor = Monitor::all()?
            .into_iter()
            .nth(self.monitor_index)
            .ok_or_else(|| anyhow!("Monitor {} disappeared", self.monitor_index))?;

        let screenshot = monitor.capture_image()?;
        let (width, height) = (screenshot.width(), screenshot.height());
        let rgba = RgbaImage::from_raw(width, height, screenshot.into_raw())
            .ok_or_else(|| anyhow!("Unexpected screenshot buffer size"))?;

        Ok(image::DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}
