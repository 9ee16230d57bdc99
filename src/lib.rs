//! OCR Recorder
//!
//! Periodically grabs a full frame (live screen or decoded video), reads
//! numeric values out of user-defined rectangular regions with OCR, and
//! records them as an aligned time series that is written to CSV when a
//! recording stops.
//!
//! Data flow per cycle:
//! sampler → `RegionSet::process` → `Dispatcher` → per-region `OcrPipeline`
//! → name/value readings → `Recorder::record`.

pub mod analysis;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod recorder;
pub mod region;
pub mod sampler;
pub mod session;

#[cfg(feature = "screen-capture")]
pub mod capture;

pub use config::AppConfig;
pub use dispatch::Dispatcher;
pub use ocr::{OcrEngine, OcrPipeline, PreProcessConfig, Recognizer};
pub use recorder::Recorder;
pub use region::{Area, Readings, Region, RegionSet};
pub use sampler::{FrameSource, RealtimeSampler, VideoSampler, VideoSource};
pub use session::{Command, Session};
