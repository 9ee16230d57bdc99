pub mod engine;
pub mod pipeline;
pub mod preprocess;
pub mod setup;

pub use engine::{OcrEngine, Recognizer, TesseractCli, TesseractSettings, DIGIT_WHITELIST};
pub use pipeline::OcrPipeline;
pub use preprocess::{preprocess, PreProcessConfig};
pub use setup::ensure_tessdata;
