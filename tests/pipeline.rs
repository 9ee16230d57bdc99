//! End-to-end cycles: sampler → dispatch → recorder → CSV, with scripted OCR
//! and synthetic frame sources.

use anyhow::{bail, Result};
use image::{GrayImage, ImageBuffer, Rgb, RgbImage};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::mpsc::channel;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

use ocr_recorder::ocr::TesseractSettings;
use ocr_recorder::sampler::VideoInfo;
use ocr_recorder::{
    Command, OcrEngine, PreProcessConfig, RealtimeSampler, Recognizer, Recorder, RegionSet,
    Session, VideoSampler, VideoSource,
};

/// Returns scripted answers per input width; the last answer repeats.
struct ScriptedRecognizer {
    scripts: Mutex<HashMap<u32, VecDeque<String>>>,
}

impl ScriptedRecognizer {
    fn new(scripts: &[(u32, &[&str])]) -> Self {
        let scripts = scripts
            .iter()
            .map(|(width, answers)| (*width, answers.iter().map(|a| a.to_string()).collect()))
            .collect();
        Self {
            scripts: Mutex::new(scripts),
        }
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&self, img: &GrayImage, _whitelist: &str) -> Result<String> {
        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts.get_mut(&img.width()) else {
            bail!("no script for width {}", img.width());
        };
        if script.len() > 1 {
            Ok(script.pop_front().unwrap())
        } else {
            Ok(script.front().cloned().unwrap_or_default())
        }
    }
}

struct SyntheticVideo {
    frame_rate: f64,
    frame_count: u64,
    cursor: u64,
}

impl VideoSource for SyntheticVideo {
    fn info(&self) -> VideoInfo {
        VideoInfo {
            frame_rate: self.frame_rate,
            frame_count: self.frame_count,
            width: 16,
            height: 16,
        }
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>> {
        Ok((index < self.frame_count).then(frame))
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.cursor >= self.frame_count {
            return Ok(None);
        }
        self.cursor += 1;
        Ok(Some(frame()))
    }
}

fn frame() -> RgbImage {
    ImageBuffer::from_pixel(16, 16, Rgb([200, 200, 200]))
}

/// "speed" is 10 px wide, "temp" 5 px wide, bounded to [20, 100].
const REGIONS: &str = r#"{
    "speed": { "area": [0, 0, 3, 9], "is_enabled": true, "show_preview": false,
               "ocr": { "invert_img": false, "upscale_ratio": 1.0, "unsharp_kernel_size": 5,
                        "unsharp_sigma": 1.0, "unsharp_amount": 1.0 } },
    "temp":  { "area": [4, 0, 7, 4], "min_value": 20.0, "max_value": 100.0 }
}"#;

fn session(dir: &Path, recognizer: ScriptedRecognizer) -> Session {
    let regions_path = dir.join("regions.json");
    std::fs::write(&regions_path, REGIONS).unwrap();

    let regions = RegionSet::new(OcrEngine::TesseractLstm, Arc::new(recognizer));
    let mut session = Session::new(regions, Recorder::new(dir), TesseractSettings::default());
    session.load_regions(&regions_path).unwrap();
    session
}

#[test]
fn test_video_to_csv() {
    let dir = tempdir().unwrap();
    let recognizer = ScriptedRecognizer::new(&[
        (10, &["42"]),
        (5, &["87.3", "8O.3", "150.0"]),
    ]);
    let mut session = session(dir.path(), recognizer);
    let out = dir.path().join("out").join("session.csv");
    session.recorder_mut().set_output_path(Some(out.clone()));

    let mut sampler = VideoSampler::new(10.0);
    sampler
        .load(Box::new(SyntheticVideo {
            frame_rate: 30.0,
            frame_count: 9,
            cursor: 0,
        }))
        .unwrap();

    let mut progress = Vec::new();
    let path = sampler
        .process_video(&mut session, |_, p| progress.push(p))
        .unwrap()
        .unwrap();

    assert_eq!(path, out);
    assert_eq!(progress, vec![[3, 9], [6, 9], [9, 9]]);

    let content = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(
        lines,
        vec![
            r#""t","speed","temp""#,
            r#""0.1","42","87.3""#,
            r#""0.2","42","""#,
            r#""0.3","42","""#,
        ]
    );
}

#[test]
fn test_dispatch_completeness_for_any_worker_limit() {
    for limit in [Some(1), Some(2), Some(3), None] {
        let mut set = RegionSet::new(
            OcrEngine::TesseractLstm,
            Arc::new(ScriptedRecognizer::new(&[(1, &["1"])])),
        );
        for _ in 0..5 {
            set.add_region();
        }
        set.get_mut("New capture 2").unwrap().set_enabled(false);
        // Outside the frame: runs, but yields nothing
        set.get_mut("New capture 3").unwrap().set_area(500, 500, 600, 600);
        set.set_max_threads(limit);

        let readings = set.process(&frame());

        assert_eq!(readings.len(), 5, "limit {:?}", limit);
        assert!(!readings.contains_key("New capture 2"));
        assert_eq!(readings["New capture 3"], None);
        assert_eq!(readings["New capture 0"], Some(1.0));
    }
}

#[test]
fn test_region_added_mid_session_is_backfilled() {
    let dir = tempdir().unwrap();
    let recognizer = ScriptedRecognizer::new(&[(10, &["1"]), (5, &["50"]), (1, &["9"])]);
    let mut session = session(dir.path(), recognizer);

    session.apply(Command::ToggleRecording(true)).unwrap();
    session.cycle(&frame(), Some(1.0)).unwrap();
    session.cycle(&frame(), Some(2.0)).unwrap();

    session.apply(Command::AddRegion).unwrap();
    session.cycle(&frame(), Some(3.0)).unwrap();

    let recorder = session.recorder();
    for name in recorder.field_names() {
        assert_eq!(recorder.samples(&name).unwrap().len(), 3, "field {}", name);
    }
    let added: Vec<Option<f64>> = recorder
        .samples("New capture 2")
        .unwrap()
        .iter()
        .map(|s| s.value)
        .collect();
    assert_eq!(added, vec![None, None, Some(9.0)]);
}

#[test]
fn test_realtime_with_commands() {
    let dir = tempdir().unwrap();
    let recognizer = ScriptedRecognizer::new(&[(10, &["3.5"]), (5, &["25"])]);
    let mut session = session(dir.path(), recognizer);
    let mut sampler = RealtimeSampler::new(500.0, Duration::from_millis(1));

    let (sender, receiver) = channel();
    sender.send(Command::ToggleRecording(true)).unwrap();

    let stop = sampler.stop_handle();
    let mut ticks = 0;
    let mut source = move || -> Result<RgbImage> {
        ticks += 1;
        if ticks == 3 {
            bail!("capture glitch");
        }
        if ticks >= 5 {
            stop.store(true, Ordering::SeqCst);
        }
        Ok(frame())
    };

    let mut cycles = 0;
    sampler
        .run(&mut source, &mut session, Some(&receiver), |_, readings| {
            cycles += 1;
            if cycles == 1 {
                // Applied before the next tick
                sender
                    .send(Command::RenameRegion {
                        old: "temp".to_string(),
                        new: "coolant".to_string(),
                    })
                    .unwrap();
                assert_eq!(readings["temp"], Some(25.0));
            } else {
                assert_eq!(readings["coolant"], Some(25.0));
            }
        })
        .unwrap();

    assert_eq!(cycles, 4);
    let path = session.recorder_mut().stop_recording().unwrap();
    let content = std::fs::read_to_string(path).unwrap();
    assert!(content.starts_with(r#""t","speed","coolant""#));
    assert_eq!(content.lines().count(), 5);
}

#[test]
fn test_engine_swap_keeps_pre_processing() {
    let dir = tempdir().unwrap();
    let mut session = session(dir.path(), ScriptedRecognizer::new(&[]));

    let config = PreProcessConfig {
        invert: true,
        upscale_ratio: 2.0,
        unsharp_kernel_size: 4,
        ..PreProcessConfig::default()
    };
    session
        .apply(Command::SetPreProcess {
            name: "speed".to_string(),
            config,
        })
        .unwrap();
    session
        .apply(Command::SetEngine(OcrEngine::TesseractLegacy))
        .unwrap();

    let regions = session.regions().unwrap();
    assert_eq!(regions.engine(), OcrEngine::TesseractLegacy);
    let stored = regions.get("speed").unwrap().pre_process_config();
    assert!(stored.invert);
    assert_eq!(stored.upscale_ratio, 2.0);
    assert_eq!(stored.unsharp_kernel_size, 5);
}

#[test]
fn test_saved_regions_reload_identically() {
    let dir = tempdir().unwrap();
    let session = session(dir.path(), ScriptedRecognizer::new(&[]));
    let saved = dir.path().join("copy.json");
    session.save_regions(&saved).unwrap();

    let mut other = Session::new(
        RegionSet::new(OcrEngine::TesseractLstm, Arc::new(ScriptedRecognizer::new(&[]))),
        Recorder::new(dir.path()),
        TesseractSettings::default(),
    );
    other.load_regions(&saved).unwrap();

    let a = session.regions().unwrap().to_region_file();
    let b = other.regions().unwrap().to_region_file();
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
    assert_eq!(other.recorder().field_names(), vec!["speed", "temp"]);
}
