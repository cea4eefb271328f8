use std::path::Path;
use std::process::{Command, Stdio};

use image::{Rgba, RgbaImage};
use tempfile::tempdir;

use slidecast::config::VideoConfig;
use slidecast::error_codes::{find_coded_error, CodedErrorKind, MISSING_ASSET, NO_PAGES};
use slidecast::paginate::AssetIndex;
use slidecast::staging::{RunRecord, StagedPage, StagingArea};
use slidecast::video::VideoAssembler;

fn command_available(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn page(index: u32, voiced: bool) -> StagedPage {
    StagedPage {
        index: AssetIndex(index),
        comment: 0,
        author: "tester".to_owned(),
        token_start: 0,
        token_end: usize::from(voiced),
        text: if voiced { "hello".to_owned() } else { String::new() },
        image: StagingArea::image_file_name(AssetIndex(index)),
        image_sha256: String::new(),
        audio: voiced.then(|| StagingArea::audio_file_name(AssetIndex(index), "wav")),
    }
}

fn write_image(staging: &StagingArea, page: &StagedPage) {
    RgbaImage::from_pixel(64, 64, Rgba([0x18, 0x1B, 0x28, 0xFF]))
        .save(staging.path(&page.image))
        .expect("image should save");
}

fn write_tone(path: &Path, seconds: f32) {
    let status = Command::new("ffmpeg")
        .args(["-y", "-v", "error", "-f", "lavfi", "-i"])
        .arg("sine=frequency=440:sample_rate=22050")
        .args(["-t", &seconds.to_string()])
        .arg(path)
        .status()
        .expect("ffmpeg should run");
    assert!(status.success(), "tone should encode");
}

#[test]
fn missing_voice_over_is_an_inconsistency() {
    let dir = tempdir().expect("tempdir should create");
    let staging = StagingArea::prepare(&dir.path().join("assets")).unwrap();
    let pages = vec![page(0, true)];
    write_image(&staging, &pages[0]);
    let record = RunRecord::new(1, pages);

    let assembler = VideoAssembler::new(&VideoConfig::default()).unwrap();
    let error = assembler
        .assemble(&staging, &record, &dir.path().join("out.mp4"))
        .expect_err("missing audio must fail");

    let coded = find_coded_error(&error).expect("coded error");
    assert_eq!(coded.code, MISSING_ASSET);
    assert_eq!(coded.kind, CodedErrorKind::Inconsistency);
    assert!(!dir.path().join("out.mp4").exists());
}

#[test]
fn all_silent_pages_leave_nothing_to_encode() {
    let dir = tempdir().expect("tempdir should create");
    let staging = StagingArea::prepare(&dir.path().join("assets")).unwrap();
    let pages = vec![page(0, false)];
    write_image(&staging, &pages[0]);
    let record = RunRecord::new(1, pages);

    let assembler = VideoAssembler::new(&VideoConfig::default()).unwrap();
    let error = assembler
        .assemble(&staging, &record, &dir.path().join("out.mp4"))
        .expect_err("no clips must fail");
    assert_eq!(find_coded_error(&error).map(|coded| coded.code), Some(NO_PAGES));
}

#[test]
fn empty_record_is_rejected() {
    let dir = tempdir().expect("tempdir should create");
    let staging = StagingArea::prepare(&dir.path().join("assets")).unwrap();
    let record = RunRecord::new(0, Vec::new());

    let assembler = VideoAssembler::new(&VideoConfig::default()).unwrap();
    let error = assembler
        .assemble(&staging, &record, &dir.path().join("out.mp4"))
        .expect_err("zero pages must fail");
    assert_eq!(find_coded_error(&error).map(|coded| coded.code), Some(NO_PAGES));
}

#[test]
fn pages_are_joined_in_index_order() {
    if !command_available("ffmpeg") || !command_available("ffprobe") {
        eprintln!("skipping: ffmpeg/ffprobe not installed");
        return;
    }

    let dir = tempdir().expect("tempdir should create");
    let staging = StagingArea::prepare(&dir.path().join("assets")).unwrap();
    let pages = vec![page(0, true), page(1, false), page(2, true)];
    for staged in &pages {
        write_image(&staging, staged);
        if let Some(audio) = &staged.audio {
            write_tone(&staging.path(audio), 0.5);
        }
    }
    let record = RunRecord::new(1, pages);

    let config = VideoConfig {
        fps: 10,
        silent_page_seconds: 0.5,
        ..VideoConfig::default()
    };
    let output = dir.path().join("dist").join("out.mp4");
    let summary = VideoAssembler::new(&config)
        .unwrap()
        .assemble(&staging, &record, &output)
        .expect("assembly should succeed");

    assert_eq!(summary.pages, 3);
    assert_eq!(summary.clips, 3);
    assert!((summary.duration_seconds - 1.5).abs() < 0.1, "{}", summary.duration_seconds);
    assert!(output.is_file());
    assert!(staging.segments_dir().join("seg2.mp4").is_file());
}
