use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::config::{FfmpegMode, VideoConfig};
use crate::error_codes::{CodedError, MISSING_ASSET, NO_PAGES};
use crate::staging::{RunRecord, StagedPage, StagingArea};

const AUDIO_SAMPLE_RATE: &str = "44100";
const CONCAT_LIST_FILE_NAME: &str = "concat.txt";

/// Resolved `ffmpeg` and `ffprobe` executables.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    mode_label: &'static str,
}

impl FfmpegTools {
    pub fn resolve(mode: FfmpegMode) -> Result<Self> {
        match mode {
            FfmpegMode::Auto | FfmpegMode::System => Ok(Self {
                ffmpeg: PathBuf::from("ffmpeg"),
                ffprobe: PathBuf::from("ffprobe"),
                mode_label: "system",
            }),
            FfmpegMode::Sidecar => {
                #[cfg(feature = "sidecar_ffmpeg")]
                {
                    let ffmpeg = ffmpeg_sidecar::paths::ffmpeg_path();
                    if !ffmpeg.exists() {
                        ffmpeg_sidecar::download::auto_download()
                            .context("failed to auto-download ffmpeg sidecar binary")?;
                    }
                    Ok(Self {
                        ffmpeg,
                        ffprobe: ffmpeg_sidecar::ffprobe::ffprobe_path(),
                        mode_label: "sidecar",
                    })
                }
                #[cfg(not(feature = "sidecar_ffmpeg"))]
                {
                    Err(anyhow!(
                        "ffmpeg sidecar mode requested but slidecast was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`."
                    ))
                }
            }
        }
    }

    fn run(&self, program: &Path, args: &[String]) -> Result<String> {
        log::debug!("{} {}", program.display(), args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!(
                        "{} executable not found (mode={}). Install ffmpeg (system mode) or use sidecar mode with `--features sidecar_ffmpeg`.",
                        program.display(),
                        self.mode_label
                    )
                } else {
                    anyhow!(
                        "failed to spawn {} (mode={}, args='{}'): {error}",
                        program.display(),
                        self.mode_label,
                        args.join(" ")
                    )
                }
            })?;

        if !output.status.success() {
            let stderr_tail = last_n_chars(&String::from_utf8_lossy(&output.stderr), 500);
            bail!(
                "{} failed with status {} (mode={}, args='{}', stderr_tail='{}')",
                program.display(),
                output.status,
                self.mode_label,
                args.join(" "),
                stderr_tail
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub fn probe_duration(&self, media: &Path) -> Result<f64> {
        let output = self.run(&self.ffprobe, &ffprobe_duration_args(media))?;
        parse_probe_duration(&output)
            .with_context(|| format!("could not read the duration of {}", media.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblySummary {
    pub pages: usize,
    pub clips: usize,
    pub duration_seconds: f64,
    pub output: PathBuf,
}

/// Joins staged page images and voice-overs into one video, in asset index order.
pub struct VideoAssembler {
    tools: FfmpegTools,
    fps: u32,
    silent_page_seconds: f32,
}

impl VideoAssembler {
    pub fn new(config: &VideoConfig) -> Result<Self> {
        Ok(Self {
            tools: FfmpegTools::resolve(config.ffmpeg)?,
            fps: config.fps,
            silent_page_seconds: config.silent_page_seconds,
        })
    }

    pub fn assemble(
        &self,
        staging: &StagingArea,
        record: &RunRecord,
        output: &Path,
    ) -> Result<AssemblySummary> {
        if record.pages.is_empty() {
            return Err(no_pages_error("the run produced no pages"));
        }
        record.check_dense()?;
        verify_assets(staging, &record.pages)?;

        let segments_dir = staging.segments_dir();
        fs::create_dir_all(&segments_dir).with_context(|| {
            format!("failed to create segments dir {}", segments_dir.display())
        })?;

        let mut segments = Vec::with_capacity(record.pages.len());
        let mut total_seconds = 0.0;
        for page in &record.pages {
            let image = staging.path(&page.image);
            let segment = segments_dir.join(format!("seg{}.mp4", page.index));

            let args = match &page.audio {
                Some(audio) => {
                    let audio = staging.path(audio);
                    let seconds = self.tools.probe_duration(&audio)?;
                    total_seconds += seconds;
                    segment_args(&image, SegmentAudio::Voice(&audio), seconds, self.fps, &segment)
                }
                None if self.silent_page_seconds > 0.0 => {
                    let seconds = f64::from(self.silent_page_seconds);
                    total_seconds += seconds;
                    segment_args(&image, SegmentAudio::Silence, seconds, self.fps, &segment)
                }
                None => {
                    log::debug!("page {} has no voice-over; leaving it out", page.index);
                    continue;
                }
            };

            log::info!("encoding clip {}/{}", page.index.as_usize() + 1, record.pages.len());
            self.tools.run(&self.tools.ffmpeg, &args)?;
            segments.push(segment);
        }

        if segments.is_empty() {
            return Err(no_pages_error("every page was silent; nothing to concatenate"));
        }

        let list_path = staging.path(CONCAT_LIST_FILE_NAME);
        fs::write(&list_path, concat_list(&segments))
            .with_context(|| format!("failed to write concat list {}", list_path.display()))?;

        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create output dir {}", parent.display()))?;
        }
        self.tools
            .run(&self.tools.ffmpeg, &concat_args(&list_path, output))?;

        Ok(AssemblySummary {
            pages: record.pages.len(),
            clips: segments.len(),
            duration_seconds: total_seconds,
            output: output.to_path_buf(),
        })
    }
}

fn no_pages_error(message: &str) -> anyhow::Error {
    CodedError::usage(NO_PAGES, message).into()
}

/// Every page needs its image, and its voice-over unless the record marks it silent.
pub fn verify_assets(staging: &StagingArea, pages: &[StagedPage]) -> Result<()> {
    for page in pages {
        let expected = std::iter::once(&page.image).chain(page.audio.as_ref());
        for file_name in expected {
            if !staging.path(file_name).is_file() {
                return Err(CodedError::inconsistency(
                    MISSING_ASSET,
                    format!(
                        "page {} expects {} but it is missing from {}",
                        page.index,
                        file_name,
                        staging.root().display()
                    ),
                )
                .with_details(json!({ "index": page.index, "file": file_name }))
                .into());
            }
        }
    }
    Ok(())
}

pub enum SegmentAudio<'a> {
    Voice(&'a Path),
    Silence,
}

pub fn segment_args(
    image: &Path,
    audio: SegmentAudio<'_>,
    seconds: f64,
    fps: u32,
    output: &Path,
) -> Vec<String> {
    let duration = format!("{seconds:.3}");
    let fps = fps.to_string();
    let mut args = vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-loop".to_owned(),
        "1".to_owned(),
        "-framerate".to_owned(),
        fps.clone(),
        "-i".to_owned(),
        image.to_string_lossy().into_owned(),
    ];
    match audio {
        SegmentAudio::Voice(path) => {
            args.push("-i".to_owned());
            args.push(path.to_string_lossy().into_owned());
        }
        SegmentAudio::Silence => {
            args.push("-f".to_owned());
            args.push("lavfi".to_owned());
            args.push("-i".to_owned());
            args.push(format!("anullsrc=r={AUDIO_SAMPLE_RATE}:cl=stereo"));
        }
    }
    args.extend(
        [
            "-map", "0:v:0", "-map", "1:a:0", "-t", duration.as_str(), "-r", fps.as_str(),
            "-c:v", "libx264",
            "-tune", "stillimage", "-pix_fmt", "yuv420p", "-c:a", "aac", "-ar",
            AUDIO_SAMPLE_RATE, "-ac", "2",
        ]
        .iter()
        .map(|arg| (*arg).to_owned()),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

pub fn concat_args(list_path: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "concat".to_owned(),
        "-safe".to_owned(),
        "0".to_owned(),
        "-i".to_owned(),
        list_path.to_string_lossy().into_owned(),
        "-c".to_owned(),
        "copy".to_owned(),
        "-movflags".to_owned(),
        "+faststart".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Concat demuxer input listing `segments` in order.
pub fn concat_list(segments: &[PathBuf]) -> String {
    let mut list = String::new();
    for segment in segments {
        let escaped = segment.to_string_lossy().replace('\'', r"'\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    list
}

pub fn ffprobe_duration_args(media: &Path) -> Vec<String> {
    vec![
        "-v".to_owned(),
        "error".to_owned(),
        "-show_entries".to_owned(),
        "format=duration".to_owned(),
        "-of".to_owned(),
        "default=noprint_wrappers=1:nokey=1".to_owned(),
        media.to_string_lossy().into_owned(),
    ]
}

pub fn parse_probe_duration(output: &str) -> Result<f64> {
    let raw = output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| anyhow!("ffprobe printed no duration"))?;
    let seconds: f64 = raw
        .parse()
        .with_context(|| format!("ffprobe duration '{raw}' is not a number"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("ffprobe duration '{raw}' is out of range");
    }
    Ok(seconds)
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{
        concat_list, last_n_chars, parse_probe_duration, segment_args, SegmentAudio,
    };

    #[test]
    fn segment_holds_image_for_audio_duration() {
        let args = segment_args(
            Path::new("/s/img0.png"),
            SegmentAudio::Voice(Path::new("/s/vo0.wav")),
            2.5,
            30,
            Path::new("/s/segments/seg0.mp4"),
        );
        let joined = args.join(" ");
        assert!(joined.contains("-loop 1 -framerate 30 -i /s/img0.png -i /s/vo0.wav"));
        assert!(joined.contains("-t 2.500 -r 30"));
        assert_eq!(args.last().map(String::as_str), Some("/s/segments/seg0.mp4"));
    }

    #[test]
    fn silent_segment_uses_generated_audio() {
        let args = segment_args(
            Path::new("img1.png"),
            SegmentAudio::Silence,
            1.0,
            24,
            Path::new("seg1.mp4"),
        );
        assert!(args.contains(&"anullsrc=r=44100:cl=stereo".to_owned()));
        assert!(args.contains(&"lavfi".to_owned()));
    }

    #[test]
    fn concat_list_keeps_order_and_escapes_quotes() {
        let list = concat_list(&[
            PathBuf::from("/tmp/seg0.mp4"),
            PathBuf::from("/tmp/it's/seg1.mp4"),
        ]);
        assert_eq!(
            list,
            "file '/tmp/seg0.mp4'\nfile '/tmp/it'\\''s/seg1.mp4'\n"
        );
    }

    #[test]
    fn probe_output_parses() {
        assert_eq!(parse_probe_duration("3.456000\n").unwrap(), 3.456);
        assert!(parse_probe_duration("N/A\n").is_err());
        assert!(parse_probe_duration("\n").is_err());
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        assert_eq!(last_n_chars("abcdef", 3), "def");
        assert_eq!(last_n_chars(" ab ", 10), "ab");
    }
}
