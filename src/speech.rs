use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, bail, Context, Result};

use crate::config::SpeechConfig;
use crate::layout::{wrap_text, FixedAdvance};

/// Longest text the Google Translate speech endpoint accepts per request.
pub const GOOGLE_TTS_MAX_CHARS: usize = 100;

/// Turns one page of voice text into an audio file.
pub trait SpeechSynthesizer {
    /// File extension (without dot) of the audio this synthesizer writes.
    fn extension(&self) -> &str;

    fn synthesize_to_file(&mut self, text: &str, path: &Path) -> Result<()>;
}

impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Box<T> {
    fn extension(&self) -> &str {
        (**self).extension()
    }

    fn synthesize_to_file(&mut self, text: &str, path: &Path) -> Result<()> {
        (**self).synthesize_to_file(text, path)
    }
}

pub fn synthesizer_from_config(config: &SpeechConfig) -> Result<Box<dyn SpeechSynthesizer>> {
    match config {
        SpeechConfig::Command {
            program,
            args,
            language,
            extension,
        } => Ok(Box::new(CommandSynthesizer {
            program: program.clone(),
            args: args.clone(),
            language: language.clone(),
            extension: extension.clone(),
        })),
        SpeechConfig::GoogleTranslate { language, tld } => {
            #[cfg(feature = "online")]
            {
                Ok(Box::new(online::GoogleTranslateSynthesizer::new(
                    language.clone(),
                    tld.clone(),
                )?))
            }
            #[cfg(not(feature = "online"))]
            {
                let _ = (language, tld);
                Err(anyhow!(
                    "speech backend 'google_translate' requires slidecast built with `--features online`"
                ))
            }
        }
    }
}

/// Runs a local TTS program per page, e.g. `espeak-ng` or `piper`.
///
/// `{output}`, `{language}` and `{text}` in `args` are substituted; the text is also written
/// to the program's stdin.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    pub program: String,
    pub args: Vec<String>,
    pub language: String,
    pub extension: String,
}

impl CommandSynthesizer {
    pub fn expand_args(&self, text: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{output}", &output)
                    .replace("{language}", &self.language)
                    .replace("{text}", text)
            })
            .collect()
    }
}

impl SpeechSynthesizer for CommandSynthesizer {
    fn extension(&self) -> &str {
        &self.extension
    }

    fn synthesize_to_file(&mut self, text: &str, path: &Path) -> Result<()> {
        let args = self.expand_args(text, path);
        log::debug!("speech: {} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!(
                        "speech program '{}' was not found on PATH. Install it or set speech.program in the settings file.",
                        self.program
                    )
                } else {
                    anyhow!("failed to spawn speech program '{}': {error}", self.program)
                }
            })?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("failed to capture speech program stdin"))?;
            match stdin.write_all(text.as_bytes()) {
                Ok(()) => {}
                // Programs that take the text as an argument may close stdin early.
                Err(error) if error.kind() == ErrorKind::BrokenPipe => {}
                Err(error) => return Err(error).context("failed to write text to speech program"),
            }
        }

        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_string(&mut stderr)
                .context("failed reading speech program stderr")?;
        }
        let status = child
            .wait()
            .context("failed waiting for speech program")?;
        if !status.success() {
            bail!(
                "speech program '{}' failed with status {status} for {}: {}",
                self.program,
                path.display(),
                stderr.trim()
            );
        }
        if !path.is_file() {
            bail!(
                "speech program '{}' exited successfully but wrote no audio to {}",
                self.program,
                path.display()
            );
        }
        Ok(())
    }
}

/// Splits text into request-sized chunks on word boundaries.
pub fn speech_chunks(text: &str, max_chars: usize) -> Vec<String> {
    wrap_text(text, &FixedAdvance(1.0), max_chars as f32)
}

#[cfg(feature = "online")]
pub mod online {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use anyhow::{Context, Result};
    use reqwest::blocking::Client;
    use url::Url;

    use super::{speech_chunks, SpeechSynthesizer, GOOGLE_TTS_MAX_CHARS};

    /// gTTS-compatible synthesizer backed by the Google Translate speech endpoint.
    pub struct GoogleTranslateSynthesizer {
        http: Client,
        language: String,
        tld: String,
    }

    impl GoogleTranslateSynthesizer {
        pub fn new(language: String, tld: String) -> Result<Self> {
            let http = Client::builder()
                .timeout(Duration::from_secs(25))
                .user_agent(concat!("slidecast/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("failed to create HTTP client")?;
            Ok(Self {
                http,
                language,
                tld,
            })
        }

        pub fn request_url(&self, chunk: &str, idx: usize, total: usize) -> Result<Url> {
            let base = format!("https://translate.google.{}/translate_tts", self.tld);
            Url::parse_with_params(
                &base,
                &[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk),
                    ("total", &total.to_string()),
                    ("idx", &idx.to_string()),
                    ("textlen", &chunk.chars().count().to_string()),
                ],
            )
            .context("failed to build speech request URL")
        }
    }

    impl SpeechSynthesizer for GoogleTranslateSynthesizer {
        fn extension(&self) -> &str {
            "mp3"
        }

        fn synthesize_to_file(&mut self, text: &str, path: &Path) -> Result<()> {
            let chunks = speech_chunks(text, GOOGLE_TTS_MAX_CHARS);
            let mut audio = Vec::new();
            for (idx, chunk) in chunks.iter().enumerate() {
                let url = self.request_url(chunk, idx, chunks.len())?;
                log::debug!("speech: GET chunk {}/{}", idx + 1, chunks.len());
                let bytes = self
                    .http
                    .get(url)
                    .send()
                    .context("failed to call speech endpoint")?
                    .error_for_status()
                    .context("speech endpoint returned an error status")?
                    .bytes()
                    .context("failed to read speech audio")?;
                audio.extend_from_slice(&bytes);
            }
            fs::write(path, &audio)
                .with_context(|| format!("failed to write voice-over {}", path.display()))
        }
    }

}
