//! Scratch directory holding one run's page images, voice-overs and run record.
//!
//! Files are named by asset index (`img{i}.png`, `vo{i}.<ext>`), so the video assembler can
//! pair them positionally.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error_codes::{CodedError, STAGING_DIR_NOT_EMPTY};
use crate::paginate::AssetIndex;

pub const RUN_RECORD_FILE_NAME: &str = "run.json";
pub const STAGING_MARKER_FILE_NAME: &str = ".slidecast-staging";
pub const SEGMENTS_DIR_NAME: &str = "segments";
const RUN_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Creates an empty staging directory.
    ///
    /// A non-empty directory is only wiped when a previous run left its marker in it. Any
    /// other non-empty directory is refused so stale files can never be mistaken for pages.
    pub fn prepare(root: &Path) -> Result<Self> {
        if root.exists() {
            let is_empty = fs::read_dir(root)
                .with_context(|| format!("failed to read staging dir {}", root.display()))?
                .next()
                .is_none();
            if !is_empty {
                if !root.join(STAGING_MARKER_FILE_NAME).is_file() {
                    return Err(CodedError::usage(
                        STAGING_DIR_NOT_EMPTY,
                        format!(
                            "staging dir {} exists, is not empty and was not created by slidecast",
                            root.display()
                        ),
                    )
                    .with_details(json!({ "path": root.display().to_string() }))
                    .into());
                }
                log::info!("clearing stale staging dir {}", root.display());
                fs::remove_dir_all(root).with_context(|| {
                    format!("failed to clear stale staging dir {}", root.display())
                })?;
            }
        }

        fs::create_dir_all(root)
            .with_context(|| format!("failed to create staging dir {}", root.display()))?;
        fs::write(root.join(STAGING_MARKER_FILE_NAME), b"")
            .with_context(|| format!("failed to mark staging dir {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Opens an existing staging directory for assembly.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(anyhow!("staging dir {} does not exist", root.display()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn image_file_name(index: AssetIndex) -> String {
        format!("img{index}.png")
    }

    pub fn audio_file_name(index: AssetIndex, extension: &str) -> String {
        format!("vo{index}.{extension}")
    }

    pub fn path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR_NAME)
    }

    pub fn write_run_record(&self, record: &RunRecord) -> Result<()> {
        let path = self.path(RUN_RECORD_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(record).context("failed to encode run record")?;
        fs::write(&path, bytes)
            .with_context(|| format!("failed to write run record {}", path.display()))
    }

    pub fn read_run_record(&self) -> Result<RunRecord> {
        let path = self.path(RUN_RECORD_FILE_NAME);
        let bytes = fs::read(&path)
            .with_context(|| format!("failed to read run record {}", path.display()))?;
        let record: RunRecord = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to decode run record {}", path.display()))?;
        if record.version != RUN_RECORD_VERSION {
            return Err(anyhow!(
                "unsupported run record version {} in {}",
                record.version,
                path.display()
            ));
        }
        Ok(record)
    }

    pub fn remove(self) -> Result<()> {
        fs::remove_dir_all(&self.root)
            .with_context(|| format!("failed to remove staging dir {}", self.root.display()))
    }
}

/// What a generation run staged, page by page in asset index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub version: u32,
    pub generated_at: String,
    pub comment_count: usize,
    pub pages: Vec<StagedPage>,
}

impl RunRecord {
    pub fn new(comment_count: usize, pages: Vec<StagedPage>) -> Self {
        Self {
            version: RUN_RECORD_VERSION,
            generated_at: chrono::Utc::now().to_rfc3339(),
            comment_count,
            pages,
        }
    }

    /// Checks that the pages carry exactly the indices `0..N-1`, in order.
    pub fn check_dense(&self) -> Result<()> {
        for (position, page) in self.pages.iter().enumerate() {
            if page.index.as_usize() != position {
                return Err(anyhow!(
                    "run record is out of order: position {} holds page {}",
                    position,
                    page.index
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedPage {
    pub index: AssetIndex,
    /// Zero-based position of the source comment in the input.
    pub comment: usize,
    pub author: String,
    pub token_start: usize,
    pub token_end: usize,
    pub text: String,
    pub image: String,
    pub image_sha256: String,
    /// `None` when the page had nothing to say and no voice-over was synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}
