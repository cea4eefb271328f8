//! Run orchestration: comments to tokens to pages to staged assets to one video.
//!
//! The asset index is threaded through [`walk_pages`] explicitly, starting from
//! [`AssetIndex::FIRST`] on every run, so the staged files are always `0..N-1`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::comments::Comment;
use crate::config::Settings;
use crate::emit::AssetEmitter;
use crate::error_codes::{CodedError, NO_PAGES};
use crate::font::FontFace;
use crate::layout::{assemble_tokens, TextMeasure};
use crate::paginate::{paginate, AssetIndex, Page, PageMetrics};
use crate::raster::{CanvasRasterizer, CanvasStyle, PageRasterizer};
use crate::speech::{synthesizer_from_config, SpeechSynthesizer};
use crate::staging::{RunRecord, StagedPage, StagingArea};
use crate::video::{AssemblySummary, VideoAssembler};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub content_width: f32,
    pub metrics: PageMetrics,
}

impl LayoutParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            content_width: settings.canvas.content_width(),
            metrics: settings.page_metrics(),
        }
    }
}

/// Paginates every comment in order and hands each page to `visit`.
///
/// Returns the index the next page would have taken, which is the run's page count.
pub fn walk_pages<M, F>(
    comments: &[Comment],
    measure: &M,
    params: &LayoutParams,
    mut visit: F,
) -> Result<AssetIndex>
where
    M: TextMeasure,
    F: FnMut(usize, &Comment, &Page<'_>) -> Result<()>,
{
    let mut next_index = AssetIndex::FIRST;
    for (comment_number, comment) in comments.iter().enumerate() {
        let tokens = assemble_tokens(&comment.body, measure, params.content_width);
        if tokens.is_empty() {
            log::info!(
                "comment {} by {} has no text; skipping",
                comment_number,
                comment.author
            );
            continue;
        }

        let pagination = paginate(&tokens, &params.metrics, next_index);
        log::info!(
            "comment {} by {}: {} lines/gaps on {} page(s)",
            comment_number,
            comment.author,
            tokens.len(),
            pagination.pages.len()
        );
        for page in &pagination.pages {
            visit(comment_number, comment, page)?;
        }
        next_index = pagination.next_index;
    }
    Ok(next_index)
}

/// One planned page, as printed by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PagePlan {
    pub index: AssetIndex,
    pub comment: usize,
    pub token_start: usize,
    pub token_end: usize,
    pub text: String,
    pub silent: bool,
}

pub fn plan_pages<M: TextMeasure>(
    comments: &[Comment],
    measure: &M,
    params: &LayoutParams,
) -> Result<Vec<PagePlan>> {
    let mut plans = Vec::new();
    walk_pages(comments, measure, params, |comment_number, _, page| {
        plans.push(PagePlan {
            index: page.index,
            comment: comment_number,
            token_start: page.span.start,
            token_end: page.span.end,
            text: page.voice_text(),
            silent: page.is_degenerate(),
        });
        Ok(())
    })?;
    Ok(plans)
}

/// Renders and voices every page of every comment into `emitter`'s staging area.
pub fn generate_assets<M, R, S>(
    comments: &[Comment],
    measure: &M,
    params: &LayoutParams,
    emitter: &mut AssetEmitter<'_, R, S>,
) -> Result<Vec<StagedPage>>
where
    M: TextMeasure,
    R: PageRasterizer,
    S: SpeechSynthesizer,
{
    let mut staged = Vec::new();
    let page_count = walk_pages(comments, measure, params, |comment_number, comment, page| {
        staged.push(emitter.emit_page(comment_number, comment, page)?);
        Ok(())
    })?;
    debug_assert_eq!(page_count.as_usize(), staged.len());
    Ok(staged)
}

#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub comments: &'a [Comment],
    pub output: PathBuf,
    pub keep_staging: bool,
}

#[derive(Debug, Clone)]
pub struct RenderSummary {
    pub record: RunRecord,
    pub assembly: AssemblySummary,
    pub staging_dir: Option<PathBuf>,
}

/// A full run: stage every page, assemble the video, then drop the staging area.
///
/// On failure the staging area is left in place for inspection; the next run clears it.
pub fn render(settings: &Settings, request: &RenderRequest<'_>) -> Result<RenderSummary> {
    if request.comments.is_empty() {
        return Err(CodedError::usage(NO_PAGES, "no comments to render").into());
    }

    let assembler = VideoAssembler::new(&settings.video)?;
    let face = FontFace::load(
        &settings.style.font_path,
        settings.style.font_size,
        settings.style.font_sha256.as_deref(),
    )?;
    for (comment_number, comment) in request.comments.iter().enumerate() {
        let missing = face.missing_glyphs(&comment.body);
        if !missing.is_empty() {
            log::warn!(
                "comment {} uses characters {} has no glyphs for: {:?}",
                comment_number,
                face.name(),
                missing
            );
        }
    }

    let staging = StagingArea::prepare(&settings.staging_dir)?;
    let rasterizer = CanvasRasterizer::new(face.clone(), CanvasStyle::from_settings(settings)?);
    let synthesizer = synthesizer_from_config(&settings.speech)?;
    let mut emitter = AssetEmitter::new(rasterizer, synthesizer, &staging);

    let params = LayoutParams::from_settings(settings);
    let pages = generate_assets(request.comments, &face, &params, &mut emitter)?;
    let record = RunRecord::new(request.comments.len(), pages);
    staging.write_run_record(&record)?;
    if record.pages.is_empty() {
        return Err(CodedError::usage(NO_PAGES, "no comment produced any text to render").into());
    }
    log::info!(
        "staged {} page(s) from {} comment(s) in {}",
        record.pages.len(),
        record.comment_count,
        staging.root().display()
    );

    let assembly = assembler
        .assemble(&staging, &record, &request.output)
        .context("failed to assemble video")?;

    let staging_dir = if request.keep_staging {
        Some(staging.root().to_path_buf())
    } else {
        staging.remove()?;
        None
    };

    Ok(RenderSummary {
        record,
        assembly,
        staging_dir,
    })
}

/// Assembles a previously staged run.
pub fn assemble_staged(settings: &Settings, staging_dir: &Path, output: &Path) -> Result<AssemblySummary> {
    let staging = StagingArea::open(staging_dir)?;
    let record = staging.read_run_record()?;
    VideoAssembler::new(&settings.video)?
        .assemble(&staging, &record, output)
        .context("failed to assemble video")
}
