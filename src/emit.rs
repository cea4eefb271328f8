use std::fs;

use anyhow::{Context, Result};

use crate::comments::Comment;
use crate::font::sha256_hex;
use crate::paginate::Page;
use crate::raster::PageRasterizer;
use crate::speech::SpeechSynthesizer;
use crate::staging::{StagedPage, StagingArea};

/// Writes one image and, unless the page is silent, one voice-over per page.
pub struct AssetEmitter<'s, R, S> {
    rasterizer: R,
    synthesizer: S,
    staging: &'s StagingArea,
}

impl<'s, R: PageRasterizer, S: SpeechSynthesizer> AssetEmitter<'s, R, S> {
    pub fn new(rasterizer: R, synthesizer: S, staging: &'s StagingArea) -> Self {
        Self {
            rasterizer,
            synthesizer,
            staging,
        }
    }

    pub fn into_parts(self) -> (R, S) {
        (self.rasterizer, self.synthesizer)
    }

    pub fn emit_page(
        &mut self,
        comment_number: usize,
        comment: &Comment,
        page: &Page<'_>,
    ) -> Result<StagedPage> {
        let image = StagingArea::image_file_name(page.index);
        let image_path = self.staging.path(&image);
        self.rasterizer
            .rasterize_to_file(page, &image_path)
            .with_context(|| format!("failed to render page {}", page.index))?;
        let image_bytes = fs::read(&image_path)
            .with_context(|| format!("failed to read back {}", image_path.display()))?;

        let text = page.voice_text();
        let audio = if page.is_degenerate() {
            log::warn!(
                "page {} of comment {} has no text; skipping voice-over",
                page.index,
                comment_number
            );
            None
        } else {
            let audio =
                StagingArea::audio_file_name(page.index, self.synthesizer.extension());
            let audio_path = self.staging.path(&audio);
            self.synthesizer
                .synthesize_to_file(&text, &audio_path)
                .with_context(|| format!("failed to synthesize voice-over for page {}", page.index))?;
            Some(audio)
        };

        log::debug!(
            "page {}: tokens {}..{}, {} chars of speech",
            page.index,
            page.span.start,
            page.span.end,
            text.len()
        );

        Ok(StagedPage {
            index: page.index,
            comment: comment_number,
            author: comment.author.clone(),
            token_start: page.span.start,
            token_end: page.span.end,
            text,
            image,
            image_sha256: sha256_hex(&image_bytes),
            audio,
        })
    }
}
