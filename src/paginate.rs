//! Page breaking and voice-over synchronization.
//!
//! One walk over a comment's tokens decides where each canvas ends. The same boundaries cut
//! the voice-over text, so image `i` and audio `i` always cover the same tokens.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::layout::Token;

/// Run-wide sequential identifier shared by a page's image and its voice-over.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AssetIndex(pub u32);

impl AssetIndex {
    pub const FIRST: Self = Self(0);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AssetIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Vertical geometry of one canvas, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageMetrics {
    pub canvas_height: f32,
    pub top_margin: f32,
    pub bottom_margin: f32,
    pub line_height: f32,
}

impl PageMetrics {
    fn is_full(&self, offset: f32) -> bool {
        offset + self.line_height + self.bottom_margin >= self.canvas_height
    }

    fn advance(&self, token: &Token) -> f32 {
        if token.is_gap() {
            self.line_height / 2.0
        } else {
            self.line_height
        }
    }
}

/// A token placed at its top y-offset on the canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row<'a> {
    pub y: f32,
    pub token: &'a Token,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a> {
    pub index: AssetIndex,
    /// Token range `[start, end)` within the comment; drives both the rows and the voice-over.
    pub span: Range<usize>,
    pub rows: Vec<Row<'a>>,
}

impl Page<'_> {
    pub fn voice_text(&self) -> String {
        self.rows
            .iter()
            .filter_map(|row| row.token.text())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// A page with nothing to say gets an image but no voice-over.
    pub fn is_degenerate(&self) -> bool {
        self.voice_text().trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination<'a> {
    pub pages: Vec<Page<'a>>,
    pub next_index: AssetIndex,
}

impl Pagination<'_> {
    pub fn overflow_count(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }
}

/// Splits `tokens` into pages, numbering them from `next_index`.
///
/// A page closes as soon as the running offset leaves no room for another line. The final
/// page is always flushed, even when its span is empty. An empty token sequence yields no
/// pages and leaves `next_index` untouched.
pub fn paginate<'a>(
    tokens: &'a [Token],
    metrics: &PageMetrics,
    next_index: AssetIndex,
) -> Pagination<'a> {
    let mut pages = Vec::new();
    let mut index = next_index;
    if tokens.is_empty() {
        return Pagination {
            pages,
            next_index: index,
        };
    }

    let mut offset = metrics.top_margin;
    let mut tts_start = 0usize;
    let mut rows = Vec::new();

    for (position, token) in tokens.iter().enumerate() {
        rows.push(Row { y: offset, token });
        offset += metrics.advance(token);

        if metrics.is_full(offset) {
            let tts_end = position + 1;
            pages.push(Page {
                index,
                span: tts_start..tts_end,
                rows: std::mem::take(&mut rows),
            });
            index = index.next();
            tts_start = tts_end;
            offset = metrics.top_margin;
        }
    }

    pages.push(Page {
        index,
        span: tts_start..tokens.len(),
        rows,
    });
    index = index.next();

    Pagination {
        pages,
        next_index: index,
    }
}

#[cfg(test)]
mod tests {
    use super::{paginate, AssetIndex, PageMetrics};
    use crate::layout::{assemble_tokens, FixedAdvance, Token};

    // 500px canvas, 10px margins, 22px lines: a page holds 21 full lines.
    const METRICS: PageMetrics = PageMetrics {
        canvas_height: 500.0,
        top_margin: 10.0,
        bottom_margin: 10.0,
        line_height: 22.0,
    };

    fn lines(count: usize) -> Vec<Token> {
        (0..count)
            .map(|n| Token::Line(format!("line{n}")))
            .collect()
    }

    #[test]
    fn single_short_comment_is_one_page() {
        let tokens = assemble_tokens("hello world", &FixedAdvance(10.0), 480.0);
        let pagination = paginate(&tokens, &METRICS, AssetIndex::FIRST);

        assert_eq!(pagination.pages.len(), 1);
        let page = &pagination.pages[0];
        assert_eq!(page.index, AssetIndex(0));
        assert_eq!(page.span, 0..1);
        assert_eq!(page.voice_text(), "hello world");
        assert_eq!(page.rows[0].y, 10.0);
        assert_eq!(pagination.next_index, AssetIndex(1));
    }

    #[test]
    fn gap_advances_half_a_line() {
        let tokens = assemble_tokens("para one\npara two", &FixedAdvance(10.0), 480.0);
        let pagination = paginate(&tokens, &METRICS, AssetIndex::FIRST);

        let page = &pagination.pages[0];
        let offsets = page.rows.iter().map(|row| row.y).collect::<Vec<_>>();
        assert_eq!(offsets, vec![10.0, 32.0, 43.0]);
        assert_eq!(page.voice_text(), "para one para two");
    }

    #[test]
    fn page_breaks_when_no_room_remains() {
        // After 21 lines the offset is 472, and 472 + 22 + 10 >= 500.
        let tokens = lines(22);
        let pagination = paginate(&tokens, &METRICS, AssetIndex::FIRST);

        assert_eq!(pagination.pages.len(), 2);
        assert_eq!(pagination.pages[0].span, 0..21);
        assert_eq!(pagination.pages[1].span, 21..22);
        assert_eq!(pagination.pages[1].rows[0].y, METRICS.top_margin);
    }

    #[test]
    fn two_overflows_make_three_aligned_pages() {
        let tokens = lines(50);
        let pagination = paginate(&tokens, &METRICS, AssetIndex(7));

        assert_eq!(pagination.overflow_count(), 2);
        let spans = pagination
            .pages
            .iter()
            .map(|page| page.span.clone())
            .collect::<Vec<_>>();
        assert_eq!(spans, vec![0..21, 21..42, 42..50]);
        assert_eq!(spans[0].end, spans[1].start);
        let indices = pagination
            .pages
            .iter()
            .map(|page| page.index)
            .collect::<Vec<_>>();
        assert_eq!(indices, vec![AssetIndex(7), AssetIndex(8), AssetIndex(9)]);
        assert_eq!(pagination.next_index, AssetIndex(10));
    }

    #[test]
    fn overflow_on_last_token_leaves_degenerate_trailing_page() {
        let tokens = lines(21);
        let pagination = paginate(&tokens, &METRICS, AssetIndex::FIRST);

        assert_eq!(pagination.pages.len(), 2);
        let trailing = &pagination.pages[1];
        assert_eq!(trailing.span, 21..21);
        assert!(trailing.rows.is_empty());
        assert!(trailing.is_degenerate());
        assert!(!pagination.pages[0].is_degenerate());
        assert_eq!(pagination.next_index, AssetIndex(2));
    }

    #[test]
    fn pages_cover_every_token_once_in_order() {
        let body = (0..40)
            .map(|n| format!("paragraph {n} with a handful of words that will need wrapping"))
            .collect::<Vec<_>>()
            .join("\n");
        let tokens = assemble_tokens(&body, &FixedAdvance(9.0), 200.0);
        let pagination = paginate(&tokens, &METRICS, AssetIndex::FIRST);

        let mut expected_start = 0;
        let mut rebuilt = Vec::new();
        for page in &pagination.pages {
            assert_eq!(page.span.start, expected_start);
            assert_eq!(page.rows.len(), page.span.len());
            rebuilt.extend(page.rows.iter().map(|row| row.token.clone()));
            expected_start = page.span.end;
        }
        assert_eq!(expected_start, tokens.len());
        assert_eq!(rebuilt, tokens);
    }

    #[test]
    fn pagination_is_deterministic() {
        let tokens = lines(64);
        let first = paginate(&tokens, &METRICS, AssetIndex::FIRST);
        let second = paginate(&tokens, &METRICS, AssetIndex::FIRST);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_sequence_consumes_no_index() {
        let pagination = paginate(&[], &METRICS, AssetIndex(3));
        assert!(pagination.pages.is_empty());
        assert_eq!(pagination.next_index, AssetIndex(3));
    }
}
