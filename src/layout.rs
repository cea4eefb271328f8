//! Line wrapping and paragraph assembly.
//!
//! A comment body becomes a flat, ordered sequence of [`Token`]s: wrapped lines of text with a
//! [`Token::Gap`] between paragraphs. The paginator consumes this sequence for both the images
//! and the voice-over, so the order produced here is the reading order of the whole video.

pub const PARAGRAPH_SEPARATOR: char = '\n';

/// Maps a string to its rendered width in pixels.
///
/// Implementations must be deterministic and must not shrink when text is appended.
pub trait TextMeasure {
    fn measure(&self, text: &str) -> f32;
}

impl<T: TextMeasure + ?Sized> TextMeasure for &T {
    fn measure(&self, text: &str) -> f32 {
        (**self).measure(text)
    }
}

/// Measures every character with the same advance. Used for chunking speech requests by
/// character count and as a predictable stand-in for a real font.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvance(pub f32);

impl TextMeasure for FixedAdvance {
    fn measure(&self, text: &str) -> f32 {
        text.chars().count() as f32 * self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Line(String),
    Gap,
}

impl Token {
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Line(text) => Some(text.as_str()),
            Self::Gap => None,
        }
    }

    pub fn is_gap(&self) -> bool {
        matches!(self, Self::Gap)
    }
}

/// Wraps one paragraph into lines no wider than `max_width`.
///
/// Words are never split. A word that is wider than `max_width` on its own is emitted as a
/// line by itself. Blank input yields no lines.
pub fn wrap_text(text: &str, measure: &impl TextMeasure, max_width: f32) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if measure.measure(trimmed) <= max_width {
        return vec![trimmed.to_owned()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();
    for word in trimmed.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }

        let candidate_len = current.len() + 1 + word.len();
        let mut candidate = String::with_capacity(candidate_len);
        candidate.push_str(&current);
        candidate.push(' ');
        candidate.push_str(word);

        if measure.measure(&candidate) <= max_width {
            current = candidate;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Splits a comment body into paragraphs and wraps each one, inserting a [`Token::Gap`]
/// before every paragraph after the first.
pub fn assemble_tokens(body: &str, measure: &impl TextMeasure, max_width: f32) -> Vec<Token> {
    let mut tokens = Vec::new();
    for paragraph in body.split(PARAGRAPH_SEPARATOR) {
        let lines = wrap_text(paragraph, measure, max_width);
        if lines.is_empty() {
            continue;
        }
        if !tokens.is_empty() {
            tokens.push(Token::Gap);
        }
        tokens.extend(lines.into_iter().map(Token::Line));
    }
    tokens
}

/// Joins the text of `tokens` with single spaces. Gaps contribute nothing.
pub fn voice_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter_map(Token::text)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::{assemble_tokens, voice_text, wrap_text, FixedAdvance, TextMeasure, Token};

    const TEN_PX: FixedAdvance = FixedAdvance(10.0);

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    #[test]
    fn text_that_fits_is_a_single_line() {
        assert_eq!(
            wrap_text("hello world", &TEN_PX, 480.0),
            vec!["hello world".to_owned()]
        );
    }

    #[test]
    fn wrapped_lines_respect_width_and_preserve_words() {
        let text = "the quick brown fox jumps over the lazy dog and keeps running far away";
        let lines = wrap_text(text, &TEN_PX, 160.0);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(
                TEN_PX.measure(line) <= 160.0 || words(line).len() == 1,
                "line too wide: {line:?}"
            );
        }
        assert_eq!(words(&lines.join(" ")), words(text));
    }

    #[test]
    fn oversized_word_stands_alone() {
        let lines = wrap_text("a supercalifragilistic b", &TEN_PX, 50.0);
        assert_eq!(
            lines,
            vec![
                "a".to_owned(),
                "supercalifragilistic".to_owned(),
                "b".to_owned()
            ]
        );
    }

    #[test]
    fn runs_of_whitespace_collapse_when_wrapping() {
        let lines = wrap_text("one   two\tthree    four", &TEN_PX, 90.0);
        assert_eq!(lines, vec!["one two".to_owned(), "three".to_owned(), "four".to_owned()]);
    }

    #[test]
    fn blank_text_yields_no_lines() {
        assert!(wrap_text("   \t ", &TEN_PX, 100.0).is_empty());
    }

    #[test]
    fn paragraphs_are_separated_by_gaps() {
        let tokens = assemble_tokens("para one\npara two", &TEN_PX, 480.0);
        assert_eq!(
            tokens,
            vec![
                Token::Line("para one".to_owned()),
                Token::Gap,
                Token::Line("para two".to_owned()),
            ]
        );
        assert_eq!(voice_text(&tokens), "para one para two");
    }

    #[test]
    fn empty_paragraphs_are_discarded() {
        let tokens = assemble_tokens("\n\nfirst\n\n \n\nsecond\n", &TEN_PX, 480.0);
        assert_eq!(tokens.iter().filter(|token| token.is_gap()).count(), 1);
        assert_eq!(voice_text(&tokens), "first second");
    }

    #[test]
    fn whitespace_only_body_has_no_tokens() {
        assert!(assemble_tokens("", &TEN_PX, 480.0).is_empty());
        assert!(assemble_tokens(" \n \r\n\t", &TEN_PX, 480.0).is_empty());
    }
}
