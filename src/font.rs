use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use fontdue::{Font, FontSettings};
use sha2::{Digest, Sha256};

use crate::error_codes::{CodedError, FONT_HASH_MISMATCH};
use crate::layout::TextMeasure;

/// A parsed font at a fixed pixel size. Measures text for wrapping and rasterizes it for pages.
#[derive(Clone)]
pub struct FontFace {
    font: Font,
    size: f32,
    name: String,
}

impl FontFace {
    pub fn from_bytes(bytes: Vec<u8>, size: f32, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|error| anyhow!("failed to parse font {name}: {error}"))?;
        Ok(Self { font, size, name })
    }

    /// Loads a TTF/OTF file. When `expected_sha256` is set, the file must match it exactly.
    pub fn load(path: &Path, size: f32, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = read_font_bytes(path, expected_sha256)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(bytes, size, name)
    }

    pub fn font(&self) -> &Font {
        &self.font
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Characters in `text` the font has no glyph for. They still measure and render, as the
    /// font's fallback glyph.
    pub fn missing_glyphs(&self, text: &str) -> Vec<char> {
        let mut missing = Vec::new();
        for ch in text.chars() {
            if ch.is_whitespace() || ch.is_control() {
                continue;
            }
            if self.font.lookup_glyph_index(ch) == 0 && !missing.contains(&ch) {
                missing.push(ch);
            }
        }
        missing
    }
}

impl TextMeasure for FontFace {
    fn measure(&self, text: &str) -> f32 {
        let mut width = 0.0;
        let mut previous = None;
        for ch in text.chars() {
            if let Some(left) = previous {
                width += self
                    .font
                    .horizontal_kern(left, ch, self.size)
                    .unwrap_or(0.0);
            }
            width += self.font.metrics(ch, self.size).advance_width;
            previous = Some(ch);
        }
        width
    }
}

pub fn read_font_bytes(path: &Path, expected_sha256: Option<&str>) -> Result<Vec<u8>> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read font file '{}'", path.display()))?;

    if let Some(expected) = expected_sha256 {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected.trim()) {
            return Err(CodedError::usage(
                FONT_HASH_MISMATCH,
                format!(
                    "{} expected sha256={} actual sha256={}",
                    path.display(),
                    expected.trim(),
                    actual
                ),
            )
            .into());
        }
    }

    Ok(bytes)
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{read_font_bytes, sha256_hex};
    use crate::error_codes::{find_coded_error, FONT_HASH_MISMATCH};

    #[test]
    fn sha256_hex_is_lowercase_and_padded() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn pinned_hash_mismatch_is_coded() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("fake.ttf");
        fs::write(&path, b"not really a font").unwrap();

        let pinned = sha256_hex(b"not really a font");
        assert!(read_font_bytes(&path, Some(&pinned.to_uppercase())).is_ok());

        let error = read_font_bytes(&path, Some(&sha256_hex(b"other"))).expect_err("must fail");
        let coded = find_coded_error(&error).expect("coded error");
        assert_eq!(coded.code, FONT_HASH_MISMATCH);
    }

    #[test]
    fn missing_font_file_reports_path() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("absent.ttf");
        let error = read_font_bytes(&path, None).expect_err("must fail");
        assert!(format!("{error:#}").contains("absent.ttf"));
    }
}
