use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Comment {
    pub author: String,
    pub body: String,
}

impl Comment {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
        }
    }
}

/// Reads an ordered list of `{author, body}` records. `.json` files are parsed as JSON,
/// anything else as YAML.
pub fn load_comments(path: &Path) -> Result<Vec<Comment>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read comments {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&contents).map_err(|error| {
            anyhow!(
                "failed to parse json in {} at line {}, column {}: {}",
                path.display(),
                error.line(),
                error.column(),
                error
            )
        })
    } else {
        parse_comments_yaml(&contents)
            .with_context(|| format!("failed to parse comments {}", path.display()))
    }
}

pub fn parse_comments_yaml(contents: &str) -> Result<Vec<Comment>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(contents).map_err(|error| {
        let location = error
            .location()
            .map(|location| format!("line {}, column {}", location.line(), location.column()))
            .unwrap_or_else(|| "unknown location".to_owned());
        anyhow!("invalid yaml at {}: {}", location, error)
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{load_comments, parse_comments_yaml, Comment};

    #[test]
    fn yaml_list_keeps_order_and_paragraph_breaks() {
        let comments = parse_comments_yaml(
            r#"
- author: GrumpyCTurtle
  body: "First paragraph.\n\nSecond paragraph."
- author: AtelierAndyscout
  body: John Sutter.
"#,
        )
        .expect("comments should parse");

        assert_eq!(
            comments,
            vec![
                Comment::new("GrumpyCTurtle", "First paragraph.\n\nSecond paragraph."),
                Comment::new("AtelierAndyscout", "John Sutter."),
            ]
        );
    }

    #[test]
    fn empty_file_is_an_empty_list() {
        assert!(parse_comments_yaml("").unwrap().is_empty());
    }

    #[test]
    fn json_is_selected_by_extension() {
        let dir = tempdir().expect("tempdir should create");
        let path = dir.path().join("comments.json");
        fs::write(&path, r#"[{"author": "a", "body": "b"}]"#).unwrap();
        assert_eq!(load_comments(&path).unwrap(), vec![Comment::new("a", "b")]);

        fs::write(&path, r#"[{"author": "a"}]"#).unwrap();
        let error = load_comments(&path).expect_err("missing body");
        assert!(format!("{error}").contains("line 1"));
    }
}
