//! Frontmatter splitting for content files.
//!
//! A content file may open with a YAML header fenced by `---` lines:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [a, b]
//! ---
//!
//! <h1><%= title %></h1>
//! ```
//!
//! Both fences must start at the beginning of a line and be followed by a
//! newline. Parsing fails open: a header that is not a YAML mapping with
//! string keys is ignored and the whole text is returned as the body.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Parsed header: string keys to arbitrary values.
pub type Frontmatter = Map<String, Value>;

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A(?:---\n(?<header>.*?)(?m:^)---\n)?(?<body>.*)\z")
        .expect("frontmatter pattern is valid")
});

/// Split `text` into its header and a trimmed body.
pub fn parse(text: &str) -> (Frontmatter, String) {
    split(text, true)
}

/// Split `text` into its header and the body exactly as written.
pub fn parse_untrimmed(text: &str) -> (Frontmatter, String) {
    split(text, false)
}

fn split(text: &str, strip: bool) -> (Frontmatter, String) {
    let Some(captures) = FRONTMATTER.captures(text) else {
        return (Frontmatter::new(), text.to_string());
    };
    let Some(header) = captures.name("header") else {
        return (Frontmatter::new(), text.to_string());
    };

    let Some(frontmatter) = parse_header(header.as_str()) else {
        tracing::debug!("ignoring malformed frontmatter");
        return (Frontmatter::new(), text.to_string());
    };

    let body = captures.name("body").map_or("", |m| m.as_str());
    let body = if strip { body.trim() } else { body };
    (frontmatter, body.to_string())
}

fn parse_header(header: &str) -> Option<Frontmatter> {
    if header.trim().is_empty() {
        return Some(Frontmatter::new());
    }
    match serde_yaml::from_str::<Value>(header).ok()? {
        Value::Object(map) => Some(map),
        Value::Null => Some(Frontmatter::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_header_and_trims_body() {
        let (fm, body) = parse("---\nhello: world\n---\n\ntesting\n");
        assert_eq!(Value::Object(fm), json!({"hello": "world"}));
        assert_eq!(body, "testing");
    }

    #[test]
    fn untrimmed_body_is_kept_verbatim() {
        let (fm, body) = parse_untrimmed("---\nhello: world\n---\n\ntesting\n");
        assert_eq!(fm.get("hello"), Some(&json!("world")));
        assert_eq!(body, "\ntesting\n");
    }

    #[test]
    fn missing_header_returns_original_text() {
        let (fm, body) = parse("\ntesting\n");
        assert!(fm.is_empty());
        assert_eq!(body, "\ntesting\n");
    }

    #[test]
    fn header_must_start_the_text() {
        let text = "intro\n---\nhello: world\n---\nbody";
        let (fm, body) = parse(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn unclosed_header_is_body() {
        let text = "---\nhello: world\n";
        let (fm, body) = parse(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn malformed_yaml_fails_open() {
        let text = "---\nhello: [unterminated\n---\nbody";
        let (fm, body) = parse(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn scalar_header_fails_open() {
        let text = "---\njust a string\n---\nbody";
        let (fm, body) = parse(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
    }

    #[test]
    fn empty_header_yields_empty_mapping() {
        let (fm, body) = parse("---\n---\nbody\n");
        assert!(fm.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn nested_values_survive() {
        let (fm, _) = parse("---\ntags: [a, b]\nauthor:\n  name: Ada\ncount: 3\n---\n");
        assert_eq!(fm["tags"], json!(["a", "b"]));
        assert_eq!(fm["author"]["name"], json!("Ada"));
        assert_eq!(fm["count"], json!(3));
    }

    #[test]
    fn closing_fence_is_the_first_one() {
        let (fm, body) = parse("---\na: 1\n---\nx\n---\ny");
        assert_eq!(fm["a"], json!(1));
        assert_eq!(body, "x\n---\ny");
    }
}
