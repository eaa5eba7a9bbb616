// SPDX-FileCopyrightText: 2026 Nightjar Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal HTML-to-text extraction for web_fetch.
//!
//! This is intentionally small: drop script/style/comments, keep the
//! title, convert block boundaries to newlines, strip the remaining tags,
//! and decode the common entities.

use regex::Regex;

/// Heuristic: does this body look like HTML?
pub fn looks_like_html(body: &[u8]) -> bool {
    let head = String::from_utf8_lossy(&body[..body.len().min(1024)]).to_ascii_lowercase();
    head.contains("<html") || head.contains("<!doctype html")
}

/// Extract `(title, plain_text)` from an HTML document.
pub fn extract_html_text(html: &str) -> (String, String) {
    let scripts = Regex::new(r"(?is)<script\b.*?</script>").expect("static regex");
    let styles = Regex::new(r"(?is)<style\b.*?</style>").expect("static regex");
    let comments = Regex::new(r"(?s)<!--.*?-->").expect("static regex");
    let title_re = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex");
    let block_breaks =
        Regex::new(r"(?i)</(p|div|li|h[1-6]|tr|blockquote)>|<br\s*/?>").expect("static regex");
    let tags = Regex::new(r"(?s)<[^>]*>").expect("static regex");

    let title = title_re
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).trim().to_string())
        .unwrap_or_default();

    let without_scripts = scripts.replace_all(html, " ");
    let without_styles = styles.replace_all(&without_scripts, " ");
    let without_comments = comments.replace_all(&without_styles, " ");
    let with_breaks = block_breaks.replace_all(&without_comments, "\n");
    let stripped = tags.replace_all(&with_breaks, " ");
    let decoded = decode_entities(&stripped);

    let mut lines: Vec<String> = Vec::new();
    for line in decoded.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }
    (title, lines.join("\n"))
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_html_bodies() {
        assert!(looks_like_html(b"<!DOCTYPE html><html><body>hi</body></html>"));
        assert!(looks_like_html(b"  <HTML><head></head></HTML>"));
        assert!(!looks_like_html(b"{\"json\": true}"));
        assert!(!looks_like_html(b"plain text"));
    }

    #[test]
    fn extracts_title_and_body() {
        let html = r#"<html><head><title>Test Page</title>
            <style>body { color: red }</style></head>
            <body><h1>Heading</h1><p>First paragraph.</p>
            <script>alert("ignored")</script>
            <p>Second &amp; final.</p></body></html>"#;
        let (title, text) = extract_html_text(html);
        assert_eq!(title, "Test Page");
        assert!(text.contains("Heading"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second & final."));
        assert!(!text.contains("alert"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn block_tags_produce_line_breaks() {
        let html = "<ul><li>one</li><li>two</li></ul>";
        let (_, text) = extract_html_text(html);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn entities_decode() {
        let (_, text) = extract_html_text("<p>&lt;tag&gt; &quot;quoted&quot; &#39;s&nbsp;x</p>");
        assert!(text.contains("<tag> \"quoted\" 's x"));
    }

    #[test]
    fn missing_title_is_empty() {
        let (title, text) = extract_html_text("<p>no title here</p>");
        assert_eq!(title, "");
        assert_eq!(text, "no title here");
    }
}
