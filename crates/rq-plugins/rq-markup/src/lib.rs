//! # rq-markup
//!
//! `pulldown-cmark` + allowlist sanitizer implementation of `TextRenderer`.

pub mod sanitize;
pub mod urlize;

use pulldown_cmark::{html, Options, Parser};
use rq_core::traits::TextRenderer;

pub use sanitize::sanitize_html;
pub use urlize::urlize;

/// Markdown to raw (unsanitized) html.
pub fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(text, options);
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[derive(Debug, Clone, Default)]
pub struct MarkupRenderer;

impl MarkupRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl TextRenderer for MarkupRenderer {
    fn urlize(&self, text: &str) -> String {
        urlize::urlize(text)
    }

    fn render_markdown(&self, text: &str) -> String {
        let html = markdown_to_html(text);
        tracing::trace!(bytes = html.len(), "rendered markdown");
        sanitize_html(&html)
    }

    fn sanitize(&self, text: &str) -> String {
        sanitize_html(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_is_rendered_and_sanitized() {
        let renderer = MarkupRenderer::new();
        let out = renderer.render_markdown("**hi** <script>alert(1)</script>\n\n[x](javascript:alert(1))");
        assert!(out.contains("<strong>hi</strong>"));
        assert!(!out.contains("script"));
        assert!(!out.contains("javascript"));
    }

    #[test]
    fn test_markdown_keeps_mentions_intact() {
        let renderer = MarkupRenderer::new();
        assert_eq!(renderer.render_markdown("@bob hello"), "<p>@bob hello</p>\n");
    }

    #[test]
    fn test_plain_comment_path_urlizes_then_escapes() {
        let renderer = MarkupRenderer::new();
        let linked = renderer.urlize("see https://docs.rs <b>now</b> <em>");
        let out = renderer.sanitize(&linked);
        assert_eq!(
            out,
            "see <a href=\"https://docs.rs\" rel=\"nofollow\">https://docs.rs</a> <b>now</b> <em></em>"
        );
    }
}
