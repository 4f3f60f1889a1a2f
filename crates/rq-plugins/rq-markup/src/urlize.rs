//! Bare URL linking.

use once_cell::sync::Lazy;
use regex::Regex;

static URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"']+"#).expect("Invalid url regex")
});

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ':', ';', '!', '?', ')', ']'];

fn link(url: &str) -> String {
    let href = if url.to_ascii_lowercase().starts_with("www.") {
        format!("http://{url}")
    } else {
        url.to_string()
    };
    format!(
        "<a href=\"{}\" rel=\"nofollow\">{}</a>",
        html_escape::encode_double_quoted_attribute(&href),
        url
    )
}

fn urlize_segment(text: &str, out: &mut String) {
    let mut last = 0;
    for m in URL_REGEX.find_iter(text) {
        let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        out.push_str(&text[last..m.start()]);
        out.push_str(&link(url));
        last = m.start() + url.len();
    }
    out.push_str(&text[last..]);
}

/// Wrap `http(s)://` and `www.` URLs in nofollow links. Text inside tags
/// and inside existing `<a>` elements is left alone.
pub fn urlize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut inside_anchor = false;
    let mut last = 0;

    for tag in TAG_REGEX.find_iter(text) {
        let segment = &text[last..tag.start()];
        if inside_anchor {
            out.push_str(segment);
        } else {
            urlize_segment(segment, &mut out);
        }

        let lowered = tag.as_str().to_ascii_lowercase();
        if lowered.starts_with("<a ") || lowered == "<a>" {
            inside_anchor = true;
        } else if lowered == "</a>" || lowered.starts_with("</a ") {
            inside_anchor = false;
        }
        out.push_str(tag.as_str());
        last = tag.end();
    }

    let tail = &text[last..];
    if inside_anchor {
        out.push_str(tail);
    } else {
        urlize_segment(tail, &mut out);
    }
    out
}
