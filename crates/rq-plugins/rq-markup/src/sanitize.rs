//! Allowlist html sanitizer.
//!
//! Known formatting tags are re-emitted with only their safe attributes,
//! `script`/`style` elements disappear with their content, and anything
//! else that looks like markup is escaped into visible text. Open tags are
//! balanced so user content cannot leak formatting into the page.

use once_cell::sync::Lazy;
use regex::Regex;

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^<(/?)([a-zA-Z][a-zA-Z0-9]*)((?:\s+(?:[^>"']|"[^"]*"|'[^']*')*?)?)\s*(/?)>"#)
        .expect("Invalid tag regex")
});

static ATTR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("Invalid attribute regex")
});

static ENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^&(?:[a-zA-Z][a-zA-Z0-9]*|#[0-9]+|#[xX][0-9a-fA-F]+);")
        .expect("Invalid entity regex")
});

static CODE_CLASS_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^language-[A-Za-z0-9_+-]+$").expect("Invalid class regex"));

const ALLOWED_TAGS: &[&str] = &[
    "a", "abbr", "b", "blockquote", "br", "code", "dd", "del", "dl", "dt", "em", "h1", "h2",
    "h3", "h4", "h5", "h6", "hr", "i", "img", "kbd", "li", "ol", "p", "pre", "s", "strike",
    "strong", "sub", "sup", "table", "tbody", "td", "th", "thead", "tr", "ul",
];

const VOID_TAGS: &[&str] = &["br", "hr", "img"];

/// Elements removed together with everything inside them.
const DROPPED_ELEMENTS: &[&str] = &["script", "style", "iframe", "object", "embed", "noscript"];

fn allowed_attribute(tag: &str, attr: &str) -> bool {
    matches!(
        (tag, attr),
        ("a", "href" | "title" | "rel")
            | ("img", "src" | "alt" | "title" | "width" | "height")
            | ("abbr", "title")
            | ("code", "class")
            | ("ol", "start")
    )
}

/// `http`, `https`, `mailto` (links only) and scheme-less relative urls.
fn safe_url(value: &str, allow_mailto: bool) -> bool {
    let lowered: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect::<String>()
        .to_ascii_lowercase();
    let scheme_end = lowered.find(':');
    let path_start = lowered.find(|c: char| matches!(c, '/' | '?' | '#'));
    match (scheme_end, path_start) {
        (None, _) => true,
        (Some(colon), Some(path)) if path < colon => true,
        _ => {
            lowered.starts_with("http:")
                || lowered.starts_with("https:")
                || (allow_mailto && lowered.starts_with("mailto:"))
        }
    }
}

fn render_attributes(tag: &str, raw: &str) -> String {
    let mut out = String::new();
    for caps in ATTR_REGEX.captures_iter(raw) {
        let name = caps[1].to_ascii_lowercase();
        if !allowed_attribute(tag, &name) {
            continue;
        }
        let raw_value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str());
        let value = html_escape::decode_html_entities(raw_value);
        let keep = match name.as_str() {
            "href" => safe_url(&value, true),
            "src" => safe_url(&value, false),
            "class" => CODE_CLASS_REGEX.is_match(&value),
            _ => true,
        };
        if keep {
            out.push(' ');
            out.push_str(&name);
            out.push_str("=\"");
            out.push_str(&html_escape::encode_double_quoted_attribute(&value));
            out.push('"');
        }
    }
    out
}

/// Escape text content, leaving well-formed character references alone.
fn push_text(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(pos) = rest.find(|c: char| c == '&' || c == '>') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with('>') {
            out.push_str("&gt;");
            rest = &tail[1..];
        } else if let Some(entity) = ENTITY_REGEX.find(tail) {
            out.push_str(entity.as_str());
            rest = &tail[entity.end()..];
        } else {
            out.push_str("&amp;");
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
}

fn close_through(out: &mut String, open: &mut Vec<String>, name: &str) {
    if !open.iter().any(|t| t == name) {
        return;
    }
    while let Some(tag) = open.pop() {
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
        if tag == name {
            break;
        }
    }
}

pub fn sanitize_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut open: Vec<String> = Vec::new();
    let mut dropping: Option<String> = None;
    let mut i = 0;

    while i < html.len() {
        let rest = &html[i..];

        if rest.starts_with("<!--") {
            i += rest.find("-->").map_or(rest.len(), |end| end + 3);
            continue;
        }

        if rest.starts_with('<') {
            let Some(caps) = TAG_REGEX.captures(rest) else {
                if dropping.is_none() {
                    out.push_str("&lt;");
                }
                i += 1;
                continue;
            };
            let whole = caps.get(0).map_or("", |m| m.as_str());
            i += whole.len();

            let closing = !caps[1].is_empty();
            let name = caps[2].to_ascii_lowercase();

            if let Some(dropped) = &dropping {
                if closing && *dropped == name {
                    dropping = None;
                }
                continue;
            }
            if DROPPED_ELEMENTS.contains(&name.as_str()) {
                if !closing {
                    dropping = Some(name);
                }
                continue;
            }
            if !ALLOWED_TAGS.contains(&name.as_str()) {
                out.push_str(&html_escape::encode_text(whole));
                continue;
            }

            if VOID_TAGS.contains(&name.as_str()) {
                if !closing {
                    out.push('<');
                    out.push_str(&name);
                    out.push_str(&render_attributes(&name, &caps[3]));
                    out.push_str(" />");
                }
            } else if closing {
                close_through(&mut out, &mut open, &name);
            } else {
                out.push('<');
                out.push_str(&name);
                out.push_str(&render_attributes(&name, &caps[3]));
                out.push('>');
                open.push(name);
            }
            continue;
        }

        let end = rest.find('<').map_or(html.len(), |p| i + p);
        if dropping.is_none() {
            push_text(&mut out, &html[i..end]);
        }
        i = end;
    }

    while let Some(tag) = open.pop() {
        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_is_removed_with_content() {
        let out = sanitize_html("<p>hi<script>alert('x')</script> there</p>");
        assert_eq!(out, "<p>hi there</p>");
    }

    #[test]
    fn test_unknown_tags_are_escaped() {
        let out = sanitize_html("<blink>now</blink>");
        assert_eq!(out, "&lt;blink&gt;now&lt;/blink&gt;");
    }

    #[test]
    fn test_event_handlers_and_bad_schemes_are_dropped() {
        let out = sanitize_html(r#"<a href="javascript:alert(1)" onclick="x()">go</a>"#);
        assert_eq!(out, "<a>go</a>");

        let out = sanitize_html(r#"<a href="jav&#x61;script:alert(1)">go</a>"#);
        assert_eq!(out, "<a>go</a>");

        let out = sanitize_html(r#"<img src="https://img.example/a.png" alt="a" onerror="x">"#);
        assert_eq!(out, r#"<img src="https://img.example/a.png" alt="a" />"#);
    }

    #[test]
    fn test_relative_and_mail_links_survive() {
        let out = sanitize_html(r#"<a href="/questions/1?x=a:b">q</a> <a href="mailto:a@b.c">m</a>"#);
        assert_eq!(
            out,
            r#"<a href="/questions/1?x=a:b">q</a> <a href="mailto:a@b.c">m</a>"#
        );
    }

    #[test]
    fn test_unbalanced_tags_are_closed() {
        assert_eq!(sanitize_html("<b>bold <i>both"), "<b>bold <i>both</i></b>");
        assert_eq!(sanitize_html("stray</em> end"), "stray end");
    }

    #[test]
    fn test_text_escaping_keeps_entities() {
        assert_eq!(sanitize_html("a < b && c > d &amp; &#39;"), "a &lt; b &amp;&amp; c &gt; d &amp; &#39;");
    }

    #[test]
    fn test_code_language_class() {
        let out = sanitize_html(r#"<pre><code class="language-rust">fn</code></pre>"#);
        assert_eq!(out, r#"<pre><code class="language-rust">fn</code></pre>"#);
        let out = sanitize_html(r#"<code class="evil big">x</code>"#);
        assert_eq!(out, "<code>x</code>");
    }
}
