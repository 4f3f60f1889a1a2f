//! # Mention markup
//!
//! Twitter-style `@name` handling on already rendered html: seed extraction
//! for the username prefix lookup, and resolution of tokens against a
//! prioritized candidate list.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::User;

/// Characters that end a `@name` token. An `@` preceded by one of these (or
/// by whitespace, or nothing) may start a mention.
pub const MENTION_TERMINATION_CHARS: &[char] =
    &['\n', ' ', ';', ':', ',', '.', '!', '?', '<', '>', '"', '\''];

/// Longest name seed handed to the username prefix lookup.
pub const MAX_NAME_SEED_LEN: usize = 11;

static TAG_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("Invalid tag regex"));

fn is_terminator(c: char) -> bool {
    MENTION_TERMINATION_CHARS.contains(&c)
}

/// Text between two tags. Tag interiors (attribute values included) never
/// appear in a run.
struct TextRun<'a> {
    start: usize,
    text: &'a str,
    /// Inside an `<a>` element, where a mention link would nest.
    in_anchor: bool,
}

fn text_runs(html: &str) -> Vec<TextRun<'_>> {
    let mut runs = Vec::new();
    let mut in_anchor = false;
    let mut last = 0;

    for tag in TAG_REGEX.find_iter(html) {
        runs.push(TextRun {
            start: last,
            text: &html[last..tag.start()],
            in_anchor,
        });
        let lowered = tag.as_str().to_ascii_lowercase();
        if lowered.starts_with("<a ") || lowered == "<a>" {
            in_anchor = true;
        } else if lowered == "</a>" || lowered.starts_with("</a ") {
            in_anchor = false;
        }
        last = tag.end();
    }
    runs.push(TextRun {
        start: last,
        text: &html[last..],
        in_anchor,
    });
    runs
}

/// Name fragments following each `@` in text content, entity-decoded and
/// deduplicated in order of appearance.
///
/// ```
/// use rq_core::markup::extract_mentioned_name_seeds;
///
/// let seeds = extract_mentioned_name_seeds("ping @ali, @bob@carol and @");
/// assert_eq!(seeds, vec!["ali", "bob", "carol"]);
/// ```
pub fn extract_mentioned_name_seeds(text: &str) -> Vec<String> {
    let mut seeds: Vec<String> = Vec::new();
    for run in text_runs(text).into_iter().filter(|r| !r.in_anchor) {
        let decoded = html_escape::decode_html_entities(run.text);
        for (pos, _) in decoded.match_indices('@') {
            let seed: String = decoded[pos + 1..]
                .chars()
                .take_while(|c| !is_terminator(*c) && *c != '@')
                .take(MAX_NAME_SEED_LEN)
                .collect();
            if !seed.is_empty() && !seeds.contains(&seed) {
                seeds.push(seed);
            }
        }
    }
    seeds
}

/// First candidate whose html-escaped username starts `text` and is
/// followed by the end of the run or a termination character. Returns the
/// user and the length of the matched name.
fn first_matching_author<'a>(text: &str, candidates: &'a [User]) -> Option<(&'a User, usize)> {
    candidates.iter().find_map(|user| {
        let name = html_escape::encode_text(&user.username);
        let matched = !name.is_empty()
            && text.starts_with(name.as_ref())
            && text[name.len()..]
                .chars()
                .next()
                .map_or(true, is_terminator);
        matched.then(|| (user, name.len()))
    })
}

/// Profile link markup for a resolved mention.
pub fn format_mention(user: &User, profile_url_prefix: &str) -> String {
    format!(
        "<a href=\"{}{}/{}\" class=\"mention\">@{}</a>",
        profile_url_prefix,
        user.id,
        html_escape::encode_double_quoted_attribute(&user.username),
        html_escape::encode_text(&user.username),
    )
}

fn mentionize_run(
    run: &str,
    candidates: &[User],
    profile_url_prefix: &str,
    output: &mut String,
    mentioned: &mut Vec<User>,
) {
    let mut cursor = 0;
    while let Some(rel) = run[cursor..].find('@') {
        let at = cursor + rel;
        output.push_str(&run[cursor..at]);

        let starts_token = run[..at]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || is_terminator(c));

        if starts_token {
            if let Some((user, len)) = first_matching_author(&run[at + 1..], candidates) {
                output.push_str(&format_mention(user, profile_url_prefix));
                if !mentioned.iter().any(|u| u.id == user.id) {
                    mentioned.push(user.clone());
                }
                cursor = at + 1 + len;
                continue;
            }
        }

        output.push('@');
        cursor = at + 1;
    }
    output.push_str(&run[cursor..]);
}

/// Replace every resolvable `@name` in the text content of `html` with
/// profile markup. Tags, attribute values and existing links are copied
/// unchanged.
///
/// Candidates are tried in order, so earlier entries win ambiguous prefixes.
/// Returns the mentioned users (each once, in order of first appearance)
/// and the rewritten html.
pub fn mentionize_text(
    html: &str,
    candidates: &[User],
    profile_url_prefix: &str,
) -> (Vec<User>, String) {
    let mut output = String::with_capacity(html.len());
    let mut mentioned: Vec<User> = Vec::new();
    let mut copied = 0;

    for run in text_runs(html) {
        output.push_str(&html[copied..run.start]);
        if run.in_anchor {
            output.push_str(run.text);
        } else {
            mentionize_run(
                run.text,
                candidates,
                profile_url_prefix,
                &mut output,
                &mut mentioned,
            );
        }
        copied = run.start + run.text.len();
    }

    (mentioned, output)
}

pub fn strip_tags(html: &str) -> String {
    TAG_REGEX.replace_all(html, "").into_owned()
}

/// Plain-text excerpt of rendered html, at most `max_chars` characters.
/// A character reference cut in half by the limit is dropped whole.
pub fn summarize(html: &str, max_chars: usize) -> String {
    let mut summary: String = strip_tags(html).trim().chars().take(max_chars).collect();
    if let Some(amp) = summary.rfind('&') {
        if !summary[amp..].contains(';') {
            summary.truncate(amp);
            summary.truncate(summary.trim_end().len());
        }
    }
    summary
}
