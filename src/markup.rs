//! Text-to-markup rendering for transcript messages.
//!
//! The input is untrusted (user text or service output). Everything is
//! escaped before any markup is produced, and no later pass can reintroduce
//! a raw `<`, `>` or `&` taken from the input.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Markup shown in place of an assistant message whose answer has not
/// arrived yet.
pub const WORKING_INDICATOR: &str =
    r#"<div class="thinking"><span></span><span></span><span></span></div>"#;

static HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*###[ \t]*(.*)").expect("heading pattern"));
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("bold pattern"));
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.*?)\*").expect("italic pattern"));
static CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("code pattern"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*--[ \t]*(.*)").expect("list item pattern"));
static LIST_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<li>.*?</li>(?:\n<li>.*?</li>)*").expect("list run pattern"));

/// Render raw message text into an HTML fragment.
///
/// Passes run in a fixed order: escape, headings, bold, italic, inline code,
/// list items (with runs merged into one `<ul>`), then line breaks.
pub fn render(raw: &str) -> String {
    let escaped = html_escape::encode_text(raw);

    let html = HEADING.replace_all(&escaped, "<h3>${1}</h3>");
    let html = BOLD.replace_all(&html, "<strong>${1}</strong>");
    let html = ITALIC.replace_all(&html, "<em>${1}</em>");
    let html = CODE.replace_all(&html, "<code>${1}</code>");

    let html = LIST_ITEM.replace_all(&html, "<li>${1}</li>");
    let html = LIST_RUN.replace_all(&html, |caps: &Captures| {
        format!("<ul>{}</ul>", caps[0].replace('\n', ""))
    });

    html.replace('\n', "<br>")
}
