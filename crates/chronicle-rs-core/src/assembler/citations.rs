//! Citation marker rewriting.

use regex::Regex;
use std::sync::LazyLock;

struct CitationPatterns {
    image: Regex,
    numbered: Regex,
    placeholder: Regex,
}

static PATTERNS: LazyLock<Option<CitationPatterns>> = LazyLock::new(|| {
    Some(CitationPatterns {
        image: Regex::new(r"【\d+†embed_image】").ok()?,
        numbered: Regex::new(r"【(\d+)[^】]*】").ok()?,
        placeholder: Regex::new(r"\[CITATION:\d+\]").ok()?,
    })
});

const SOURCES_FOOTER: &str = "**Sources:**";

/// Rewrite raw citation markers into `[CITATION:<n>]` placeholders.
///
/// Image markers are deleted, directly repeated placeholders collapse into
/// one and a trailing `**Sources:**` footer is cut. Applying this twice gives
/// the same result as applying it once.
pub fn rewrite_citations(text: &str) -> String {
    let Some(patterns) = PATTERNS.as_ref() else {
        return text.trim().to_string();
    };
    let without_images = patterns.image.replace_all(text, "");
    let numbered = patterns
        .numbered
        .replace_all(&without_images, "[CITATION:$1]");
    let mut collapsed = collapse_repeats(&patterns.placeholder, &numbered);
    if let Some(footer) = collapsed.find(SOURCES_FOOTER) {
        collapsed.truncate(footer);
    }
    collapsed.trim().to_string()
}

fn collapse_repeats(placeholder: &Regex, text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut cursor = 0;
    let mut previous: Option<(usize, &str)> = None;
    for found in placeholder.find_iter(text) {
        let adjacent = previous
            .is_some_and(|(end, marker)| end == found.start() && marker == found.as_str());
        if adjacent {
            output.push_str(&text[cursor..found.start()]);
        } else {
            output.push_str(&text[cursor..found.end()]);
        }
        cursor = found.end();
        previous = Some((found.end(), found.as_str()));
    }
    output.push_str(&text[cursor..]);
    output
}
