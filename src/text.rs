//! Scraper helpers: built-in selectors and HTML → plain text flattening for
//! descriptions written to the store.

use scraper::{ElementRef, Html, Selector};

/// Elements that start a new line.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "tr", "table", "h1", "h2", "h3", "h4", "h5", "h6",
    "blockquote", "pre", "section",
];

/// Elements whose content is never shown.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "head"];

/// Parse a selector compiled into the binary. Panics on invalid CSS.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

/// Flatten an HTML fragment to plain text.
///
/// Block elements and `<br>` become line breaks, whitespace inside a line
/// collapses to a single space, and runs of blank lines collapse to one.
pub fn flatten_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut raw = String::new();
    walk(fragment.root_element(), &mut raw);

    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
        let previous_blank = lines.last().map(|l| l.is_empty()).unwrap_or(true);
        if line.is_empty() && previous_blank {
            continue;
        }
        lines.push(line);
    }
    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(child) = ElementRef::wrap(child) else {
            continue;
        };
        let name = child.value().name();
        if name == "br" {
            out.push('\n');
        } else if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        } else if BLOCK_ELEMENTS.contains(&name) {
            line_break(out);
            walk(child, out);
            line_break(out);
        } else {
            walk(child, out);
        }
    }
}

fn line_break(out: &mut String) {
    if !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_matches_built_in_css() {
        let html = Html::parse_fragment(r#"<ul><li class="cal_item">a</li><li>b</li></ul>"#);
        assert_eq!(html.select(&selector("li.cal_item")).count(), 1);
    }

    #[test]
    #[should_panic(expected = "invalid built-in selector")]
    fn test_selector_panics_on_invalid_css() {
        selector("li[");
    }

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(flatten_html("Read chapter 4"), "Read chapter 4");
    }

    #[test]
    fn test_paragraphs_and_breaks() {
        let html = "<p>Read chapter 4.</p><p>Answer <b>all</b> questions<br>on page 12.</p>";
        assert_eq!(
            flatten_html(html),
            "Read chapter 4.\nAnswer all questions\non page 12."
        );
    }

    #[test]
    fn test_whitespace_and_blank_lines_collapse() {
        let html = "<div>\n   Intro   text\n</div>\n\n\n<div></div><div>  Next </div>";
        assert_eq!(flatten_html(html), "Intro text\n\nNext");
    }

    #[test]
    fn test_entities_and_scripts() {
        let html = "<p>Tom &amp; Jerry&nbsp;&nbsp;show</p><script>alert(1)</script>";
        assert_eq!(flatten_html(html), "Tom & Jerry show");
    }

    #[test]
    fn test_list_items_on_own_lines() {
        let html = "<ul><li>one</li><li>two</li></ul>";
        assert_eq!(flatten_html(html), "one\ntwo");
    }

    #[test]
    fn test_empty() {
        assert_eq!(flatten_html(""), "");
        assert_eq!(flatten_html("<p>  </p>"), "");
    }
}
