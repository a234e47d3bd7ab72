//! Ranked structural extraction rules for guide pages.
//!
//! Rules are tried in order and the first one that yields acceptable content
//! wins. Container rules must produce more than [`MIN_CONTENT_LEN`] bytes of
//! markup after chrome is stripped; the paragraph fallback needs more than
//! [`MIN_PARAGRAPHS`] paragraphs, since fewer usually means boilerplate.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Minimum stripped markup length for a container rule to be accepted.
pub const MIN_CONTENT_LEN: usize = 200;

/// The paragraph fallback needs strictly more paragraphs than this.
pub const MIN_PARAGRAPHS: usize = 3;

/// Elements removed from extracted content.
const CHROME_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "aside", "noscript"];

static CHROME_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(&CHROME_TAGS.join(", ")).unwrap());
static PARAGRAPH_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static CONTENT_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"content|article|post").unwrap());

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// One step of the extraction cascade.
#[derive(Debug, Clone)]
pub enum ExtractionRule {
    /// First acceptable element with `tag` that has a class matching `class_pattern`.
    ClassedContainer {
        tag: &'static str,
        class_pattern: Regex,
    },
    /// First element with `tag`.
    Container { tag: &'static str },
    /// Every paragraph outside page chrome, if there are more than `min_count`.
    Paragraphs { min_count: usize },
}

impl ExtractionRule {
    /// Short description for tracing.
    pub fn describe(&self) -> String {
        match self {
            Self::ClassedContainer { tag, class_pattern } => {
                format!("{tag}[class~/{}/]", class_pattern.as_str())
            }
            Self::Container { tag } => (*tag).to_string(),
            Self::Paragraphs { min_count } => format!("p{{>{min_count}}}"),
        }
    }

    fn apply(&self, doc: &Html) -> Option<String> {
        match self {
            Self::ClassedContainer { tag, class_pattern } => {
                let sel = Selector::parse(tag).ok()?;
                doc.select(&sel)
                    .filter(|el| el.value().classes().any(|c| class_pattern.is_match(c)))
                    .find_map(accept_container)
            }
            Self::Container { tag } => {
                let sel = Selector::parse(tag).ok()?;
                accept_container(doc.select(&sel).next()?)
            }
            Self::Paragraphs { min_count } => {
                let paragraphs: Vec<String> = doc
                    .select(&PARAGRAPH_SEL)
                    .filter(|p| !inside_chrome(p))
                    .map(|p| p.html())
                    .collect();
                (paragraphs.len() > *min_count).then(|| paragraphs.join("\n"))
            }
        }
    }
}

/// The default cascade: classed `article`, classed `div`, `main`, `article`,
/// then the paragraph fallback.
pub fn default_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule::ClassedContainer {
            tag: "article",
            class_pattern: CONTENT_CLASS.clone(),
        },
        ExtractionRule::ClassedContainer {
            tag: "div",
            class_pattern: CONTENT_CLASS.clone(),
        },
        ExtractionRule::Container { tag: "main" },
        ExtractionRule::Container { tag: "article" },
        ExtractionRule::Paragraphs {
            min_count: MIN_PARAGRAPHS,
        },
    ]
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Content accepted by one of the rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Clean HTML fragment.
    pub html: String,
    /// Absolute image URLs referenced by the fragment, in document order.
    pub images: Vec<String>,
    /// Which rule matched.
    pub rule: String,
}

/// Run `rules` against a full HTML document.
pub fn extract(html: &str, base_url: &Url, rules: &[ExtractionRule]) -> Option<Extracted> {
    let doc = Html::parse_document(html);

    for rule in rules {
        if let Some(fragment) = rule.apply(&doc) {
            debug!(rule = %rule.describe(), len = fragment.len(), "extraction rule matched");
            let images = extract_images(&fragment, base_url);
            return Some(Extracted {
                html: fragment,
                images,
                rule: rule.describe(),
            });
        }
        debug!(rule = %rule.describe(), "extraction rule did not match");
    }

    None
}

/// Strip chrome from a container and keep it if enough content remains.
fn accept_container(el: ElementRef<'_>) -> Option<String> {
    let stripped = strip_chrome(&el.html());
    (stripped.trim().len() > MIN_CONTENT_LEN).then_some(stripped)
}

fn inside_chrome(el: &ElementRef<'_>) -> bool {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| CHROME_TAGS.contains(&a.value().name()))
}

/// Remove scripts, styles, navigation, headers, footers and asides.
pub fn strip_chrome(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut result = fragment.root_element().inner_html();

    for el in fragment.select(&CHROME_SEL) {
        let outer = el.html();
        result = result.replace(&outer, "");
    }
    result
}

/// Collect `img` sources (`src`, falling back to `data-src`) resolved
/// against the page URL, without duplicates.
fn extract_images(fragment: &str, base_url: &Url) -> Vec<String> {
    let doc = Html::parse_fragment(fragment);
    let mut images: Vec<String> = Vec::new();

    for el in doc.select(&IMG_SEL) {
        let src = el
            .value()
            .attr("src")
            .filter(|s| !s.trim().is_empty())
            .or_else(|| el.value().attr("data-src"));

        if let Some(resolved) = src.and_then(|s| base_url.join(s.trim()).ok()) {
            let resolved = resolved.to_string();
            if !images.contains(&resolved) {
                images.push(resolved);
            }
        }
    }

    images
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn base() -> Url {
        Url::parse("https://portal.example.com/advisor/a1/content/kyoto").unwrap()
    }

    #[test]
    fn classed_article_wins_and_is_stripped() {
        let html = load_fixture("guide_article.html");
        let out = extract(&html, &base(), &default_rules()).expect("content");

        assert!(out.rule.starts_with("article[class"));
        assert!(out.html.contains("Fushimi Inari"));
        assert!(!out.html.contains("trackVisit"));
        assert!(!out.html.contains("Related guides"));
        assert_eq!(
            out.images,
            vec![
                "https://portal.example.com/images/kyoto-maple.jpg".to_string(),
                "https://cdn.example.com/lazy/tea-house.jpg".to_string(),
            ]
        );
    }

    #[test]
    fn main_tag_is_used_without_classed_container() {
        let html = load_fixture("guide_main.html");
        let out = extract(&html, &base(), &default_rules()).expect("content");
        assert_eq!(out.rule, "main");
        assert!(out.html.contains("Alfama"));
        assert!(!out.html.contains("Site Menu"));
    }

    #[test]
    fn short_container_falls_through_to_paragraphs() {
        let html = load_fixture("guide_paragraphs.html");
        let out = extract(&html, &base(), &default_rules()).expect("content");
        assert_eq!(out.rule, "p{>3}");
        assert_eq!(out.html.matches("<p>").count(), 4);
        // Footer paragraphs are chrome, not content.
        assert!(!out.html.contains("All rights reserved"));
    }

    #[test]
    fn short_classed_element_does_not_hide_later_container() {
        let html = load_fixture("guide_classed_list.html");
        let out = extract(&html, &base(), &default_rules()).expect("content");
        assert!(out.rule.starts_with("div[class"));
        assert!(out.html.contains("tram 28"));
        assert!(!out.html.contains("By Jane"));
    }

    #[test]
    fn sparse_pages_yield_nothing() {
        let html = r#"<html><body>
            <div class="post-teaser"><p>Sign in to read.</p></div>
            <p>One</p><p>Two</p>
            <footer><p>Footer</p><p>More footer</p></footer>
        </body></html>"#;
        assert!(extract(html, &base(), &default_rules()).is_none());
    }

    #[test]
    fn strip_chrome_removes_nested_chrome() {
        let html = r#"<div><header><nav>Menu</nav></header><p>Body text</p><script>x()</script></div>"#;
        let stripped = strip_chrome(html);
        assert!(stripped.contains("Body text"));
        assert!(!stripped.contains("Menu"));
        assert!(!stripped.contains("x()"));
    }

    #[test]
    fn describe_rules() {
        let names: Vec<String> = default_rules().iter().map(ExtractionRule::describe).collect();
        assert_eq!(names[2], "main");
        assert_eq!(names[4], "p{>3}");
    }
}
