//! Guide listings published on the portal itself.
//!
//! A listing page shows one card per guide. A card is an `article` or `div`
//! whose class mentions a guide, resource or magic content; it needs a
//! heading and a link to count, and may carry a short description.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use guidepress_shared::Item;

static CARD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("article, div").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3, h4").unwrap());
static DESCRIPTION_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p, div").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static CARD_CLASS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"guide|resource|magic").unwrap());
static DESCRIPTION_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"description|excerpt").unwrap());

/// Parse a listing page into items, in page order.
///
/// Links are resolved against `base_url`. Cards that repeat an earlier link
/// (nested cards, for instance) are dropped.
pub fn parse_listing(html: &str, base_url: &Url) -> Vec<Item> {
    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for card in doc.select(&CARD_SEL).filter(|el| has_class(el, &CARD_CLASS)) {
        let Some(item) = parse_card(card, base_url) else {
            continue;
        };
        if seen.insert(item.raw_url.clone()) {
            items.push(item);
        }
    }

    debug!(cards = items.len(), "listing parsed");
    items
}

fn parse_card(card: ElementRef<'_>, base_url: &Url) -> Option<Item> {
    let name = text_of(card.select(&TITLE_SEL).next()?);
    let href = card.select(&LINK_SEL).next()?.value().attr("href")?;
    let url = base_url.join(href.trim()).ok()?;
    if name.is_empty() {
        return None;
    }

    let description = card
        .select(&DESCRIPTION_SEL)
        .find(|el| has_class(el, &DESCRIPTION_CLASS))
        .map(text_of)
        .unwrap_or_default();

    Some(Item {
        name,
        description,
        raw_url: url.to_string(),
        ..Item::default()
    })
}

fn has_class(el: &ElementRef<'_>, pattern: &Regex) -> bool {
    el.value().classes().any(|c| pattern.is_match(c))
}

/// Whitespace-collapsed text content.
fn text_of(el: ElementRef<'_>) -> String {
    el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}
