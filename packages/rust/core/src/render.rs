//! Page rendering: the [`Renderer`] seam and the default HTML page writer.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use html_escape::{encode_double_quoted_attribute, encode_text};
use sha2::{Digest, Sha256};
use tracing::debug;

use guidepress_shared::{GuidePressError, Item, PublishMode, Result, SiteBranding};

/// Maximum length of the `<meta name="description">` value, in characters.
const META_DESCRIPTION_LEN: usize = 155;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Body of a page: fetched content, or a teaser that links out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageBody {
    Content { html: String, images: Vec<String> },
    Teaser,
}

impl PageBody {
    pub fn mode(&self) -> PublishMode {
        match self {
            Self::Content { .. } => PublishMode::Full,
            Self::Teaser => PublishMode::Teaser,
        }
    }
}

/// Everything a renderer needs for one item.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub item: &'a Item,
    /// File-name slug, without extension.
    pub slug: &'a str,
    /// Personalized outbound link.
    pub link: &'a str,
    pub body: &'a PageBody,
    pub published_at: DateTime<Utc>,
}

/// Produces a published artifact and returns its output reference.
///
/// Equal requests must produce equal artifacts.
pub trait Renderer: Send + Sync {
    fn render(&self, request: &RenderRequest<'_>) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HtmlPageRenderer
// ---------------------------------------------------------------------------

/// Writes one self-contained HTML page per item into `output_dir`.
#[derive(Debug, Clone)]
pub struct HtmlPageRenderer {
    output_dir: PathBuf,
    branding: SiteBranding,
}

impl HtmlPageRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, branding: SiteBranding) -> Self {
        Self {
            output_dir: output_dir.into(),
            branding,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Build the full page markup.
    pub fn page(&self, request: &RenderRequest<'_>) -> String {
        let item = request.item;
        let title = item.name.trim();
        let site = &self.branding.site_name;

        let description: String = item.description.chars().take(META_DESCRIPTION_LEN).collect();
        let og_image = match request.body {
            PageBody::Content { images, .. } => images
                .first()
                .map(|src| {
                    format!(
                        "\n    <meta property=\"og:image\" content=\"{}\">",
                        encode_double_quoted_attribute(src)
                    )
                })
                .unwrap_or_default(),
            PageBody::Teaser => String::new(),
        };

        let mut meta_line = Vec::new();
        let location = item.tags.location();
        if !location.is_empty() {
            meta_line.push(format!("<span class=\"guide-location\">{}</span>", encode_text(&location)));
        }
        if !item.date.is_empty() {
            meta_line.push(format!("<span class=\"guide-date\">{}</span>", encode_text(&item.date)));
        }
        if item.budget_friendly {
            meta_line.push("<span class=\"budget-badge\">Budget-Friendly Options Available</span>".into());
        }

        let tags: String = item
            .tags
            .labels()
            .iter()
            .map(|label| format!("<span class=\"guide-tag\">{}</span>", encode_text(label)))
            .collect();
        let tags_html = if tags.is_empty() {
            String::new()
        } else {
            format!("\n        <div class=\"guide-tags\">{tags}</div>")
        };

        let lead = if item.description.is_empty() {
            String::new()
        } else {
            format!("\n        <p class=\"guide-lead\">{}</p>", encode_text(&item.description))
        };

        let link = encode_double_quoted_attribute(request.link);
        let body = match request.body {
            PageBody::Content { html, .. } => format!(
                "{html}\n        <p class=\"guide-source\"><a href=\"{link}\" target=\"_blank\" rel=\"noopener noreferrer\">View the original guide</a></p>"
            ),
            PageBody::Teaser => format!(
                "<p>This guide is available in full from {source}.</p>\n        <p><a class=\"btn\" href=\"{link}\" target=\"_blank\" rel=\"noopener noreferrer\">Read the full guide</a></p>",
                source = encode_text(&self.branding.source_label),
            ),
        };

        let destination = if item.tags.country.is_empty() {
            "This Destination".to_string()
        } else {
            item.tags.country.clone()
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="description" content="{description}">
    <meta name="generator" content="guidepress">
    <meta name="published" content="{published}">{og_image}
    <title>{title_text} - {site_text}</title>
    <link rel="stylesheet" href="../css/styles.css">
</head>
<body>
<nav class="navbar"><a href="../index.html">{site_text}</a> <a href="../index.html">Back to Home</a></nav>
<main class="travel-guide">
    <article>
    <header class="guide-header">
        <h1>{title_text}</h1>
        <div class="guide-meta">{meta}</div>{lead}{tags_html}
    </header>
    <div class="guide-content">
        {body}
    </div>
    <footer class="guide-footer">
        <h3>Ready to Experience {destination_text}?</h3>
        <a href="{contact}" class="btn">Contact Us</a>
        <p class="attribution">Travel guide curated by {site_text}<br>Content powered by {source_text}</p>
    </footer>
    </article>
</main>
</body>
</html>
"#,
            description = encode_double_quoted_attribute(&description),
            published = request.published_at.to_rfc3339(),
            title_text = encode_text(title),
            site_text = encode_text(site),
            meta = meta_line.join(" "),
            destination_text = encode_text(&destination),
            contact = encode_double_quoted_attribute(&self.branding.contact_url),
            source_text = encode_text(&self.branding.source_label),
        )
    }
}

impl Renderer for HtmlPageRenderer {
    fn render(&self, request: &RenderRequest<'_>) -> Result<String> {
        let item_name = request.item.name.trim();
        let filename = format!("{}.html", request.slug);
        let target = self.output_dir.join(&filename);
        let page = self.page(request);

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| GuidePressError::render(item_name, format!("create output dir: {e}")))?;

        // Write to temp, then rename
        let temp = self.output_dir.join(format!(".{filename}.tmp"));
        std::fs::write(&temp, &page)
            .map_err(|e| GuidePressError::render(item_name, format!("write {}: {e}", temp.display())))?;
        std::fs::rename(&temp, &target)
            .map_err(|e| GuidePressError::render(item_name, format!("rename {}: {e}", target.display())))?;

        debug!(file = %filename, hash = %content_hash(&page), bytes = page.len(), "page written");
        Ok(filename)
    }
}

/// Hex SHA-256 of rendered markup.
pub fn content_hash(page: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(page.as_bytes());
    format!("{:x}", hasher.finalize())
}
