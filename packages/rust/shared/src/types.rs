//! Core domain types for GuidePress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one publish run in logs (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// Categorical tags attached to a guide.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags {
    #[serde(default)]
    pub continent: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub partner: String,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub season: String,
}

impl Tags {
    /// Human-readable location, most specific first (`Region, Country, Continent`).
    pub fn location(&self) -> String {
        [&self.region, &self.country, &self.continent]
            .into_iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Non-empty display labels (style, season, partner).
    pub fn labels(&self) -> Vec<String> {
        let mut labels = Vec::new();
        if !self.style.is_empty() {
            labels.push(self.style.clone());
        }
        if !self.season.is_empty() {
            labels.push(self.season.clone());
        }
        if !self.partner.is_empty() {
            labels.push(format!("Partner: {}", self.partner));
        }
        labels
    }
}

/// One candidate guide read from the tabular source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Human-readable name; the stable dedup key.
    pub name: String,
    /// Short descriptive text.
    pub description: String,
    /// Free-form date column from the sheet.
    pub date: String,
    /// Categorical tags.
    pub tags: Tags,
    /// Whether a low-budget option is available.
    pub budget_friendly: bool,
    /// Reference URL exactly as it appeared in the source.
    pub raw_url: String,
    /// Editorial notes.
    pub notes: String,
    /// Title of the upstream article, when different from `name`.
    pub article_title: String,
}

impl Item {
    /// Key recorded in the publication ledger. Derived from the name so it
    /// survives slug or filename changes between runs.
    pub fn key(&self) -> &str {
        self.name.trim()
    }

    /// Whether the item carries a reference URL worth personalizing.
    pub fn has_url(&self) -> bool {
        !self.raw_url.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Publication ledger
// ---------------------------------------------------------------------------

/// One successful publish. Append-only; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// Stable item key (see [`Item::key`]).
    pub item_key: String,
    /// When the artifact was written.
    #[serde(deserialize_with = "lenient_time::deserialize")]
    pub published_at: DateTime<Utc>,
    /// Renderer output reference (file name within the output directory).
    pub output_ref: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Whether a published page carries fetched content or only a teaser link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    Full,
    #[default]
    Teaser,
}

/// Metadata describing one published page in `index.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Display title.
    pub title: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Output reference (file name of the rendered page). Unique in the catalog.
    pub filename: String,
    /// Categorical tags, flattened into the entry.
    #[serde(flatten)]
    pub tags: Tags,
    /// Display location derived from the tags.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub budget_friendly: bool,
    /// Personalized outbound link.
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub mode: PublishMode,
    /// Content provider attribution.
    #[serde(default)]
    pub source: String,
    /// When the page was published.
    #[serde(deserialize_with = "lenient_time::deserialize")]
    pub published_date: DateTime<Utc>,
}

impl CatalogEntry {
    /// Build the catalog entry for a freshly published item.
    pub fn for_item(
        item: &Item,
        url: &str,
        output_ref: &str,
        published_at: DateTime<Utc>,
        mode: PublishMode,
        source: &str,
    ) -> Self {
        Self {
            title: item.name.trim().to_string(),
            description: item.description.clone(),
            filename: output_ref.to_string(),
            tags: item.tags.clone(),
            location: item.tags.location(),
            budget_friendly: item.budget_friendly,
            url: url.to_string(),
            mode,
            source: source.to_string(),
            published_date: published_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Timestamp deserialization that also accepts offset-less ISO-8601
/// (`2024-05-01T10:00:00.123456`), read as UTC. Older state and catalog
/// files were written that way.
pub mod lenient_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// Parse RFC 3339, falling back to a naive timestamp taken as UTC.
    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    /// Optional variant; unparseable values become `None`.
    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }
}
