//! Tabular guide source (an exported spreadsheet in CSV form).
//!
//! Columns are matched by name, case-insensitively, against a ranked alias
//! list per field. Missing optional columns read as empty strings; rows
//! without a name or a reference URL are skipped.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{StringRecord, StringRecordsIntoIter};
use tracing::{debug, info, instrument};

use guidepress_shared::{GuidePressError, Item, Result, Tags};

// ---------------------------------------------------------------------------
// Column aliases
// ---------------------------------------------------------------------------

const NAME: &[&str] = &["name", "title", "guide name", "guide"];
const URL: &[&str] = &["magic content", "url", "link", "content url", "guide url"];
const DESCRIPTION: &[&str] = &["description", "short description", "summary"];
const DATE: &[&str] = &["date"];
const CONTINENT: &[&str] = &["continent"];
const COUNTRY: &[&str] = &["country"];
const REGION: &[&str] = &["region"];
const PARTNER: &[&str] = &["partner"];
const STYLE: &[&str] = &["style"];
const SEASON: &[&str] = &["season"];
const BUDGET: &[&str] = &["< $500 option(s)", "budget friendly", "budget_friendly", "budget"];
const NOTES: &[&str] = &["notes"];
const ARTICLE_TITLE: &[&str] = &["article title", "article title (hq reference)"];

/// Values of the boolean column that count as true.
const TRUTHY: &[&str] = &["yes", "true", "x"];

/// Resolved column positions for one header row.
#[derive(Debug, Clone, Default)]
struct ColumnMap {
    name: Option<usize>,
    url: Option<usize>,
    description: Option<usize>,
    date: Option<usize>,
    continent: Option<usize>,
    country: Option<usize>,
    region: Option<usize>,
    partner: Option<usize>,
    style: Option<usize>,
    season: Option<usize>,
    budget: Option<usize>,
    notes: Option<usize>,
    article_title: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &StringRecord) -> Self {
        let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
        let find = |aliases: &[&str]| {
            aliases
                .iter()
                .find_map(|alias| normalized.iter().position(|h| h == alias))
        };

        Self {
            name: find(NAME),
            url: find(URL),
            description: find(DESCRIPTION),
            date: find(DATE),
            continent: find(CONTINENT),
            country: find(COUNTRY),
            region: find(REGION),
            partner: find(PARTNER),
            style: find(STYLE),
            season: find(SEASON),
            budget: find(BUDGET),
            notes: find(NOTES),
            article_title: find(ARTICLE_TITLE),
        }
    }

    /// Build an item from a row, or `None` if the row lacks a name or URL.
    fn item(&self, record: &StringRecord) -> Option<Item> {
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let name = field(self.name);
        let raw_url = field(self.url);
        if name.is_empty() || raw_url.is_empty() {
            return None;
        }

        let budget = field(self.budget).to_ascii_lowercase();

        Some(Item {
            name,
            description: field(self.description),
            date: field(self.date),
            tags: Tags {
                continent: field(self.continent),
                country: field(self.country),
                region: field(self.region),
                partner: field(self.partner),
                style: field(self.style),
                season: field(self.season),
            },
            budget_friendly: TRUTHY.contains(&budget.as_str()),
            raw_url,
            notes: field(self.notes),
            article_title: field(self.article_title),
        })
    }
}

/// Lower-case and collapse internal whitespace.
fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// SourceReader
// ---------------------------------------------------------------------------

/// Reads candidate guides from an exported sheet.
///
/// Each call to [`SourceReader::items`] re-opens the file, so the sequence
/// can be restarted any number of times.
#[derive(Debug, Clone)]
pub struct SourceReader {
    path: PathBuf,
}

impl SourceReader {
    /// Check that the source can be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        File::open(&path)
            .map_err(|e| GuidePressError::source_unavailable(&path, e.to_string()))?;
        Ok(Self { path })
    }

    /// Path of the underlying source file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the usable rows of the source.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn items(&self) -> Result<Items> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .map_err(|e| GuidePressError::source_unavailable(&self.path, e.to_string()))?;

        let headers = reader
            .headers()
            .map_err(|e| GuidePressError::source_unavailable(&self.path, e.to_string()))?
            .clone();
        let columns = ColumnMap::from_headers(&headers);

        if columns.name.is_none() || columns.url.is_none() {
            info!(
                has_name = columns.name.is_some(),
                has_url = columns.url.is_some(),
                "source header lacks a name or URL column, no rows will qualify"
            );
        }

        Ok(Items {
            records: reader.into_records(),
            columns,
            row: 1,
        })
    }

    /// Collect all usable rows.
    pub fn read_all(&self) -> Result<Vec<Item>> {
        let items: Vec<Item> = self.items()?.collect();
        info!(count = items.len(), path = %self.path.display(), "loaded guides from source");
        Ok(items)
    }
}

/// Lazy iterator over the usable rows of a source.
pub struct Items {
    records: StringRecordsIntoIter<File>,
    columns: ColumnMap,
    row: usize,
}

impl Iterator for Items {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        loop {
            let record = self.records.next()?;
            self.row += 1;

            match record {
                Ok(record) => match self.columns.item(&record) {
                    Some(item) => return Some(item),
                    None => debug!(row = self.row, "skipping row without name or URL"),
                },
                Err(e) => debug!(row = self.row, error = %e, "skipping undecodable row"),
            }
        }
    }
}
