//! Application configuration for GuidePress.
//!
//! Configuration is a line-oriented `KEY=VALUE` file (`guidepress.conf`).
//! Lines starting with `#` and blank lines are ignored, unknown keys are
//! ignored. The file is looked up at an explicit `--config` path, then in
//! the working directory, then at `~/.guidepress/guidepress.conf`.
//! CLI flags override file values, which override defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{GuidePressError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "guidepress.conf";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".guidepress";

/// Values starting with this prefix are unfilled template placeholders.
const PLACEHOLDER_PREFIX: &str = "your-";

// ---------------------------------------------------------------------------
// Config keys
// ---------------------------------------------------------------------------

pub const KEY_SOURCE_CSV: &str = "SOURCE_CSV";
pub const KEY_OUTPUT_DIR: &str = "OUTPUT_DIR";
pub const KEY_STATE_FILE: &str = "STATE_FILE";
pub const KEY_CATALOG_SORT: &str = "CATALOG_SORT";
pub const KEY_ADVISOR_ID: &str = "ADVISOR_ID";
pub const KEY_FETCH_CONTENT: &str = "FETCH_CONTENT";
pub const KEY_PORTAL_LOGIN_URL: &str = "PORTAL_LOGIN_URL";
pub const KEY_PORTAL_USERNAME: &str = "PORTAL_USERNAME";
pub const KEY_PORTAL_PASSWORD: &str = "PORTAL_PASSWORD";
pub const KEY_PORTAL_GUIDES_URL: &str = "PORTAL_GUIDES_URL";
pub const KEY_REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
pub const KEY_SITE_NAME: &str = "SITE_NAME";
pub const KEY_CONTACT_URL: &str = "CONTACT_URL";
pub const KEY_SOURCE_LABEL: &str = "SOURCE_LABEL";
pub const KEY_NOTIFY_WEBHOOK_URL: &str = "NOTIFY_WEBHOOK_URL";

// ---------------------------------------------------------------------------
// ConfigStore
// ---------------------------------------------------------------------------

/// Raw key/value configuration as read from disk.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    values: HashMap<String, String>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// Parse `KEY=VALUE` lines. Later duplicates win.
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Self { values, path: None }
    }

    /// Load a config file. A missing file yields an empty store; callers that
    /// need specific keys fail later through [`ConfigStore::require`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self {
                values: HashMap::new(),
                path: Some(path.to_path_buf()),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| GuidePressError::io(path, e))?;
        let mut store = Self::parse(&content);
        store.path = Some(path.to_path_buf());
        tracing::debug!(?path, keys = store.values.len(), "config loaded");
        Ok(store)
    }

    /// Path this store was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Get a non-empty, non-placeholder value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX))
    }

    /// Get a value or a default.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Interpret a value as a boolean flag (`true`, `yes`, `1`, `on`).
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(v) => matches!(
                v.to_ascii_lowercase().as_str(),
                "true" | "yes" | "1" | "on"
            ),
            None => default,
        }
    }

    /// Parse a value with `FromStr`, falling back to `default` when absent.
    pub fn get_parsed<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v
                .parse()
                .map_err(|e| GuidePressError::config(format!("invalid {key}={v}: {e}"))),
            None => Ok(default),
        }
    }

    /// Fail with [`GuidePressError::ConfigMissing`] if any key is absent.
    pub fn require(&self, keys: &[&str]) -> Result<()> {
        let missing: Vec<&str> = keys
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GuidePressError::config_missing(missing))
        }
    }

    /// Override a value (used for CLI flags).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Keys present in the store, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// Ordering applied to the published catalog on every write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogSort {
    /// Newest `published_date` first.
    #[default]
    Recency,
    /// Case-insensitive title order.
    Title,
}

impl FromStr for CatalogSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recency" | "date" | "newest" => Ok(Self::Recency),
            "title" | "name" => Ok(Self::Title),
            other => Err(format!("unknown catalog sort '{other}' (expected recency or title)")),
        }
    }
}

impl fmt::Display for CatalogSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recency => f.write_str("recency"),
            Self::Title => f.write_str("title"),
        }
    }
}

/// Portal login details. Only resolved when content fetching is enabled.
#[derive(Clone)]
pub struct PortalCredentials {
    pub login_url: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("login_url", &self.login_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Branding used by the default page renderer.
#[derive(Debug, Clone)]
pub struct SiteBranding {
    /// Site name shown in page titles and the navbar.
    pub site_name: String,
    /// Link target of the call-to-action button.
    pub contact_url: String,
    /// Attribution line for the content provider.
    pub source_label: String,
}

impl Default for SiteBranding {
    fn default() -> Self {
        Self {
            site_name: "Travel Guides".into(),
            contact_url: "../contact.html".into(),
            source_label: "Partner Portal".into(),
        }
    }
}

/// File locations, resolvable without credentials (used by read-only
/// commands such as `status`).
#[derive(Debug, Clone)]
pub struct StoreLocations {
    pub source_csv: PathBuf,
    pub output_dir: PathBuf,
    pub state_file: PathBuf,
    pub catalog_sort: CatalogSort,
}

impl StoreLocations {
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        Ok(Self {
            source_csv: PathBuf::from(store.get_or(KEY_SOURCE_CSV, "guides.csv")),
            output_dir: PathBuf::from(store.get_or(KEY_OUTPUT_DIR, "travel-guides")),
            state_file: PathBuf::from(store.get_or(KEY_STATE_FILE, "published_guides_state.json")),
            catalog_sort: store.get_parsed(KEY_CATALOG_SORT, CatalogSort::default())?,
        })
    }

    /// Location of the catalog index inside the output directory.
    pub fn catalog_file(&self) -> PathBuf {
        self.output_dir.join("index.json")
    }
}

/// Runtime publish configuration: resolved from a [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct PublishSettings {
    /// Exported spreadsheet (CSV) of candidate guides.
    pub source_csv: PathBuf,
    /// Directory receiving rendered pages and `index.json`.
    pub output_dir: PathBuf,
    /// Dedup ledger location.
    pub state_file: PathBuf,
    /// Catalog ordering.
    pub catalog_sort: CatalogSort,
    /// Personalization token embedded into outbound links.
    pub advisor_id: String,
    /// Whether to fetch full guide content from the portal.
    pub fetch_content: bool,
    /// Portal credentials (present iff `fetch_content`).
    pub portal: Option<PortalCredentials>,
    /// Portal page listing further guides, read after the sheet.
    pub portal_guides_url: Option<String>,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Default renderer branding.
    pub branding: SiteBranding,
    /// Optional webhook notified after each publish.
    pub notify_webhook_url: Option<String>,
}

impl PublishSettings {
    /// Resolve typed settings, failing with `ConfigMissing` when a key the
    /// enabled features depend on is absent.
    pub fn from_store(store: &ConfigStore) -> Result<Self> {
        store.require(&[KEY_ADVISOR_ID])?;

        let fetch_content = store.get_bool(KEY_FETCH_CONTENT, true);
        let portal = if fetch_content {
            store.require(&[KEY_PORTAL_LOGIN_URL, KEY_PORTAL_USERNAME, KEY_PORTAL_PASSWORD])?;
            Some(PortalCredentials {
                login_url: store.get_or(KEY_PORTAL_LOGIN_URL, "").to_string(),
                username: store.get_or(KEY_PORTAL_USERNAME, "").to_string(),
                password: store.get_or(KEY_PORTAL_PASSWORD, "").to_string(),
            })
        } else {
            None
        };

        let locations = StoreLocations::from_store(store)?;
        let branding = SiteBranding::default();

        Ok(Self {
            source_csv: locations.source_csv,
            output_dir: locations.output_dir,
            state_file: locations.state_file,
            catalog_sort: locations.catalog_sort,
            advisor_id: store.get_or(KEY_ADVISOR_ID, "").to_string(),
            fetch_content,
            portal,
            portal_guides_url: store.get(KEY_PORTAL_GUIDES_URL).map(String::from),
            request_timeout_secs: store.get_parsed(KEY_REQUEST_TIMEOUT_SECS, 15u64)?,
            branding: SiteBranding {
                site_name: store.get_or(KEY_SITE_NAME, &branding.site_name).to_string(),
                contact_url: store.get_or(KEY_CONTACT_URL, &branding.contact_url).to_string(),
                source_label: store.get_or(KEY_SOURCE_LABEL, &branding.source_label).to_string(),
            },
            notify_webhook_url: store.get(KEY_NOTIFY_WEBHOOK_URL).map(String::from),
        })
    }

    /// Location of the catalog index inside the output directory.
    pub fn catalog_file(&self) -> PathBuf {
        self.output_dir.join("index.json")
    }
}

// ---------------------------------------------------------------------------
// Config file lookup
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.guidepress/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GuidePressError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the per-user config file (`~/.guidepress/guidepress.conf`).
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Pick the config file to load: explicit path, `./guidepress.conf`, then the
/// per-user file. Returns the explicit path even if it does not exist.
pub fn locate_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Some(local);
    }

    default_config_path().ok().filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
# Portal credentials
PORTAL_LOGIN_URL=https://portal.example.com/login
PORTAL_USERNAME=advisor@example.com
PORTAL_PASSWORD=s3cret=with=equals

ADVISOR_ID=jane-doe
FETCH_CONTENT=yes
PORTAL_GUIDES_URL=your-guides-page
CATALOG_SORT=title
UNKNOWN_KEY=ignored
not a pair
"#;

    #[test]
    fn parses_key_value_lines() {
        let store = ConfigStore::parse(SAMPLE);
        assert_eq!(store.get(KEY_ADVISOR_ID), Some("jane-doe"));
        // Only the first '=' splits.
        assert_eq!(store.get(KEY_PORTAL_PASSWORD), Some("s3cret=with=equals"));
        assert!(store.get_bool(KEY_FETCH_CONTENT, false));
        assert_eq!(store.get("not a pair"), None);
    }

    #[test]
    fn placeholders_count_as_missing() {
        let store = ConfigStore::parse("PORTAL_USERNAME=your-username\nADVISOR_ID=a1");
        assert_eq!(store.get(KEY_PORTAL_USERNAME), None);

        let err = store
            .require(&[KEY_ADVISOR_ID, KEY_PORTAL_USERNAME])
            .unwrap_err();
        assert!(matches!(err, GuidePressError::ConfigMissing { ref keys } if keys == &["PORTAL_USERNAME"]));
    }

    #[test]
    fn settings_from_store() {
        let store = ConfigStore::parse(SAMPLE);
        let settings = PublishSettings::from_store(&store).expect("settings");
        assert!(settings.fetch_content);
        assert_eq!(settings.catalog_sort, CatalogSort::Title);
        assert_eq!(settings.request_timeout_secs, 15);
        assert_eq!(settings.portal_guides_url, None);
        assert_eq!(settings.catalog_file(), PathBuf::from("travel-guides/index.json"));
        let portal = settings.portal.expect("portal credentials");
        assert_eq!(portal.username, "advisor@example.com");
        assert!(!format!("{portal:?}").contains("s3cret"));
    }

    #[test]
    fn credentials_only_required_when_fetching() {
        let store = ConfigStore::parse("ADVISOR_ID=a1\nFETCH_CONTENT=false");
        let settings = PublishSettings::from_store(&store).expect("settings");
        assert!(!settings.fetch_content);
        assert!(settings.portal.is_none());

        let store = ConfigStore::parse("ADVISOR_ID=a1");
        let err = PublishSettings::from_store(&store).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("PORTAL_LOGIN_URL"));
    }

    #[test]
    fn locations_need_no_credentials() {
        let store = ConfigStore::parse("OUTPUT_DIR=site/guides\nSTATE_FILE=");
        let locations = StoreLocations::from_store(&store).expect("locations");
        assert_eq!(locations.catalog_file(), PathBuf::from("site/guides/index.json"));
        assert_eq!(locations.state_file, PathBuf::from("published_guides_state.json"));
        assert_eq!(locations.catalog_sort, CatalogSort::Recency);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let store = ConfigStore::parse("ADVISOR_ID=a1\nFETCH_CONTENT=no\nCATALOG_SORT=random");
        let err = PublishSettings::from_store(&store).unwrap_err();
        assert!(matches!(err, GuidePressError::Config { .. }));
    }

    #[test]
    fn missing_file_yields_empty_store() {
        let path = std::env::temp_dir().join(format!("gp-config-{}.conf", uuid::Uuid::now_v7()));
        let store = ConfigStore::load(&path).expect("load");
        assert!(store.keys().is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(PublishSettings::from_store(&store).is_err());
    }
}
