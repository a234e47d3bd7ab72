//! Shared types, error model, and configuration for GuidePress.
//!
//! This crate is the foundation depended on by all other GuidePress crates.
//! It provides:
//! - [`GuidePressError`]: the unified error type
//! - Domain types ([`Item`], [`Tags`], [`CatalogEntry`], [`PublicationRecord`], [`RunId`])
//! - Configuration ([`ConfigStore`], [`PublishSettings`], config file lookup)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    CatalogSort, ConfigStore, PortalCredentials, PublishSettings, SiteBranding, StoreLocations,
    config_dir, default_config_path, locate_config,
};
pub use error::{GuidePressError, Result};
pub use types::{CatalogEntry, Item, PublicationRecord, PublishMode, RunId, Tags};
