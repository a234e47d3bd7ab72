//! Candidate guide sources and outbound link personalization.
//!
//! This crate provides:
//! - [`SourceReader`]: streams [`Item`](guidepress_shared::Item) records from an exported sheet
//! - [`personalize`]: embeds an advisor token into a guide URL, idempotently

pub mod personalize;
pub mod reader;

pub use personalize::personalize;
pub use reader::{Items, SourceReader};
