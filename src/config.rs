//! Process-wide, read-only conversion configuration.
//!
//! Built once (embedded tables plus an optional JSON overlay) and passed by
//! reference into every conversion. Nothing here changes after start-up.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kfx::style::{DefaultMappingTable, IgnorableTable, IgnorePattern, MergeRuleTable};

/// Tunable settings, deserialized from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Position units between location-map checkpoints.
    pub location_stride: usize,
    /// Maximum byte size of one `content_N` text fragment.
    pub content_chunk_size: usize,
    /// EID of the first page template.
    pub first_eid: u32,
    pub generator_version: String,
    pub application_version: String,
    /// Write a text dump of the container beside the output.
    pub debug_dump: bool,
    /// Collapse adjoining vertical margins after style resolution.
    pub collapse_margins: bool,
    /// Patterns added to the embedded ignorable-property table.
    pub ignorable_properties: Vec<IgnorePattern>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            location_stride: 110,
            content_chunk_size: 8192,
            first_eid: 1000,
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            application_version: concat!("kfxgen-", env!("CARGO_PKG_VERSION")).to_string(),
            debug_dump: false,
            collapse_margins: true,
            ignorable_properties: Vec::new(),
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if self.location_stride == 0 {
            return Err(Error::InvalidConfig("location_stride must be positive".into()));
        }
        if self.content_chunk_size < 16 {
            return Err(Error::InvalidConfig(format!(
                "content_chunk_size {} is too small",
                self.content_chunk_size
            )));
        }
        if self.first_eid == 0 {
            return Err(Error::InvalidConfig("first_eid 0 is reserved for the position-map sentinel".into()));
        }
        Ok(())
    }
}

/// Everything shared by conversions: the merge-rule table, element
/// defaults, ignorable patterns and settings.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub merge_rules: MergeRuleTable,
    pub defaults: DefaultMappingTable,
    pub ignorable: IgnorableTable,
    pub settings: Settings,
}

impl Config {
    /// Embedded tables with `settings` applied.
    pub fn with_settings(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let mut ignorable = IgnorableTable::default();
        ignorable.extend(settings.ignorable_properties.iter().cloned());
        Ok(Self {
            ignorable,
            settings,
            ..Self::default()
        })
    }

    /// Overlay a JSON settings document on the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(json)?;
        Self::with_settings(settings)
    }

    /// Read a JSON settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("loaded settings from {}", path.as_ref().display());
        Self::from_json(&text)
    }
}
