//! Decoder configuration

use crate::common::{Error, Result};
use crate::format::revision::FormatRevision;
use crate::storage::page_constants::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use serde::{Deserialize, Serialize};

/// Placeholder recorded for external values that cannot be found
pub const DEFAULT_MISSING_PLACEHOLDER: &str = "<missing external value {id}>";

/// Expand `{id}` in a placeholder pattern
pub fn expand_placeholder(pattern: &str, owner_id: u32) -> String {
    pattern.replace("{id}", &owner_id.to_string())
}

/// Settings for one decoding session
///
/// Every field has a default, so a partial document deserializes into a
/// complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Format revision of the storage being decoded
    pub revision: FormatRevision,
    /// Size of one relation block in bytes
    pub block_size: usize,
    /// Alignment applied to `d`-aligned (double) columns
    pub double_align: usize,
    /// Separator between diagnostic scopes
    pub context_separator: String,
    /// Text recorded for external values that cannot be found; `{id}` is
    /// replaced with the chunk owner id
    pub missing_external_placeholder: String,
    /// Keep reported diagnostics in memory in addition to logging them
    pub collect_diagnostics: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            revision: FormatRevision::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            double_align: 4,
            context_separator: " : ".to_string(),
            missing_external_placeholder: DEFAULT_MISSING_PLACEHOLDER.to_string(),
            collect_diagnostics: true,
        }
    }
}

impl DecoderConfig {
    /// Configuration for a given revision with every other setting defaulted
    pub fn for_revision(revision: FormatRevision) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    /// Check the configuration for values the decoder cannot work with
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        if !self.block_size.is_power_of_two()
            || !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size)
        {
            return Err(Error::invalid_config(format!(
                "block size {} is not a power of two between {MIN_BLOCK_SIZE} and {MAX_BLOCK_SIZE}",
                self.block_size
            )));
        }
        if self.double_align != 4 && self.double_align != 8 {
            return Err(Error::invalid_config(format!(
                "double alignment must be 4 or 8, got {}",
                self.double_align
            )));
        }
        Ok(())
    }

    /// Placeholder text for a missing external value
    pub fn placeholder_for(&self, owner_id: u32) -> String {
        expand_placeholder(&self.missing_external_placeholder, owner_id)
    }
}
