//! Bundle configuration
//!
//! Settings used when creating and saving bundles. Loaded from TOML:
//!
//! ```toml
//! chunk_size = 262144
//! compressor = "zstd"
//! compression_level = 3
//! verify_on_open = false
//! ```
//!
//! `chunk_size` only applies to new bundles; an existing bundle keeps the
//! chunk size recorded in its header.

use crate::compression::{Compressor, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{BundleError, Result};
use crate::header::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::Validate;

/// Largest chunk size accepted for new bundles (16 MiB)
pub const MAX_CHUNK_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct BundleConfig {
    /// Logical size of every chunk except the last
    #[validate(range(min = 1, max = 16_777_216))]
    pub chunk_size: u32,

    /// Algorithm for new bundles
    pub compressor: Compressor,

    /// Level passed to the encoder on save
    #[validate(range(min = -7, max = 22))]
    pub compression_level: i32,

    /// Decode every chunk once when a bundle is opened
    pub verify_on_open: bool,
}

impl Default for BundleConfig {
    fn default() -> Self {
        BundleConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            compressor: Compressor::Zstd,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            verify_on_open: false,
        }
    }
}

impl BundleConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: BundleConfig =
            toml::from_str(text).map_err(|e| BundleError::Config(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| BundleError::Config(e.to_string()))
    }

    /// Run field validation, reporting failures as `BundleError::Config`
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| BundleError::Config(e.to_string()))
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_verify_on_open(mut self, verify: bool) -> Self {
        self.verify_on_open = verify;
        self
    }
}
