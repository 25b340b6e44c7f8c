//! Bundle container core
//!
//! - [`error`] - Error types for bundle operations
//! - [`header`] - Fixed 60-byte header and its little-endian codec
//! - [`chunk_table`] - Per-chunk compressed lengths and offset lookup
//! - [`compression`] - Codec capability and the built-in algorithms
//! - [`cache`] - Lazily allocated decoded-content cache
//! - [`io`] - Backing streams and the per-stream lock
//! - [`record`] - Index records that mirror a bundle's size
//! - [`config`] - TOML-loadable bundle settings
//! - [`bundle`] - The container itself

pub mod bundle;
pub mod cache;
pub mod chunk_table;
pub mod compression;
pub mod config;
pub mod error;
pub mod header;
pub mod io;
pub mod record;


pub use bundle::{Bundle, RangeBuf};
