//! File format parsers and builders for pak containers
//!
#![allow(clippy::cast_possible_truncation)] // Intentional for binary format parsing
#![allow(clippy::cast_lossless)] // Sometimes clearer than From
#![allow(clippy::module_name_repetitions)] // Clear naming is preferred
#![allow(clippy::return_self_not_must_use)] // Builder patterns
//! This crate provides symmetric (parser and builder) implementations for the
//! container formats served by the pakfs virtual file system.
//!
//! # Supported Formats
//!
//! - **Pak**: Block-compressed, optionally AES encrypted archives with a
//!   footer-located index
//! - **IoStore**: TOC header of `.utoc`/`.ucas` containers (metadata only)
//!
//! # Design Principles
//!
//! - **Symmetric Operations**: Both parsing and building supported
//! - **Whole-archive validation**: An index either parses completely or the
//!   archive is rejected
//! - **No payload access**: Parsing reads the footer and index only

#![warn(missing_docs)]

pub mod iostore;
pub mod pak;

pub use iostore::{TocError, TocHeader};
pub use pak::{CompressionMethod, PakBuilder, PakEntry, PakError, PakFooter, PakIndex};
