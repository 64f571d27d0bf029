//! Pak block compression and decompression
//!
//! Each compression block is an independent stream. Decoders write into a
//! caller-provided slice of exactly the block's uncompressed length, so the
//! block reader can decode straight into its destination.

use std::fmt;
use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use super::error::{PakError, PakResult};

/// Compression method of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// Stored without compression
    None,
    /// zlib stream
    Zlib,
    /// gzip stream
    Gzip,
    /// Raw LZ4 block
    Lz4,
}

impl CompressionMethod {
    /// Resolve a compression table name (case-insensitive)
    ///
    /// Returns `None` for names this crate cannot decode.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "zlib" => Some(Self::Zlib),
            "gzip" => Some(Self::Gzip),
            "lz4" => Some(Self::Lz4),
            _ => None,
        }
    }

    /// Name as written in the compression table
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Zlib => "Zlib",
            Self::Gzip => "Gzip",
            Self::Lz4 => "LZ4",
        }
    }

    /// Worst-case compressed size for `size` input bytes
    pub fn compressed_bound(self, size: usize) -> usize {
        let zlib = size + (size >> 12) + (size >> 14) + (size >> 25) + 13;
        match self {
            Self::None => size,
            Self::Zlib => zlib,
            // gzip carries a 10-byte header and 8-byte trailer instead of zlib's 6 bytes
            Self::Gzip => zlib + 12,
            Self::Lz4 => lz4_flex::block::get_maximum_output_size(size),
        }
    }

    /// Decompress one block into `output`
    ///
    /// `output` must be exactly the block's uncompressed length; a stream that
    /// ends early is an error.
    pub fn decompress_into(self, input: &[u8], output: &mut [u8]) -> PakResult<()> {
        match self {
            Self::None => {
                let stored = input.get(..output.len()).ok_or_else(|| {
                    PakError::DecompressionFailed(format!(
                        "stored block has {} bytes, expected {}",
                        input.len(),
                        output.len()
                    ))
                })?;
                output.copy_from_slice(stored);
                Ok(())
            }
            Self::Zlib => ZlibDecoder::new(input).read_exact(output).map_err(|e| {
                PakError::DecompressionFailed(format!("ZLib decompression failed: {e}"))
            }),
            Self::Gzip => GzDecoder::new(input).read_exact(output).map_err(|e| {
                PakError::DecompressionFailed(format!("Gzip decompression failed: {e}"))
            }),
            Self::Lz4 => {
                let written = lz4_flex::block::decompress_into(input, output).map_err(|e| {
                    PakError::DecompressionFailed(format!("LZ4 decompression failed: {e}"))
                })?;
                if written == output.len() {
                    Ok(())
                } else {
                    Err(PakError::DecompressionFailed(format!(
                        "LZ4 block produced {written} bytes, expected {}",
                        output.len()
                    )))
                }
            }
        }
    }

    /// Compress one block
    pub fn compress(self, data: &[u8]) -> PakResult<Vec<u8>> {
        match self {
            Self::None => Ok(data.to_vec()),
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data).map_err(|e| {
                    PakError::CompressionError(format!("ZLib compression failed: {e}"))
                })?;
                encoder.finish().map_err(|e| {
                    PakError::CompressionError(format!("ZLib compression failed: {e}"))
                })
            }
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data).map_err(|e| {
                    PakError::CompressionError(format!("Gzip compression failed: {e}"))
                })?;
                encoder.finish().map_err(|e| {
                    PakError::CompressionError(format!("Gzip compression failed: {e}"))
                })
            }
            Self::Lz4 => Ok(lz4_flex::block::compress(data)),
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
