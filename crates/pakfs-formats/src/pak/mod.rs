//! Pak archive format
//!
//! A pak file is a payload area followed by an index and a fixed-size footer:
//!
//! ```text
//! +------------------+  0
//! | file payloads    |  stored or block-compressed, optionally AES encrypted
//! +------------------+  footer.index_offset
//! | index            |  mount point + path -> entry records
//! +------------------+  file_size - FOOTER_SIZE
//! | footer           |  magic, version, index location, key GUID, methods
//! +------------------+
//! ```
//!
//! Parsing never touches file payloads; the index alone is enough to build
//! the path lookup. Payload decoding lives in the VFS block reader.
//!
//! # Example
//!
//! ```
//! use pakfs_formats::pak::{CompressionMethod, PakBuilder, PakFooter, PakIndex};
//!
//! let bytes = PakBuilder::new("../../../Game/")
//!     .with_block_size(4096)
//!     .with_compression(CompressionMethod::Lz4)
//!     .add_file("Config.json", vec![b'x'; 10_000])
//!     .build()
//!     .unwrap();
//!
//! let footer = PakFooter::parse(&bytes).unwrap();
//! let index = PakIndex::parse(&bytes, &footer, None).unwrap();
//! assert_eq!(index.get("Config.json").unwrap().blocks.len(), 3);
//! ```

mod builder;
mod compression;
mod entry;
mod error;
mod footer;
mod index;
mod string;

pub use builder::{DEFAULT_BLOCK_SIZE, PakBuilder};
pub use compression::CompressionMethod;
pub use entry::{CompressedBlock, ENTRY_FLAG_ENCRYPTED, PakEntry};
pub use error::{PakError, PakResult};
pub use footer::{
    COMPRESSION_METHOD_SLOTS, FOOTER_SIZE, METHOD_NAME_LEN, PAK_MAGIC, PAK_VERSION_LATEST,
    PakFooter, VERSION_ABSOLUTE_BLOCK_OFFSETS, VERSION_RELATIVE_BLOCK_OFFSETS,
};
pub use index::PakIndex;
pub use string::{MAX_STRING_LEN, PakString};
