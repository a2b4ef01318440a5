//! # zipcore: a PKWARE ZIP archive engine
//!
//! `zipcore` reads and writes ZIP archives over any `Read + Write + Seek`
//! stream, streaming entry data through a layered codec/cipher stack rather
//! than buffering whole entries in memory. It understands ZIP64 extensions,
//! multi-disk spanning markers, traditional PKWARE encryption (ZipCrypto),
//! and WinZip AES (AE-1/AE-2), and supports store, deflate, bzip2, and LZMA
//! compression.
//!
//! ## Quick start
//!
//! ### Reading an archive
//!
//! ```no_run
//! use zipcore::Archive;
//! use std::fs::File;
//! use std::io::Read;
//!
//! let file = File::open("archive.zip")?;
//! let mut archive = Archive::open_read(file)?;
//!
//! while archive.goto_next_entry().is_some() {
//!     let (entry, mut reader) = archive.open_current_entry(None)?;
//!     let mut data = Vec::new();
//!     reader.read_to_end(&mut data)?;
//!     zipcore::archive::close_entry_read(&entry, reader, false)?;
//!     println!("{}: {} bytes", entry.filename, data.len());
//! }
//! # Ok::<(), zipcore::SZipError>(())
//! ```
//!
//! ### Writing an archive
//!
//! ```no_run
//! use zipcore::{Archive, EntryDescriptor};
//! use std::fs::File;
//!
//! let file = File::create("output.zip")?;
//! let mut archive = Archive::create(file);
//!
//! let mut entry = EntryDescriptor::default();
//! entry.filename = "hello.txt".to_string();
//! archive.start_entry(entry, 6, None)?;
//! archive.write_entry_data(b"Hello, World!")?;
//!
//! archive.finish()?;
//! # Ok::<(), zipcore::SZipError>(())
//! ```

pub mod archive;
pub mod central_directory;
pub mod cipher;
pub mod codec;
pub mod consts;
pub mod datetime;
pub mod entry;
pub mod entry_stream;
pub mod error;
pub mod extra_field;
pub mod io_ext;

pub use archive::{Archive, ArchiveMode};
pub use entry::{EntryDescriptor, Zip64Policy};
pub use entry_stream::{EntryReader, EntryWriter};
pub use error::{Result, SZipError};
