//! Archive façade (C7): open modes, entry iteration, name lookup, and the
//! single-open-entry invariant tying together the central-directory engine
//! (C5), the header codec (C4), and the entry stream stack (C6).

use crate::central_directory::{CdWriter, CentralDirectoryInfo};
use crate::codec::deflate_level_flag_bits;
use crate::consts::{compression_method, flag};
use crate::datetime;
use crate::entry::{self, EntryDescriptor, HeaderRead};
use crate::entry_stream::{
    effective_compression_method, EntryReader, EntryWriter, ReadPlan, WritePlan,
};
use crate::error::{Result, SZipError};
use std::io::{Read, Seek, SeekFrom, Write};

/// How an archive was opened. `Append` is a variant of write that seeds its
/// central directory from an existing archive instead of starting empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    Read,
    Write,
    Append,
}

struct OpenWrite<S> {
    writer: EntryWriter<S>,
    descriptor: EntryDescriptor,
    local_header_offset: u64,
}

/// A PKWARE ZIP archive over any seekable stream.
///
/// Only one entry may be open for read or write at a time (§5); starting a
/// new write-side entry implicitly closes the previous one, while reading a
/// new entry while one is still open is a parameter error.
pub struct Archive<S> {
    stream: Option<S>,
    mode: ArchiveMode,
    entries: Vec<EntryDescriptor>,
    cursor: Option<usize>,
    cd_writer: Option<CdWriter>,
    cd_info: Option<CentralDirectoryInfo>,
    version_madeby: u16,
    comment: String,
    open_write: Option<OpenWrite<S>>,
}

impl<S: Read + Write + Seek> Archive<S> {
    /// Open an existing archive for read. Scans and fully parses the
    /// central directory up front; entries are then addressed by position.
    pub fn open_read(mut stream: S) -> Result<Self> {
        let info = crate::central_directory::read_tail(&mut stream)?;
        let entries = read_entries(&mut stream, &info)?;
        Ok(Archive {
            stream: Some(stream),
            mode: ArchiveMode::Read,
            entries,
            cursor: None,
            cd_writer: None,
            cd_info: Some(info.clone()),
            version_madeby: info.version_madeby,
            comment: info.comment,
            open_write: None,
        })
    }

    /// Open a brand-new archive for write, discarding anything already in
    /// `stream` from its current position onward.
    pub fn create(stream: S) -> Self {
        Archive {
            stream: Some(stream),
            mode: ArchiveMode::Write,
            entries: Vec::new(),
            cursor: None,
            cd_writer: Some(CdWriter::new()),
            cd_info: None,
            version_madeby: (crate::consts::host_system::UNIX as u16) << 8 | 20,
            comment: String::new(),
            open_write: None,
        }
    }

    /// Open an existing archive for append: parses its central directory,
    /// seeds a `CdWriter` with the raw CD bytes, and positions the stream at
    /// the old CD's start so new local entries overwrite it (to be followed
    /// by a fresh CD write in `finish`).
    pub fn open_append(mut stream: S) -> Result<Self> {
        let info = crate::central_directory::read_tail(&mut stream)?;
        let entries = read_entries(&mut stream, &info)?;

        let cd_start = (info.cd_offset as i64 + info.disk_offset_shift) as u64;
        stream.seek(SeekFrom::Start(cd_start)).map_err(SZipError::from)?;
        let mut raw_cd = vec![0u8; info.cd_size as usize];
        stream.read_exact(&mut raw_cd).map_err(SZipError::from)?;
        stream.seek(SeekFrom::Start(cd_start)).map_err(SZipError::from)?;

        let cd_writer = CdWriter::seed(raw_cd, info.number_entry);

        Ok(Archive {
            stream: Some(stream),
            mode: ArchiveMode::Append,
            entries,
            cursor: None,
            cd_writer: Some(cd_writer),
            cd_info: Some(info.clone()),
            version_madeby: info.version_madeby,
            comment: info.comment,
            open_write: None,
        })
    }

    pub fn mode(&self) -> ArchiveMode {
        self.mode
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: String) {
        self.comment = comment;
    }

    pub fn version_madeby(&self) -> u16 {
        self.version_madeby
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Position the cursor at the first entry, if any.
    pub fn goto_first_entry(&mut self) -> Option<&EntryDescriptor> {
        if self.entries.is_empty() {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(0);
        self.entries.first()
    }

    /// Advance the cursor to the next entry, if any.
    pub fn goto_next_entry(&mut self) -> Option<&EntryDescriptor> {
        let next = match self.cursor {
            Some(i) => i + 1,
            None => 0,
        };
        if next >= self.entries.len() {
            self.cursor = None;
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next)
    }

    /// Position the cursor at a specific index, as previously returned by
    /// `current_position`.
    pub fn goto_entry(&mut self, position: usize) -> Result<&EntryDescriptor> {
        if position >= self.entries.len() {
            return Err(SZipError::EndOfList);
        }
        self.cursor = Some(position);
        Ok(&self.entries[position])
    }

    /// A stable handle to the entry the cursor currently sits on, usable
    /// later with `goto_entry`.
    pub fn current_position(&self) -> Option<usize> {
        self.cursor
    }

    pub fn current_entry(&self) -> Option<&EntryDescriptor> {
        self.cursor.and_then(|i| self.entries.get(i))
    }

    /// Find an entry by name, treating `/` and `\` as equivalent path
    /// separators and optionally folding case (P7).
    pub fn locate_entry(&mut self, name: &str, ignore_case: bool) -> Option<usize> {
        self.locate_entry_by(|candidate| paths_equal(candidate, name, ignore_case))
    }

    pub fn locate_entry_by<F: Fn(&str) -> bool>(&mut self, predicate: F) -> Option<usize> {
        let found = self.entries.iter().position(|e| predicate(&e.filename));
        if let Some(i) = found {
            self.cursor = Some(i);
        }
        found
    }

    /// Open the entry the cursor currently sits on for streaming read.
    ///
    /// Returns a clone of its descriptor alongside the reader: the reader
    /// borrows the archive's stream for its lifetime, so the descriptor
    /// (needed again at `close_entry_read`) has to travel with it rather
    /// than be re-fetched through `self`.
    pub fn open_current_entry(&mut self, password: Option<&str>) -> Result<(EntryDescriptor, EntryReader<&mut S>)> {
        let idx = self.cursor.ok_or_else(|| SZipError::param("no current entry; call goto_first_entry first"))?;
        let entry = self.entries[idx].clone();

        let stream = self.stream.as_mut().ok_or_else(|| SZipError::internal("archive stream missing"))?;
        let data_offset = locate_entry_data(stream, &entry)?;
        stream.seek(SeekFrom::Start(data_offset)).map_err(SZipError::from)?;

        let dos_modified = datetime::unix_to_dos(entry.modified);
        let plan = ReadPlan::from_entry(&entry, dos_modified, password);
        let reader = EntryReader::open(stream, &plan)?;
        Ok((entry, reader))
    }

    /// Start writing a new entry. Closes any entry still open for write.
    ///
    /// Applies §4.6's write-open side effects: forces `STORE` for
    /// directories and `compress_level == 0`, always sets the
    /// `DATA_DESCRIPTOR` flag, translates the deflate level into its flag
    /// bits, and defaults an AES mode of `0` to 256-bit.
    pub fn start_entry(
        &mut self,
        mut descriptor: EntryDescriptor,
        compress_level: u32,
        password: Option<&str>,
    ) -> Result<()> {
        if self.mode == ArchiveMode::Read {
            return Err(SZipError::param("archive was opened for read"));
        }
        self.finish_current_write()?;

        let is_directory = descriptor.is_directory();
        descriptor.compression_method =
            effective_compression_method(descriptor.compression_method, compress_level, is_directory);
        descriptor.flag |= flag::DATA_DESCRIPTOR;
        if descriptor.compression_method == compression_method::DEFLATE {
            descriptor.flag |= deflate_level_flag_bits(compress_level);
        }
        if descriptor.is_encrypted() && descriptor.aes_version != 0 && descriptor.aes_encryption_mode == 0 {
            descriptor.aes_encryption_mode = 256;
        }

        let mut stream = self.stream.take().ok_or_else(|| SZipError::internal("archive stream missing"))?;
        let local_header_offset = stream.stream_position().map_err(SZipError::from)?;
        entry::write_header(&mut stream, &descriptor, true)?;

        let random = random_bytes_10();
        let verifier = if descriptor.flag & flag::DATA_DESCRIPTOR != 0 {
            (datetime::unix_to_dos(descriptor.modified) >> 16) as u16
        } else {
            (descriptor.crc >> 16) as u16
        };
        let write_plan = WritePlan {
            compression_method: descriptor.compression_method,
            compress_level,
            is_encrypted: descriptor.is_encrypted(),
            aes_mode: if descriptor.aes_version != 0 { descriptor.aes_encryption_mode } else { 0 },
            password,
            zipcrypto_random: random,
            zipcrypto_verifier: verifier,
        };
        let writer = EntryWriter::open(stream, &write_plan)?;

        self.open_write = Some(OpenWrite {
            writer,
            descriptor,
            local_header_offset,
        });
        Ok(())
    }

    pub fn write_entry_data(&mut self, data: &[u8]) -> Result<()> {
        let open = self.open_write.as_mut().ok_or_else(|| SZipError::param("no entry is open for write"))?;
        open.writer.write_all(data).map_err(SZipError::from)
    }

    /// Flush the current write entry's codec/cipher, emit its data
    /// descriptor, and fold its final record into the central directory
    /// buffer (§4.6 close-on-write).
    fn finish_current_write(&mut self) -> Result<()> {
        let open = match self.open_write.take() {
            Some(o) => o,
            None => return Ok(()),
        };
        let result = open.writer.close()?;
        let mut descriptor = open.descriptor;
        descriptor.crc = result.crc;
        descriptor.uncompressed_size = result.uncompressed_size;
        descriptor.compressed_size = result.compressed_size;
        descriptor.disk_offset = open.local_header_offset;

        let mut stream = result.base;
        write_data_descriptor(&mut stream, &descriptor)?;

        self.cd_writer
            .as_mut()
            .ok_or_else(|| SZipError::internal("archive has no central directory writer"))?
            .push(&descriptor)?;
        self.entries.push(descriptor);
        self.stream = Some(stream);
        Ok(())
    }

    /// Close out the archive: finish any still-open entry, flush the
    /// central directory and EOCD family, and return the underlying stream.
    pub fn finish(mut self) -> Result<S> {
        self.finish_current_write()?;
        let mut stream = self.stream.take().ok_or_else(|| SZipError::internal("archive stream missing"))?;
        if let Some(cd_writer) = self.cd_writer.take() {
            cd_writer.finish(&mut stream, self.version_madeby, &self.comment)?;
        }
        Ok(stream)
    }
}

/// Read every central-directory record, correcting each entry's
/// `disk_offset` by the archive's detected shift (§4.5).
fn read_entries<S: Read + Seek>(stream: &mut S, info: &CentralDirectoryInfo) -> Result<Vec<EntryDescriptor>> {
    let cd_start = (info.cd_offset as i64 + info.disk_offset_shift) as u64;
    stream.seek(SeekFrom::Start(cd_start)).map_err(SZipError::from)?;

    let mut entries = Vec::with_capacity(info.number_entry as usize);
    for _ in 0..info.number_entry {
        match entry::read_header(stream, false)? {
            HeaderRead::Entry(mut e) => {
                e.disk_offset = (e.disk_offset as i64 + info.disk_offset_shift) as u64;
                entries.push(e);
            }
            HeaderRead::EndOfList => break,
        }
    }
    Ok(entries)
}

/// Seek past an entry's local header to find where its compressed data
/// begins, re-reading the local header since its extra field length can
/// legitimately differ from the central record's (§3).
fn locate_entry_data<S: Read + Seek>(stream: &mut S, entry: &EntryDescriptor) -> Result<u64> {
    stream.seek(SeekFrom::Start(entry.disk_offset)).map_err(SZipError::from)?;
    match entry::read_header(stream, true)? {
        HeaderRead::Entry(_) => stream.stream_position().map_err(SZipError::from),
        HeaderRead::EndOfList => Err(SZipError::format("local header offset points at an EOCD signature")),
    }
}

fn write_data_descriptor<W: Write>(w: &mut W, entry: &EntryDescriptor) -> Result<()> {
    use crate::io_ext::{write_u32, write_u64};
    use crate::consts::DATA_DESCRIPTOR_SIG;

    write_u32(w, DATA_DESCRIPTOR_SIG).map_err(SZipError::from)?;
    write_u32(w, entry.crc).map_err(SZipError::from)?;
    if entry.uncompressed_size > u32::MAX as u64 {
        write_u64(w, entry.compressed_size).map_err(SZipError::from)?;
        write_u64(w, entry.uncompressed_size).map_err(SZipError::from)?;
    } else {
        write_u32(w, entry.compressed_size as u32).map_err(SZipError::from)?;
        write_u32(w, entry.uncompressed_size as u32).map_err(SZipError::from)?;
    }
    Ok(())
}

/// Flush a read-side entry stream and verify its observed CRC32 against the
/// descriptor's stored value, applying §4.6's AE-2 exemption (its CRC field
/// is zeroed on the wire, authenticated by the AES footer instead).
pub fn close_entry_read<R: Read>(entry: &EntryDescriptor, reader: EntryReader<R>, raw_mode: bool) -> Result<()> {
    let (observed_crc, total_in) = reader.close()?;
    let skip_crc_check = raw_mode || total_in == 0 || (entry.is_encrypted() && entry.aes_version == 2);
    if !skip_crc_check && observed_crc != entry.crc {
        return Err(SZipError::Crc {
            expected: entry.crc,
            actual: observed_crc,
        });
    }
    Ok(())
}

fn paths_equal(a: &str, b: &str, ignore_case: bool) -> bool {
    let normalize = |s: &str| s.replace('\\', "/");
    let (na, nb) = (normalize(a), normalize(b));
    if ignore_case {
        na.eq_ignore_ascii_case(&nb)
    } else {
        na == nb
    }
}

/// Ten bytes of header padding for a ZipCrypto-encrypted entry. Real
/// randomness matters for the keystream warm-up; a CSPRNG source is already
/// pulled in for AES, so route ZipCrypto's padding through it too.
fn random_bytes_10() -> [u8; 10] {
    let mut buf = [0u8; 10];
    #[cfg(feature = "aes")]
    {
        let _ = getrandom::getrandom(&mut buf);
    }
    #[cfg(not(feature = "aes"))]
    {
        let seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        let mut x = seed ^ 0x9E37_79B9_7F4A_7C15;
        for b in buf.iter_mut() {
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            *b = (x & 0xff) as u8;
        }
    }
    buf
}
