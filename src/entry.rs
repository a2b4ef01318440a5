//! Entry header codec (C4): bidirectional serializer for the 30-byte local
//! and 46-byte central directory records, plus the variable-length
//! name/extra/comment regions and the extra-field policy from §4.3.

use crate::consts::{self, compression_method, extra_id, flag, version_needed, CENTRAL_DIR_HEADER_SIG, EOCD_SIG,
    LOCAL_FILE_HEADER_SIG, SENTINEL16, SENTINEL32, ZIP64_EOCD_SIG};
use crate::datetime;
use crate::error::{Result, SZipError};
use crate::extra_field::{ExtraFields, Zip64Extra, Zip64Sentinels};
use crate::io_ext::{read_u16, read_u32, write_u16, write_u32, write_u8};
use std::io::{Read, Write};

/// ZIP64 policy a caller attaches to an entry being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Policy {
    /// Use ZIP64 only for fields that actually overflow 32 bits, or for a
    /// local header whose final size is not yet known (streaming write).
    #[default]
    Auto,
    /// Always attach a ZIP64 extra record, even if empty.
    Force,
    /// Reject the write with a parameter error if any field would overflow.
    Disable,
}

/// A single archive entry's metadata, shared by local and central records.
///
/// Populated from a read, or built by the caller for a write. `comment` and
/// `disk_number`/`disk_offset` are central-directory-only in practice; a
/// local header read leaves them at their default.
#[derive(Debug, Clone)]
pub struct EntryDescriptor {
    pub version_madeby: u16,
    /// `0` means "compute the default at write time" (§4.4).
    pub version_needed: u16,
    pub flag: u16,
    pub compression_method: u16,
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
    pub crc: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub disk_number: u32,
    pub disk_offset: u64,
    pub external_fa: u32,
    pub internal_fa: u16,
    pub filename: String,
    pub extra: ExtraFields,
    pub comment: String,
    /// `0` when the entry is not AES-encrypted, else 1 or 2 (AE-1/AE-2).
    pub aes_version: u16,
    /// 128, 192, or 256; meaningful only when `aes_version != 0`.
    pub aes_encryption_mode: u16,
    pub zip64: Zip64Policy,
}

impl Default for EntryDescriptor {
    fn default() -> Self {
        EntryDescriptor {
            version_madeby: (consts::host_system::UNIX as u16) << 8 | 20,
            version_needed: 0,
            flag: 0,
            compression_method: compression_method::STORE,
            modified: 0,
            accessed: 0,
            created: 0,
            crc: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_number: 0,
            disk_offset: 0,
            external_fa: 0,
            internal_fa: 0,
            filename: String::new(),
            extra: ExtraFields::default(),
            comment: String::new(),
            aes_version: 0,
            aes_encryption_mode: 0,
            zip64: Zip64Policy::Auto,
        }
    }
}

impl EntryDescriptor {
    pub fn is_directory(&self) -> bool {
        datetime::is_directory(self.external_fa, self.version_madeby, &self.filename)
    }

    pub fn is_encrypted(&self) -> bool {
        self.flag & flag::ENCRYPTED != 0
    }

    /// Fold NTFS/Unix1 timestamps parsed from the extra field into the
    /// descriptor's canonical modified/accessed/created fields. Unix1's
    /// times are adopted only if the corresponding field is still zero,
    /// matching §4.3's "used only if still zero" rule; NTFS always wins
    /// since it is more precise and parsed after Unix1 in practice.
    fn merge_extra_timestamps(&mut self) {
        if let Some(unix1) = self.extra.unix1 {
            if self.accessed == 0 {
                self.accessed = unix1.atime as i64;
            }
            if self.modified == 0 {
                self.modified = unix1.mtime as i64;
            }
        }
        if let Some(ntfs) = self.extra.ntfs {
            self.modified = ntfs.modified;
            self.accessed = ntfs.accessed;
            self.created = ntfs.created;
        }
    }

    fn merge_extra_zip64(&mut self) {
        if let Some(z) = self.extra.zip64 {
            if let Some(v) = z.uncompressed_size {
                self.uncompressed_size = v;
            }
            if let Some(v) = z.compressed_size {
                self.compressed_size = v;
            }
            if let Some(v) = z.disk_offset {
                self.disk_offset = v;
            }
            if let Some(v) = z.disk_number {
                self.disk_number = v;
            }
        }
    }

    fn merge_extra_aes(&mut self) {
        if let Some(aes) = self.extra.aes {
            self.aes_version = aes.version;
            self.aes_encryption_mode = match aes.strength {
                1 => 128,
                2 => 192,
                3 => 256,
                _ => 0,
            };
            self.compression_method = aes.real_compression_method;
        }
    }
}

/// Outcome of reading one local/central record: either a parsed entry, or
/// the discovery that the next signature is an EOCD/ZIP64-EOCD marker,
/// meaning the central directory is exhausted.
pub enum HeaderRead {
    Entry(EntryDescriptor),
    EndOfList,
}

/// Read one local (`local = true`) or central (`local = false`) header,
/// including its variable-length name/extra(/comment) regions, from the
/// current stream position.
pub fn read_header<R: Read>(r: &mut R, local: bool) -> Result<HeaderRead> {
    let sig = read_u32(r).map_err(SZipError::from)?;
    if sig == EOCD_SIG || sig == ZIP64_EOCD_SIG {
        return Ok(HeaderRead::EndOfList);
    }
    let expected = if local {
        LOCAL_FILE_HEADER_SIG
    } else {
        CENTRAL_DIR_HEADER_SIG
    };
    if sig != expected {
        return Err(SZipError::format(format!(
            "expected {} header signature {:#010x}, got {:#010x}",
            if local { "local" } else { "central" },
            expected,
            sig
        )));
    }

    let mut entry = EntryDescriptor::default();

    if !local {
        entry.version_madeby = read_u16(r).map_err(SZipError::from)?;
    }
    entry.version_needed = read_u16(r).map_err(SZipError::from)?;
    entry.flag = read_u16(r).map_err(SZipError::from)?;
    entry.compression_method = read_u16(r).map_err(SZipError::from)?;
    let mod_time = read_u16(r).map_err(SZipError::from)?;
    let mod_date = read_u16(r).map_err(SZipError::from)?;
    let dos = ((mod_date as u32) << 16) | mod_time as u32;
    entry.modified = datetime::dos_to_unix(dos).unwrap_or(0);
    entry.crc = read_u32(r).map_err(SZipError::from)?;
    let compressed_size_raw = read_u32(r).map_err(SZipError::from)?;
    let uncompressed_size_raw = read_u32(r).map_err(SZipError::from)?;
    entry.compressed_size = compressed_size_raw as u64;
    entry.uncompressed_size = uncompressed_size_raw as u64;

    let filename_len = read_u16(r).map_err(SZipError::from)? as usize;
    let extra_len = read_u16(r).map_err(SZipError::from)? as usize;

    let mut comment_len = 0usize;
    let mut disk_offset_raw = 0u32;
    if !local {
        comment_len = read_u16(r).map_err(SZipError::from)? as usize;
        entry.disk_number = read_u16(r).map_err(SZipError::from)? as u32;
        entry.internal_fa = read_u16(r).map_err(SZipError::from)?;
        entry.external_fa = read_u32(r).map_err(SZipError::from)?;
        disk_offset_raw = read_u32(r).map_err(SZipError::from)?;
        entry.disk_offset = disk_offset_raw as u64;
    }

    let mut name_buf = vec![0u8; filename_len];
    r.read_exact(&mut name_buf).map_err(SZipError::from)?;
    entry.filename = String::from_utf8_lossy(&name_buf).into_owned();

    let mut extra_buf = vec![0u8; extra_len];
    r.read_exact(&mut extra_buf).map_err(SZipError::from)?;

    if !local {
        let mut comment_buf = vec![0u8; comment_len];
        r.read_exact(&mut comment_buf).map_err(SZipError::from)?;
        entry.comment = String::from_utf8_lossy(&comment_buf).into_owned();
    }

    let sentinels = Zip64Sentinels {
        uncompressed_size: uncompressed_size_raw == SENTINEL32,
        compressed_size: compressed_size_raw == SENTINEL32,
        disk_offset: !local && disk_offset_raw == SENTINEL32,
        disk_number: !local && entry.disk_number == SENTINEL16 as u32,
    };
    entry.extra = ExtraFields::parse(&extra_buf, sentinels)?;
    entry.merge_extra_zip64();
    entry.merge_extra_timestamps();
    entry.merge_extra_aes();

    Ok(HeaderRead::Entry(entry))
}

/// Compute the effective `version_needed` a writer should declare, applying
/// the caller override (`entry.version_needed != 0`) or the §4.4 defaults.
fn effective_version_needed(entry: &EntryDescriptor, zip64: bool) -> u16 {
    if entry.version_needed != 0 {
        return entry.version_needed;
    }
    let mut needed = version_needed::BASELINE;
    if zip64 {
        needed = version_needed::ZIP64;
    }
    if entry.is_encrypted() && entry.aes_version != 0 {
        needed = version_needed::AES;
    }
    if entry.compression_method == compression_method::LZMA {
        needed = version_needed::LZMA;
    }
    needed
}

/// Per-field ZIP64 sentinel decision for a write: a field is sentinel'd
/// (and gets an 8-byte slot in the ZIP64 extra) iff its own value overflows
/// 32 bits, independent of the `Zip64Policy`.
fn write_sentinels(entry: &EntryDescriptor) -> Zip64Sentinels {
    Zip64Sentinels {
        uncompressed_size: entry.uncompressed_size >= SENTINEL32 as u64,
        compressed_size: entry.compressed_size >= SENTINEL32 as u64,
        disk_offset: entry.disk_offset >= SENTINEL32 as u64,
        disk_number: false,
    }
}

/// Decide whether a ZIP64 extra record is attached at all.
fn resolve_zip64(entry: &EntryDescriptor, local: bool, sentinels: Zip64Sentinels) -> Result<bool> {
    match entry.zip64 {
        Zip64Policy::Auto => Ok((local && entry.uncompressed_size == 0) || sentinels.any()),
        Zip64Policy::Force => Ok(true),
        Zip64Policy::Disable => {
            if sentinels.any() {
                Err(SZipError::param(
                    "entry size exceeds 32 bits but ZIP64 is disabled for this entry",
                ))
            } else {
                Ok(false)
            }
        }
    }
}

/// Write one local (`local = true`) or central (`local = false`) header,
/// including its variable-length name/extra(/comment) regions, to the
/// current stream position.
pub fn write_header<W: Write>(w: &mut W, entry: &EntryDescriptor, local: bool) -> Result<()> {
    let sentinels = write_sentinels(entry);
    let zip64 = resolve_zip64(entry, local, sentinels)?;

    let mut extra = entry.extra.clone();
    if zip64 {
        extra.zip64 = Some(Zip64Extra {
            uncompressed_size: sentinels.uncompressed_size.then_some(entry.uncompressed_size),
            compressed_size: sentinels.compressed_size.then_some(entry.compressed_size),
            disk_offset: sentinels.disk_offset.then_some(entry.disk_offset),
            disk_number: None,
        });
    } else {
        extra.zip64 = None;
    }
    if entry.modified != 0 && entry.accessed != 0 && entry.created != 0 {
        extra.ntfs = Some(crate::extra_field::NtfsExtra {
            modified: entry.modified,
            accessed: entry.accessed,
            created: entry.created,
        });
    }
    if entry.is_encrypted() && entry.aes_version != 0 && extra.aes.is_none() {
        let strength = match entry.aes_encryption_mode {
            128 => 1,
            192 => 2,
            _ => 3,
        };
        extra.aes = Some(crate::extra_field::AesExtra {
            version: entry.aes_version,
            strength,
            real_compression_method: entry.compression_method,
        });
    }
    let extra_zip64_sentinels = if zip64 { sentinels } else { Zip64Sentinels::default() };
    let extra_blob = extra.write(extra_zip64_sentinels);

    write_u32(w, if local { LOCAL_FILE_HEADER_SIG } else { CENTRAL_DIR_HEADER_SIG }).map_err(SZipError::from)?;
    if !local {
        write_u16(w, entry.version_madeby).map_err(SZipError::from)?;
    }
    write_u16(w, effective_version_needed(entry, zip64)).map_err(SZipError::from)?;
    write_u16(w, entry.flag).map_err(SZipError::from)?;

    let on_wire_method = if entry.is_encrypted() && entry.aes_version != 0 {
        compression_method::AES
    } else {
        entry.compression_method
    };
    write_u16(w, on_wire_method).map_err(SZipError::from)?;

    let dos = datetime::unix_to_dos(entry.modified);
    write_u16(w, (dos & 0xFFFF) as u16).map_err(SZipError::from)?;
    write_u16(w, (dos >> 16) as u16).map_err(SZipError::from)?;

    write_u32(w, entry.crc).map_err(SZipError::from)?;
    write_u32(
        w,
        if sentinels.compressed_size {
            SENTINEL32
        } else {
            entry.compressed_size as u32
        },
    )
    .map_err(SZipError::from)?;
    write_u32(
        w,
        if sentinels.uncompressed_size {
            SENTINEL32
        } else {
            entry.uncompressed_size as u32
        },
    )
    .map_err(SZipError::from)?;

    let is_dir = entry.is_directory();
    let name_bytes = entry.filename.as_bytes();
    let ends_with_slash = matches!(name_bytes.last(), Some(b'/') | Some(b'\\'));
    let (write_len, declared_len) = if is_dir {
        if ends_with_slash {
            (name_bytes.len() - 1, name_bytes.len())
        } else {
            (name_bytes.len(), name_bytes.len() + 1)
        }
    } else {
        (name_bytes.len(), name_bytes.len())
    };

    write_u16(w, declared_len as u16).map_err(SZipError::from)?;
    write_u16(w, extra_blob.len() as u16).map_err(SZipError::from)?;

    if !local {
        write_u16(w, entry.comment.len() as u16).map_err(SZipError::from)?;
        write_u16(w, entry.disk_number as u16).map_err(SZipError::from)?;
        write_u16(w, entry.internal_fa).map_err(SZipError::from)?;
        write_u32(w, entry.external_fa).map_err(SZipError::from)?;
        write_u32(
            w,
            if sentinels.disk_offset {
                SENTINEL32
            } else {
                entry.disk_offset as u32
            },
        )
        .map_err(SZipError::from)?;
    }

    w.write_all(&name_bytes[..write_len]).map_err(SZipError::from)?;
    if is_dir {
        write_u8(w, b'/').map_err(SZipError::from)?;
    }
    w.write_all(&extra_blob).map_err(SZipError::from)?;
    if !local {
        w.write_all(entry.comment.as_bytes()).map_err(SZipError::from)?;
    }

    Ok(())
}

/// Compute the byte count of a central record on disk, given its parsed
/// descriptor. Used by C7's `goto_next_entry` to step the cursor without
/// re-deriving the extra-field blob.
pub fn central_record_len(filename_len: usize, extra_len: usize, comment_len: usize) -> u64 {
    consts::CENTRAL_HEADER_SIZE + filename_len as u64 + extra_len as u64 + comment_len as u64
}

/// The on-wire extra-field length for a directory canonicalization check in
/// tests: recomputes what `write_header` would declare without writing.
#[cfg(test)]
pub(crate) fn declared_filename_len(entry: &EntryDescriptor) -> usize {
    let name_bytes = entry.filename.as_bytes();
    let is_dir = entry.is_directory();
    let ends_with_slash = matches!(name_bytes.last(), Some(b'/') | Some(b'\\'));
    if is_dir && !ends_with_slash {
        name_bytes.len() + 1
    } else {
        name_bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::win_attr;

    fn sample_entry(name: &str) -> EntryDescriptor {
        let mut e = EntryDescriptor::default();
        e.filename = name.to_string();
        e.crc = 0xEBE6_C6E6;
        e.compressed_size = 13;
        e.uncompressed_size = 13;
        e.modified = 1_700_000_000;
        e
    }

    #[test]
    fn local_header_roundtrip() {
        let entry = sample_entry("hello.txt");
        let mut buf = Vec::new();
        write_header(&mut buf, &entry, true).unwrap();

        let mut cursor = &buf[..];
        let parsed = match read_header(&mut cursor, true).unwrap() {
            HeaderRead::Entry(e) => e,
            HeaderRead::EndOfList => panic!("expected entry"),
        };
        assert_eq!(parsed.filename, "hello.txt");
        assert_eq!(parsed.crc, entry.crc);
        assert_eq!(parsed.compressed_size, 13);
        assert_eq!(parsed.uncompressed_size, 13);
    }

    #[test]
    fn central_header_roundtrip_with_comment() {
        let mut entry = sample_entry("dir/file.bin");
        entry.comment = "a comment".to_string();
        entry.version_madeby = 0x0314; // unix, 20
        let mut buf = Vec::new();
        write_header(&mut buf, &entry, false).unwrap();

        let mut cursor = &buf[..];
        let parsed = match read_header(&mut cursor, false).unwrap() {
            HeaderRead::Entry(e) => e,
            HeaderRead::EndOfList => panic!("expected entry"),
        };
        assert_eq!(parsed.filename, "dir/file.bin");
        assert_eq!(parsed.comment, "a comment");
    }

    #[test]
    fn zip64_sentinel_substitution_on_write() {
        let mut entry = sample_entry("big.bin");
        entry.uncompressed_size = 5_000_000_000;
        entry.compressed_size = 5_000_000_000;
        let mut buf = Vec::new();
        write_header(&mut buf, &entry, false).unwrap();

        // Fixed-region sizes must be the 32-bit sentinel.
        let compressed_size_field = u32::from_le_bytes(buf[20..24].try_into().unwrap());
        let uncompressed_size_field = u32::from_le_bytes(buf[24..28].try_into().unwrap());
        assert_eq!(compressed_size_field, SENTINEL32);
        assert_eq!(uncompressed_size_field, SENTINEL32);

        let mut cursor = &buf[..];
        let parsed = match read_header(&mut cursor, false).unwrap() {
            HeaderRead::Entry(e) => e,
            HeaderRead::EndOfList => panic!("expected entry"),
        };
        assert_eq!(parsed.uncompressed_size, 5_000_000_000);
        assert_eq!(parsed.compressed_size, 5_000_000_000);
    }

    #[test]
    fn directory_gets_canonical_trailing_slash() {
        let mut entry = sample_entry("dir");
        entry.external_fa = win_attr::DIRECTORY;
        entry.uncompressed_size = 0;
        entry.compressed_size = 0;
        let mut buf = Vec::new();
        write_header(&mut buf, &entry, false).unwrap();

        let mut cursor = &buf[..];
        let parsed = match read_header(&mut cursor, false).unwrap() {
            HeaderRead::Entry(e) => e,
            HeaderRead::EndOfList => panic!("expected entry"),
        };
        assert_eq!(parsed.filename, "dir/");
    }

    #[test]
    fn disable_policy_rejects_overflow() {
        let mut entry = sample_entry("huge.bin");
        entry.zip64 = Zip64Policy::Disable;
        entry.uncompressed_size = 5_000_000_000;
        let mut buf = Vec::new();
        let err = write_header(&mut buf, &entry, false).unwrap_err();
        assert!(matches!(err, SZipError::Param(_)));
    }

    #[test]
    fn reading_eocd_signature_reports_end_of_list() {
        let mut buf = Vec::new();
        write_u32(&mut buf, EOCD_SIG).unwrap();
        let mut cursor = &buf[..];
        assert!(matches!(
            read_header(&mut cursor, false).unwrap(),
            HeaderRead::EndOfList
        ));
    }
}
