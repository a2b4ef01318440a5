//! Extra-field codec (C3): parses and emits the ZIP64, NTFS, Unix1, and AES
//! extra records carried in the variable-length extra-field blob attached
//! to every local/central header.

use crate::consts::extra_id;
use crate::error::{Result, SZipError};
use crate::io_ext::{read_u16, read_u32, read_u64, read_u8, write_u16, write_u32, write_u64, write_u8};

/// Which of the four ZIP64-eligible fields were sentinel'd in the fixed
/// header region, and therefore must be (and in that order) present in the
/// ZIP64 extra block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip64Sentinels {
    pub uncompressed_size: bool,
    pub compressed_size: bool,
    pub disk_offset: bool,
    pub disk_number: bool,
}

impl Zip64Sentinels {
    pub fn any(&self) -> bool {
        self.uncompressed_size || self.compressed_size || self.disk_offset || self.disk_number
    }
}

/// Decoded ZIP64 extra record (0x0001). Only fields whose fixed-width
/// counterpart was a sentinel are present, in declaration order:
/// uncompressed size, compressed size, local header offset, disk number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64Extra {
    pub uncompressed_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub disk_offset: Option<u64>,
    pub disk_number: Option<u32>,
}

/// Decoded NTFS extra record (0x000A), sub-record 0x01.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NtfsExtra {
    pub modified: i64,
    pub accessed: i64,
    pub created: i64,
}

/// Decoded Unix1 extra record (0x000D).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unix1Extra {
    pub atime: i32,
    pub mtime: i32,
    pub uid: u16,
    pub gid: u16,
}

/// Decoded WinZip AES extra record (0x9901).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtra {
    pub version: u16,
    pub strength: u8,
    pub real_compression_method: u16,
}

/// All extra-field state the core understands, plus a passthrough bag for
/// everything else.
#[derive(Debug, Clone, Default)]
pub struct ExtraFields {
    pub zip64: Option<Zip64Extra>,
    pub ntfs: Option<NtfsExtra>,
    pub unix1: Option<Unix1Extra>,
    pub aes: Option<AesExtra>,
    /// Blocks with ids the library does not own, kept in original order so
    /// they pass through a read-then-write cycle untouched.
    pub other: Vec<(u16, Vec<u8>)>,
}

impl ExtraFields {
    /// Parse an extra-field blob. `sentinels` tells the ZIP64 reader how
    /// many of its optional 8-byte fields are actually present.
    pub fn parse(blob: &[u8], sentinels: Zip64Sentinels) -> Result<Self> {
        let mut fields = ExtraFields::default();
        let mut cursor = blob;

        while cursor.len() >= 4 {
            let id = read_u16(&mut cursor).map_err(SZipError::from)?;
            let len = read_u16(&mut cursor).map_err(SZipError::from)? as usize;
            if cursor.len() < len {
                return Err(SZipError::format("extra field block runs past end of blob"));
            }
            let data = &cursor[..len];
            cursor = &cursor[len..];

            match id {
                extra_id::ZIP64 => {
                    fields.zip64 = Some(parse_zip64(data, sentinels)?);
                }
                extra_id::NTFS => {
                    fields.ntfs = parse_ntfs(data)?;
                }
                extra_id::UNIX1 => {
                    fields.unix1 = parse_unix1(data);
                }
                extra_id::AES => {
                    fields.aes = Some(parse_aes(data)?);
                }
                _ => fields.other.push((id, data.to_vec())),
            }
        }

        Ok(fields)
    }

    /// Emit the blob a writer should attach: library-owned blocks first, in
    /// fixed order (ZIP64, NTFS, AES), followed by passthrough blocks in
    /// their original relative order. Ids the library owns are never
    /// duplicated into `other` by `parse`, so no filtering is needed here;
    /// `parse` already strips any incoming AES block into `self.aes`, so
    /// `write` always emits at most one AES block and never needs to
    /// suppress its own in favor of a passthrough copy.
    pub fn write(&self, sentinels: Zip64Sentinels) -> Vec<u8> {
        let mut out = Vec::new();

        if let Some(z) = &self.zip64 {
            write_zip64_block(&mut out, z, sentinels);
        }
        if let Some(n) = &self.ntfs {
            write_ntfs_block(&mut out, n);
        }
        if let Some(a) = &self.aes {
            write_aes_block(&mut out, a);
        }
        for (id, data) in &self.other {
            write_u16(&mut out, *id).ok();
            write_u16(&mut out, data.len() as u16).ok();
            out.extend_from_slice(data);
        }

        out
    }
}

fn parse_zip64(mut data: &[u8], sentinels: Zip64Sentinels) -> Result<Zip64Extra> {
    let mut extra = Zip64Extra::default();
    if sentinels.uncompressed_size {
        extra.uncompressed_size = Some(read_u64(&mut data).map_err(SZipError::from)?);
    }
    if sentinels.compressed_size {
        extra.compressed_size = Some(read_u64(&mut data).map_err(SZipError::from)?);
    }
    if sentinels.disk_offset {
        extra.disk_offset = Some(read_u64(&mut data).map_err(SZipError::from)?);
    }
    if sentinels.disk_number {
        extra.disk_number = Some(read_u32(&mut data).map_err(SZipError::from)?);
    }
    Ok(extra)
}

fn write_zip64_block(out: &mut Vec<u8>, z: &Zip64Extra, sentinels: Zip64Sentinels) {
    let mut data = Vec::new();
    if sentinels.uncompressed_size {
        write_u64(&mut data, z.uncompressed_size.unwrap_or(0)).ok();
    }
    if sentinels.compressed_size {
        write_u64(&mut data, z.compressed_size.unwrap_or(0)).ok();
    }
    if sentinels.disk_offset {
        write_u64(&mut data, z.disk_offset.unwrap_or(0)).ok();
    }
    if sentinels.disk_number {
        write_u32(&mut data, z.disk_number.unwrap_or(0)).ok();
    }
    // An empty block (no field overflowed) is still emitted when the caller
    // explicitly attached a ZIP64 record (`Zip64Policy::Force`, §4.4).
    write_u16(out, extra_id::ZIP64).ok();
    write_u16(out, data.len() as u16).ok();
    out.extend_from_slice(&data);
}

fn parse_ntfs(data: &[u8]) -> Result<Option<NtfsExtra>> {
    if data.len() < 4 {
        return Ok(None);
    }
    let mut cursor = &data[4..];
    while cursor.len() >= 4 {
        let attr_id = read_u16(&mut cursor).map_err(SZipError::from)?;
        let attr_size = read_u16(&mut cursor).map_err(SZipError::from)? as usize;
        if cursor.len() < attr_size {
            return Err(SZipError::format("NTFS extra sub-record runs past end"));
        }
        let sub = &cursor[..attr_size];
        cursor = &cursor[attr_size..];

        if attr_id == 0x01 && attr_size == 24 {
            let mut sub = sub;
            let mtime = read_u64(&mut sub).map_err(SZipError::from)?;
            let atime = read_u64(&mut sub).map_err(SZipError::from)?;
            let ctime = read_u64(&mut sub).map_err(SZipError::from)?;
            return Ok(Some(NtfsExtra {
                modified: crate::datetime::ntfs_to_unix(mtime),
                accessed: crate::datetime::ntfs_to_unix(atime),
                created: crate::datetime::ntfs_to_unix(ctime),
            }));
        }
    }
    Ok(None)
}

fn write_ntfs_block(out: &mut Vec<u8>, n: &NtfsExtra) {
    let mut data = Vec::with_capacity(32);
    write_u32(&mut data, 0).ok(); // reserved
    write_u16(&mut data, 0x01).ok(); // sub-record id
    write_u16(&mut data, 24).ok(); // sub-record size
    write_u64(&mut data, crate::datetime::unix_to_ntfs(n.modified)).ok();
    write_u64(&mut data, crate::datetime::unix_to_ntfs(n.accessed)).ok();
    write_u64(&mut data, crate::datetime::unix_to_ntfs(n.created)).ok();

    write_u16(out, extra_id::NTFS).ok();
    write_u16(out, data.len() as u16).ok();
    out.extend_from_slice(&data);
}

fn parse_unix1(data: &[u8]) -> Option<Unix1Extra> {
    if data.len() < 12 {
        return None;
    }
    let mut cursor = data;
    let atime = read_u32(&mut cursor).ok()? as i32;
    let mtime = read_u32(&mut cursor).ok()? as i32;
    let uid = read_u16(&mut cursor).ok()?;
    let gid = read_u16(&mut cursor).ok()?;
    // Remaining variable-length bytes (variable uid/gid data) are skipped.
    Some(Unix1Extra {
        atime,
        mtime,
        uid,
        gid,
    })
}

/// Writer-side variant: the spec's read rule only adopts `atime`/`mtime`
/// "if the corresponding field is still zero" on the *entry descriptor*,
/// not inside this module; callers merge `Unix1Extra` into the descriptor
/// using that rule themselves (see `entry::EntryDescriptor::merge_extra`).
fn parse_aes(data: &[u8]) -> Result<AesExtra> {
    if data.len() != 7 {
        return Err(SZipError::format(format!(
            "AES extra field must be 7 bytes, got {}",
            data.len()
        )));
    }
    let mut cursor = data;
    let version = read_u16(&mut cursor).map_err(SZipError::from)?;
    let mark1 = read_u8(&mut cursor).map_err(SZipError::from)?;
    let mark2 = read_u8(&mut cursor).map_err(SZipError::from)?;
    if mark1 != b'A' || mark2 != b'E' {
        return Err(SZipError::format("AES extra field missing 'AE' magic"));
    }
    let strength = read_u8(&mut cursor).map_err(SZipError::from)?;
    let real_compression_method = read_u16(&mut cursor).map_err(SZipError::from)?;
    if version != 1 && version != 2 {
        return Err(SZipError::format(format!(
            "unsupported AES extra field version {version}"
        )));
    }
    Ok(AesExtra {
        version,
        strength,
        real_compression_method,
    })
}

fn write_aes_block(out: &mut Vec<u8>, a: &AesExtra) {
    write_u16(out, extra_id::AES).ok();
    write_u16(out, 7).ok();
    write_u16(out, a.version).ok();
    write_u8(out, b'A').ok();
    write_u8(out, b'E').ok();
    write_u8(out, a.strength).ok();
    write_u16(out, a.real_compression_method).ok();
}
