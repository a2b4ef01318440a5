//! Central-directory engine (C5): EOCD discovery, ZIP64 upgrade, offset-shift
//! repair, and the in-memory CD buffer used while writing.

use crate::consts::{
    self, CENTRAL_DIR_HEADER_SIG, EOCD_SIG, EOCD_SIZE, MAX_COMMENT_SIZE, SENTINEL16, SENTINEL32,
    ZIP64_EOCD_BODY_SIZE, ZIP64_EOCD_LOCATOR_SIG, ZIP64_EOCD_LOCATOR_SIZE, ZIP64_EOCD_SIG,
};
use crate::entry::EntryDescriptor;
use crate::error::{Result, SZipError};
use crate::io_ext::{read_u16, read_u32, read_u64, write_u16, write_u32, write_u64};
use log::{debug, warn};
use std::io::{Read, Seek, SeekFrom, Write};

/// Parsed tail-of-archive bookkeeping the façade needs to position itself
/// over the central directory and correct local-header offsets.
#[derive(Debug, Clone)]
pub struct CentralDirectoryInfo {
    pub disk_number_with_cd: u32,
    pub cd_offset: u64,
    pub cd_size: u64,
    pub number_entry: u64,
    pub version_madeby: u16,
    pub comment: String,
    /// Additive correction applied to every entry's `disk_offset` on read,
    /// accounting for bytes prepended ahead of a valid archive.
    pub disk_offset_shift: i64,
}

/// Window size used while scanning backward for the EOCD signature. Chosen
/// to overlap with the previous window by 4 bytes so a signature straddling
/// a window boundary is never missed.
const SEARCH_WINDOW: u64 = 1024;

/// Scan the tail of `r` for the last End-Of-Central-Directory signature,
/// returning its absolute byte offset.
fn find_eocd<R: Read + Seek>(r: &mut R) -> Result<u64> {
    let file_size = r.seek(SeekFrom::End(0)).map_err(SZipError::from)?;
    let max_back = (MAX_COMMENT_SIZE + EOCD_SIZE).min(file_size);
    let floor = file_size - max_back;

    let mut pos = file_size;
    let mut found: Option<u64> = None;

    while pos > floor {
        let window_start = pos.saturating_sub(SEARCH_WINDOW + 4).max(floor);
        let window_len = (pos - window_start) as usize;

        r.seek(SeekFrom::Start(window_start)).map_err(SZipError::from)?;
        let mut buf = vec![0u8; window_len];
        r.read_exact(&mut buf).map_err(SZipError::from)?;

        if let Some(idx) = rfind_signature(&buf, EOCD_SIG) {
            found = Some(window_start + idx as u64);
            break;
        }

        pos = window_start + 4;
    }

    found.ok_or_else(|| SZipError::Exist("end of central directory record not found".into()))
}

fn rfind_signature(buf: &[u8], sig: u32) -> Option<usize> {
    let needle = sig.to_le_bytes();
    if buf.len() < 4 {
        return None;
    }
    (0..=buf.len() - 4).rev().find(|&i| buf[i..i + 4] == needle)
}

/// Locate, parse, and (if needed) ZIP64-upgrade and offset-shift-repair the
/// central-directory bookkeeping for an archive opened for read.
pub fn read_tail<R: Read + Seek>(r: &mut R) -> Result<CentralDirectoryInfo> {
    let eocd_pos = find_eocd(r)?;
    r.seek(SeekFrom::Start(eocd_pos)).map_err(SZipError::from)?;

    let sig = read_u32(r).map_err(SZipError::from)?;
    if sig != EOCD_SIG {
        return Err(SZipError::internal("find_eocd returned a non-signature position"));
    }
    let _disk_number = read_u16(r).map_err(SZipError::from)?;
    let disk_number_with_cd_16 = read_u16(r).map_err(SZipError::from)?;
    let number_entry_this_disk = read_u16(r).map_err(SZipError::from)?;
    let number_entry_16 = read_u16(r).map_err(SZipError::from)?;
    let cd_size_32 = read_u32(r).map_err(SZipError::from)?;
    let cd_offset_32 = read_u32(r).map_err(SZipError::from)?;
    let comment_len = read_u16(r).map_err(SZipError::from)? as usize;
    let mut comment_buf = vec![0u8; comment_len];
    r.read_exact(&mut comment_buf).map_err(SZipError::from)?;
    let comment = String::from_utf8_lossy(&comment_buf).into_owned();

    let mut number_entry = number_entry_16 as u64;
    let mut cd_size = cd_size_32 as u64;
    let mut cd_offset = cd_offset_32 as u64;
    let mut disk_number_with_cd = disk_number_with_cd_16 as u32;
    let mut version_madeby = 0u16;

    let needs_zip64 = number_entry_16 == SENTINEL16 || cd_size_32 == SENTINEL32 || cd_offset_32 == SENTINEL32;
    if needs_zip64 {
        let locator_pos = eocd_pos
            .checked_sub(ZIP64_EOCD_LOCATOR_SIZE)
            .ok_or_else(|| SZipError::format("archive too short to hold a ZIP64 EOCD locator"))?;
        r.seek(SeekFrom::Start(locator_pos)).map_err(SZipError::from)?;
        let locator_sig = read_u32(r).map_err(SZipError::from)?;
        if locator_sig != ZIP64_EOCD_LOCATOR_SIG {
            return Err(SZipError::format(
                "EOCD declares ZIP64 sentinels but no ZIP64 EOCD locator precedes it",
            ));
        }
        let _locator_disk = read_u32(r).map_err(SZipError::from)?;
        let zip64_eocd_offset = read_u64(r).map_err(SZipError::from)?;

        r.seek(SeekFrom::Start(zip64_eocd_offset)).map_err(SZipError::from)?;
        let z_sig = read_u32(r).map_err(SZipError::from)?;
        if z_sig != ZIP64_EOCD_SIG {
            return Err(SZipError::format("ZIP64 EOCD locator points at the wrong signature"));
        }
        let _record_size = read_u64(r).map_err(SZipError::from)?;
        version_madeby = read_u16(r).map_err(SZipError::from)?;
        let _version_needed = read_u16(r).map_err(SZipError::from)?;
        let _disk_number = read_u32(r).map_err(SZipError::from)?;
        disk_number_with_cd = read_u32(r).map_err(SZipError::from)?;
        let _number_entry_this_disk = read_u64(r).map_err(SZipError::from)?;
        number_entry = read_u64(r).map_err(SZipError::from)?;
        cd_size = read_u64(r).map_err(SZipError::from)?;
        cd_offset = read_u64(r).map_err(SZipError::from)?;
    } else if disk_number_with_cd == 0 && number_entry_this_disk != number_entry_16 {
        return Err(SZipError::format(
            "central directory entry count mismatch between disk and total fields",
        ));
    }

    if eocd_pos < cd_offset.saturating_add(cd_size) && !needs_zip64 {
        warn!("EOCD precedes declared end of central directory; archive may be truncated");
    }

    let disk_offset_shift = repair_offset_shift(r, eocd_pos, cd_offset, cd_size)?;

    debug!(
        "central directory: {number_entry} entries at offset {cd_offset} (shift {disk_offset_shift})"
    );

    Ok(CentralDirectoryInfo {
        disk_number_with_cd,
        cd_offset,
        cd_size,
        number_entry,
        version_madeby,
        comment,
        disk_offset_shift,
    })
}

/// §4.5 offset-shift repair: verify the central directory's first record
/// signature sits where declared; if not, look for it at `EOCD − cd_size`
/// and compute the shift a self-extracting stub (or similar prefix) caused.
fn repair_offset_shift<R: Read + Seek>(r: &mut R, eocd_pos: u64, cd_offset: u64, cd_size: u64) -> Result<i64> {
    if cd_size == 0 {
        return Ok(0);
    }

    if signature_at(r, cd_offset)? == CENTRAL_DIR_HEADER_SIG {
        return Ok(0);
    }

    let alt_pos = eocd_pos
        .checked_sub(cd_size)
        .ok_or_else(|| SZipError::format("central directory size exceeds archive length"))?;
    if signature_at(r, alt_pos)? == CENTRAL_DIR_HEADER_SIG {
        let shift = alt_pos as i64 - cd_offset as i64;
        warn!("archive offsets shifted by {shift} bytes; repairing on read");
        return Ok(shift);
    }

    Err(SZipError::format(
        "central directory signature not found at its declared offset or its shift-corrected offset",
    ))
}

fn signature_at<R: Read + Seek>(r: &mut R, pos: u64) -> Result<u32> {
    r.seek(SeekFrom::Start(pos)).map_err(SZipError::from)?;
    read_u32(r).map_err(SZipError::from)
}

/// Accumulates central records in memory while an archive is open for
/// write or append, and flushes them (plus the EOCD family) on close.
#[derive(Debug, Default)]
pub struct CdWriter {
    buf: Vec<u8>,
    number_entry: u64,
}

impl CdWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the buffer from an existing archive's raw central-directory
    /// bytes, for `APPEND` mode (§4.7).
    pub fn seed(buf: Vec<u8>, number_entry: u64) -> Self {
        CdWriter { buf, number_entry }
    }

    pub fn number_entry(&self) -> u64 {
        self.number_entry
    }

    /// Append one entry's central record to the in-memory buffer.
    pub fn push(&mut self, entry: &EntryDescriptor) -> Result<()> {
        crate::entry::write_header(&mut self.buf, entry, false)?;
        self.number_entry += 1;
        Ok(())
    }

    /// Copy the buffered CD to `w`, then emit the ZIP64 records (if needed)
    /// and the classic EOCD, per the write sequencing in §9: CD copy →
    /// ZIP64 records → 32-bit EOCD, never otherwise.
    pub fn finish<W: Write + Seek>(&self, w: &mut W, version_madeby: u16, comment: &str) -> Result<()> {
        let cd_offset = w.stream_position().map_err(SZipError::from)?;
        w.write_all(&self.buf).map_err(SZipError::from)?;
        let cd_size = self.buf.len() as u64;

        let need_zip64 =
            self.number_entry > SENTINEL16 as u64 || cd_size >= SENTINEL32 as u64 || cd_offset >= SENTINEL32 as u64;

        if need_zip64 {
            let zip64_eocd_pos = w.stream_position().map_err(SZipError::from)?;
            write_u32(w, ZIP64_EOCD_SIG).map_err(SZipError::from)?;
            write_u64(w, ZIP64_EOCD_BODY_SIZE).map_err(SZipError::from)?;
            write_u16(w, version_madeby).map_err(SZipError::from)?;
            write_u16(w, consts::version_needed::ZIP64).map_err(SZipError::from)?;
            write_u32(w, 0).map_err(SZipError::from)?; // disk number
            write_u32(w, 0).map_err(SZipError::from)?; // disk with CD
            write_u64(w, self.number_entry).map_err(SZipError::from)?;
            write_u64(w, self.number_entry).map_err(SZipError::from)?;
            write_u64(w, cd_size).map_err(SZipError::from)?;
            write_u64(w, cd_offset).map_err(SZipError::from)?;

            write_u32(w, ZIP64_EOCD_LOCATOR_SIG).map_err(SZipError::from)?;
            write_u32(w, 0).map_err(SZipError::from)?; // disk with ZIP64 EOCD
            write_u64(w, zip64_eocd_pos).map_err(SZipError::from)?;
            write_u32(w, 1).map_err(SZipError::from)?; // total disks
        }

        write_u32(w, EOCD_SIG).map_err(SZipError::from)?;
        write_u16(w, 0).map_err(SZipError::from)?; // disk number
        write_u16(w, 0).map_err(SZipError::from)?; // disk with CD

        let entry_count_field = if self.number_entry > SENTINEL16 as u64 {
            SENTINEL16
        } else {
            self.number_entry as u16
        };
        write_u16(w, entry_count_field).map_err(SZipError::from)?;
        write_u16(w, entry_count_field).map_err(SZipError::from)?;

        write_u32(w, if cd_size >= SENTINEL32 as u64 { SENTINEL32 } else { cd_size as u32 }).map_err(SZipError::from)?;
        write_u32(
            w,
            if cd_offset >= SENTINEL32 as u64 { SENTINEL32 } else { cd_offset as u32 },
        )
        .map_err(SZipError::from)?;

        write_u16(w, comment.len() as u16).map_err(SZipError::from)?;
        w.write_all(comment.as_bytes()).map_err(SZipError::from)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_archive_is_exact_22_bytes() {
        let mut buf = Cursor::new(Vec::new());
        let writer = CdWriter::new();
        writer.finish(&mut buf, 0, "").unwrap();
        let expected: [u8; 22] = [
            0x50, 0x4B, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ];
        assert_eq!(buf.into_inner(), expected);
    }

    #[test]
    fn find_eocd_locates_trailing_signature() {
        let mut buf = Cursor::new(vec![0u8; 100]);
        buf.seek(SeekFrom::Start(100)).unwrap();
        let writer = CdWriter::new();
        writer.finish(&mut buf, 0, "hi").unwrap();

        let mut inner = buf.into_inner();
        let pos = find_eocd(&mut Cursor::new(&mut inner)).unwrap();
        assert_eq!(pos, 100);
    }

    #[test]
    fn offset_shift_repair_detects_prepended_bytes() {
        let mut archive = Cursor::new(Vec::new());
        let mut entry = EntryDescriptor::default();
        entry.filename = "a.txt".to_string();
        entry.crc = 1;
        entry.compressed_size = 0;
        entry.uncompressed_size = 0;
        crate::entry::write_header(&mut archive, &entry, true).unwrap();

        let mut cd = CdWriter::new();
        cd.push(&entry).unwrap();
        cd.finish(&mut archive, 0, "").unwrap();

        let mut shifted = vec![0xAAu8; 1024];
        shifted.extend_from_slice(&archive.into_inner());
        let mut cursor = Cursor::new(shifted);

        let info = read_tail(&mut cursor).unwrap();
        assert_eq!(info.disk_offset_shift, 1024);
        assert_eq!(info.number_entry, 1);
    }
}
