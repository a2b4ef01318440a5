//! On-disk signatures, flag bits, and field sentinels from the PKWARE
//! APPNOTE layout.

/// Local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x0403_4b50;
/// Central directory file header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x0201_4b50;
/// End of central directory record signature (32-bit).
pub const EOCD_SIG: u32 = 0x0605_4b50;
/// ZIP64 end of central directory record signature.
pub const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
/// ZIP64 end of central directory locator signature.
pub const ZIP64_EOCD_LOCATOR_SIG: u32 = 0x0706_4b50;
/// Data descriptor signature.
pub const DATA_DESCRIPTOR_SIG: u32 = 0x0807_4b50;

/// Fixed size of a local file header, excluding variable-length regions.
pub const LOCAL_HEADER_SIZE: u64 = 30;
/// Fixed size of a central directory record, excluding variable-length regions.
pub const CENTRAL_HEADER_SIZE: u64 = 46;
/// Fixed size of the ZIP64 EOCD locator.
pub const ZIP64_EOCD_LOCATOR_SIZE: u64 = 20;
/// Fixed size of the 32-bit EOCD record, excluding the comment.
pub const EOCD_SIZE: u64 = 22;
/// Fixed size of the ZIP64 EOCD body (after signature and 8-byte length field).
pub const ZIP64_EOCD_BODY_SIZE: u64 = 44;

/// Sentinel value for 16-bit fields overflowed by ZIP64.
pub const SENTINEL16: u16 = 0xFFFF;
/// Sentinel value for 32-bit fields overflowed by ZIP64.
pub const SENTINEL32: u32 = 0xFFFF_FFFF;

/// Largest comment length the 32-bit EOCD can declare, also the widest
/// window searched for the EOCD signature.
pub const MAX_COMMENT_SIZE: u64 = 0xFFFF;

/// Extra field block IDs the core owns (read, parse, and rewrite).
pub mod extra_id {
    pub const ZIP64: u16 = 0x0001;
    pub const NTFS: u16 = 0x000A;
    pub const UNIX1: u16 = 0x000D;
    pub const AES: u16 = 0x9901;
}

/// Compression method codes as stored on the wire.
pub mod compression_method {
    pub const STORE: u16 = 0;
    pub const DEFLATE: u16 = 8;
    pub const BZIP2: u16 = 12;
    pub const LZMA: u16 = 14;
    /// Placeholder written when AES encryption is active; the real method
    /// lives inside the AES extra field.
    pub const AES: u16 = 99;
}

/// General purpose bit flag positions (APPNOTE 4.4.4).
pub mod flag {
    pub const ENCRYPTED: u16 = 1 << 0;
    pub const DEFLATE_MAX: u16 = 1 << 1;
    pub const DEFLATE_FAST: u16 = 1 << 2;
    pub const DEFLATE_SUPER_FAST: u16 = (1 << 1) | (1 << 2);
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    pub const LZMA_EOS_MARKER: u16 = 1 << 1;
}

/// `version_madeby`/`version_needed` high byte: producing host system.
pub mod host_system {
    pub const MSDOS: u8 = 0;
    pub const UNIX: u8 = 3;
    pub const WINDOWS_NTFS: u8 = 11;
    pub const OSX_DARWIN: u8 = 19;
}

/// Minimum `version_needed_to_extract` values the writer may declare.
pub mod version_needed {
    pub const BASELINE: u16 = 20;
    pub const ZIP64: u16 = 45;
    pub const AES: u16 = 51;
    pub const LZMA: u16 = 63;
}

/// POSIX mode bits used by host-attribute translation (§4.2).
pub mod posix_mode {
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IWUSR: u32 = 0o000200;
}

/// Win32 `FILE_ATTRIBUTE_*` bits used by host-attribute translation.
pub mod win_attr {
    pub const READONLY: u32 = 0x01;
    pub const DIRECTORY: u32 = 0x10;
    pub const REPARSE_POINT: u32 = 0x400;
    pub const NORMAL: u32 = 0x80;
}
