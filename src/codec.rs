//! Compression codec layer (C6, layer 2): wraps the base stream's I/O with
//! store, deflate, bzip2, or LZMA framing. Bzip2 and LZMA are compiled in
//! only when their Cargo features are enabled; attempting to use them
//! otherwise is a support error, matching §7 kind 3.

use crate::consts::compression_method;
use crate::error::{Result, SZipError};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

#[cfg(feature = "bzip2")]
use bzip2::read::BzDecoder;
#[cfg(feature = "bzip2")]
use bzip2::write::BzEncoder;

#[cfg(feature = "lzma")]
use lzma_rust2::{LzmaOptions, LzmaReader, LzmaWriter};

/// A decompressing reader over one of the supported codecs, or a
/// pass-through for `STORE`/raw mode.
pub enum Decoder<R: Read> {
    Store(R),
    Deflate(DeflateDecoder<R>),
    #[cfg(feature = "bzip2")]
    Bzip2(BzDecoder<R>),
    #[cfg(feature = "lzma")]
    Lzma(LzmaReader<R>),
}

impl<R: Read> Decoder<R> {
    /// Build a decoder for `method` over `inner`, which the caller has
    /// already bounded to `TOTAL_IN_MAX` compressed bytes (§4.6).
    ///
    /// `uncompressed_size` and `has_eos_marker` are consulted only by the
    /// LZMA branch, which needs an explicit stop condition when the stream
    /// carries no end-of-stream marker.
    pub fn new(method: u16, inner: R, uncompressed_size: u64, has_eos_marker: bool) -> Result<Self> {
        match method {
            compression_method::STORE => Ok(Decoder::Store(inner)),
            compression_method::DEFLATE => Ok(Decoder::Deflate(DeflateDecoder::new(inner))),
            #[cfg(feature = "bzip2")]
            compression_method::BZIP2 => Ok(Decoder::Bzip2(BzDecoder::new(inner))),
            #[cfg(not(feature = "bzip2"))]
            compression_method::BZIP2 => Err(SZipError::Support(
                "bzip2 support was not compiled into this build".into(),
            )),
            #[cfg(feature = "lzma")]
            compression_method::LZMA => {
                let limit = if has_eos_marker { None } else { Some(uncompressed_size) };
                Ok(Decoder::Lzma(
                    LzmaReader::new_raw(inner, limit).map_err(|e| SZipError::format(format!("LZMA stream error: {e}")))?,
                ))
            }
            #[cfg(not(feature = "lzma"))]
            compression_method::LZMA => Err(SZipError::Support(
                "LZMA support was not compiled into this build".into(),
            )),
            other => Err(SZipError::Support(format!("unrecognized compression method {other}"))),
        }
    }

    /// Recover the wrapped stream once the caller is done reading, so the
    /// cipher/footer layer above can consume whatever bytes remain.
    pub fn into_inner(self) -> R {
        match self {
            Decoder::Store(r) => r,
            Decoder::Deflate(d) => d.into_inner(),
            #[cfg(feature = "bzip2")]
            Decoder::Bzip2(d) => d.into_inner(),
            #[cfg(feature = "lzma")]
            Decoder::Lzma(d) => d.into_inner(),
        }
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Store(r) => r.read(buf),
            Decoder::Deflate(d) => d.read(buf),
            #[cfg(feature = "bzip2")]
            Decoder::Bzip2(d) => d.read(buf),
            #[cfg(feature = "lzma")]
            Decoder::Lzma(d) => d.read(buf),
        }
    }
}

/// A compressing writer over one of the supported codecs, or a pass-through
/// for `STORE`/raw mode.
pub enum Encoder<W: Write> {
    Store(W),
    Deflate(DeflateEncoder<W>),
    #[cfg(feature = "bzip2")]
    Bzip2(BzEncoder<W>),
    #[cfg(feature = "lzma")]
    Lzma(LzmaWriter<W>),
}

impl<W: Write> Encoder<W> {
    /// Build an encoder for `method` over `inner` at the given deflate-style
    /// `level` (0-9). A directory entry or `level == 0` should already have
    /// been forced to `STORE` by the caller (§4.6 write-open side effects).
    pub fn new(method: u16, inner: W, level: u32) -> Result<Self> {
        match method {
            compression_method::STORE => Ok(Encoder::Store(inner)),
            compression_method::DEFLATE => Ok(Encoder::Deflate(DeflateEncoder::new(inner, Compression::new(level)))),
            #[cfg(feature = "bzip2")]
            compression_method::BZIP2 => Ok(Encoder::Bzip2(BzEncoder::new(
                inner,
                bzip2::Compression::new(level.clamp(1, 9)),
            ))),
            #[cfg(not(feature = "bzip2"))]
            compression_method::BZIP2 => Err(SZipError::Support(
                "bzip2 support was not compiled into this build".into(),
            )),
            #[cfg(feature = "lzma")]
            compression_method::LZMA => {
                let options = LzmaOptions::with_preset(level.min(9));
                Ok(Encoder::Lzma(
                    LzmaWriter::new_raw(inner, &options).map_err(|e| SZipError::format(format!("LZMA stream error: {e}")))?,
                ))
            }
            #[cfg(not(feature = "lzma"))]
            compression_method::LZMA => Err(SZipError::Support(
                "LZMA support was not compiled into this build".into(),
            )),
            other => Err(SZipError::Support(format!("unrecognized compression method {other}"))),
        }
    }

    /// Flush and unwrap the codec, returning the underlying stream so the
    /// cipher/footer layer can append its trailer.
    pub fn finish(self) -> Result<W> {
        match self {
            Encoder::Store(w) => Ok(w),
            Encoder::Deflate(e) => e.finish().map_err(SZipError::from),
            #[cfg(feature = "bzip2")]
            Encoder::Bzip2(e) => e.finish().map_err(SZipError::from),
            #[cfg(feature = "lzma")]
            Encoder::Lzma(e) => e.finish().map_err(|e| SZipError::format(format!("LZMA stream error: {e}"))),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Store(w) => w.write(buf),
            Encoder::Deflate(e) => e.write(buf),
            #[cfg(feature = "bzip2")]
            Encoder::Bzip2(e) => e.write(buf),
            #[cfg(feature = "lzma")]
            Encoder::Lzma(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Store(w) => w.flush(),
            Encoder::Deflate(e) => e.flush(),
            #[cfg(feature = "bzip2")]
            Encoder::Bzip2(e) => e.flush(),
            #[cfg(feature = "lzma")]
            Encoder::Lzma(e) => e.flush(),
        }
    }
}

/// Translate a 0-9 deflate-style level into the two general-purpose flag
/// bits §4.6 says to set (`DEFLATE_MAX`/`DEFLATE_FAST`/`DEFLATE_SUPER_FAST`).
pub fn deflate_level_flag_bits(level: u32) -> u16 {
    use crate::consts::flag;
    match level {
        0..=1 => flag::DEFLATE_SUPER_FAST,
        2..=5 => flag::DEFLATE_FAST,
        9 => flag::DEFLATE_MAX,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_roundtrip() {
        let data = b"hello store";
        let mut out = Vec::new();
        {
            let mut enc = Encoder::new(compression_method::STORE, &mut out, 0).unwrap();
            enc.write_all(data).unwrap();
            enc.finish().unwrap();
        }
        assert_eq!(out, data);

        let mut dec = Decoder::new(compression_method::STORE, &out[..], data.len() as u64, true).unwrap();
        let mut roundtrip = Vec::new();
        dec.read_to_end(&mut roundtrip).unwrap();
        assert_eq!(roundtrip, data);
    }

    #[test]
    fn deflate_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog, many times over";
        let mut out = Vec::new();
        {
            let mut enc = Encoder::new(compression_method::DEFLATE, &mut out, 6).unwrap();
            enc.write_all(data).unwrap();
            enc.finish().unwrap();
        }
        assert!(out.len() < data.len());

        let mut dec = Decoder::new(compression_method::DEFLATE, &out[..], data.len() as u64, true).unwrap();
        let mut roundtrip = Vec::new();
        dec.read_to_end(&mut roundtrip).unwrap();
        assert_eq!(roundtrip, data);
    }

    #[test]
    fn unrecognized_method_is_support_error() {
        let err = Decoder::new(12345, &b""[..], 0, true).unwrap_err();
        assert!(matches!(err, SZipError::Support(_)));
    }

    #[test]
    fn deflate_level_flags() {
        assert_eq!(deflate_level_flag_bits(9), crate::consts::flag::DEFLATE_MAX);
        assert_eq!(deflate_level_flag_bits(1), crate::consts::flag::DEFLATE_SUPER_FAST);
        assert_eq!(deflate_level_flag_bits(6), 0);
    }
}
