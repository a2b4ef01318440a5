//! Entry stream stack (C6): composes, outermost first, a CRC32 observer, a
//! compression codec, and an optional cipher over a base stream, with the
//! exact byte budgeting §4.6 requires so codec framing and encryption
//! trailers land on their declared boundaries.

use crate::cipher::{AesStrength, ZipCryptoCipher, ZIPCRYPTO_HEADER_SIZE};
#[cfg(feature = "aes")]
use crate::cipher::{AesDecryptor, AesEncryptor, AES_FOOTER_SIZE};
use crate::codec::{Decoder, Encoder};
use crate::consts::{compression_method, flag};
use crate::entry::EntryDescriptor;
use crate::error::{Result, SZipError};
use std::io::{Read, Take, Write};

/// What the write-open side effects (§4.6) decided about this entry's
/// cipher, needed again at close to know header/footer sizes.
enum ReadCipherState<R: Read> {
    Raw(R),
    ZipCrypto(ZipCryptoCipher, R),
    #[cfg(feature = "aes")]
    Aes(AesDecryptor, R),
}

/// Innermost layer on read: strips and verifies the cipher header, decrypts
/// the ciphertext body byte range, and leaves the footer for `close` to
/// consume directly.
struct CipherReader<R: Read> {
    state: ReadCipherState<R>,
    remaining: u64,
}

impl<R: Read> CipherReader<R> {
    fn raw(inner: R, body_len: u64) -> Self {
        CipherReader {
            state: ReadCipherState::Raw(inner),
            remaining: body_len,
        }
    }

    fn zipcrypto(mut inner: R, password: &str, expected_verifier: u16, body_len: u64) -> Result<Self> {
        let mut header = [0u8; 12];
        inner.read_exact(&mut header).map_err(SZipError::from)?;
        let mut cipher = ZipCryptoCipher::new(password);
        let verifier = cipher.decrypt_header(&mut header);
        if verifier != expected_verifier {
            return Err(SZipError::param("incorrect password (ZipCrypto verifier mismatch)"));
        }
        Ok(CipherReader {
            state: ReadCipherState::ZipCrypto(cipher, inner),
            remaining: body_len,
        })
    }

    #[cfg(feature = "aes")]
    fn aes(mut inner: R, password: &str, strength: AesStrength, body_len: u64) -> Result<Self> {
        let mut header = vec![0u8; strength.salt_size() + 2];
        inner.read_exact(&mut header).map_err(SZipError::from)?;
        let (decryptor, verified) = AesDecryptor::new(password, strength, &header)?;
        if !verified {
            return Err(SZipError::param("incorrect password (AES verifier mismatch)"));
        }
        Ok(CipherReader {
            state: ReadCipherState::Aes(decryptor, inner),
            remaining: body_len,
        })
    }

    /// Read and (for AES) verify the footer, returning the base reader.
    fn finish(self, expected_footer: &[u8]) -> Result<R> {
        match self.state {
            ReadCipherState::Raw(mut r) => {
                if !expected_footer.is_empty() {
                    let mut buf = vec![0u8; expected_footer.len()];
                    r.read_exact(&mut buf).map_err(SZipError::from)?;
                }
                Ok(r)
            }
            ReadCipherState::ZipCrypto(_, r) => Ok(r),
            #[cfg(feature = "aes")]
            ReadCipherState::Aes(decryptor, mut r) => {
                let mut trailer = vec![0u8; AES_FOOTER_SIZE as usize];
                r.read_exact(&mut trailer).map_err(SZipError::from)?;
                decryptor.verify(&trailer)?;
                Ok(r)
            }
        }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let limit = (buf.len() as u64).min(self.remaining) as usize;
        if limit == 0 {
            return Ok(0);
        }
        let n = match &mut self.state {
            ReadCipherState::Raw(r) => r.read(&mut buf[..limit])?,
            ReadCipherState::ZipCrypto(cipher, r) => {
                let n = r.read(&mut buf[..limit])?;
                cipher.decrypt(&mut buf[..n]);
                n
            }
            #[cfg(feature = "aes")]
            ReadCipherState::Aes(decryptor, r) => {
                let n = r.read(&mut buf[..limit])?;
                decryptor.decrypt(&mut buf[..n]);
                n
            }
        };
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// The full read-side pipeline: CRC32 observer wrapping the codec wrapping
/// the cipher wrapping a size-bounded slice of the base stream.
pub struct EntryReader<R: Read> {
    codec: Decoder<CipherReader<Take<R>>>,
    crc: crc32fast::Hasher,
    total_in: u64,
    footer_len: u64,
}

/// Everything `EntryReader::open` needs to decide cipher and codec shape,
/// derived by the caller from the parsed `EntryDescriptor`.
pub struct ReadPlan<'a> {
    pub compression_method: u16,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub is_encrypted: bool,
    pub aes_version: u16,
    pub aes_mode: u16,
    pub flag: u16,
    pub dos_modified: u32,
    pub crc: u32,
    pub password: Option<&'a str>,
}

impl<'a> ReadPlan<'a> {
    pub fn from_entry(entry: &'a EntryDescriptor, dos_modified: u32, password: Option<&'a str>) -> Self {
        ReadPlan {
            compression_method: entry.compression_method,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            is_encrypted: entry.is_encrypted(),
            aes_version: entry.aes_version,
            aes_mode: entry.aes_encryption_mode,
            flag: entry.flag,
            dos_modified,
            crc: entry.crc,
            password,
        }
    }
}

impl<R: Read> EntryReader<R> {
    pub fn open(base: R, plan: &ReadPlan) -> Result<Self> {
        let header_len = cipher_header_size(plan)?;
        let footer_len = cipher_footer_size(plan);
        let body_len = plan
            .compressed_size
            .checked_sub(header_len + footer_len)
            .ok_or_else(|| SZipError::format("compressed_size too small for declared cipher header/footer"))?;

        let bounded = Read::take(base, plan.compressed_size);
        let cipher_reader = build_cipher_reader(bounded, plan, body_len)?;

        let has_eos_marker = plan.flag & flag::LZMA_EOS_MARKER != 0;
        let codec = Decoder::new(plan.compression_method, cipher_reader, plan.uncompressed_size, has_eos_marker)?;

        Ok(EntryReader {
            codec,
            crc: crc32fast::Hasher::new(),
            total_in: 0,
            footer_len,
        })
    }

    /// Flush the codec, verify the cipher footer, and return the observed
    /// CRC32 and total plaintext byte count (§4.6 close-on-read, P2/P3).
    pub fn close(self) -> Result<(u32, u64)> {
        let crc = self.crc.clone().finalize();
        let total_in = self.total_in;
        let cipher_reader = self.codec.into_inner();
        let expected_footer = vec![0u8; self.footer_len as usize];
        cipher_reader.finish(&expected_footer)?;
        Ok((crc, total_in))
    }
}

impl<R: Read> Read for EntryReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.codec.read(buf)?;
        self.crc.update(&buf[..n]);
        self.total_in += n as u64;
        Ok(n)
    }
}

fn cipher_header_size(plan: &ReadPlan) -> Result<u64> {
    if !plan.is_encrypted {
        return Ok(0);
    }
    if plan.aes_version != 0 {
        #[cfg(feature = "aes")]
        {
            let strength = AesStrength::from_mode(plan.aes_mode)?;
            Ok(strength.salt_size() as u64 + 2)
        }
        #[cfg(not(feature = "aes"))]
        {
            Err(SZipError::Support("AES support was not compiled into this build".into()))
        }
    } else {
        Ok(ZIPCRYPTO_HEADER_SIZE)
    }
}

fn cipher_footer_size(plan: &ReadPlan) -> u64 {
    if plan.is_encrypted && plan.aes_version != 0 {
        #[cfg(feature = "aes")]
        {
            return AES_FOOTER_SIZE;
        }
    }
    0
}

fn build_cipher_reader<R: Read>(base: Take<R>, plan: &ReadPlan, body_len: u64) -> Result<CipherReader<Take<R>>> {
    if !plan.is_encrypted {
        return Ok(CipherReader::raw(base, body_len));
    }
    let password = plan
        .password
        .ok_or_else(|| SZipError::param("entry is encrypted but no password was supplied"))?;

    if plan.aes_version != 0 {
        #[cfg(feature = "aes")]
        {
            let strength = AesStrength::from_mode(plan.aes_mode)?;
            return CipherReader::aes(base, password, strength, body_len);
        }
        #[cfg(not(feature = "aes"))]
        {
            return Err(SZipError::Support("AES support was not compiled into this build".into()));
        }
    }

    // §4.6 cipher selection: verifier is the high two bytes of the DOS
    // modification date when DATA_DESCRIPTOR is set, else the high two
    // bytes of the CRC.
    let expected_verifier = if plan.flag & flag::DATA_DESCRIPTOR != 0 {
        (plan.dos_modified >> 16) as u16
    } else {
        (plan.crc >> 16) as u16
    };
    CipherReader::zipcrypto(base, password, expected_verifier, body_len)
}

/// Innermost layer on write: encrypts (if configured) and writes the header
/// up front, tracking total ciphertext bytes (including any footer) for
/// the caller to adopt as `compressed_size`.
enum WriteCipherState {
    Raw,
    ZipCrypto(ZipCryptoCipher),
    #[cfg(feature = "aes")]
    Aes(AesEncryptor),
}

struct CipherWriter<W: Write> {
    inner: W,
    state: WriteCipherState,
    total_out: u64,
}

impl<W: Write> CipherWriter<W> {
    fn raw(inner: W) -> Self {
        CipherWriter {
            inner,
            state: WriteCipherState::Raw,
            total_out: 0,
        }
    }

    fn zipcrypto(mut inner: W, password: &str, random: [u8; 10], verifier: u16) -> Result<Self> {
        let mut cipher = ZipCryptoCipher::new(password);
        let header = cipher.encrypt_header(&random, verifier);
        inner.write_all(&header).map_err(SZipError::from)?;
        Ok(CipherWriter {
            inner,
            state: WriteCipherState::ZipCrypto(cipher),
            total_out: header.len() as u64,
        })
    }

    #[cfg(feature = "aes")]
    fn aes(mut inner: W, password: &str, strength: AesStrength) -> Result<Self> {
        let encryptor = AesEncryptor::new(password, strength)?;
        let header = encryptor.header();
        inner.write_all(&header).map_err(SZipError::from)?;
        Ok(CipherWriter {
            inner,
            state: WriteCipherState::Aes(encryptor),
            total_out: header.len() as u64,
        })
    }

    fn finish(mut self) -> Result<(W, u64)> {
        match self.state {
            WriteCipherState::Raw | WriteCipherState::ZipCrypto(_) => Ok((self.inner, self.total_out)),
            #[cfg(feature = "aes")]
            WriteCipherState::Aes(encryptor) => {
                let trailer = encryptor.finish();
                self.inner.write_all(&trailer).map_err(SZipError::from)?;
                self.total_out += trailer.len() as u64;
                Ok((self.inner, self.total_out))
            }
        }
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut scratch = buf.to_vec();
        match &mut self.state {
            WriteCipherState::Raw => {}
            WriteCipherState::ZipCrypto(cipher) => cipher.encrypt(&mut scratch),
            #[cfg(feature = "aes")]
            WriteCipherState::Aes(encryptor) => encryptor.encrypt(&mut scratch),
        }
        self.inner.write_all(&scratch)?;
        self.total_out += scratch.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// The full write-side pipeline: CRC32 observer wrapping the codec wrapping
/// the cipher wrapping the base stream.
pub struct EntryWriter<W: Write> {
    codec: Encoder<CipherWriter<W>>,
    crc: crc32fast::Hasher,
    total_in: u64,
}

/// Cipher/codec choices for a write-open entry, decided by the caller from
/// the caller-supplied `EntryDescriptor` before §4.6's write-open side
/// effects (forcing `STORE`, setting `DATA_DESCRIPTOR`, etc.) are applied.
pub struct WritePlan<'a> {
    pub compression_method: u16,
    pub compress_level: u32,
    pub is_encrypted: bool,
    pub aes_mode: u16,
    pub password: Option<&'a str>,
    /// 10 caller-supplied random bytes for the ZipCrypto header; ignored
    /// for AES (which derives its own salt) or unencrypted entries.
    pub zipcrypto_random: [u8; 10],
    pub zipcrypto_verifier: u16,
}

impl<W: Write> EntryWriter<W> {
    pub fn open(base: W, plan: &WritePlan) -> Result<Self> {
        let cipher_writer = build_cipher_writer(base, plan)?;
        let codec = Encoder::new(plan.compression_method, cipher_writer, plan.compress_level)?;
        Ok(EntryWriter {
            codec,
            crc: crc32fast::Hasher::new(),
            total_in: 0,
        })
    }

    /// Flush codec and cipher, returning the base stream plus the final
    /// CRC, uncompressed size, and compressed size (which, for AES,
    /// includes the authentication trailer — §9 preserves this quirk).
    pub fn close(self) -> Result<EntryWriteResult<W>> {
        let crc = self.crc.clone().finalize();
        let uncompressed_size = self.total_in;
        let cipher_writer = self.codec.finish()?;
        let (base, compressed_size) = cipher_writer.finish()?;
        Ok(EntryWriteResult {
            base,
            crc,
            uncompressed_size,
            compressed_size,
        })
    }
}

impl<W: Write> Write for EntryWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.crc.update(buf);
        self.codec.write_all(buf)?;
        self.total_in += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.codec.flush()
    }
}

pub struct EntryWriteResult<W> {
    pub base: W,
    pub crc: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

fn build_cipher_writer<W: Write>(base: W, plan: &WritePlan) -> Result<CipherWriter<W>> {
    if !plan.is_encrypted {
        return Ok(CipherWriter::raw(base));
    }
    let password = plan
        .password
        .ok_or_else(|| SZipError::param("encryption requested but no password was supplied"))?;

    if plan.aes_mode != 0 {
        #[cfg(feature = "aes")]
        {
            let strength = AesStrength::from_mode(plan.aes_mode)?;
            return CipherWriter::aes(base, password, strength);
        }
        #[cfg(not(feature = "aes"))]
        {
            return Err(SZipError::Support("AES support was not compiled into this build".into()));
        }
    }

    CipherWriter::zipcrypto(base, password, plan.zipcrypto_random, plan.zipcrypto_verifier)
}

/// Directories and `compress_level == 0` always write `STORE`, per §4.6's
/// write-open side effects.
pub fn effective_compression_method(requested: u16, compress_level: u32, is_directory: bool) -> u16 {
    if is_directory || compress_level == 0 {
        compression_method::STORE
    } else {
        requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::compression_method as cm;

    #[test]
    fn store_raw_roundtrip() {
        let mut base = Vec::new();
        let plan = WritePlan {
            compression_method: cm::STORE,
            compress_level: 0,
            is_encrypted: false,
            aes_mode: 0,
            password: None,
            zipcrypto_random: [0; 10],
            zipcrypto_verifier: 0,
        };
        let mut w = EntryWriter::open(&mut base, &plan).unwrap();
        w.write_all(b"hello world").unwrap();
        let result = w.close().unwrap();
        assert_eq!(result.crc, crc32fast::hash(b"hello world"));
        assert_eq!(result.uncompressed_size, 11);
        assert_eq!(result.compressed_size, 11);

        let read_plan = ReadPlan {
            compression_method: cm::STORE,
            compressed_size: 11,
            uncompressed_size: 11,
            is_encrypted: false,
            aes_version: 0,
            aes_mode: 0,
            flag: 0,
            dos_modified: 0,
            crc: result.crc,
            password: None,
        };
        let mut r = EntryReader::open(&base[..], &read_plan).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        let (crc, total_in) = r.close().unwrap();
        assert_eq!(crc, result.crc);
        assert_eq!(total_in, 11);
    }

    #[test]
    fn zipcrypto_roundtrip_with_wrong_password_fails() {
        let mut base = Vec::new();
        let plan = WritePlan {
            compression_method: cm::STORE,
            compress_level: 0,
            is_encrypted: true,
            aes_mode: 0,
            password: Some("letmein"),
            zipcrypto_random: [9; 10],
            zipcrypto_verifier: 0xABCD,
        };
        let mut w = EntryWriter::open(&mut base, &plan).unwrap();
        w.write_all(b"top secret").unwrap();
        let result = w.close().unwrap();

        let read_plan = ReadPlan {
            compression_method: cm::STORE,
            compressed_size: result.compressed_size,
            uncompressed_size: 10,
            is_encrypted: true,
            aes_version: 0,
            aes_mode: 0,
            flag: flag::DATA_DESCRIPTOR,
            dos_modified: 0xABCD_0000,
            crc: result.crc,
            password: Some("wrong"),
        };
        let err = EntryReader::open(&base[..], &read_plan).unwrap_err();
        assert!(matches!(err, SZipError::Param(_)));

        let read_plan_ok = ReadPlan {
            password: Some("letmein"),
            ..read_plan
        };
        let mut r = EntryReader::open(&base[..], &read_plan_ok).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"top secret");
    }
}
