//! Cipher layer (C6, layer 3): traditional PKWARE encryption (ZipCrypto) and
//! WinZip AES, operating on buffers the entry stream stack feeds through in
//! chunks. Both ciphers are symmetric in shape: a header written/verified
//! once at open, buffer-at-a-time transformation while the entry streams,
//! and a footer written/verified once at close.

use crate::error::{Result, SZipError};

#[cfg(feature = "aes")]
use aes::{Aes128, Aes192, Aes256};
#[cfg(feature = "aes")]
use ctr::{
    cipher::{KeyIvInit, StreamCipher},
    Ctr128BE,
};
#[cfg(feature = "aes")]
use getrandom::getrandom;
#[cfg(feature = "aes")]
use hmac::{Hmac, Mac};
#[cfg(feature = "aes")]
use pbkdf2::pbkdf2_hmac;
#[cfg(feature = "aes")]
use sha1::Sha1;

/// Standard CRC32 table (polynomial `0xEDB88320`), computed at compile time.
/// ZipCrypto's key-update step needs the same reflected table the archive's
/// own CRC32 layer uses, but seeded per-byte rather than streamed.
const fn build_crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { 0xEDB8_8320 ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}
const CRC_TABLE: [u32; 256] = build_crc_table();

fn crc32_update(crc: u32, byte: u8) -> u32 {
    (crc >> 8) ^ CRC_TABLE[((crc ^ byte as u32) & 0xff) as usize]
}

/// Length of the PKCrypt encryption header prefixing ciphertext (§4.6).
pub const ZIPCRYPTO_HEADER_SIZE: u64 = 12;

/// Traditional PKWARE stream cipher, keyed from a password.
///
/// The three 32-bit keys evolve with every plaintext byte that passes
/// through the cipher, in either direction; callers must call
/// [`ZipCryptoCipher::update`] with the *plaintext* byte after every
/// encrypt/decrypt step.
pub struct ZipCryptoCipher {
    keys: [u32; 3],
}

impl ZipCryptoCipher {
    pub fn new(password: &str) -> Self {
        let mut cipher = ZipCryptoCipher {
            keys: [0x1234_5678, 0x2345_6789, 0x3456_7890],
        };
        for b in password.as_bytes() {
            cipher.update(*b);
        }
        cipher
    }

    fn update(&mut self, plain_byte: u8) {
        self.keys[0] = crc32_update(self.keys[0], plain_byte);
        self.keys[1] = self.keys[1].wrapping_add(self.keys[0] & 0xff);
        self.keys[1] = self.keys[1].wrapping_mul(134_775_813).wrapping_add(1);
        self.keys[2] = crc32_update(self.keys[2], (self.keys[1] >> 24) as u8);
    }

    fn keystream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) as u16;
        (((temp.wrapping_mul(temp ^ 1)) >> 8) & 0xff) as u8
    }

    /// Encrypt `data` in place; each output byte's plaintext source updates
    /// the keys before the next byte is processed.
    pub fn encrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            let plain = *b;
            *b = plain ^ self.keystream_byte();
            self.update(plain);
        }
    }

    /// Decrypt `data` in place.
    pub fn decrypt(&mut self, data: &mut [u8]) {
        for b in data.iter_mut() {
            let plain = *b ^ self.keystream_byte();
            self.update(plain);
            *b = plain;
        }
    }

    /// Build the 12-byte encryption header: the caller's random bytes
    /// (typically 10, but any length `< 12` is padded internally) followed
    /// by the 2-byte verifier, all run through the cipher in order.
    pub fn encrypt_header(&mut self, random: &[u8; 10], verifier: u16) -> [u8; 12] {
        let mut header = [0u8; 12];
        header[..10].copy_from_slice(random);
        header[10..].copy_from_slice(&verifier.to_le_bytes());
        self.encrypt(&mut header);
        header
    }

    /// Decrypt a 12-byte encryption header and return its verifier for the
    /// caller to compare against the expected value (§4.6 cipher selection).
    pub fn decrypt_header(&mut self, header: &mut [u8; 12]) -> u16 {
        self.decrypt(header);
        u16::from_le_bytes([header[10], header[11]])
    }
}

/// AES key/IV/strength bit width, generalized from WinZip's AE-1/AE-2
/// extra field `strength` byte (`1, 2, 3` for 128/192/256).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesStrength {
    Bits128,
    Bits192,
    Bits256,
}

impl AesStrength {
    pub fn from_mode(mode: u16) -> Result<Self> {
        match mode {
            128 => Ok(AesStrength::Bits128),
            192 => Ok(AesStrength::Bits192),
            256 => Ok(AesStrength::Bits256),
            other => Err(SZipError::param(format!("unsupported AES encryption mode {other}"))),
        }
    }

    pub fn to_mode(self) -> u16 {
        match self {
            AesStrength::Bits128 => 128,
            AesStrength::Bits192 => 192,
            AesStrength::Bits256 => 256,
        }
    }

    pub fn to_winzip_code(self) -> u8 {
        match self {
            AesStrength::Bits128 => 1,
            AesStrength::Bits192 => 2,
            AesStrength::Bits256 => 3,
        }
    }

    pub fn from_winzip_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(AesStrength::Bits128),
            2 => Ok(AesStrength::Bits192),
            3 => Ok(AesStrength::Bits256),
            other => Err(SZipError::format(format!("invalid AES extra field strength byte {other}"))),
        }
    }

    pub fn salt_size(self) -> usize {
        self.key_size() / 2
    }

    pub fn key_size(self) -> usize {
        match self {
            AesStrength::Bits128 => 16,
            AesStrength::Bits192 => 24,
            AesStrength::Bits256 => 32,
        }
    }

    /// Key material PBKDF2 must derive: encryption key + HMAC key + 2-byte
    /// password verification value.
    fn derived_key_size(self) -> usize {
        self.key_size() * 2 + 2
    }
}

#[cfg(feature = "aes")]
type HmacSha1 = Hmac<Sha1>;

#[cfg(feature = "aes")]
enum CtrCipher {
    Bits128(Ctr128BE<Aes128>),
    Bits192(Ctr128BE<Aes192>),
    Bits256(Ctr128BE<Aes256>),
}

#[cfg(feature = "aes")]
impl CtrCipher {
    fn new(strength: AesStrength, key: &[u8]) -> Self {
        let iv = [0u8; 16];
        match strength {
            AesStrength::Bits128 => CtrCipher::Bits128(Ctr128BE::<Aes128>::new(key.into(), (&iv).into())),
            AesStrength::Bits192 => CtrCipher::Bits192(Ctr128BE::<Aes192>::new(key.into(), (&iv).into())),
            AesStrength::Bits256 => CtrCipher::Bits256(Ctr128BE::<Aes256>::new(key.into(), (&iv).into())),
        }
    }

    fn apply_keystream(&mut self, data: &mut [u8]) {
        match self {
            CtrCipher::Bits128(c) => c.apply_keystream(data),
            CtrCipher::Bits192(c) => c.apply_keystream(data),
            CtrCipher::Bits256(c) => c.apply_keystream(data),
        }
    }
}

/// Length of the WinZip AES footer: a 10-byte HMAC-SHA1 authentication code
/// (§4.6 `FOOTER_SIZE`).
pub const AES_FOOTER_SIZE: u64 = 10;

/// AES encryption context for a ZIP entry being written.
#[cfg(feature = "aes")]
pub struct AesEncryptor {
    strength: AesStrength,
    salt: Vec<u8>,
    password_verify: [u8; 2],
    cipher: CtrCipher,
    hmac: HmacSha1,
}

#[cfg(feature = "aes")]
impl AesEncryptor {
    pub fn new(password: &str, strength: AesStrength) -> Result<Self> {
        let mut salt = vec![0u8; strength.salt_size()];
        getrandom(&mut salt).map_err(|e| SZipError::internal(format!("CSPRNG failure: {e}")))?;

        let derived_size = strength.derived_key_size();
        let mut derived = vec![0u8; derived_size];
        pbkdf2_hmac::<Sha1>(password.as_bytes(), &salt, 1000, &mut derived);

        let key_size = strength.key_size();
        let encryption_key = &derived[..key_size];
        let auth_key = &derived[key_size..key_size * 2];
        let password_verify = [derived[key_size * 2], derived[key_size * 2 + 1]];

        let hmac = HmacSha1::new_from_slice(auth_key).map_err(|e| SZipError::internal(format!("HMAC init: {e}")))?;
        let cipher = CtrCipher::new(strength, encryption_key);

        Ok(AesEncryptor {
            strength,
            salt,
            password_verify,
            cipher,
            hmac,
        })
    }

    /// Header to write before ciphertext: salt, then the 2-byte password
    /// verification value.
    pub fn header(&self) -> Vec<u8> {
        let mut h = self.salt.clone();
        h.extend_from_slice(&self.password_verify);
        h
    }

    pub fn strength(&self) -> AesStrength {
        self.strength
    }

    pub fn encrypt(&mut self, data: &mut [u8]) {
        self.cipher.apply_keystream(data);
        self.hmac.update(data);
    }

    /// Finalize and return the 10-byte authentication trailer.
    pub fn finish(self) -> Vec<u8> {
        self.hmac.finalize().into_bytes()[..10].to_vec()
    }
}

/// AES decryption context for a ZIP entry being read.
#[cfg(feature = "aes")]
pub struct AesDecryptor {
    cipher: CtrCipher,
    hmac: HmacSha1,
}

#[cfg(feature = "aes")]
impl AesDecryptor {
    /// `header` is the salt-plus-verifier prefix read from the stream;
    /// returns the decryptor alongside whether the password verified.
    pub fn new(password: &str, strength: AesStrength, header: &[u8]) -> Result<(Self, bool)> {
        let salt_size = strength.salt_size();
        if header.len() != salt_size + 2 {
            return Err(SZipError::format(format!(
                "AES header must be {} bytes, got {}",
                salt_size + 2,
                header.len()
            )));
        }
        let salt = &header[..salt_size];
        let password_verify = &header[salt_size..];

        let derived_size = strength.derived_key_size();
        let mut derived = vec![0u8; derived_size];
        pbkdf2_hmac::<Sha1>(password.as_bytes(), salt, 1000, &mut derived);

        let key_size = strength.key_size();
        let encryption_key = &derived[..key_size];
        let auth_key = &derived[key_size..key_size * 2];
        let expected_verify = [derived[key_size * 2], derived[key_size * 2 + 1]];

        let hmac = HmacSha1::new_from_slice(auth_key).map_err(|e| SZipError::internal(format!("HMAC init: {e}")))?;
        let cipher = CtrCipher::new(strength, encryption_key);

        let verified = expected_verify == *password_verify;
        Ok((AesDecryptor { cipher, hmac }, verified))
    }

    pub fn decrypt(&mut self, data: &mut [u8]) {
        self.hmac.update(data);
        self.cipher.apply_keystream(data);
    }

    /// Compare the trailing 10-byte authentication code against the one
    /// computed from decrypted ciphertext.
    pub fn verify(&self, auth_code: &[u8]) -> Result<()> {
        let expected = self.hmac.clone().finalize().into_bytes();
        if &expected[..10] != auth_code {
            return Err(SZipError::Crc { expected: 0, actual: 0 });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zipcrypto_header_roundtrip() {
        let mut enc = ZipCryptoCipher::new("hunter2");
        let random = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let header = enc.encrypt_header(&random, 0xBEEF);

        let mut dec = ZipCryptoCipher::new("hunter2");
        let mut header_copy = header;
        let verifier = dec.decrypt_header(&mut header_copy);
        assert_eq!(verifier, 0xBEEF);
    }

    #[test]
    fn zipcrypto_data_roundtrip() {
        let mut enc = ZipCryptoCipher::new("swordfish");
        let mut data = b"the quick brown fox".to_vec();
        let original = data.clone();
        enc.encrypt(&mut data);
        assert_ne!(data, original);

        let mut dec = ZipCryptoCipher::new("swordfish");
        dec.decrypt(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn zipcrypto_wrong_password_gives_wrong_verifier() {
        let mut enc = ZipCryptoCipher::new("right");
        let random = [0u8; 10];
        let header = enc.encrypt_header(&random, 0x1234);

        let mut dec = ZipCryptoCipher::new("wrong");
        let mut header_copy = header;
        let verifier = dec.decrypt_header(&mut header_copy);
        assert_ne!(verifier, 0x1234);
    }

    #[cfg(feature = "aes")]
    #[test]
    fn aes_roundtrip_and_auth() {
        let mut enc = AesEncryptor::new("pw", AesStrength::Bits256).unwrap();
        let header = enc.header();
        let mut data = b"Hello, encrypted world!".to_vec();
        let plain = data.clone();
        enc.encrypt(&mut data);
        let trailer = enc.finish();
        assert_ne!(data, plain);

        let (mut dec, ok) = AesDecryptor::new("pw", AesStrength::Bits256, &header).unwrap();
        assert!(ok);
        dec.decrypt(&mut data);
        assert_eq!(data, plain);
        dec.verify(&trailer).unwrap();
    }

    #[cfg(feature = "aes")]
    #[test]
    fn aes_wrong_password_fails_verification() {
        let mut enc = AesEncryptor::new("correct", AesStrength::Bits128).unwrap();
        let header = enc.header();
        let mut data = b"Secret data".to_vec();
        enc.encrypt(&mut data);

        let (_, ok) = AesDecryptor::new("incorrect", AesStrength::Bits128, &header).unwrap();
        assert!(!ok);
    }
}
