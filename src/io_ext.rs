//! Binary I/O primitives (C1): little-endian integer read/write over any
//! `Read`/`Write` stream, shared by every header and record codec.

use crate::error::Result;
use std::io::{self, Read, Write};

/// Read a little-endian `u16`.
pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Read a little-endian `u32`.
pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Read a little-endian `u64`.
pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Write a little-endian `u16`.
pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a little-endian `u32`.
pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a little-endian `u64`.
pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a single byte.
pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

/// Copy exactly `n` bytes from `src` to `dst`, erroring if the source runs
/// dry early.
pub fn copy_exact<R: Read, W: Write>(dst: &mut W, src: &mut R, n: u64) -> Result<()> {
    let mut remaining = n;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        src.read_exact(&mut buf[..chunk])?;
        dst.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(())
}
