use std::fs::File;
use std::io::{Seek, Write};
use tempfile::tempdir;

// Crafts a minimal ZIP64 archive on disk by hand: local file header with a
// data descriptor, central directory with a ZIP64 extra field, ZIP64 EOCD
// record and locator, and a classic EOCD with 0xFFFF/0xFFFFFFFF placeholders
// deferring to the ZIP64 EOCD (§4.5).
#[test]
fn read_zip64_crafted() {
    use zipcore::Archive;

    let _ = env_logger::builder().is_test(true).try_init();

    let dir = tempdir().unwrap();
    let path = dir.path().join("zip64_test.zip");
    let mut f = File::create(&path).unwrap();

    // local file header, a.txt, stored, data descriptor flag set
    f.write_all(&[0x50, 0x4b, 0x03, 0x04]).unwrap();
    f.write_all(&[20, 0]).unwrap(); // version needed
    f.write_all(&[8, 0]).unwrap(); // flags (bit 3 set)
    f.write_all(&[0, 0]).unwrap(); // compression method (stored)
    f.write_all(&[0, 0, 0, 0]).unwrap(); // mod time/date
    f.write_all(&0u32.to_le_bytes()).unwrap(); // crc placeholder
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // compressed size placeholder
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // uncompressed size placeholder
    f.write_all(&(5u16).to_le_bytes()).unwrap(); // name length
    f.write_all(&0u16.to_le_bytes()).unwrap(); // extra length
    f.write_all(b"a.txt").unwrap();

    let data = b"hello";
    let data_offset = f.stream_position().unwrap();
    f.write_all(data).unwrap();

    let crc = crc32fast::hash(data);
    f.write_all(&[0x50, 0x4b, 0x07, 0x08]).unwrap();
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();

    let cd_start = f.stream_position().unwrap();

    f.write_all(&[0x50, 0x4b, 0x01, 0x02]).unwrap();
    f.write_all(&[20, 0]).unwrap(); // version made by
    f.write_all(&[20, 0]).unwrap(); // version needed
    f.write_all(&[8, 0]).unwrap(); // flags
    f.write_all(&[0, 0]).unwrap(); // compression method
    f.write_all(&[0, 0, 0, 0]).unwrap(); // mod time/date
    f.write_all(&crc.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap();
    f.write_all(&(5u16).to_le_bytes()).unwrap(); // name len
    f.write_all(&(28u16).to_le_bytes()).unwrap(); // extra len: header(4)+data(24)
    f.write_all(&0u16.to_le_bytes()).unwrap(); // comment len
    f.write_all(&0u16.to_le_bytes()).unwrap(); // disk start
    f.write_all(&0u16.to_le_bytes()).unwrap(); // internal attrs
    f.write_all(&0u32.to_le_bytes()).unwrap(); // external attrs
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // relative offset placeholder
    f.write_all(b"a.txt").unwrap();
    f.write_all(&0x0001u16.to_le_bytes()).unwrap(); // ZIP64 extra id
    f.write_all(&(24u16).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&(data.len() as u64).to_le_bytes()).unwrap();
    f.write_all(&(data_offset - 30).to_le_bytes()).unwrap();

    let cd_end = f.stream_position().unwrap();
    let cd_size = cd_end - cd_start;

    let zip64_eocd_start = f.stream_position().unwrap();
    f.write_all(&[0x50, 0x4b, 0x06, 0x06]).unwrap();
    f.write_all(&(44u64).to_le_bytes()).unwrap();
    f.write_all(&[20, 0]).unwrap(); // version made by
    f.write_all(&[20, 0]).unwrap(); // version needed
    f.write_all(&0u32.to_le_bytes()).unwrap(); // disk number
    f.write_all(&0u32.to_le_bytes()).unwrap(); // disk start
    f.write_all(&(1u64).to_le_bytes()).unwrap(); // entries on disk
    f.write_all(&(1u64).to_le_bytes()).unwrap(); // total entries
    f.write_all(&cd_size.to_le_bytes()).unwrap();
    f.write_all(&cd_start.to_le_bytes()).unwrap();

    f.write_all(&[0x50, 0x4b, 0x06, 0x07]).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap();
    f.write_all(&zip64_eocd_start.to_le_bytes()).unwrap();
    f.write_all(&0u32.to_le_bytes()).unwrap(); // total disks

    f.write_all(&[0x50, 0x4b, 0x05, 0x06]).unwrap();
    f.write_all(&0u16.to_le_bytes()).unwrap(); // disk
    f.write_all(&0u16.to_le_bytes()).unwrap(); // disk with cd
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap(); // entries on disk
    f.write_all(&0xFFFFu16.to_le_bytes()).unwrap(); // total entries
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // cd size
    f.write_all(&0xFFFFFFFFu32.to_le_bytes()).unwrap(); // cd offset
    f.write_all(&0u16.to_le_bytes()).unwrap(); // comment len

    f.flush().unwrap();
    drop(f);

    let stream = File::open(&path).unwrap();
    let mut archive = Archive::open_read(stream).expect("should open crafted zip64");
    assert_eq!(archive.entry_count(), 1);
    let entry = archive.goto_first_entry().unwrap().clone();
    assert_eq!(entry.filename, "a.txt");
    assert_eq!(entry.uncompressed_size, data.len() as u64);
    assert_eq!(entry.compressed_size, data.len() as u64);
}
