//! Directory listings returned by QUERY_DIRECTORY

use crate::auth::ntlm_crypto::FILETIME_UNIX_EPOCH;
use crate::error::{Error, Result};
use crate::protocol::messages::utf16le_decode;
use crate::protocol::smb2_constants::FileAttributes;
use byteorder::{ByteOrder, LittleEndian};
use chrono::{DateTime, TimeZone, Utc};

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub size: u64,
    pub last_write_time: Option<DateTime<Utc>>,
    pub attributes: FileAttributes,
}

impl DirEntry {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }
}

// FileDirectoryInformation layout
const NEXT_ENTRY_OFFSET: usize = 0;
const LAST_WRITE_TIME: usize = 24;
const END_OF_FILE: usize = 40;
const FILE_ATTRIBUTES: usize = 56;
const FILE_NAME_LENGTH: usize = 60;
const FILE_NAME: usize = 64;

/// Two little-endian u32 halves, low first
fn read_split_u64(buf: &[u8]) -> u64 {
    let low = u64::from(LittleEndian::read_u32(&buf[0..4]));
    let high = u64::from(LittleEndian::read_u32(&buf[4..8]));
    low | (high << 32)
}

/// FILETIME (100 ns ticks since 1601) to UTC; zero means unset
pub fn filetime_to_utc(filetime: u64) -> Option<DateTime<Utc>> {
    if filetime == 0 {
        return None;
    }
    let ticks = i128::from(filetime) - i128::from(FILETIME_UNIX_EPOCH);
    let secs = i64::try_from(ticks.div_euclid(10_000_000)).ok()?;
    let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Walk a FileDirectoryInformation buffer
pub fn parse_directory_information(buf: &[u8]) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    let mut pos = 0usize;

    while pos < buf.len() {
        let entry = &buf[pos..];
        if entry.len() < FILE_NAME {
            return Err(Error::BufferTooSmall {
                need: FILE_NAME,
                have: entry.len(),
            });
        }

        let next = LittleEndian::read_u32(&entry[NEXT_ENTRY_OFFSET..]) as usize;
        let name_len = LittleEndian::read_u32(&entry[FILE_NAME_LENGTH..]) as usize;
        let name = entry.get(FILE_NAME..FILE_NAME + name_len).ok_or_else(|| {
            Error::ParseError(format!(
                "Directory entry name of {} bytes runs past the buffer",
                name_len
            ))
        })?;

        entries.push(DirEntry {
            name: utf16le_decode(name),
            size: read_split_u64(&entry[END_OF_FILE..]),
            last_write_time: filetime_to_utc(read_split_u64(&entry[LAST_WRITE_TIME..])),
            attributes: FileAttributes::from_bits_retain(LittleEndian::read_u32(
                &entry[FILE_ATTRIBUTES..],
            )),
        });

        if next == 0 {
            break;
        }
        if next < FILE_NAME {
            return Err(Error::ParseError(format!(
                "Directory entry offset {} overlaps the current entry",
                next
            )));
        }
        pos += next;
    }

    Ok(entries)
}

/// Drop the `.` and `..` pseudo-entries, keeping server order
pub fn without_dot_entries(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    entries
        .into_iter()
        .filter(|entry| entry.name != "." && entry.name != "..")
        .collect()
}

/// Encode entries the way a server lays them out; the loopback server uses it
#[cfg(test)]
pub(crate) fn encode_directory_information(entries: &[DirEntry]) -> Vec<u8> {
    use crate::protocol::messages::utf16le_encode;

    let mut buf = Vec::new();
    for (i, entry) in entries.iter().enumerate() {
        let name = utf16le_encode(&entry.name);
        let len = (FILE_NAME + name.len() + 7) & !7;
        let start = buf.len();
        buf.resize(start + len, 0);
        let record = &mut buf[start..];

        let next = if i + 1 == entries.len() { 0 } else { len as u32 };
        LittleEndian::write_u32(&mut record[NEXT_ENTRY_OFFSET..], next);
        let filetime = entry.last_write_time.map_or(0, |time| {
            (time.timestamp() as u64) * 10_000_000
                + u64::from(time.timestamp_subsec_nanos()) / 100
                + FILETIME_UNIX_EPOCH
        });
        LittleEndian::write_u64(&mut record[LAST_WRITE_TIME..], filetime);
        LittleEndian::write_u64(&mut record[END_OF_FILE..], entry.size);
        LittleEndian::write_u32(&mut record[FILE_ATTRIBUTES..], entry.attributes.bits());
        LittleEndian::write_u32(&mut record[FILE_NAME_LENGTH..], name.len() as u32);
        record[FILE_NAME..FILE_NAME + name.len()].copy_from_slice(&name);
    }
    buf
}
