//! Stat-attribute payload codec.
//!
//! An `Attribs` record carries the entry's stat metadata and compression
//! flag as thirteen space-separated hex fields in fixed order. Signed
//! fields (times, compression) are sign-prefixed since `-1` marks an unset
//! compression level.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrakeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatAttribs {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    /// Platform file attributes (zero where not applicable).
    pub winattr: u64,
    /// Compression level selected for this entry; `-1` when unset.
    pub compression: i32,
}

impl StatAttribs {
    pub fn encode(&self) -> String {
        format!(
            "{:x} {:x} {:x} {:x} {:x} {:x} {:x} {:x} {} {} {} {:x} {}",
            self.dev,
            self.ino,
            self.mode,
            self.nlink,
            self.uid,
            self.gid,
            self.rdev,
            self.size,
            encode_signed(self.atime),
            encode_signed(self.mtime),
            encode_signed(self.ctime),
            self.winattr,
            encode_signed(self.compression as i64),
        )
    }

    pub fn decode(payload: &str) -> Result<Self> {
        let fields: Vec<&str> = payload.split(' ').collect();
        if fields.len() != 13 {
            return Err(StrakeError::InvalidAttribs(format!(
                "expected 13 fields, got {}",
                fields.len()
            )));
        }
        Ok(Self {
            dev: decode_unsigned(fields[0])?,
            ino: decode_unsigned(fields[1])?,
            mode: decode_unsigned(fields[2])? as u32,
            nlink: decode_unsigned(fields[3])? as u32,
            uid: decode_unsigned(fields[4])? as u32,
            gid: decode_unsigned(fields[5])? as u32,
            rdev: decode_unsigned(fields[6])?,
            size: decode_unsigned(fields[7])?,
            atime: decode_signed(fields[8])?,
            mtime: decode_signed(fields[9])?,
            ctime: decode_signed(fields[10])?,
            winattr: decode_unsigned(fields[11])?,
            compression: decode_signed(fields[12])? as i32,
        })
    }
}

fn encode_signed(v: i64) -> String {
    if v < 0 {
        format!("-{:x}", v.unsigned_abs())
    } else {
        format!("{v:x}")
    }
}

fn decode_unsigned(field: &str) -> Result<u64> {
    u64::from_str_radix(field, 16)
        .map_err(|_| StrakeError::InvalidAttribs(format!("bad field {field:?}")))
}

fn decode_signed(field: &str) -> Result<i64> {
    if let Some(magnitude) = field.strip_prefix('-') {
        let v = decode_unsigned(magnitude)?;
        Ok(-(v as i64))
    } else {
        Ok(decode_unsigned(field)? as i64)
    }
}
