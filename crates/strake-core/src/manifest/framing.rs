//! The five-byte record header and its decoder.
//!
//! Every record is framed as `<symbol><4-hex-digit length>` followed by the
//! payload and one newline separator; the same bytes travel the wire and sit in
//! manifest files.

use std::io::{Read, Write};

use crate::error::{Result, StrakeError};

/// Header length: one command symbol plus four hex digits.
pub const HEADER_LEN: usize = 5;

/// Largest payload a four-hex-digit length can announce.
pub const MAX_PAYLOAD: usize = 0xFFFF;

const RECORD_SEPARATOR: u8 = b'\n';

/// A decoded frame: raw command symbol and payload bytes, separator trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub symbol: char,
    pub payload: Vec<u8>,
}

/// Write one framed record.
pub fn write_frame(w: &mut impl Write, symbol: char, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(StrakeError::Framing(format!(
            "payload of {} bytes exceeds frame limit {MAX_PAYLOAD}",
            payload.len()
        )));
    }
    let header = format!("{symbol}{:04X}", payload.len());
    w.write_all(header.as_bytes())?;
    w.write_all(payload)?;
    w.write_all(&[RECORD_SEPARATOR])?;
    Ok(())
}

/// Read one framed record.
///
/// `Ok(None)` is the non-error end-of-stream: zero bytes available at a
/// record boundary. A partial header or short payload is `TruncatedRead`
/// (the tail of a half-written manifest); a header that does not parse as
/// `<symbol><4 hex digits>` is `Framing`.
pub fn read_frame(r: &mut impl Read) -> Result<Option<Frame>> {
    let mut header = [0u8; HEADER_LEN];
    let got = read_up_to(r, &mut header)?;
    if got == 0 {
        return Ok(None);
    }
    if got < HEADER_LEN {
        return Err(StrakeError::TruncatedRead {
            wanted: HEADER_LEN,
            got,
        });
    }

    let symbol = header[0] as char;
    let len_digits = &header[1..];
    if !len_digits.iter().all(|b| b.is_ascii_hexdigit()) {
        return Err(StrakeError::Framing(format!(
            "unparseable header {:?}",
            String::from_utf8_lossy(&header)
        )));
    }
    // All four bytes are hex digits, so this cannot fail.
    let len_str = std::str::from_utf8(len_digits).expect("hex digits are ASCII");
    let len = usize::from_str_radix(len_str, 16).expect("checked hex digits");

    let mut payload = vec![0u8; len];
    let got = read_up_to(r, &mut payload)?;
    if got < len {
        return Err(StrakeError::TruncatedRead { wanted: len, got });
    }

    // Trim the record separator when present; end-of-stream right after the
    // payload is accepted.
    let mut sep = [0u8; 1];
    let got = read_up_to(r, &mut sep)?;
    if got == 1 && sep[0] != RECORD_SEPARATOR {
        return Err(StrakeError::Framing(format!(
            "expected record separator after '{symbol}' payload, got {:#04x}",
            sep[0]
        )));
    }

    Ok(Some(Frame { symbol, payload }))
}

/// Fill as much of `buf` as the reader can provide, returning the number of
/// bytes actually read (short only at end of stream).
fn read_up_to(r: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
