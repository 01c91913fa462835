//! Netstring framing for object records.
//!
//! Format:
//! ```text
//! <decimal length>:<payload>,
//! ```
//! Payloads are UTF-8 JSON. A stream is a plain concatenation of frames and
//! ends at EOF.

use std::io::{BufRead, Error as IoError, ErrorKind, Result as IoResult, Write};

use serde::{de::DeserializeOwned, Serialize};

/// Largest payload accepted when reading (100 MB).
pub const MAX_PAYLOAD_SIZE: usize = 100 * 1024 * 1024;

const MAX_LENGTH_DIGITS: usize = 10;

/// Writes one frame around `payload`.
pub fn write_netstring(writer: &mut impl Write, payload: &[u8]) -> IoResult<()> {
    write!(writer, "{}:", payload.len())?;
    writer.write_all(payload)?;
    writer.write_all(b",")
}

/// Serializes `value` as JSON and frames it.
pub fn encode<T: Serialize>(value: &T) -> IoResult<Vec<u8>> {
    let data = serde_json::to_vec(value)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("serialization failed: {e}")))?;

    let mut out = Vec::with_capacity(data.len() + MAX_LENGTH_DIGITS + 2);
    write_netstring(&mut out, &data)?;
    Ok(out)
}

/// Reads one frame. Returns `None` on EOF before the first length digit.
///
/// # Errors
/// - `UnexpectedEof` if the stream ends inside a frame
/// - `InvalidData` for a malformed length, an oversized payload or a
///   missing trailing comma
pub fn read_netstring(reader: &mut impl BufRead) -> IoResult<Option<Vec<u8>>> {
    let mut len: usize = 0;
    let mut digits = 0usize;

    loop {
        let byte = {
            let buf = reader.fill_buf()?;
            match buf.first() {
                Some(b) => *b,
                None if digits == 0 => return Ok(None),
                None => {
                    return Err(IoError::new(ErrorKind::UnexpectedEof, "stream ended inside netstring length"));
                }
            }
        };
        reader.consume(1);

        match byte {
            b':' if digits > 0 => break,
            b'0'..=b'9' if digits < MAX_LENGTH_DIGITS => {
                len = len * 10 + usize::from(byte - b'0');
                digits += 1;
            }
            other => {
                return Err(IoError::new(
                    ErrorKind::InvalidData,
                    format!("invalid byte 0x{other:02x} in netstring length"),
                ));
            }
        }
    }

    if len > MAX_PAYLOAD_SIZE {
        return Err(IoError::new(
            ErrorKind::InvalidData,
            format!("netstring length {len} exceeds maximum {MAX_PAYLOAD_SIZE}"),
        ));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let mut trailer = [0u8; 1];
    reader.read_exact(&mut trailer)?;
    if trailer[0] != b',' {
        return Err(IoError::new(ErrorKind::InvalidData, "netstring is missing its trailing ','"));
    }

    Ok(Some(payload))
}

/// Reads one frame and deserializes its JSON payload.
pub fn decode<T: DeserializeOwned>(reader: &mut impl BufRead) -> IoResult<Option<T>> {
    let Some(payload) = read_netstring(reader)? else {
        return Ok(None);
    };

    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| IoError::new(ErrorKind::InvalidData, format!("deserialization failed: {e}")))
}
