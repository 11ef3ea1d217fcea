use std::io::Cursor;
use std::str;

use crate::error::DecodeError;

const MAX_LABEL_LEN: usize = 63;
const MAX_POINTER_HOPS: usize = 64;

/// Canonical form used for every name in the crate: lower case, no
/// trailing dot. The root domain is the empty string.
pub fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

//Domain names are sent with "length" separators and are null-terminated
//The domain 'microsoft.com' becomes "0x09microsoft0x03com0x00"
pub fn encode_name(name: &str, buffer: &mut Vec<u8>) {
    for part in name.split('.').filter(|part| !part.is_empty()) {
        //Labels are capped at 63 bytes on the wire
        let bytes = &part.as_bytes()[..part.len().min(MAX_LABEL_LEN)];
        buffer.push(bytes.len() as u8);
        buffer.extend_from_slice(bytes);
    }
    //Write terminating null byte
    buffer.push(0);
}

/// Reads a possibly compressed name starting at the cursor position and
/// leaves the cursor just past the name as it appears in place.
pub fn read_name(rdr: &mut Cursor<&[u8]>) -> Result<String, DecodeError> {
    let buf: &[u8] = *rdr.get_ref();
    let mut pos = rdr.position() as usize;
    let mut resume_at = None;
    let mut hops = 0;
    let mut labels: Vec<&str> = Vec::new();

    loop {
        let len = *buf.get(pos).ok_or(DecodeError::UnexpectedEnd)?;
        match len & 0xC0 {
            0x00 if len == 0 => {
                pos += 1;
                break;
            }
            0x00 => {
                let start = pos + 1;
                let end = start + len as usize;
                let raw = buf.get(start..end).ok_or(DecodeError::UnexpectedEnd)?;
                labels.push(str::from_utf8(raw).map_err(|_| DecodeError::InvalidName)?);
                pos = end;
            }
            0xC0 => {
                let low = *buf.get(pos + 1).ok_or(DecodeError::UnexpectedEnd)?;
                hops += 1;
                if hops > MAX_POINTER_HOPS {
                    return Err(DecodeError::PointerLoop(pos));
                }
                if resume_at.is_none() {
                    resume_at = Some(pos + 2);
                }
                pos = (((len & 0x3F) as usize) << 8) | low as usize;
            }
            _ => return Err(DecodeError::BadLabelType(len)),
        }
    }

    rdr.set_position(resume_at.unwrap_or(pos) as u64);
    Ok(normalize(&labels.join(".")))
}
