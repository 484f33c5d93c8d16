//! Wire-level encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers on the wire.

use crate::error::{Error, Result};

/// Read a 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> Result<(u8, &[u8])> {
    if data.is_empty() {
        return Err(Error::ProtocolError("read_u8: empty buffer".into()));
    }
    Ok((data[0], &data[1..]))
}

/// Read a 2-byte big-endian signed integer.
#[inline]
pub fn read_i16(data: &[u8]) -> Result<(i16, &[u8])> {
    if data.len() < 2 {
        return Err(Error::ProtocolError(format!(
            "read_i16: buffer too short: {} < 2",
            data.len()
        )));
    }
    let (head, rest) = data.split_at(2);
    let mut buf = [0u8; 2];
    buf.copy_from_slice(head);
    Ok((i16::from_be_bytes(buf), rest))
}

/// Read a 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> Result<(u16, &[u8])> {
    let (value, rest) = read_i16(data)?;
    Ok((value as u16, rest))
}

/// Read a 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> Result<(i32, &[u8])> {
    if data.len() < 4 {
        return Err(Error::ProtocolError(format!(
            "read_i32: buffer too short: {} < 4",
            data.len()
        )));
    }
    let (head, rest) = data.split_at(4);
    let mut buf = [0u8; 4];
    buf.copy_from_slice(head);
    Ok((i32::from_be_bytes(buf), rest))
}

/// Read a 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> Result<(u32, &[u8])> {
    let (value, rest) = read_i32(data)?;
    Ok((value as u32, rest))
}

/// Read an 8-byte big-endian signed integer.
#[inline]
pub fn read_i64(data: &[u8]) -> Result<(i64, &[u8])> {
    if data.len() < 8 {
        return Err(Error::ProtocolError(format!(
            "read_i64: buffer too short: {} < 8",
            data.len()
        )));
    }
    let (head, rest) = data.split_at(8);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(head);
    Ok((i64::from_be_bytes(buf), rest))
}

/// Read a 4-byte big-endian IEEE-754 float.
#[inline]
pub fn read_f32(data: &[u8]) -> Result<(f32, &[u8])> {
    let (bits, rest) = read_u32(data)?;
    Ok((f32::from_bits(bits), rest))
}

/// Read an 8-byte big-endian IEEE-754 double.
#[inline]
pub fn read_f64(data: &[u8]) -> Result<(f64, &[u8])> {
    let (bits, rest) = read_i64(data)?;
    Ok((f64::from_bits(bits as u64), rest))
}

/// Read a fixed-length slice.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if data.len() < len {
        return Err(Error::ProtocolError(format!(
            "read_bytes: buffer too short: {} < {len}",
            data.len()
        )));
    }
    Ok((&data[..len], &data[len..]))
}

/// Read a null-terminated byte string, returning the bytes before the terminator.
#[inline]
pub fn read_cstring(data: &[u8]) -> Result<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(Error::ProtocolError(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read a null-terminated string, validating it as UTF-8.
#[inline]
pub fn read_cstr(data: &[u8]) -> Result<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::basic::from_utf8(bytes)
        .map_err(|e| Error::ProtocolError(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Write a 1-byte unsigned integer.
#[inline]
pub fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

/// Write a 2-byte big-endian signed integer.
#[inline]
pub fn write_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write a 2-byte big-endian unsigned integer.
#[inline]
pub fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write a 4-byte big-endian signed integer.
#[inline]
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write a 4-byte big-endian unsigned integer.
#[inline]
pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write an 8-byte big-endian signed integer.
#[inline]
pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Write a 4-byte big-endian IEEE-754 float.
#[inline]
pub fn write_f32(out: &mut Vec<u8>, value: f32) {
    write_u32(out, value.to_bits());
}

/// Write an 8-byte big-endian IEEE-754 double.
#[inline]
pub fn write_f64(out: &mut Vec<u8>, value: f64) {
    write_i64(out, value.to_bits() as i64);
}

/// Write raw bytes.
#[inline]
pub fn write_bytes(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(data);
}

/// Write a null-terminated byte string.
#[inline]
pub fn write_cstring(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(s);
    out.push(0);
}

/// Write a null-terminated string.
#[inline]
pub fn write_cstr(out: &mut Vec<u8>, s: &str) {
    write_cstring(out, s.as_bytes());
}

/// Builds a tagged, length-prefixed message in place, patching the length field on `finish`.
///
/// Wire layout: type byte (1 byte, omitted for startup messages) + length (4 bytes,
/// includes itself) + payload.
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a tagged message.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Start building a startup-phase message, which has no leading type byte.
    pub fn new_untagged(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    pub fn write_u8(&mut self, value: u8) {
        write_u8(self.buf, value);
    }

    pub fn write_i16(&mut self, value: i16) {
        write_i16(self.buf, value);
    }

    pub fn write_i32(&mut self, value: i32) {
        write_i32(self.buf, value);
    }

    pub fn write_u32(&mut self, value: u32) {
        write_u32(self.buf, value);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        write_bytes(self.buf, data);
    }

    pub fn write_cstr(&mut self, s: &str) {
        write_cstr(self.buf, s);
    }

    /// Patch the length field with the total length of type-tag-exclusive payload.
    pub fn finish(self) {
        let len = i32::try_from(self.buf.len() - self.start).unwrap_or(i32::MAX);
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_primitives() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -7);
        write_u16(&mut buf, 1234);
        write_cstr(&mut buf, "hello");
        let (i, rest) = read_i32(&buf).expect("i32");
        assert_eq!(i, -7);
        let (u, rest) = read_u16(rest).expect("u16");
        assert_eq!(u, 1234);
        let (s, rest) = read_cstr(rest).expect("cstr");
        assert_eq!(s, "hello");
        assert!(rest.is_empty());
    }

    #[test]
    fn message_builder_patches_length() {
        let mut buf = Vec::new();
        let mut mb = MessageBuilder::new(&mut buf, b'Q');
        mb.write_cstr("select 1");
        mb.finish();
        assert_eq!(buf[0], b'Q');
        let (len, _) = read_i32(&buf[1..]).expect("len");
        assert_eq!(len as usize, buf.len() - 1);
    }

    #[test]
    fn read_cstring_missing_terminator_errors() {
        let data = [1, 2, 3];
        assert!(read_cstring(&data).is_err());
    }
}
