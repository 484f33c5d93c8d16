//! Binary column value codecs for the PostgreSQL types this driver round-trips.
//!
//! These operate on the body of a column value (the bytes after the 4-byte length
//! prefix found in `DataRow`/bind parameters) — the length prefix itself is handled
//! by the caller, since `DataRow` parsing is deferred to a higher-level collaborator.

use crate::codec::{read_f32, read_f64, read_i16, read_i32, read_i64, read_u16};
use crate::error::{Error, Result};

/// PostgreSQL epoch (2000-01-01) expressed as a Julian day number.
const PG_EPOCH_JULIAN_DAY: i32 = 2_451_545;

pub fn encode_bool(value: bool) -> [u8; 1] {
    [u8::from(value)]
}

pub fn decode_bool(bytes: &[u8]) -> Result<bool> {
    match bytes {
        [0] => Ok(false),
        [1] => Ok(true),
        other => Err(Error::ProtocolError(format!(
            "invalid bool binary length/value: {other:?}"
        ))),
    }
}

pub fn encode_bytea(value: &[u8]) -> Vec<u8> {
    value.to_vec()
}

pub fn decode_bytea(bytes: &[u8]) -> Vec<u8> {
    bytes.to_vec()
}

pub fn encode_char(value: char) -> Result<[u8; 1]> {
    let code = u32::from(value);
    let byte = u8::try_from(code)
        .map_err(|_err| Error::ProtocolError(format!("char {value:?} does not fit in one byte")))?;
    Ok([byte])
}

pub fn decode_char(bytes: &[u8]) -> Result<char> {
    match bytes {
        [b] => Ok(char::from(*b)),
        other => Err(Error::ProtocolError(format!(
            "invalid char binary length: {}",
            other.len()
        ))),
    }
}

pub fn encode_int2(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}

pub fn decode_int2(bytes: &[u8]) -> Result<i16> {
    Ok(read_i16(bytes)?.0)
}

pub fn encode_int4(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

pub fn decode_int4(bytes: &[u8]) -> Result<i32> {
    Ok(read_i32(bytes)?.0)
}

pub fn encode_int8(value: i64) -> [u8; 8] {
    value.to_be_bytes()
}

pub fn decode_int8(bytes: &[u8]) -> Result<i64> {
    Ok(read_i64(bytes)?.0)
}

pub fn encode_float4(value: f32) -> [u8; 4] {
    value.to_bits().to_be_bytes()
}

pub fn decode_float4(bytes: &[u8]) -> Result<f32> {
    Ok(read_f32(bytes)?.0)
}

pub fn encode_float8(value: f64) -> [u8; 8] {
    value.to_bits().to_be_bytes()
}

pub fn decode_float8(bytes: &[u8]) -> Result<f64> {
    Ok(read_f64(bytes)?.0)
}

/// A calendar day stored as the signed day offset from 2000-01-01 (the PostgreSQL epoch).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub days_since_epoch: i32,
}

impl Date {
    /// The Julian day number this date represents.
    pub fn julian_day(self) -> i32 {
        self.days_since_epoch + PG_EPOCH_JULIAN_DAY
    }
}

pub fn encode_date(value: Date) -> [u8; 4] {
    value.days_since_epoch.to_be_bytes()
}

pub fn decode_date(bytes: &[u8]) -> Result<Date> {
    let (days_since_epoch, _) = read_i32(bytes)?;
    Ok(Date { days_since_epoch })
}

/// A timestamp stored as microseconds since 2000-01-01 00:00:00, with or without a
/// time zone attached (the wire encoding is identical; the OID distinguishes them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub micros_since_epoch: i64,
}

pub fn encode_timestamp(value: Timestamp) -> [u8; 8] {
    value.micros_since_epoch.to_be_bytes()
}

pub fn decode_timestamp(bytes: &[u8]) -> Result<Timestamp> {
    let (micros_since_epoch, _) = read_i64(bytes)?;
    Ok(Timestamp { micros_since_epoch })
}

/// A time interval: microseconds, days, and months kept separate per PostgreSQL's
/// representation (a month has no fixed number of days).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub micros: i64,
    pub days: i32,
    pub months: i32,
}

pub fn encode_interval(value: Interval) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[0..8].copy_from_slice(&value.micros.to_be_bytes());
    out[8..12].copy_from_slice(&value.days.to_be_bytes());
    out[12..16].copy_from_slice(&value.months.to_be_bytes());
    out
}

pub fn decode_interval(bytes: &[u8]) -> Result<Interval> {
    let (micros, rest) = read_i64(bytes)?;
    let (days, rest) = read_i32(rest)?;
    let (months, _) = read_i32(rest)?;
    Ok(Interval { micros, days, months })
}

pub fn encode_uuid(value: uuid::Uuid) -> [u8; 16] {
    *value.as_bytes()
}

pub fn decode_uuid(bytes: &[u8]) -> Result<uuid::Uuid> {
    uuid::Uuid::from_slice(bytes).map_err(|e| Error::ProtocolError(format!("invalid uuid: {e}")))
}

pub fn encode_text(value: &str) -> &[u8] {
    value.as_bytes()
}

pub fn decode_text(bytes: &[u8]) -> Result<&str> {
    simdutf8::basic::from_utf8(bytes)
        .map_err(|e| Error::ProtocolError(format!("invalid UTF-8 text: {e}")))
}

/// `jsonb`'s single leading version byte, currently always 1.
pub const JSONB_VERSION: u8 = 1;

pub fn encode_jsonb(json_body: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + json_body.len());
    out.push(JSONB_VERSION);
    out.extend_from_slice(json_body.as_bytes());
    out
}

pub fn decode_jsonb(bytes: &[u8]) -> Result<&str> {
    let (version, body) = bytes
        .split_first()
        .ok_or_else(|| Error::ProtocolError("empty jsonb body".into()))?;
    if *version != JSONB_VERSION {
        return Err(Error::ProtocolError(format!(
            "unsupported jsonb version byte: {version}"
        )));
    }
    decode_text(body)
}

/// PostgreSQL `numeric` sign field values.
mod numeric_sign {
    pub const POSITIVE: u16 = 0x0000;
    pub const NEGATIVE: u16 = 0x4000;
    pub const NAN: u16 = 0xC000;
    pub const POSITIVE_INFINITY: u16 = 0xD000;
    pub const NEGATIVE_INFINITY: u16 = 0xF000;
}

/// A decoded `numeric` value: a sign, an array of base-10000 digit groups, a weight
/// (power-of-10000 position of the first digit), and a display scale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Numeric {
    Value {
        negative: bool,
        digits: Vec<i16>,
        weight: i16,
        dscale: u16,
    },
    NaN,
    PositiveInfinity,
    NegativeInfinity,
}

pub fn encode_numeric(value: &Numeric) -> Vec<u8> {
    let mut out = Vec::new();
    match value {
        Numeric::Value { negative, digits, weight, dscale } => {
            out.extend_from_slice(&(digits.len() as i16).to_be_bytes());
            out.extend_from_slice(&weight.to_be_bytes());
            let sign = if *negative { numeric_sign::NEGATIVE } else { numeric_sign::POSITIVE };
            out.extend_from_slice(&sign.to_be_bytes());
            out.extend_from_slice(&dscale.to_be_bytes());
            for digit in digits {
                out.extend_from_slice(&digit.to_be_bytes());
            }
        }
        Numeric::NaN => {
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&numeric_sign::NAN.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
        Numeric::PositiveInfinity => {
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&numeric_sign::POSITIVE_INFINITY.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
        Numeric::NegativeInfinity => {
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&0i16.to_be_bytes());
            out.extend_from_slice(&numeric_sign::NEGATIVE_INFINITY.to_be_bytes());
            out.extend_from_slice(&0u16.to_be_bytes());
        }
    }
    out
}

pub fn decode_numeric(bytes: &[u8]) -> Result<Numeric> {
    let (ndigits, rest) = read_u16(bytes)?;
    let (weight, rest) = read_i16(rest)?;
    let (sign, rest) = read_u16(rest)?;
    let (dscale, mut rest) = read_u16(rest)?;

    match sign {
        numeric_sign::NAN => return Ok(Numeric::NaN),
        numeric_sign::POSITIVE_INFINITY => return Ok(Numeric::PositiveInfinity),
        numeric_sign::NEGATIVE_INFINITY => return Ok(Numeric::NegativeInfinity),
        numeric_sign::POSITIVE | numeric_sign::NEGATIVE => {}
        other => return Err(Error::ProtocolError(format!("unknown numeric sign: {other}"))),
    }

    let mut digits = Vec::with_capacity(ndigits as usize);
    for _ in 0..ndigits {
        let (digit, remaining) = read_i16(rest)?;
        digits.push(digit);
        rest = remaining;
    }

    Ok(Numeric::Value {
        negative: sign == numeric_sign::NEGATIVE,
        digits,
        weight,
        dscale,
    })
}

impl std::fmt::Display for Numeric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Numeric::NaN => write!(f, "NaN"),
            Numeric::PositiveInfinity => write!(f, "Infinity"),
            Numeric::NegativeInfinity => write!(f, "-Infinity"),
            Numeric::Value { negative, digits, weight, dscale } => {
                if *negative {
                    write!(f, "-")?;
                }
                if digits.is_empty() {
                    write!(f, "0")?;
                    if *dscale > 0 {
                        write!(f, ".{:0<width$}", "", width = *dscale as usize)?;
                    }
                    return Ok(());
                }

                let int_digit_groups = i32::from(*weight) + 1;
                if int_digit_groups <= 0 {
                    write!(f, "0")?;
                } else {
                    for (i, digit) in digits.iter().enumerate() {
                        if i == 0 {
                            write!(f, "{digit}")?;
                        } else if (i as i32) < int_digit_groups {
                            write!(f, "{digit:04}")?;
                        } else {
                            break;
                        }
                    }
                    let missing = int_digit_groups - digits.len() as i32;
                    for _ in 0..missing.max(0) {
                        write!(f, "0000")?;
                    }
                }

                if *dscale > 0 {
                    write!(f, ".")?;
                    let mut written = 0u32;
                    if int_digit_groups < 0 {
                        let leading_zeros = (-int_digit_groups) as u32 * 4;
                        for _ in 0..leading_zeros.min(u32::from(*dscale)) {
                            write!(f, "0")?;
                            written += 1;
                        }
                    }
                    let frac_start = int_digit_groups.max(0) as usize;
                    for digit in digits.iter().skip(frac_start) {
                        let group = format!("{digit:04}");
                        for c in group.chars() {
                            if written >= u32::from(*dscale) {
                                break;
                            }
                            write!(f, "{c}")?;
                            written += 1;
                        }
                    }
                    while written < u32::from(*dscale) {
                        write!(f, "0")?;
                        written += 1;
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_roundtrip() {
        assert!(decode_bool(&encode_bool(true)).expect("decode"));
        assert!(!decode_bool(&encode_bool(false)).expect("decode"));
    }

    #[test]
    fn int_roundtrips() {
        assert_eq!(decode_int2(&encode_int2(-7)).expect("i16"), -7);
        assert_eq!(decode_int4(&encode_int4(-70000)).expect("i32"), -70000);
        assert_eq!(decode_int8(&encode_int8(i64::MIN)).expect("i64"), i64::MIN);
    }

    #[test]
    fn float_roundtrips() {
        assert_eq!(decode_float4(&encode_float4(3.5)).expect("f32"), 3.5);
        assert_eq!(decode_float8(&encode_float8(3.5)).expect("f64"), 3.5);
    }

    #[test]
    fn date_julian_day_matches_known_epoch() {
        let epoch = Date { days_since_epoch: 0 };
        assert_eq!(epoch.julian_day(), PG_EPOCH_JULIAN_DAY);
    }

    #[test]
    fn interval_roundtrip() {
        let interval = Interval { micros: 1_500_000, days: 3, months: 2 };
        let decoded = decode_interval(&encode_interval(interval)).expect("interval");
        assert_eq!(decoded, interval);
    }

    #[test]
    fn uuid_roundtrip() {
        let id = uuid::Uuid::parse_str("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11").expect("uuid");
        let decoded = decode_uuid(&encode_uuid(id)).expect("decode");
        assert_eq!(decoded, id);
    }

    #[test]
    fn jsonb_roundtrip() {
        let body = r#"{"a":1}"#;
        let encoded = encode_jsonb(body);
        assert_eq!(decode_jsonb(&encoded).expect("decode"), body);
    }

    #[test]
    fn jsonb_rejects_unknown_version() {
        let bytes = [2u8, b'{', b'}'];
        assert!(decode_jsonb(&bytes).is_err());
    }

    fn numeric_bytes(ndigits: i16, weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ndigits.to_be_bytes());
        buf.extend_from_slice(&weight.to_be_bytes());
        buf.extend_from_slice(&sign.to_be_bytes());
        buf.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            buf.extend_from_slice(&d.to_be_bytes());
        }
        buf
    }

    #[test]
    fn numeric_decode_header_roundtrip() {
        let bytes = numeric_bytes(2, 0, numeric_sign::POSITIVE, 2, &[123, 4500]);
        let numeric = decode_numeric(&bytes).expect("decode");
        assert_eq!(encode_numeric(&numeric), bytes);
    }

    #[test]
    fn numeric_display_matches_known_values() {
        let positive = numeric_bytes(2, 0, numeric_sign::POSITIVE, 2, &[123, 4500]);
        assert_eq!(decode_numeric(&positive).expect("decode").to_string(), "123.45");

        let negative = numeric_bytes(2, 0, numeric_sign::NEGATIVE, 2, &[123, 4500]);
        assert_eq!(decode_numeric(&negative).expect("decode").to_string(), "-123.45");

        let zero = numeric_bytes(0, 0, numeric_sign::POSITIVE, 0, &[]);
        assert_eq!(decode_numeric(&zero).expect("decode").to_string(), "0");

        let nan = numeric_bytes(0, 0, numeric_sign::NAN, 0, &[]);
        assert_eq!(decode_numeric(&nan).expect("decode").to_string(), "NaN");
    }

    #[test]
    fn numeric_display_simple_integer() {
        let bytes = numeric_bytes(2, 1, numeric_sign::POSITIVE, 0, &[1, 2345]);
        assert_eq!(decode_numeric(&bytes).expect("decode").to_string(), "12345");
    }

    #[test]
    fn numeric_display_small_magnitude_has_leading_zero_gap() {
        let bytes = numeric_bytes(1, -2, numeric_sign::POSITIVE, 8, &[1]);
        assert_eq!(decode_numeric(&bytes).expect("decode").to_string(), "0.00000001");
    }
}
