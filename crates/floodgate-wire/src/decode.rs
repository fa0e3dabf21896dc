//! Bounds-checked decoder for the binary wire format.

use crate::error::{WireError, WireResult};
use crate::tags::{
    CHR_DICT, CHR_FALSE, CHR_FLOAT32, CHR_FLOAT64, CHR_INT, CHR_INT1, CHR_INT2, CHR_INT4,
    CHR_INT8, CHR_LIST, CHR_NONE, CHR_TERM, CHR_TRUE, DICT_FIXED_COUNT, DICT_FIXED_START,
    INT_NEG_FIXED_COUNT, INT_NEG_FIXED_START, INT_POS_FIXED_COUNT, LIST_FIXED_COUNT,
    LIST_FIXED_START, MAX_INT_LENGTH, STR_FIXED_COUNT, STR_FIXED_START,
};
use crate::value::{WireKey, WireValue};

/// Cursor-tracking decoder over a borrowed buffer.
///
/// Every read is bounds-checked; a failure leaves no shared state behind
/// because a decoder is constructed per payload.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> WireResult<u8> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(WireError::UnexpectedEof {
                at: self.pos,
                needed: 1,
            })
    }

    fn take_byte(&mut self) -> WireResult<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize) -> WireResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(WireError::UnexpectedEof {
            at: self.pos,
            needed: len,
        })?;
        if end > self.buf.len() {
            return Err(WireError::UnexpectedEof {
                at: self.pos,
                needed: len,
            });
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_value(&mut self) -> WireResult<WireValue> {
        let at = self.pos;
        let tag = self.take_byte()?;
        match tag {
            _ if tag < INT_POS_FIXED_COUNT => Ok(WireValue::Int(i64::from(tag))),
            _ if (INT_NEG_FIXED_START..INT_NEG_FIXED_START + INT_NEG_FIXED_COUNT)
                .contains(&tag) =>
            {
                Ok(WireValue::Int(-1 - i64::from(tag - INT_NEG_FIXED_START)))
            }
            CHR_INT1 => {
                let bytes: [u8; 1] = self.take(1)?.try_into().expect("length checked");
                Ok(WireValue::Int(i64::from(i8::from_be_bytes(bytes))))
            }
            CHR_INT2 => {
                let bytes: [u8; 2] = self.take(2)?.try_into().expect("length checked");
                Ok(WireValue::Int(i64::from(i16::from_be_bytes(bytes))))
            }
            CHR_INT4 => {
                let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
                Ok(WireValue::Int(i64::from(i32::from_be_bytes(bytes))))
            }
            CHR_INT8 => {
                let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked");
                Ok(WireValue::Int(i64::from_be_bytes(bytes)))
            }
            CHR_INT => self.read_big_int(),
            CHR_FLOAT32 => {
                let bytes: [u8; 4] = self.take(4)?.try_into().expect("length checked");
                Ok(WireValue::Float32(f32::from_be_bytes(bytes)))
            }
            CHR_FLOAT64 => {
                let bytes: [u8; 8] = self.take(8)?.try_into().expect("length checked");
                Ok(WireValue::Float64(f64::from_be_bytes(bytes)))
            }
            CHR_TRUE => Ok(WireValue::Bool(true)),
            CHR_FALSE => Ok(WireValue::Bool(false)),
            CHR_NONE => Ok(WireValue::Null),
            _ if (STR_FIXED_START..STR_FIXED_START.wrapping_add(STR_FIXED_COUNT))
                .contains(&tag) =>
            {
                let len = usize::from(tag - STR_FIXED_START);
                self.read_str_payload(len)
            }
            b'0'..=b'9' => {
                self.pos = at;
                self.read_prefixed_str()
            }
            _ if (LIST_FIXED_START..=LIST_FIXED_START.wrapping_add(LIST_FIXED_COUNT - 1))
                .contains(&tag) =>
            {
                let len = usize::from(tag - LIST_FIXED_START);
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_value()?);
                }
                Ok(WireValue::List(items))
            }
            CHR_LIST => {
                let mut items = Vec::new();
                while self.peek()? != CHR_TERM {
                    items.push(self.read_value()?);
                }
                self.pos += 1;
                Ok(WireValue::List(items))
            }
            _ if (DICT_FIXED_START..DICT_FIXED_START + DICT_FIXED_COUNT).contains(&tag) => {
                let len = usize::from(tag - DICT_FIXED_START);
                let mut pairs = Vec::with_capacity(len);
                for _ in 0..len {
                    let key = self.read_key()?;
                    let value = self.read_value()?;
                    pairs.push((key, value));
                }
                Ok(WireValue::Dict(pairs))
            }
            CHR_DICT => {
                let mut pairs = Vec::new();
                while self.peek()? != CHR_TERM {
                    let key = self.read_key()?;
                    let value = self.read_value()?;
                    pairs.push((key, value));
                }
                self.pos += 1;
                Ok(WireValue::Dict(pairs))
            }
            _ => Err(WireError::UnknownTag { tag, at }),
        }
    }

    fn read_key(&mut self) -> WireResult<WireKey> {
        let at = self.pos;
        match self.read_value()? {
            WireValue::Str(text) => Ok(WireKey::Str(text)),
            WireValue::Int(int) => Ok(WireKey::Int(int)),
            _ => Err(WireError::InvalidKey { at }),
        }
    }

    fn read_big_int(&mut self) -> WireResult<WireValue> {
        let start = self.pos;
        loop {
            let byte = self.peek()?;
            if byte == CHR_TERM {
                break;
            }
            let literal_len = self.pos - start + 1;
            if literal_len > MAX_INT_LENGTH {
                return Err(WireError::IntTooLong { len: literal_len });
            }
            let is_digit = byte.is_ascii_digit();
            let is_sign = byte == b'-' && self.pos == start;
            if !is_digit && !is_sign {
                return Err(WireError::MalformedInt { at: self.pos });
            }
            self.pos += 1;
        }
        let digits = std::str::from_utf8(&self.buf[start..self.pos])
            .expect("digits are ASCII")
            .to_owned();
        self.pos += 1;
        if digits.is_empty() || digits == "-" {
            return Err(WireError::MalformedInt { at: start });
        }
        // Values that fit i64 normalize to Int so round-trips are stable.
        match digits.parse::<i64>() {
            Ok(value) => Ok(WireValue::Int(value)),
            Err(_) => Ok(WireValue::BigInt(digits)),
        }
    }

    fn read_prefixed_str(&mut self) -> WireResult<WireValue> {
        let start = self.pos;
        loop {
            let byte = self.peek()?;
            if byte == b':' {
                break;
            }
            if !byte.is_ascii_digit() {
                return Err(WireError::MalformedInt { at: self.pos });
            }
            let literal_len = self.pos - start + 1;
            if literal_len > MAX_INT_LENGTH {
                return Err(WireError::IntTooLong { len: literal_len });
            }
            self.pos += 1;
        }
        let len: usize = std::str::from_utf8(&self.buf[start..self.pos])
            .expect("digits are ASCII")
            .parse()
            .map_err(|_| WireError::MalformedInt { at: start })?;
        self.pos += 1;
        self.read_str_payload(len)
    }

    fn read_str_payload(&mut self, len: usize) -> WireResult<WireValue> {
        let at = self.pos;
        let bytes = self.take(len)?;
        let text = std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8 { at })?;
        Ok(WireValue::Str(text.to_owned()))
    }

    const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

/// Decode a single value, requiring the whole buffer to be consumed.
pub fn decode(buf: &[u8]) -> WireResult<WireValue> {
    let mut decoder = Decoder::new(buf);
    let value = decoder.read_value()?;
    if decoder.remaining() > 0 {
        return Err(WireError::Trailing {
            remaining: decoder.remaining(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::encode;

    #[test]
    fn truncated_buffers_raise_eof() {
        let full = encode(&WireValue::str("hello world"));
        for cut in 0..full.len() {
            let result = decode(&full[..cut]);
            assert!(
                matches!(
                    result,
                    Err(WireError::UnexpectedEof { .. }) | Err(WireError::Trailing { .. })
                ),
                "cut at {cut} should fail, got {result:?}"
            );
        }
    }

    #[test]
    fn truncated_sized_int_raises_eof() {
        let full = encode(&WireValue::Int(1_000_000));
        let result = decode(&full[..full.len() - 1]);
        assert!(matches!(result, Err(WireError::UnexpectedEof { .. })));
    }

    #[test]
    fn unterminated_list_raises_eof() {
        let mut bytes = encode(&WireValue::List((0..70).map(WireValue::Int).collect()));
        bytes.pop();
        assert!(matches!(
            decode(&bytes),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn oversized_int_literal_is_rejected() {
        let mut bytes = vec![crate::tags::CHR_INT];
        bytes.extend(std::iter::repeat_n(b'9', 80));
        bytes.push(crate::tags::CHR_TERM);
        assert!(matches!(decode(&bytes), Err(WireError::IntTooLong { .. })));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        // 58 sits in the gap between embedded ints and the list opener.
        assert!(matches!(
            decode(&[58]),
            Err(WireError::UnknownTag { tag: 58, at: 0 })
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode(&WireValue::Int(1));
        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(WireError::Trailing { remaining: 1 })
        ));
    }

    #[test]
    fn non_string_dict_keys_are_rejected() {
        // Fixed dict of one pair whose key is a list.
        let bytes = vec![
            crate::tags::DICT_FIXED_START + 1,
            crate::tags::LIST_FIXED_START,
            0,
        ];
        assert!(matches!(decode(&bytes), Err(WireError::InvalidKey { .. })));
    }

    #[test]
    fn invalid_utf8_string_is_rejected() {
        let bytes = vec![crate::tags::STR_FIXED_START + 2, 0xff, 0xfe];
        assert!(matches!(decode(&bytes), Err(WireError::InvalidUtf8 { .. })));
    }
}
