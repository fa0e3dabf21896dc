//! Encoder for the binary wire format.

use crate::tags::{
    CHR_DICT, CHR_FALSE, CHR_FLOAT32, CHR_FLOAT64, CHR_INT, CHR_INT1, CHR_INT2, CHR_INT4,
    CHR_INT8, CHR_LIST, CHR_NONE, CHR_TERM, CHR_TRUE, DICT_FIXED_COUNT, DICT_FIXED_START,
    INT_NEG_FIXED_COUNT, INT_NEG_FIXED_START, INT_POS_FIXED_COUNT, INT_POS_FIXED_START,
    LIST_FIXED_COUNT, LIST_FIXED_START, STR_FIXED_COUNT, STR_FIXED_START,
};
use crate::value::{WireKey, WireValue};

/// Output buffer that grows geometrically rather than per byte.
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(64),
        }
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.buf.len() + additional;
        if needed > self.buf.capacity() {
            let mut capacity = self.buf.capacity().max(64);
            while capacity < needed {
                capacity *= 2;
            }
            self.buf.reserve_exact(capacity - self.buf.len());
        }
    }

    fn push(&mut self, byte: u8) {
        self.ensure(1);
        self.buf.push(byte);
    }

    fn extend(&mut self, bytes: &[u8]) {
        self.ensure(bytes.len());
        self.buf.extend_from_slice(bytes);
    }

    fn write_value(&mut self, value: &WireValue) {
        match value {
            WireValue::Int(int) => self.write_int(*int),
            WireValue::BigInt(digits) => {
                self.push(CHR_INT);
                self.extend(digits.as_bytes());
                self.push(CHR_TERM);
            }
            WireValue::Float32(float) => {
                self.push(CHR_FLOAT32);
                self.extend(&float.to_be_bytes());
            }
            WireValue::Float64(float) => {
                self.push(CHR_FLOAT64);
                self.extend(&float.to_be_bytes());
            }
            WireValue::Str(text) => self.write_str(text),
            WireValue::Bool(true) => self.push(CHR_TRUE),
            WireValue::Bool(false) => self.push(CHR_FALSE),
            WireValue::Null => self.push(CHR_NONE),
            WireValue::List(items) => {
                if items.len() < LIST_FIXED_COUNT as usize {
                    #[allow(clippy::cast_possible_truncation)]
                    self.push(LIST_FIXED_START + items.len() as u8);
                    for item in items {
                        self.write_value(item);
                    }
                } else {
                    self.push(CHR_LIST);
                    for item in items {
                        self.write_value(item);
                    }
                    self.push(CHR_TERM);
                }
            }
            WireValue::Dict(pairs) => {
                if pairs.len() < DICT_FIXED_COUNT as usize {
                    #[allow(clippy::cast_possible_truncation)]
                    self.push(DICT_FIXED_START + pairs.len() as u8);
                    for (key, item) in pairs {
                        self.write_key(key);
                        self.write_value(item);
                    }
                } else {
                    self.push(CHR_DICT);
                    for (key, item) in pairs {
                        self.write_key(key);
                        self.write_value(item);
                    }
                    self.push(CHR_TERM);
                }
            }
        }
    }

    fn write_key(&mut self, key: &WireKey) {
        match key {
            WireKey::Str(text) => self.write_str(text),
            WireKey::Int(int) => self.write_int(*int),
        }
    }

    fn write_int(&mut self, value: i64) {
        if (0..i64::from(INT_POS_FIXED_COUNT)).contains(&value) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.push(INT_POS_FIXED_START + value as u8);
        } else if (-i64::from(INT_NEG_FIXED_COUNT)..0).contains(&value) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            self.push(INT_NEG_FIXED_START + (-1 - value) as u8);
        } else if let Ok(small) = i8::try_from(value) {
            self.push(CHR_INT1);
            self.extend(&small.to_be_bytes());
        } else if let Ok(small) = i16::try_from(value) {
            self.push(CHR_INT2);
            self.extend(&small.to_be_bytes());
        } else if let Ok(small) = i32::try_from(value) {
            self.push(CHR_INT4);
            self.extend(&small.to_be_bytes());
        } else {
            self.push(CHR_INT8);
            self.extend(&value.to_be_bytes());
        }
    }

    fn write_str(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if bytes.len() < STR_FIXED_COUNT as usize {
            #[allow(clippy::cast_possible_truncation)]
            self.push(STR_FIXED_START + bytes.len() as u8);
            self.extend(bytes);
        } else {
            self.extend(bytes.len().to_string().as_bytes());
            self.push(b':');
            self.extend(bytes);
        }
    }
}

/// Encode a value into its binary form.
#[must_use]
pub fn encode(value: &WireValue) -> Vec<u8> {
    let mut encoder = Encoder::new();
    encoder.write_value(value);
    encoder.buf
}
