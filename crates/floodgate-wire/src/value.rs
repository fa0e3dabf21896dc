//! Value domain for the binary wire format.

/// Keys permitted in wire dictionaries: strings or numbers only.
#[derive(Debug, Clone, PartialEq)]
pub enum WireKey {
    /// UTF-8 string key.
    Str(String),
    /// Integer key.
    Int(i64),
}

impl From<&str> for WireKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for WireKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for WireKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// One value in the wire format's domain.
///
/// Dictionaries preserve insertion order; lookups are linear, which is fine
/// for the small maps the backends exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum WireValue {
    /// Signed integer encoded in the smallest fitting form.
    Int(i64),
    /// Integer too large for 64 bits, carried as its decimal digits.
    BigInt(String),
    /// 32-bit float.
    Float32(f32),
    /// 64-bit float.
    Float64(f64),
    /// UTF-8 string.
    Str(String),
    /// Boolean.
    Bool(bool),
    /// Null sentinel.
    Null,
    /// Ordered list of values.
    List(Vec<WireValue>),
    /// Ordered key/value pairs.
    Dict(Vec<(WireKey, WireValue)>),
}

impl WireValue {
    /// Build a string value.
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Build a dictionary from an ordered pair list.
    #[must_use]
    pub fn dict(pairs: impl IntoIterator<Item = (WireKey, WireValue)>) -> Self {
        Self::Dict(pairs.into_iter().collect())
    }

    /// Integer view of this value.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Unsigned view, clamping negatives to `None`.
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Int(value) if *value >= 0 => Some(value.unsigned_abs()),
            _ => None,
        }
    }

    /// Float view; integers widen losslessly enough for rate math.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        #[allow(clippy::cast_precision_loss)]
        match self {
            Self::Float64(value) => Some(*value),
            Self::Float32(value) => Some(f64::from(*value)),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// String view.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// Boolean view.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// List view.
    #[must_use]
    pub fn as_list(&self) -> Option<&[WireValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary view.
    #[must_use]
    pub fn as_dict(&self) -> Option<&[(WireKey, WireValue)]> {
        match self {
            Self::Dict(pairs) => Some(pairs),
            _ => None,
        }
    }

    /// Look up a string-keyed dictionary entry.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&WireValue> {
        self.as_dict()?.iter().find_map(|(k, v)| match k {
            WireKey::Str(name) if name == key => Some(v),
            _ => None,
        })
    }
}

impl From<i64> for WireValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for WireValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for WireValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<WireValue>> for WireValue {
    fn from(items: Vec<WireValue>) -> Self {
        Self::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_lookup_finds_string_keys() {
        let value = WireValue::dict([
            (WireKey::from("name"), WireValue::str("demo")),
            (WireKey::from(7_i64), WireValue::Int(42)),
        ]);
        assert_eq!(value.get("name").and_then(WireValue::as_str), Some("demo"));
        assert!(value.get("missing").is_none());
    }

    #[test]
    fn numeric_views_respect_sign() {
        assert_eq!(WireValue::Int(-1).as_u64(), None);
        assert_eq!(WireValue::Int(9).as_u64(), Some(9));
        assert_eq!(WireValue::Int(9).as_f64(), Some(9.0));
    }
}
