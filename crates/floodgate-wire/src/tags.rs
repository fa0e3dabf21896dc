//! Type-tag table for the binary wire format.
//!
//! Single-byte tags; short integers, strings, lists, and dictionaries embed
//! their value or length directly in the tag.

/// List opener for lists of 64 or more items.
pub const CHR_LIST: u8 = 59;
/// Dictionary opener for dictionaries of 25 or more pairs.
pub const CHR_DICT: u8 = 60;
/// ASCII big-integer opener; terminated by [`CHR_TERM`].
pub const CHR_INT: u8 = 61;
/// 1-byte signed integer.
pub const CHR_INT1: u8 = 62;
/// 2-byte big-endian signed integer.
pub const CHR_INT2: u8 = 63;
/// 4-byte big-endian signed integer.
pub const CHR_INT4: u8 = 64;
/// 8-byte big-endian signed integer.
pub const CHR_INT8: u8 = 65;
/// 32-bit IEEE-754 float.
pub const CHR_FLOAT32: u8 = 66;
/// 64-bit IEEE-754 float.
pub const CHR_FLOAT64: u8 = 44;
/// Boolean true.
pub const CHR_TRUE: u8 = 67;
/// Boolean false.
pub const CHR_FALSE: u8 = 68;
/// Null sentinel.
pub const CHR_NONE: u8 = 69;
/// Terminator for variable-length containers and big integers.
pub const CHR_TERM: u8 = 127;

/// First tag for embedded non-negative integers (`0..=43`).
pub const INT_POS_FIXED_START: u8 = 0;
/// Number of embedded non-negative integer tags.
pub const INT_POS_FIXED_COUNT: u8 = 44;
/// First tag for embedded negative integers (`-1..=-32`).
pub const INT_NEG_FIXED_START: u8 = 70;
/// Number of embedded negative integer tags.
pub const INT_NEG_FIXED_COUNT: u8 = 32;
/// First tag for length-embedded strings.
pub const STR_FIXED_START: u8 = 128;
/// Number of length-embedded string tags.
pub const STR_FIXED_COUNT: u8 = 64;
/// First tag for length-embedded lists.
pub const LIST_FIXED_START: u8 = STR_FIXED_START + STR_FIXED_COUNT;
/// Number of length-embedded list tags.
pub const LIST_FIXED_COUNT: u8 = 64;
/// First tag for length-embedded dictionaries.
pub const DICT_FIXED_START: u8 = 102;
/// Number of length-embedded dictionary tags.
pub const DICT_FIXED_COUNT: u8 = 25;

/// Longest accepted ASCII integer/length literal; guards malformed input.
pub const MAX_INT_LENGTH: usize = 64;
