//! Length-prefixed, type-tagged binary codec for the binary-RPC backend.
//!
//! The format is a compact superset of a bencode-style scheme: small
//! integers and short strings/lists/dictionaries embed their value or length
//! directly in the type tag, larger values carry explicit sizes, and
//! variable-length containers are terminator-delimited. Encoding and
//! decoding are exact inverses over the full value domain.

pub mod decode;
pub mod encode;
pub mod error;
pub mod tags;
pub mod value;

pub use decode::decode;
pub use encode::encode;
pub use error::{WireError, WireResult};
pub use value::{WireKey, WireValue};
