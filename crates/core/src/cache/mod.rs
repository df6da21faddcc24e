mod error;
mod keys;
mod kind;
mod serialization;
mod traits;

pub use error::{CacheError, Result};
pub use keys::prefix_key;
pub use kind::{resolve, CacheKind};
pub use serialization::{decode_scored, decode_value, decode_values, encode_value};
pub use traits::CacheBackend;
