mod decoder;
mod encoder;
mod value;

pub use decoder::{decode, decode_prefix, dict_value_span};
pub use encoder::encode;
pub use value::BencodeValue;
