pub mod json;
pub mod sha1;

pub use json::{
    combine_json, decode_document, decode_updates, encode_snapshot, get_json_value,
    make_json_bool, make_json_float, make_json_int, make_json_string, CodecError,
};
pub use sha1::{sha1_digest, sha1_hex, value_etag};
