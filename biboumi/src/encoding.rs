//! Text encoding conversion.
//!
//! IRC has no notion of a wire charset; legacy networks still send
//! Latin-1/CP1252 bytes. Grounded on `encoding_rs`, the same crate the
//! wider Rust IRC ecosystem (e.g. `aatxe-irc`) reaches for to decode
//! arbitrary IRC bytes into UTF-8 before handing them to XMPP, which is
//! UTF-8-only on the wire.

use encoding_rs::Encoding;

/// Decodes `bytes` using `charset`, falling back to UTF-8 (lossless
/// passthrough of valid UTF-8, replacement characters otherwise) when the
/// label isn't recognized. Mirrors the original's `to_utf8(bytes, charset)`
/// pure function.
pub fn to_utf8(bytes: &[u8], charset: &str) -> String {
    let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

/// Inverse of [`to_utf8`]: encodes `text` as `charset` for lines sent out to
/// an IRC server whose `encoding_out` differs from UTF-8.
pub fn from_utf8(text: &str, charset: &str) -> Vec<u8> {
    let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or(encoding_rs::UTF_8);
    let (bytes, _, _) = encoding.encode(text);
    bytes.into_owned()
}
