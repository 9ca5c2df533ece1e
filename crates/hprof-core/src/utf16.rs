//! UTF-16 to UTF-8 conversion for `char[]` contents.

/// Decodes big-endian UTF-16 code units. Unpaired surrogates become U+FFFD and
/// a trailing odd byte is ignored.
pub fn decode_utf16_be(bytes: &[u8]) -> String {
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
