use sha2::{Digest, Sha256};

pub const DEFAULT_SATURATION: u8 = 70;
pub const DEFAULT_LIGHTNESS: u8 = 80;

/// Stable pastel color for a token's text, as a CSS `hsl(...)` string.
///
/// The hue comes from the first two digest bytes, so equal texts always get the
/// same chip color across requests and tokenizers.
pub fn string_to_color(text: &str, saturation: u8, lightness: u8) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let hue = u16::from_be_bytes([digest[0], digest[1]]) % 360;
    format!("hsl({}, {}%, {}%)", hue, saturation, lightness)
}

pub fn token_color(text: &str) -> String {
    string_to_color(text, DEFAULT_SATURATION, DEFAULT_LIGHTNESS)
}
