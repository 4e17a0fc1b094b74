//! HTML hex color parsing
//!
//! The definition language admits colors in HTML notation only:
//! `#RRGGBB` and `#RRGGBBAA`.

use image::Rgba;
use thiserror::Error;

/// Error type for color parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string doesn't start with '#'
    #[error("color in HTML notation expected")]
    MissingHash,
    /// Invalid length (must be 6 or 8 hex chars after #)
    #[error("invalid color length {0}, expected 6 or 8")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
}

/// Parse an HTML hex color string into an RGBA color.
///
/// `#RRGGBB` defaults the alpha channel to 255; `#RRGGBBAA` carries it
/// explicitly.
///
/// # Examples
///
/// ```
/// use pixpack::color::parse_color;
///
/// let magenta = parse_color("#FF00FF").unwrap();
/// assert_eq!(magenta, image::Rgba([255, 0, 255, 255]));
///
/// let translucent = parse_color("#FF00FF80").unwrap();
/// assert_eq!(translucent, image::Rgba([255, 0, 255, 128]));
/// ```
pub fn parse_color(s: &str) -> Result<Rgba<u8>, ColorError> {
    let hex = s.strip_prefix('#').ok_or(ColorError::MissingHash)?;

    for c in hex.chars() {
        if !c.is_ascii_hexdigit() {
            return Err(ColorError::InvalidHex(c));
        }
    }

    match hex.len() {
        6 => {
            let r = parse_hex_pair(&hex[0..2])?;
            let g = parse_hex_pair(&hex[2..4])?;
            let b = parse_hex_pair(&hex[4..6])?;
            Ok(Rgba([r, g, b, 255]))
        }
        8 => {
            let r = parse_hex_pair(&hex[0..2])?;
            let g = parse_hex_pair(&hex[2..4])?;
            let b = parse_hex_pair(&hex[4..6])?;
            let a = parse_hex_pair(&hex[6..8])?;
            Ok(Rgba([r, g, b, a]))
        }
        len => Err(ColorError::InvalidLength(len)),
    }
}

/// Parse a single hex digit (0-9, A-F, a-f) to u8 (0-15)
fn parse_hex_digit(c: char) -> Result<u8, ColorError> {
    match c {
        '0'..='9' => Ok(c as u8 - b'0'),
        'a'..='f' => Ok(c as u8 - b'a' + 10),
        'A'..='F' => Ok(c as u8 - b'A' + 10),
        _ => Err(ColorError::InvalidHex(c)),
    }
}

/// Parse a two-character hex string to u8 (0-255)
fn parse_hex_pair(s: &str) -> Result<u8, ColorError> {
    let mut chars = s.chars();
    let high = parse_hex_digit(chars.next().ok_or(ColorError::InvalidLength(0))?)?;
    let low = parse_hex_digit(chars.next().ok_or(ColorError::InvalidLength(1))?)?;
    Ok(high * 16 + low)
}
