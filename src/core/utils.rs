use anyhow::{bail, Context, Result};

/// Parse a hex string into bytes
/// Supports various formats:
/// - "00A40400" (pure hex)
/// - "00 A4 04 00" (space-separated)
/// - "0x00,0xA4,0x04,0x00" (0x prefix with commas)
/// - "00:A4:04:00" (colon-separated)
pub fn parse_hex(hex_str: &str) -> Result<Vec<u8>> {
    let cleaned = clean_hex_string(hex_str);

    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    if cleaned.len() % 2 != 0 {
        bail!(
            "Hex string must have even number of characters: '{}'",
            hex_str
        );
    }

    hex::decode(&cleaned).with_context(|| format!("Invalid hex string: '{hex_str}'"))
}

/// Clean a hex string by removing common separators and prefixes
fn clean_hex_string(hex_str: &str) -> String {
    hex_str
        .trim()
        .replace("0x", "")
        .replace("0X", "")
        .replace([' ', ',', ':', '-', '\t', '\n', '\r'], "")
        .to_uppercase()
}

/// Format bytes as an uppercase hex string
pub fn format_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Format bytes as a hex string with spaces
pub fn format_hex_spaced(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format bytes as ASCII, replacing non-printable chars with '.'
pub fn format_ascii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_various_formats() {
        assert_eq!(parse_hex("00A40400").unwrap(), vec![0x00, 0xA4, 0x04, 0x00]);
        assert_eq!(
            parse_hex("00 A4 04 00").unwrap(),
            vec![0x00, 0xA4, 0x04, 0x00]
        );
        assert_eq!(
            parse_hex("0x00,0xA4,0x04,0x00").unwrap(),
            vec![0x00, 0xA4, 0x04, 0x00]
        );
        assert_eq!(
            parse_hex("00:a4:04:00").unwrap(),
            vec![0x00, 0xA4, 0x04, 0x00]
        );
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("   ").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_parse_hex_invalid() {
        assert!(parse_hex("0102030").is_err()); // Odd length
        assert!(parse_hex("0102G30A").is_err()); // Invalid hex character
        assert!(parse_hex("Z").is_err());
    }

    #[test]
    fn test_format_functions() {
        let bytes = vec![0x01, 0x02, 0x03, 0x0A];
        assert_eq!(format_hex(&bytes), "0102030A");
        assert_eq!(format_hex_spaced(&bytes), "01 02 03 0A");
        assert_eq!(format_hex(&[]), "");
        assert_eq!(format_hex_spaced(&[]), "");
    }

    #[test]
    fn test_format_ascii() {
        assert_eq!(format_ascii(b"Hello"), "Hello");
        assert_eq!(format_ascii(&[0x00, 0x01, 0x02, 0x20, 0x7F]), "... .");
    }
}
