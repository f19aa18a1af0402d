//! Encoding detection and image sniffing helpers.

use std::borrow::Cow;

// ============================================================================
// Encoding Detection
// ============================================================================

/// Decode a book's bytes to a string.
///
/// 1. Tries UTF-8 (a BOM is handled by encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1251, the usual legacy encoding of FB2 files
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1251.decode(bytes);
    result
}

/// Extract the encoding name from an XML declaration.
///
/// Only the first 100 bytes are checked.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    if after_enc.is_empty() {
        return None;
    }

    let quote = after_enc[0];
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;

    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

// ============================================================================
// Image Format Detection
// ============================================================================

/// Image formats found in FB2 `<binary>` sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Unknown,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Gif => "gif",
            ImageFormat::WebP => "webp",
            ImageFormat::Unknown => "bin",
        }
    }
}

/// Detect an image format from its magic bytes.
pub fn detect_image_format(data: &[u8]) -> ImageFormat {
    if data.len() >= 4 {
        // JPEG: FF D8
        if data[0] == 0xFF && data[1] == 0xD8 {
            return ImageFormat::Jpeg;
        }
        // PNG: 89 50 4E 47 (.PNG)
        if data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47 {
            return ImageFormat::Png;
        }
        // GIF: 47 49 46 (GIF)
        if data[0] == 0x47 && data[1] == 0x49 && data[2] == 0x46 {
            return ImageFormat::Gif;
        }
        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return ImageFormat::WebP;
        }
    }

    ImageFormat::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_xml_encoding() {
        let bytes = br#"<?xml version="1.0" encoding="windows-1251"?><FictionBook/>"#;
        assert_eq!(extract_xml_encoding(bytes), Some("windows-1251"));

        let single = b"<?xml version='1.0' encoding='utf-8'?>";
        assert_eq!(extract_xml_encoding(single), Some("utf-8"));

        assert_eq!(extract_xml_encoding(b"<FictionBook/>"), None);
    }

    #[test]
    fn test_decode_text_utf8_passthrough() {
        let text = "Привет";
        assert!(matches!(decode_text(text.as_bytes(), None), Cow::Borrowed("Привет")));
    }

    #[test]
    fn test_decode_text_cp1251() {
        // "Да" in Windows-1251
        let bytes = [0xC4, 0xE0];
        assert_eq!(decode_text(&bytes, Some("windows-1251")), "Да");
        // No hint: the FB2 legacy default applies
        assert_eq!(decode_text(&bytes, None), "Да");
    }

    #[test]
    fn test_detect_image_format_by_magic_bytes() {
        assert_eq!(detect_image_format(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(
            detect_image_format(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            ImageFormat::Png
        );
        assert_eq!(detect_image_format(b"GIF89a"), ImageFormat::Gif);
        assert_eq!(detect_image_format(b"RIFF\0\0\0\0WEBPVP8 "), ImageFormat::WebP);
        assert_eq!(detect_image_format(b"??"), ImageFormat::Unknown);
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
    }
}
