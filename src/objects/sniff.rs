//! Content type detection from leading bytes
//!
//! Looks at no more than the first 512 bytes, the same window browsers use.
//! Uploaded objects are stored with the sniffed type; a client-declared type
//! is never trusted.

/// Number of leading bytes considered
pub const SNIFF_LEN: usize = 512;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Exact signatures matched against the start of the payload
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"%PDF-", "application/pdf"),
    (b"%!PS-Adobe-", "application/postscript"),
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xFF\xD8\xFF", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"BM", "image/bmp"),
    (b"\x00\x00\x01\x00", "image/x-icon"),
    (b"\x00\x00\x02\x00", "image/x-icon"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x1F\x8B\x08", "application/x-gzip"),
    (b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    (b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    (b"7z\xBC\xAF\x27\x1C", "application/x-7z-compressed"),
    (b"OggS\x00", "application/ogg"),
    (b"ID3", "audio/mpeg"),
    (b"fLaC", "audio/flac"),
    (b"\x1A\x45\xDF\xA3", "video/webm"),
    (b"\x00asm", "application/wasm"),
    (b"\xEF\xBB\xBF", TEXT_PLAIN),
    (b"\xFE\xFF", "text/plain; charset=utf-16be"),
    (b"\xFF\xFE", "text/plain; charset=utf-16le"),
];

/// Tags that mark a document as HTML when they open it
const HTML_TAGS: &[&[u8]] = &[
    b"<!DOCTYPE HTML",
    b"<HTML",
    b"<HEAD",
    b"<SCRIPT",
    b"<IFRAME",
    b"<H1",
    b"<DIV",
    b"<FONT",
    b"<TABLE",
    b"<A",
    b"<STYLE",
    b"<TITLE",
    b"<B",
    b"<BODY",
    b"<BR",
    b"<P",
    b"<!--",
];

/// Detect the MIME type of `data`
///
/// Always returns a valid type. Empty input is plain text; anything
/// unrecognised containing control bytes is `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];

    if let Some((_, mime)) = SIGNATURES.iter().find(|(sig, _)| data.starts_with(sig)) {
        return *mime;
    }

    if let Some(mime) = riff_type(data) {
        return mime;
    }

    if is_mp4(data) {
        return "video/mp4";
    }

    let text = trim_leading_whitespace(data);
    if HTML_TAGS.iter().any(|tag| opens_with_tag(text, tag)) {
        return "text/html; charset=utf-8";
    }
    if text.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }

    if data.iter().any(|&b| is_binary_byte(b)) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}

fn riff_type(data: &[u8]) -> Option<&'static str> {
    if data.len() < 12 || &data[..4] != b"RIFF" {
        return None;
    }
    match &data[8..12] {
        b"WEBP" => Some("image/webp"),
        b"WAVE" => Some("audio/wave"),
        b"AVI " => Some("video/avi"),
        _ => None,
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if box_size < 12 || box_size > data.len() || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    // Major brand at 8..12, compatible brands from 16 onward; 12..16 is the version
    (8..box_size)
        .step_by(4)
        .filter(|&offset| offset != 12 && offset + 3 <= box_size)
        .any(|offset| &data[offset..offset + 3] == b"mp4")
}

fn trim_leading_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' '))
        .unwrap_or(data.len());
    &data[start..]
}

/// Case-insensitive tag match followed by a space or `>`
fn opens_with_tag(data: &[u8], tag: &[u8]) -> bool {
    if data.len() <= tag.len() {
        return false;
    }
    let matches = data
        .iter()
        .zip(tag)
        .all(|(b, t)| b.to_ascii_uppercase() == *t);
    if !matches {
        return false;
    }
    if tag == b"<!--" {
        return true;
    }
    matches!(data[tag.len()], b' ' | b'>')
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text() {
        assert_eq!(detect_content_type(b"hello"), TEXT_PLAIN);
        assert_eq!(detect_content_type(b""), TEXT_PLAIN);
    }

    #[test]
    fn test_binary_falls_back_to_octet_stream() {
        assert_eq!(detect_content_type(&[0x00, 0x01, 0x02, 0xFF]), OCTET_STREAM);
    }

    #[test]
    fn test_known_signatures() {
        assert_eq!(detect_content_type(b"%PDF-1.7\n..."), "application/pdf");
        assert_eq!(
            detect_content_type(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR"),
            "image/png"
        );
        assert_eq!(detect_content_type(b"\xFF\xD8\xFF\xE0JFIF"), "image/jpeg");
        assert_eq!(detect_content_type(b"GIF89a\x01\x00"), "image/gif");
        assert_eq!(detect_content_type(b"PK\x03\x04rest"), "application/zip");
    }

    #[test]
    fn test_riff_containers() {
        assert_eq!(detect_content_type(b"RIFF\x24\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(detect_content_type(b"RIFF\x24\x00\x00\x00WAVEfmt "), "audio/wave");
    }

    #[test]
    fn test_mp4() {
        let mut data = Vec::new();
        data.extend_from_slice(&24u32.to_be_bytes());
        data.extend_from_slice(b"ftypmp42\x00\x00\x00\x00mp42isom");
        assert_eq!(detect_content_type(&data), "video/mp4");
    }

    #[test]
    fn test_html_and_xml() {
        assert_eq!(
            detect_content_type(b"  \n<!doctype html><html>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            detect_content_type(b"<p>paragraph</p>"),
            "text/html; charset=utf-8"
        );
        assert_eq!(
            detect_content_type(b"<?xml version=\"1.0\"?><root/>"),
            "text/xml; charset=utf-8"
        );
        // Not a tag boundary
        assert_eq!(detect_content_type(b"<pre-formatted"), TEXT_PLAIN);
    }

    #[test]
    fn test_only_first_512_bytes_considered() {
        let mut data = vec![b'a'; SNIFF_LEN];
        data.push(0x00);
        assert_eq!(detect_content_type(&data), TEXT_PLAIN);
    }
}
