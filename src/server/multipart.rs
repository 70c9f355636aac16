//! Multipart form data parser
//!
//! Parses a collected `multipart/form-data` body into its parts. File parts
//! are sliced out of the body without copying.

use bytes::Bytes;
use thiserror::Error;

/// Multipart parsing errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MultipartError {
    #[error("Expected multipart/form-data, got: {0}")]
    NotMultipart(String),

    #[error("Missing boundary in Content-Type")]
    MissingBoundary,

    #[error("Malformed multipart body: {0}")]
    Malformed(String),
}

/// One part of a multipart form
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    /// Base name of the client-supplied filename, for file parts
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FormPart {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

/// A parsed multipart form-data submission
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    /// First file part submitted under `field`
    pub fn file(&self, field: &str) -> Option<&FormPart> {
        self.parts
            .iter()
            .find(|part| part.name == field && part.is_file())
    }

    /// Every file part submitted under `field`, in body order
    pub fn into_files(self, field: &str) -> Vec<FormPart> {
        self.parts
            .into_iter()
            .filter(|part| part.name == field && part.is_file())
            .collect()
    }
}

/// Extract the boundary from a `multipart/form-data; boundary=...` content type
pub fn extract_boundary(content_type: &str) -> Result<String, MultipartError> {
    if !content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(MultipartError::NotMultipart(content_type.to_string()));
    }

    content_type
        .split(';')
        .filter_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("boundary")
                .then(|| value.trim().trim_matches('"').to_string())
        })
        .find(|boundary| !boundary.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Parse a multipart body
///
/// The closing delimiter is required; a truncated body is rejected.
pub fn parse_multipart(body: &Bytes, boundary: &str) -> Result<MultipartForm, MultipartError> {
    let delimiter = format!("--{boundary}");
    let inner_delimiter = format!("\r\n--{boundary}");

    let first = find_bytes(body, delimiter.as_bytes(), 0)
        .ok_or_else(|| MultipartError::Malformed("missing opening boundary".into()))?;
    let mut cursor = first + delimiter.len();
    let mut parts = Vec::new();

    loop {
        let rest = &body[cursor..];
        if rest.starts_with(b"--") {
            break;
        }
        if !rest.starts_with(b"\r\n") {
            return Err(MultipartError::Malformed(
                "boundary not followed by CRLF".into(),
            ));
        }
        let part_start = cursor + 2;

        let part_end = find_bytes(body, inner_delimiter.as_bytes(), part_start)
            .ok_or_else(|| MultipartError::Malformed("missing closing boundary".into()))?;

        parts.push(parse_part(body, part_start, part_end)?);
        cursor = part_end + inner_delimiter.len();
    }

    Ok(MultipartForm { parts })
}

fn parse_part(body: &Bytes, start: usize, end: usize) -> Result<FormPart, MultipartError> {
    let raw = &body[start..end];
    let (headers_len, data_offset) = match find_bytes(raw, b"\r\n\r\n", 0) {
        Some(pos) => (pos, pos + 4),
        // Part without headers
        None if raw.starts_with(b"\r\n") => (0, 2),
        None => {
            return Err(MultipartError::Malformed(
                "part headers not terminated".into(),
            ))
        }
    };

    let headers = String::from_utf8_lossy(&raw[..headers_len]);
    let mut name = None;
    let mut filename = None;
    let mut content_type = None;

    for line in headers.split("\r\n") {
        let Some((header, value)) = line.split_once(':') else {
            continue;
        };
        if header.trim().eq_ignore_ascii_case("content-disposition") {
            for (key, param) in disposition_params(value) {
                match key.as_str() {
                    "name" => name = Some(param),
                    "filename" => filename = Some(base_name(&param)),
                    _ => {}
                }
            }
        } else if header.trim().eq_ignore_ascii_case("content-type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let name = name.ok_or_else(|| {
        MultipartError::Malformed("part without a Content-Disposition name".into())
    })?;

    Ok(FormPart {
        name,
        filename,
        content_type,
        data: body.slice(start + data_offset..end),
    })
}

/// `form-data; name="files"; filename="a.txt"` → [(name, files), (filename, a.txt)]
fn disposition_params(value: &str) -> Vec<(String, String)> {
    value
        .split(';')
        .skip(1)
        .filter_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Some((key.trim().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

/// Strip any client-side directory from a filename
fn base_name(filename: &str) -> String {
    filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename)
        .to_string()
}

fn find_bytes(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() || needle.len() > haystack.len() - from {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}
