//! Content type detection for served and uploaded files.

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Types accepted by upload.
pub const ALLOWED_UPLOAD_TYPES: &[&str] = &["image/jpeg", "image/png", "application/pdf"];

/// Guess a MIME type from the file extension.
pub fn from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "txt" | "log" => "text/plain; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "js" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

/// Detect a MIME type from leading bytes.
pub fn sniff(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(512)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if head.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else if !head.is_empty() && std::str::from_utf8(head).is_ok() {
        "text/plain; charset=utf-8"
    } else {
        OCTET_STREAM
    }
}

/// Content type for serving a stored file.
pub fn for_file(path: &Path, data: &[u8]) -> &'static str {
    from_extension(path).unwrap_or_else(|| sniff(data))
}
