//! Byte-range file streaming.
//!
//! Each response opens its own file handle and streams only the requested
//! window, so overlapping requests for the same file are independent.

use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::library::LibraryError;

/// Inclusive byte window of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the window
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Returns `Ok(None)` when there is no header or it is not a single
/// `bytes=` range (the whole file is served). A well-formed range outside
/// the file is `RangeNotSatisfiable`.
pub fn parse_range(header: Option<&str>, size: u64) -> Result<Option<ByteRange>, LibraryError> {
    let Some(ranges) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return Ok(None);
    };
    if ranges.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());

    let unsatisfiable = || Err(LibraryError::RangeNotSatisfiable { size });

    if start.is_empty() {
        // Suffix form: the last N bytes
        let Ok(suffix) = end.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || size == 0 {
            return unsatisfiable();
        }
        return Ok(Some(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        }));
    }

    let Ok(start) = start.parse::<u64>() else {
        return Ok(None);
    };
    let end = if end.is_empty() {
        match size.checked_sub(1) {
            Some(last) => last,
            None => return unsatisfiable(),
        }
    } else {
        match end.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return Ok(None),
        }
    };

    if start > end || end >= size {
        return unsatisfiable();
    }
    Ok(Some(ByteRange { start, end }))
}

/// Content type for a served file, by extension
pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Serve `path`, honoring the request's `Range` header.
///
/// With `head_only` the headers are computed the same way but the file is
/// not opened.
pub async fn serve_file(
    path: &Path,
    request_headers: &HeaderMap,
    head_only: bool,
) -> Result<Response, LibraryError> {
    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => meta,
        Ok(_) => return Err(LibraryError::not_found("File not found")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(LibraryError::not_found("File not found"))
        }
        Err(e) => return Err(e.into()),
    };
    let size = meta.len();

    let range_header = request_headers
        .get(axum::http::header::RANGE)
        .and_then(|v| v.to_str().ok());
    let range = parse_range(range_header, size)?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(mime_for(path)));
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let (status, start, length) = match range {
        Some(r) => {
            headers.insert(
                CONTENT_RANGE,
                header_value(format!("bytes {}-{}/{}", r.start, r.end, size))?,
            );
            (StatusCode::PARTIAL_CONTENT, r.start, r.length())
        }
        None => (StatusCode::OK, 0, size),
    };
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

    debug!(
        "Serving {} [{}+{} of {}]",
        path.display(),
        start,
        length,
        size
    );

    if head_only {
        return Ok((status, headers).into_response());
    }

    let mut file = tokio::fs::File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    let body = Body::from_stream(ReaderStream::new(file.take(length)));

    Ok((status, headers, body).into_response())
}

pub(crate) fn header_value(value: String) -> Result<HeaderValue, LibraryError> {
    HeaderValue::try_from(value).map_err(|e| LibraryError::invalid(e.to_string()))
}
