//! Upload extraction from `multipart/form-data` bodies.

use crate::error::{ApkDockError, Result};
use crate::orchestrator::{accepts_part, Upload};
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Request};
use multer::{Constraints, Multipart, SizeLimit};
use tracing::debug;

/// Form field carrying the package.
pub const UPLOAD_FIELD: &str = "apk";

/// Slack on top of the file ceiling for boundaries and part headers.
const ENVELOPE_BYTES: u64 = 64 * 1024;

pub const NO_APK_MESSAGE: &str = "No APK file provided or invalid file type";

/// Pull the first acceptable `apk` part out of the request body.
///
/// Parts that fail the APK filter are dropped silently; only the absence of
/// any accepted part is an error.
pub async fn extract_upload(req: Request<Body>, max_bytes: u64) -> Result<Upload> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApkDockError::Validation(NO_APK_MESSAGE.to_string()))?;
    let boundary = multer::parse_boundary(content_type)
        .map_err(|_| ApkDockError::Validation(NO_APK_MESSAGE.to_string()))?;

    let constraints = Constraints::new().size_limit(
        SizeLimit::new()
            .per_field(max_bytes)
            .whole_stream(max_bytes.saturating_add(ENVELOPE_BYTES)),
    );
    let mut multipart = Multipart::with_constraints(req.into_body(), boundary, constraints);

    let mut accepted: Option<Upload> = None;
    while let Some(field) = multipart.next_field().await.map_err(from_multer)? {
        if field.name() != Some(UPLOAD_FIELD) || accepted.is_some() {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(|m| m.essence_str().to_string());
        if !accepts_part(filename.as_deref(), content_type.as_deref()) {
            debug!(?filename, ?content_type, "Dropping non-APK part");
            continue;
        }
        let data = field.bytes().await.map_err(from_multer)?;
        accepted = Some(Upload::new(filename.unwrap_or_default(), content_type, data));
    }

    accepted.ok_or_else(|| ApkDockError::Validation(NO_APK_MESSAGE.to_string()))
}

fn from_multer(err: multer::Error) -> ApkDockError {
    match err {
        multer::Error::FieldSizeExceeded { limit, .. } | multer::Error::StreamSizeExceeded { limit } => {
            ApkDockError::Validation(format!(
                "File exceeds the maximum allowed size of {} bytes",
                limit
            ))
        }
        other => ApkDockError::Validation(format!("Malformed upload: {}", other)),
    }
}
