use actix_multipart::Multipart;
use actix_web::error::PayloadError;
use actix_web::http::header;
use actix_web::{HttpRequest, web::Bytes};
use futures::{Stream, TryStreamExt};

use crate::error::ServiceError;

/// Multipart field carrying the uploaded images.
pub const FILES_FIELD: &str = "files[]";

/// One uploaded file, kept only for the duration of a request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or("")
    }
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Reads every `files[]` file part of the request. Only parts whose
/// Content-Disposition carries a `filename` (possibly empty) are files; plain
/// form values under the same name are ignored. Returns `None` when no file
/// part was sent, including non-multipart bodies.
pub async fn read_files<S>(
    req: &HttpRequest,
    payload: S,
    limit: usize,
) -> Result<Option<Vec<Upload>>, ServiceError>
where
    S: Stream<Item = Result<Bytes, PayloadError>> + 'static,
{
    if !is_multipart(req) {
        return Ok(None);
    }

    let mut multipart = Multipart::new(req.headers(), payload);
    let mut uploads: Option<Vec<Upload>> = None;
    let mut total = 0usize;

    while let Some(mut field) = multipart.try_next().await? {
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_owned);

        if field.name() != Some(FILES_FIELD) || filename.is_none() {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            total += chunk.len();
            if total > limit {
                return Err(ServiceError::PayloadTooLarge(limit));
            }
            bytes.extend_from_slice(&chunk);
        }

        uploads.get_or_insert_with(Vec::new).push(Upload { filename, bytes });
    }

    Ok(uploads)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    pub(crate) const BOUNDARY: &str = "retina-test-boundary";

    pub(crate) fn content_type() -> String {
        format!("multipart/form-data; boundary={}", BOUNDARY)
    }

    /// Builds a multipart body from `(field, filename, bytes)` parts.
    pub(crate) fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, bytes) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            let disposition = match filename {
                Some(f) => format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    name, f
                ),
                None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", name),
            };
            body.extend_from_slice(disposition.as_bytes());
            body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn read(body: Vec<u8>, limit: usize) -> Result<Option<Vec<Upload>>, ServiceError> {
        let (req, mut payload) = TestRequest::post()
            .insert_header((header::CONTENT_TYPE, content_type()))
            .set_payload(body)
            .to_http_parts();
        read_files(&req, payload.take(), limit).await
    }

    #[actix_web::test]
    async fn collects_only_files_field() {
        let body = multipart_body(&[
            ("note", None, &b"hello"[..]),
            ("files[]", Some("a.png"), &b"first"[..]),
            ("files[]", Some("b.jpg"), &b"second"[..]),
        ]);
        let uploads = read(body, 1024).await.unwrap().unwrap();
        assert_eq!(uploads.len(), 2);
        assert_eq!(uploads[0].filename.as_deref(), Some("a.png"));
        assert_eq!(uploads[0].bytes, b"first");
        assert_eq!(uploads[1].display_name(), "b.jpg");
    }

    #[actix_web::test]
    async fn absent_field_is_none() {
        let body = multipart_body(&[("other", Some("a.png"), &b"x"[..])]);
        assert!(read(body, 1024).await.unwrap().is_none());

        let body = multipart_body(&[("files[]", None, &b"plain value"[..])]);
        assert!(read(body, 1024).await.unwrap().is_none());

        let (req, mut payload) = TestRequest::post().set_payload("plain").to_http_parts();
        let uploads = read_files(&req, payload.take(), 1024).await.unwrap();
        assert!(uploads.is_none());
    }

    #[actix_web::test]
    async fn empty_filename_still_counts_as_file() {
        let body = multipart_body(&[
            ("files[]", None, &b"plain value"[..]),
            ("files[]", Some(""), &b""[..]),
        ]);
        let uploads = read(body, 1024).await.unwrap().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename.as_deref(), Some(""));
    }

    #[actix_web::test]
    async fn enforces_upload_limit() {
        let body = multipart_body(&[("files[]", Some("big.png"), &[0u8; 64][..])]);
        let err = read(body, 16).await.unwrap_err();
        assert!(matches!(err, ServiceError::PayloadTooLarge(16)));
    }
}
