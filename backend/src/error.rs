use actix_multipart::MultipartError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ApiErrorBody;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No files provided")]
    MissingFiles,
    #[error("Invalid multipart payload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Inference worker failed")]
    Blocking(#[from] actix_web::error::BlockingError),
    /// Some images in the batch failed. `client` is set when every failure
    /// was caused by the uploaded content.
    #[error("{}", .body.error)]
    Batch { client: bool, body: ApiErrorBody },
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MissingFiles | ServiceError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServiceError::Batch { client: true, .. } => StatusCode::BAD_REQUEST,
            ServiceError::Batch { client: false, .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ServiceError::Batch { body, .. } => body.clone(),
            other => ApiErrorBody::new(other.to_string()),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use shared::ApiFailure;

    #[actix_web::test]
    async fn missing_files_is_json_400() {
        let resp = ServiceError::MissingFiles.error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "No files provided" }));
    }

    #[actix_web::test]
    async fn batch_failure_keeps_per_file_details() {
        let err = ServiceError::Batch {
            client: false,
            body: ApiErrorBody {
                error: "Inference failed for one or more images".into(),
                failures: vec![ApiFailure {
                    image_id: 1,
                    filename: Some("b.png".into()),
                    error: "Inference failed".into(),
                }],
                results: vec![],
            },
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: ApiErrorBody = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.failures.len(), 1);
        assert_eq!(body.failures[0].image_id, 1);
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        let err = ServiceError::Timeout(Duration::from_secs(3));
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
