use actix_files::Files;
use actix_web::http::header::{self, ContentType};
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use log::{info, warn};
use serde_json::json;
use shared::{ApiErrorBody, ApiFailure, ApiPrediction};
use std::path::PathBuf;
use uuid::Uuid;

use crate::batch::{FileOutcome, Validation, run_batch};
use crate::config::AppConfig;
use crate::error::ServiceError;
use crate::inference::service::InferenceService;
use crate::upload::{Upload, read_files};
use crate::views::{render_error, render_index};

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: PathBuf) {
    cfg.service(web::resource("/upload").route(web::get().to(upload_form)))
        .service(
            web::resource("/predict")
                .route(web::get().to(upload_form))
                .route(web::post().to(predict_form)),
        )
        .service(web::resource("/predict-api").route(web::post().to(predict_api)))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(Files::new("/static", static_dir));
}

async fn upload_form() -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(render_index(None))
}

async fn health(service: web::Data<InferenceService>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "model": service.model_name(),
    }))
}

/// Form endpoint. Failures are answered with the form page and a notice
/// instead of a JSON body.
async fn predict_form(
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<InferenceService>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let request_id = Uuid::new_v4();
    match classify_form(&req, payload, service, &config, request_id).await {
        Ok(response) => response,
        Err(e) => {
            warn!("[{}] /predict failed: {}", request_id, e);
            HttpResponse::build(e.status_code())
                .content_type(ContentType::html())
                .body(render_error(&e.to_string()))
        }
    }
}

async fn classify_form(
    req: &HttpRequest,
    payload: web::Payload,
    service: web::Data<InferenceService>,
    config: &AppConfig,
    request_id: Uuid,
) -> Result<HttpResponse, ServiceError> {
    let Some(uploads) = read_files(req, payload, config.server.max_upload_bytes).await? else {
        info!("[{}] /predict without files, redirecting", request_id);
        return Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, req.uri().to_string()))
            .finish());
    };

    info!("[{}] /predict received {} file(s)", request_id, uploads.len());
    let (uploads, outcomes) = run_batch(
        service,
        uploads,
        Validation::Extension,
        request_id,
        config.request_timeout(),
    )
    .await?;

    Ok(HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(render_index(Some((uploads.as_slice(), outcomes.as_slice())))))
}

/// JSON endpoint. Files are not screened by extension here; anything the
/// decoder cannot read is reported per image instead.
async fn predict_api(
    req: HttpRequest,
    payload: web::Payload,
    service: web::Data<InferenceService>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ServiceError> {
    let request_id = Uuid::new_v4();
    let uploads = read_files(&req, payload, config.server.max_upload_bytes)
        .await?
        .ok_or(ServiceError::MissingFiles)?;

    info!("[{}] /predict-api received {} file(s)", request_id, uploads.len());
    let (uploads, outcomes) = run_batch(
        service,
        uploads,
        Validation::ContentOnly,
        request_id,
        config.request_timeout(),
    )
    .await?;

    let (results, failures, client) = summarize(&uploads, outcomes);
    if failures.is_empty() {
        return Ok(HttpResponse::Ok().json(results));
    }

    let error = if client {
        "One or more images could not be decoded"
    } else {
        "Inference failed for one or more images"
    };
    Err(ServiceError::Batch {
        client,
        body: ApiErrorBody {
            error: error.to_string(),
            failures,
            results,
        },
    })
}

/// Splits outcomes into API entries. The flag is true when every failure was
/// the client's fault.
fn summarize(
    uploads: &[Upload],
    outcomes: Vec<FileOutcome>,
) -> (Vec<ApiPrediction>, Vec<ApiFailure>, bool) {
    let mut results = Vec::new();
    let mut failures = Vec::new();
    let mut client = true;

    for (image_id, (upload, outcome)) in uploads.iter().zip(outcomes).enumerate() {
        let error = match outcome {
            FileOutcome::Classified(prediction) => {
                results.push(ApiPrediction {
                    image_id,
                    class_label: prediction.label,
                    probability: prediction.probability,
                });
                continue;
            }
            FileOutcome::Rejected => "Unsupported file type".to_string(),
            FileOutcome::Failed(e) if e.is_client_error() => e.to_string(),
            FileOutcome::Failed(_) => {
                client = false;
                "Inference failed".to_string()
            }
        };
        failures.push(ApiFailure {
            image_id,
            filename: upload.filename.clone(),
            error,
        });
    }

    (results, failures, client)
}
