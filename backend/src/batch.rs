use actix_web::web;
use log::{error, warn};
use std::time::Duration;
use uuid::Uuid;

use crate::error::ServiceError;
use crate::inference::InferenceError;
use crate::inference::preprocess::allowed_file;
use crate::inference::service::{InferenceService, Prediction};
use crate::upload::Upload;

/// Whether uploads are screened by file extension before decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validation {
    Extension,
    ContentOnly,
}

/// Result of processing one upload, in submission order.
#[derive(Debug)]
pub enum FileOutcome {
    Classified(Prediction),
    Rejected,
    Failed(InferenceError),
}

pub fn classify_batch(
    service: &InferenceService,
    uploads: &[Upload],
    validation: Validation,
    request_id: Uuid,
) -> Vec<FileOutcome> {
    uploads
        .iter()
        .enumerate()
        .map(|(i, upload)| {
            if validation == Validation::Extension && !allowed_file(upload.display_name()) {
                warn!(
                    "[{}] skipping file {} ({:?}): unsupported extension",
                    request_id,
                    i,
                    upload.display_name()
                );
                return FileOutcome::Rejected;
            }

            match service.classify(&upload.bytes) {
                Ok(prediction) => FileOutcome::Classified(prediction),
                Err(e) if e.is_client_error() => {
                    warn!("[{}] file {} could not be decoded: {}", request_id, i, e);
                    FileOutcome::Failed(e)
                }
                Err(e) => {
                    error!("[{}] inference failed for file {}: {}", request_id, i, e);
                    FileOutcome::Failed(e)
                }
            }
        })
        .collect()
}

/// Runs a batch on the blocking pool so inference never stalls the async
/// workers. The uploads are handed back alongside their outcomes.
pub async fn run_batch(
    service: web::Data<InferenceService>,
    uploads: Vec<Upload>,
    validation: Validation,
    request_id: Uuid,
    timeout: Duration,
) -> Result<(Vec<Upload>, Vec<FileOutcome>), ServiceError> {
    let service = service.into_inner();
    let job = web::block(move || {
        let outcomes = classify_batch(&service, &uploads, validation, request_id);
        (uploads, outcomes)
    });

    match tokio::time::timeout(timeout, job).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            error!("[{}] batch timed out after {:?}", request_id, timeout);
            Err(ServiceError::Timeout(timeout))
        }
    }
}
