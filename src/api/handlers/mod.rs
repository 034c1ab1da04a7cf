pub mod capture;
pub mod conversations;
pub mod details;
pub mod packets;

use actix_web::{web, HttpResponse};
use log::error;
use std::sync::Arc;

use crate::dispatch::{Command, Dispatcher};
use crate::utils::error::AppError;

/// Shared handle the handlers dispatch through
pub type DispatcherData = web::Data<Arc<Dispatcher>>;

/// Run a command on the blocking pool and turn the reply into a response
pub async fn run_command(dispatcher: DispatcherData, command: Command) -> HttpResponse {
    let dispatcher = dispatcher.into_inner();
    match web::block(move || dispatcher.dispatch(command)).await {
        Ok(Ok(reply)) => HttpResponse::Ok().json(reply),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            error!("Command worker failed: {}", e);
            HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "message": "Internal error"
            }))
        }
    }
}

/// Map an application error onto an HTTP status
pub fn error_response(e: &AppError) -> HttpResponse {
    let mut response = match e {
        AppError::UnknownPacket(_)
        | AppError::UnknownRequest(_)
        | AppError::UnknownConversation { .. } => HttpResponse::NotFound(),
        AppError::AlreadyRunning(_) | AppError::NotRunning => HttpResponse::Conflict(),
        AppError::SourceError(_) | AppError::CaptureFileError(_) => HttpResponse::BadRequest(),
        AppError::PipelineClosed => HttpResponse::ServiceUnavailable(),
        _ => {
            error!("Command failed: {}", e);
            HttpResponse::InternalServerError()
        }
    };
    response.json(serde_json::json!({
        "status": "error",
        "message": e.to_string()
    }))
}
