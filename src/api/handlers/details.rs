use actix_web::{web, Responder};
use uuid::Uuid;

use super::{run_command, DispatcherData};
use crate::dispatch::Command;

/// Pending or finished state of a detail request
pub async fn get_detail(dispatcher: DispatcherData, path: web::Path<Uuid>) -> impl Responder {
    let request_id = path.into_inner();
    run_command(dispatcher, Command::DetailStatus { request_id }).await
}

/// Cancel a detail request
pub async fn cancel_detail(dispatcher: DispatcherData, path: web::Path<Uuid>) -> impl Responder {
    let request_id = path.into_inner();
    run_command(dispatcher, Command::CancelDetail { request_id }).await
}
