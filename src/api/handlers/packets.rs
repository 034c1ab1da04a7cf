use actix_web::{web, Responder};

use super::{run_command, DispatcherData};
use crate::dispatch::Command;

/// Get a specific packet by ID
pub async fn get_packet(dispatcher: DispatcherData, path: web::Path<u64>) -> impl Responder {
    let id = path.into_inner();
    run_command(dispatcher, Command::Packet { id }).await
}

/// Queue a description of a packet; the result arrives later
pub async fn request_detail(dispatcher: DispatcherData, path: web::Path<u64>) -> impl Responder {
    let packet_id = path.into_inner();
    run_command(dispatcher, Command::RequestDetail { packet_id }).await
}
