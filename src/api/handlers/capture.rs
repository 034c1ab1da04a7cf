use actix_web::{web, Responder};
use log::info;
use serde::Deserialize;
use std::path::PathBuf;

use super::{run_command, DispatcherData};
use crate::dispatch::Command;

/// Request for starting capture
#[derive(Deserialize)]
pub struct StartCaptureRequest {
    /// Interface to capture on
    pub interface: String,
}

/// Request naming a capture file
#[derive(Deserialize)]
pub struct CaptureFileRequest {
    pub path: PathBuf,
}

/// List available network interfaces
pub async fn list_interfaces(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::ListInterfaces).await
}

/// Start packet capture
pub async fn start_capture(
    dispatcher: DispatcherData,
    request: web::Json<StartCaptureRequest>,
) -> impl Responder {
    let interface = request.into_inner().interface;
    info!("Starting capture with interface: {}", interface);
    run_command(dispatcher, Command::Start { interface }).await
}

/// Ask the running capture to stop; completion arrives as an event
pub async fn stop_capture(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::Stop).await
}

/// Get capture status
pub async fn get_capture_status(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::Status).await
}

/// Write the current capture to a pcap file
pub async fn save_capture(
    dispatcher: DispatcherData,
    request: web::Json<CaptureFileRequest>,
) -> impl Responder {
    let path = request.into_inner().path;
    info!("Saving capture to {}", path.display());
    run_command(dispatcher, Command::Save { path }).await
}

/// Replace the current conversations with the contents of a capture file
pub async fn load_capture(
    dispatcher: DispatcherData,
    request: web::Json<CaptureFileRequest>,
) -> impl Responder {
    let path = request.into_inner().path;
    info!("Loading capture from {}", path.display());
    run_command(dispatcher, Command::Load { path }).await
}
