use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::api::handlers::{
    capture::{get_capture_status, list_interfaces, load_capture, save_capture, start_capture, stop_capture},
    conversations::{
        get_conversation_packets, get_conversations, get_conversations_by_source,
        get_encrypted_conversations, get_readable_conversations,
    },
    details::{cancel_detail, get_detail},
    packets::{get_packet, request_detail},
};
use crate::api::websocket::ws_index;

/// Root endpoint to provide information about the API
async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "name": "sniffsight API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "endpoints": [
            { "path": "/api/interfaces", "method": "GET", "description": "List available network interfaces" },
            { "path": "/api/capture/start", "method": "POST", "description": "Start packet capture" },
            { "path": "/api/capture/stop", "method": "POST", "description": "Request the capture to stop" },
            { "path": "/api/capture/status", "method": "GET", "description": "Engine state and session statistics" },
            { "path": "/api/capture/save", "method": "POST", "description": "Save captured packets to a pcap file" },
            { "path": "/api/capture/load", "method": "POST", "description": "Load packets from a pcap file" },
            { "path": "/api/conversations", "method": "GET", "description": "Conversations, most packets first" },
            { "path": "/api/conversations/readable", "method": "GET", "description": "Conversations with readable payloads" },
            { "path": "/api/conversations/encrypted", "method": "GET", "description": "Conversations with opaque payloads" },
            { "path": "/api/conversations/by-source", "method": "GET", "description": "Conversations grouped by source address" },
            { "path": "/api/conversations/{source}/{destination}", "method": "GET", "description": "Packets of one conversation" },
            { "path": "/api/packets/{id}", "method": "GET", "description": "Get a specific packet" },
            { "path": "/api/packets/{id}/detail", "method": "POST", "description": "Request a packet description" },
            { "path": "/api/details/{request_id}", "method": "GET", "description": "Get a description request" },
            { "path": "/api/details/{request_id}", "method": "DELETE", "description": "Cancel a description request" },
            { "path": "/api/ws", "method": "GET", "description": "WebSocket endpoint for engine events" }
        ]
    }))
}

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index)).service(
        web::scope("/api")
            // WebSocket route for engine events
            .route("/ws", web::get().to(ws_index))
            .route("/interfaces", web::get().to(list_interfaces))
            // Capture management
            .service(
                web::scope("/capture")
                    .route("/start", web::post().to(start_capture))
                    .route("/stop", web::post().to(stop_capture))
                    .route("/status", web::get().to(get_capture_status))
                    .route("/save", web::post().to(save_capture))
                    .route("/load", web::post().to(load_capture)),
            )
            .service(
                web::scope("/conversations")
                    .route("", web::get().to(get_conversations))
                    .route("/readable", web::get().to(get_readable_conversations))
                    .route("/encrypted", web::get().to(get_encrypted_conversations))
                    .route("/by-source", web::get().to(get_conversations_by_source))
                    .route("/{source}/{destination}", web::get().to(get_conversation_packets)),
            )
            // Packet data
            .service(
                web::scope("/packets")
                    .route("/{id}", web::get().to(get_packet))
                    .route("/{id}/detail", web::post().to(request_detail)),
            )
            .service(
                web::scope("/details")
                    .route("/{request_id}", web::get().to(get_detail))
                    .route("/{request_id}", web::delete().to(cancel_detail)),
            ),
    );
}
