use actix_web::{web, Responder};
use std::net::IpAddr;

use super::{run_command, DispatcherData};
use crate::dispatch::Command;

/// All conversations, busiest first
pub async fn get_conversations(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::Summary).await
}

/// Conversations carrying readable payloads
pub async fn get_readable_conversations(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::ReadableOnly).await
}

/// Conversations carrying opaque payloads
pub async fn get_encrypted_conversations(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::EncryptedOnly).await
}

/// Conversations grouped by source address
pub async fn get_conversations_by_source(dispatcher: DispatcherData) -> impl Responder {
    run_command(dispatcher, Command::GroupBySource).await
}

/// Packets of the conversation from one address to another
pub async fn get_conversation_packets(
    dispatcher: DispatcherData,
    path: web::Path<(IpAddr, IpAddr)>,
) -> impl Responder {
    let (source, destination) = path.into_inner();
    run_command(dispatcher, Command::ConversationPackets { source, destination }).await
}
