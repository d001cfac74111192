//! WebSocket server
//!
//! One task per connection. Incoming envelopes are handled concurrently, so
//! a slow answer on one conversation never blocks another; the service
//! serializes requests that target the same conversation.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use clinic_assistant_core::protocol::{ClientMessage, MessageEnvelope, ServerEvent, ServerInfo};
use clinic_assistant_core::{AssistantError, AssistantService};

pub async fn start_server(service: Arc<AssistantService>, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind server to {}", address))?;
    info!("clinic-assistant listening on ws://{}", address);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("Failed to accept connection")?;
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    debug!("Connection from {}", peer);
                    handle_connection(stream, service).await;
                    debug!("Connection from {} closed", peer);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, service: Arc<AssistantService>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<MessageEnvelope<ServerEvent>>();

    // Forward events to the socket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let json = match serde_json::to_string(&envelope) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize {} event: {}", envelope.msg_type, e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("WebSocket read failed: {}", e);
                break;
            }
        };

        match serde_json::from_str::<MessageEnvelope<ClientMessage>>(&text) {
            Ok(envelope) => {
                let service = Arc::clone(&service);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let request_id = envelope.request_id;
                    let event = handle_client_message(envelope.payload, &service).await;
                    let _ = tx.send(MessageEnvelope::event(request_id, event));
                });
            }
            Err(e) => {
                let _ = tx.send(MessageEnvelope::event(
                    None,
                    ServerEvent::error("bad_request", format!("unreadable message: {}", e)),
                ));
            }
        }
    }

    drop(tx);
    let _ = send_task.await;
}

fn error_event(error: AssistantError) -> ServerEvent {
    if !error.is_client_error() {
        warn!("Request failed: {}", error);
    }
    ServerEvent::error(error.code(), error.user_message())
}

async fn handle_client_message(msg: ClientMessage, service: &AssistantService) -> ServerEvent {
    let result = match msg {
        ClientMessage::Hello { client } => {
            info!("Client {} {} connected", client.name, client.version);
            Ok(ServerEvent::HelloAck {
                server: ServerInfo {
                    name: "clinic-assistant".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                tools: service.tools(),
            })
        }
        ClientMessage::CreateConversation { title } => Ok(ServerEvent::ConversationCreated {
            conversation: service.create_conversation(title.as_deref()),
        }),
        ClientMessage::RenameConversation {
            conversation_id,
            title,
        } => service
            .rename_conversation(conversation_id, &title)
            .await
            .map(|info| ServerEvent::Ack {
                conversation: Some(info),
            }),
        ClientMessage::ClearConversation { conversation_id } => service
            .clear_conversation(conversation_id)
            .await
            .map(|info| ServerEvent::Ack {
                conversation: Some(info),
            }),
        ClientMessage::DeleteConversation { conversation_id } => service
            .delete_conversation(conversation_id)
            .map(|()| ServerEvent::Ack { conversation: None }),
        ClientMessage::ListConversations => Ok(ServerEvent::Conversations {
            conversations: service.list_conversations().await,
        }),
        ClientMessage::SendMessage {
            conversation_id,
            text,
        } => service
            .submit(conversation_id, &text)
            .await
            .map(ServerEvent::from),
        ClientMessage::InvokeTool { tool, input } => service
            .invoke_tool(&tool, input)
            .await
            .map(|result| ServerEvent::ToolResult { result }),
    };
    result.unwrap_or_else(error_event)
}
