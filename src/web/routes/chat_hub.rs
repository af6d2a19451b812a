use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::services::chat_hub_service::{ClientInvocation, ServerEvent};
use crate::services::identity_service::CallerIdentity;
use crate::web::middleware::auth::AuthenticatedUser;
use crate::web::AppState;

/// Upgrades an authenticated request to a hub connection. The identity is
/// fixed at handshake time and stamped on every comment sent over it.
pub async fn chat_hub_handler(
    auth_user: AuthenticatedUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| {
        let (outbound, inbound) = socket.split();
        serve_connection(inbound, outbound, state, auth_user.identity)
    })
}

/// Runs one hub connection until the client closes it or stops accepting
/// frames. Hub events and invocation errors share `outbound`; errors go only
/// to this connection.
pub async fn serve_connection<R, W>(
    mut inbound: R,
    mut outbound: W,
    state: AppState,
    identity: CallerIdentity,
) where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
    W: Sink<Message> + Unpin,
{
    let (connection_id, mut events) = state.hub.connect();
    info!(%connection_id, user = %identity, "hub connection opened");

    loop {
        tokio::select! {
            event = events.recv() => {
                // Closed when the hub dropped this connection.
                let Some(event) = event else {
                    break;
                };
                if send_event(&mut outbound, &event).await.is_err() {
                    break;
                }
            }
            incoming = inbound.next() => {
                let Some(Ok(message)) = incoming else {
                    break;
                };
                match message {
                    Message::Text(text) => {
                        if let Err(e) = handle_frame(&state, &identity, &text).await {
                            debug!(%connection_id, error = %e, "invocation rejected");
                            if send_event(&mut outbound, &ServerEvent::from_error(&e)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    state.hub.disconnect(connection_id);
    info!(%connection_id, user = %identity, "hub connection closed");
}

async fn handle_frame(state: &AppState, identity: &CallerIdentity, text: &str) -> Result<(), AppError> {
    let invocation: ClientInvocation = serde_json::from_str(text)
        .map_err(|e| AppError::validation(format!("malformed frame: {e}")))?;
    state
        .hub
        .dispatch(&state.pool, Some(identity), invocation)
        .await?;
    Ok(())
}

async fn send_event<W>(outbound: &mut W, event: &ServerEvent) -> Result<(), W::Error>
where
    W: Sink<Message> + Unpin,
{
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "failed to encode hub event");
            return Ok(());
        }
    };
    outbound.send(Message::Text(text)).await
}
