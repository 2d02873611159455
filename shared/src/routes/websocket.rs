// ============================================================================
// Message Queue WebSocket
// ============================================================================
//
// GET /api/v1/message-queue/ws
//
// The upgrade runs the full gate, so a client due for rotation gets 495
// instead of 101. After that:
// - client -> cloud: text frames, each a `PushRequest` with a fresh
//   challenge, checked per frame. An accepted frame is answered with a
//   `PushResponse` ack. A frame that fails the rotation gate closes the
//   socket with 4495 and is not acked. Any other auth failure closes
//   with 1008.
// - cloud -> client: text frames, one `BridgedMessage` each. Cached messages
//   go first. A message that fails to send is pushed back to the cache.
//
// ============================================================================

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bridge_error::AppError;
use bridge_types::{PushRequest, PushResponse, CERTIFICATE_INVALID_CLOSE_CODE};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::bus::Subscription;
use crate::cloud::seal_for_client;
use crate::context::AppContext;
use crate::routes::extractors::AuthorizedClient;
use crate::routes::messages::ingest_batch;

const WRITER_WAKEUP: Duration = Duration::from_secs(5);
const CONTROL_CAPACITY: usize = 64;

/// Frames the reader asks the writer to send.
enum Control {
    Ack(PushResponse),
    Close(CloseFrame<'static>),
}

pub async fn message_queue_socket(
    State(ctx): State<Arc<AppContext>>,
    client: AuthorizedClient,
    ws: WebSocketUpgrade,
) -> Response {
    let client_id = client.location_id;
    tracing::info!(location_id = %client_id, "Message queue socket opened");
    ws.on_upgrade(move |socket| handle_socket(ctx, client_id, socket))
}

async fn handle_socket(ctx: Arc<AppContext>, client_id: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();

    let Some(subscription) = ctx.subscriptions.subscription_for_client(&client_id).await else {
        tracing::warn!(location_id = %client_id, "No subscription for socket, closing");
        let close = CloseFrame {
            code: close_code::POLICY,
            reason: Cow::from("client not subscribed"),
        };
        let _ = sink.send(Message::Close(Some(close))).await;
        return;
    };
    let (control_tx, control_rx) = mpsc::channel::<Control>(CONTROL_CAPACITY);
    let done = CancellationToken::new();

    let writer = tokio::spawn(write_loop(
        ctx.clone(),
        client_id.clone(),
        subscription,
        sink,
        control_rx,
        done.clone(),
    ));

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(location_id = %client_id, error = %e, "Socket read failed");
                break;
            }
        };

        let request: PushRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(location_id = %client_id, error = %e, "Malformed socket frame");
                continue;
            }
        };

        if let Err(e) = ctx.authorize(&client_id, &request.auth_challenge).await {
            let close = match e {
                AppError::CertificateInvalid(_) => CloseFrame {
                    code: CERTIFICATE_INVALID_CLOSE_CODE,
                    reason: Cow::from("certificate rotation required"),
                },
                _ => CloseFrame {
                    code: close_code::POLICY,
                    reason: Cow::from("authentication failed"),
                },
            };
            e.log();
            let _ = control_tx.send(Control::Close(close)).await;
            break;
        }

        let accepted = ingest_batch(&ctx, &client_id, &request.messages).await;
        if control_tx
            .send(Control::Ack(PushResponse { accepted }))
            .await
            .is_err()
        {
            break;
        }
    }

    done.cancel();
    let _ = writer.await;
    tracing::info!(location_id = %client_id, "Message queue socket closed");
}

async fn write_loop(
    ctx: Arc<AppContext>,
    client_id: String,
    subscription: Arc<Subscription>,
    mut sink: SplitSink<WebSocket, Message>,
    mut control_rx: mpsc::Receiver<Control>,
    done: CancellationToken,
) {
    if !flush_cache(&ctx, &client_id, &mut sink).await {
        return;
    }

    loop {
        let next = tokio::select! {
            biased;
            Some(control) = control_rx.recv() => match control {
                Control::Ack(ack) => {
                    let json = match serde_json::to_string(&ack) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(location_id = %client_id, error = %e, "Failed to encode ack");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(json)).await {
                        tracing::warn!(location_id = %client_id, error = %e, "Socket send failed");
                        break;
                    }
                    continue;
                }
                Control::Close(frame) => {
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            },
            _ = done.cancelled() => break,
            next = subscription.next_message(WRITER_WAKEUP) => next,
        };

        match next {
            Ok(Some(message)) => {
                let subject = message.subject.clone();
                let bridged = match seal_for_client(&ctx, &client_id, message).await {
                    Ok(bridged) => bridged,
                    Err(e) => {
                        tracing::warn!(location_id = %client_id, subject = %subject, error = %e, "Dropping undeliverable message");
                        continue;
                    }
                };
                let json = match serde_json::to_string(&bridged) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(location_id = %client_id, error = %e, "Failed to encode message");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(json.clone())).await {
                    tracing::warn!(location_id = %client_id, error = %e, "Socket send failed, caching message");
                    requeue(&ctx, &client_id, vec![json]).await;
                    break;
                }
            }
            Ok(None) => {
                if !flush_cache(&ctx, &client_id, &mut sink).await {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(location_id = %client_id, error = %e, "Client subscription ended");
                break;
            }
        }
    }
}

/// Send everything cached for the client. False once the socket is broken.
async fn flush_cache(
    ctx: &AppContext,
    client_id: &str,
    sink: &mut SplitSink<WebSocket, Message>,
) -> bool {
    let limit = ctx.config.server.pull_limit.max(1);
    loop {
        let entries = match ctx.cache.pop(client_id, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(location_id = %client_id, error = %e, "Cache read failed");
                return true;
            }
        };
        if entries.is_empty() {
            return true;
        }
        let mut pending = entries.into_iter();
        while let Some(entry) = pending.next() {
            if let Err(e) = sink.send(Message::Text(entry.clone())).await {
                tracing::warn!(location_id = %client_id, error = %e, "Socket send failed, caching message");
                let mut rest = vec![entry];
                rest.extend(pending);
                requeue(ctx, client_id, rest).await;
                return false;
            }
        }
    }
}

async fn requeue(ctx: &AppContext, client_id: &str, entries: Vec<String>) {
    if let Err(e) = ctx.cache.push(client_id, entries).await {
        tracing::error!(location_id = %client_id, error = %e, "Failed to cache undelivered messages");
    }
}
