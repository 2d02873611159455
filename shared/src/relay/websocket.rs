// ============================================================================
// WebSocket Relay Transport
// ============================================================================
//
// One persistent socket to /api/v1/message-queue/ws.
//
// - Every outbound message goes out at once as a one-message push frame
//   with a fresh challenge. It stays in flight until the cloud acks it.
// - Inbound frames are `BridgedMessage`s, handled as they arrive, or
//   `PushResponse` acks for our frames in send order.
// - A 495 on upgrade or a 4495 close triggers rotation, then reconnect.
//   Frames left unacked by a 4495 are resent once under the new key, and
//   dropped if the rotation fails.
// - Any other disconnect reconnects with backoff, resending unacked
//   frames first.
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_types::{
    BridgedMessage, BusMessage, PushResponse, CERTIFICATE_INVALID_CLOSE_CODE,
    CERTIFICATE_INVALID_STATUS, CHALLENGE_HEADER, CHALLENGE_SIGNATURE_HEADER, LOCATION_HEADER,
    MESSAGE_QUEUE_WS_PATH,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::{
    CertRotator, CertificateRotation, Lifecycle, RelayContext, RelayCore, RelayTransport,
    TransportError, OUTBOUND_CAPACITY,
};
use crate::retry::Backoff;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WebSocketTransport {
    ctx: RelayContext,
    lifecycle: Lifecycle,
}

impl WebSocketTransport {
    pub fn new(ctx: RelayContext) -> Self {
        Self {
            ctx,
            lifecycle: Lifecycle::default(),
        }
    }
}

#[async_trait]
impl RelayTransport for WebSocketTransport {
    async fn start_message_handler(&self, client_id: &str) -> Result<(), TransportError> {
        let ctx = self.ctx.clone();
        self.lifecycle
            .start(|cancel| async move {
                let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                let core = Arc::new(RelayCore::new(ctx.clone(), client_id, tx));
                let rotator = Arc::new(CertRotator::new(ctx, client_id));

                let mut tasks = core.spawn_pumps(cancel.clone()).await?;
                tasks.push(spawn_connection_loop(core, rotator, rx, cancel));

                tracing::info!(location_id = %client_id, transport = "websocket", "Relay started");
                Ok(tasks)
            })
            .await
    }

    async fn stop_message_handler(&self) -> Result<(), TransportError> {
        self.lifecycle.stop().await?;
        tracing::info!(transport = "websocket", "Relay stopped");
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    RotationRequired,
    Disconnected,
}

/// A message waiting for the next socket.
#[derive(Debug)]
struct Pending {
    message: BusMessage,
    /// Already resent once after a rotation.
    rotated: bool,
}

impl Pending {
    fn new(message: BusMessage) -> Self {
        Self {
            message,
            rotated: false,
        }
    }
}

fn spawn_connection_loop(
    core: Arc<RelayCore>,
    rotator: Arc<CertRotator>,
    mut rx: mpsc::Receiver<BusMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let relay = &core.context().config.relay;
        let mut backoff = Backoff::new(relay.reconnect_initial_backoff, relay.reconnect_max_backoff);
        let mut outbox: VecDeque<Pending> = VecDeque::new();

        while !cancel.is_cancelled() {
            let observed = rotator.generation();
            let rejected = match connect(&core).await {
                Ok(socket) => {
                    tracing::info!(location_id = %core.client_id(), "Message queue socket connected");
                    backoff.reset();
                    let (end, unacked) = run_session(&core, socket, &mut rx, &mut outbox, &cancel).await;
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::RotationRequired => Some(unacked),
                        SessionEnd::Disconnected => {
                            requeue_front(&mut outbox, unacked);
                            None
                        }
                    }
                }
                Err(TransportError::CertificateInvalid) => Some(VecDeque::new()),
                Err(e) => {
                    tracing::warn!(error = %e, "Socket connect failed");
                    None
                }
            };

            if let Some(rejected) = rejected {
                let retry = retry_after_rotation(rejected);
                match rotator.rotate(observed).await {
                    Ok(()) => {
                        requeue_front(&mut outbox, retry);
                        continue;
                    }
                    Err(e) => {
                        if !retry.is_empty() {
                            tracing::warn!(count = retry.len(), "Dropping messages rejected before a failed rotation");
                        }
                        tracing::warn!(error = %e, "Rotation failed, backing off");
                    }
                }
            }
            if !backoff.wait(&cancel).await {
                break;
            }
        }
    })
}

/// Messages the cloud did not ack before demanding rotation get one more
/// try under the new key. A second rejection drops them.
fn retry_after_rotation(rejected: VecDeque<Pending>) -> VecDeque<Pending> {
    rejected
        .into_iter()
        .filter_map(|pending| {
            if pending.rotated {
                tracing::warn!(subject = %pending.message.subject, "Dropping message rejected again after rotation");
                None
            } else {
                Some(Pending {
                    message: pending.message,
                    rotated: true,
                })
            }
        })
        .collect()
}

/// Put `items` ahead of the outbox in their original order. The oldest
/// overflow is dropped.
fn requeue_front(outbox: &mut VecDeque<Pending>, items: VecDeque<Pending>) {
    for pending in items.into_iter().rev() {
        outbox.push_front(pending);
    }
    while outbox.len() > OUTBOUND_CAPACITY {
        if let Some(dropped) = outbox.pop_back() {
            tracing::warn!(subject = %dropped.message.subject, "Outbox full, dropping message");
        }
    }
}

async fn connect(core: &RelayCore) -> Result<Socket, TransportError> {
    let url = core
        .context()
        .config
        .relay
        .websocket_url(MESSAGE_QUEUE_WS_PATH);
    let challenge = core.challenge().await?;

    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::Network(e.to_string()))?;
    let headers = request.headers_mut();
    headers.insert(LOCATION_HEADER, header_value(core.client_id())?);
    headers.insert(CHALLENGE_HEADER, header_value(&challenge.challenge_text)?);
    headers.insert(
        CHALLENGE_SIGNATURE_HEADER,
        header_value(&challenge.challenge_signature)?,
    );

    match tokio_tungstenite::connect_async(request).await {
        Ok((socket, _response)) => Ok(socket),
        Err(tungstenite::Error::Http(response))
            if response.status().as_u16() == CERTIFICATE_INVALID_STATUS =>
        {
            Err(TransportError::CertificateInvalid)
        }
        Err(tungstenite::Error::Http(response)) => Err(TransportError::Status {
            status: response.status().as_u16(),
            body: response
                .body()
                .as_ref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default(),
        }),
        Err(e) => Err(TransportError::Network(e.to_string())),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|e| TransportError::Network(e.to_string()))
}

/// Drive one socket until it ends. Returns how it ended and the messages
/// sent but not acked, oldest first, including one whose send failed.
async fn run_session(
    core: &Arc<RelayCore>,
    socket: Socket,
    rx: &mut mpsc::Receiver<BusMessage>,
    outbox: &mut VecDeque<Pending>,
    cancel: &CancellationToken,
) -> (SessionEnd, VecDeque<Pending>) {
    let (mut sink, mut stream) = socket.split();
    let mut in_flight: VecDeque<Pending> = VecDeque::new();

    while let Some(pending) = outbox.pop_front() {
        if !send_pending(core, &mut sink, pending, &mut in_flight).await {
            return (SessionEnd::Disconnected, in_flight);
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return (SessionEnd::Cancelled, in_flight);
            }
            outbound = rx.recv() => {
                let Some(message) = outbound else {
                    return (SessionEnd::Cancelled, in_flight);
                };
                if !send_pending(core, &mut sink, Pending::new(message), &mut in_flight).await {
                    return (SessionEnd::Disconnected, in_flight);
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(bridged) = serde_json::from_str::<BridgedMessage>(&text) {
                        core.handle_inbound(bridged).await;
                    } else if serde_json::from_str::<PushResponse>(&text).is_ok() {
                        in_flight.pop_front();
                    } else {
                        tracing::warn!("Malformed socket frame");
                    }
                }
                Some(Ok(Message::Close(Some(close))))
                    if u16::from(close.code) == CERTIFICATE_INVALID_CLOSE_CODE =>
                {
                    tracing::info!(unacked = in_flight.len(), "Cloud closed socket demanding rotation");
                    return (SessionEnd::RotationRequired, in_flight);
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!("Message queue socket closed by cloud");
                    return (SessionEnd::Disconnected, in_flight);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Socket read failed");
                    return (SessionEnd::Disconnected, in_flight);
                }
            },
        }
    }
}

/// Send one message and track it until acked. False once the socket is
/// broken, with the message kept at the back of `in_flight`.
async fn send_pending<S>(
    core: &RelayCore,
    sink: &mut S,
    pending: Pending,
    in_flight: &mut VecDeque<Pending>,
) -> bool
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let result = send_message(core, sink, &pending.message).await;
    match result {
        Ok(true) => {
            in_flight.push_back(pending);
            if in_flight.len() > OUTBOUND_CAPACITY {
                in_flight.pop_front();
                tracing::warn!("Too many unacked frames, forgetting the oldest");
            }
            true
        }
        Ok(false) => true,
        Err(e) => {
            tracing::warn!(subject = %pending.message.subject, error = %e, "Socket send failed");
            in_flight.push_back(pending);
            false
        }
    }
}

/// Seal `message` and send it as a one-message push frame. False when
/// sealing failed and the message was dropped.
async fn send_message<S>(
    core: &RelayCore,
    sink: &mut S,
    message: &BusMessage,
) -> Result<bool, TransportError>
where
    S: futures_util::Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let sealed = match core.seal(message).await {
        Ok(sealed) => sealed,
        Err(e) => {
            tracing::warn!(subject = %message.subject, error = %e, "Dropping message that failed to seal");
            return Ok(false);
        }
    };
    let frame = core.push_request(vec![sealed]).await?;
    let json = serde_json::to_string(&frame).map_err(|e| TransportError::Network(e.to_string()))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| TransportError::Network(e.to_string()))?;
    Ok(true)
}
