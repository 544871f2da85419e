//! STOMP session task.
//!
//! Runs the read/write loop for one transport client: WebSocket open,
//! `CONNECT`/`CONNECTED` handshake, then frames from the server, commands
//! from the manager and heart-beat timers multiplexed with `select!`. A
//! session lost after the handshake is re-opened after the configured
//! transport delay until the client is deactivated.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::stomp::{Command, Frame, Heartbeat, split_frames};
use crate::transport::{ConnectParams, EventSink, TransportEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Timer period used when a heart-beat direction is disabled.
const IDLE_TICK: Duration = Duration::from_secs(3600);

/// Command from the handle to its session task.
#[derive(Debug)]
pub(crate) enum ClientCommand {
    Subscribe(String),
    Unsubscribe(String),
    Publish { destination: String, body: String },
    Deactivate,
}

#[derive(Debug)]
enum SessionEnd {
    Deactivated,
    Lost(String),
}

/// Drives one client until it is deactivated or its handle is dropped.
pub(crate) async fn run_client(
    params: ConnectParams,
    mut commands: mpsc::UnboundedReceiver<ClientCommand>,
    sink: EventSink,
    connected: Arc<AtomicBool>,
) {
    let generation = sink.generation();
    loop {
        let end = run_session(&params, &mut commands, &sink, &connected).await;
        connected.store(false, Ordering::Release);
        match end {
            SessionEnd::Deactivated => break,
            SessionEnd::Lost(reason) => {
                tracing::warn!(generation, %reason, "stomp session ended");
                sink.emit(TransportEvent::Closed { reason });
            }
        }
        if !wait_for_retry(params.reconnect_delay, &mut commands).await {
            break;
        }
        tracing::info!(generation, "stomp session retrying");
    }
    tracing::debug!(generation, "stomp client stopped");
}

async fn run_session(
    params: &ConnectParams,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    sink: &EventSink,
    connected: &AtomicBool,
) -> SessionEnd {
    let stream = match tokio_tungstenite::connect_async(params.url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => return SessionEnd::Lost(format!("websocket connect failed: {e}")),
    };
    let (mut ws_tx, mut ws_rx) = stream.split();

    if let Err(end) = send_frame(&mut ws_tx, &connect_frame(params)).await {
        return end;
    }

    let server_heartbeat = match await_connected(&mut ws_rx, commands, sink).await {
        Ok(heartbeat) => heartbeat,
        Err(end) => {
            let _ = ws_tx.close().await;
            return end;
        }
    };
    let heartbeat = params.heartbeat.negotiate(server_heartbeat);

    connected.store(true, Ordering::Release);
    tracing::info!(
        generation = sink.generation(),
        send_every = ?heartbeat.send_interval(),
        receive_timeout = ?heartbeat.receive_timeout(),
        "stomp session established"
    );
    sink.emit(TransportEvent::Connected);

    let end = session_loop(&mut ws_tx, &mut ws_rx, commands, sink, heartbeat).await;
    let _ = ws_tx.close().await;
    end
}

/// Waits for `CONNECTED`, returning the server's advertised heart-beat.
async fn await_connected(
    ws_rx: &mut WsRead,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    sink: &EventSink,
) -> Result<Heartbeat, SessionEnd> {
    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let payload = match read_payload(msg) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => continue,
                    Err(reason) => return Err(SessionEnd::Lost(format!("{reason} before CONNECTED"))),
                };
                for raw in split_frames(&payload) {
                    match Frame::parse(raw) {
                        Ok(frame) if frame.command() == Command::Connected => {
                            return Ok(frame
                                .header("heart-beat")
                                .and_then(Heartbeat::parse)
                                .unwrap_or_default());
                        }
                        Ok(frame) if frame.command() == Command::Error => {
                            let message = error_summary(&frame);
                            sink.emit(TransportEvent::StompError { message: message.clone() });
                            return Err(SessionEnd::Lost(format!("server rejected session: {message}")));
                        }
                        Ok(frame) => {
                            tracing::debug!(command = %frame.command(), "frame before CONNECTED ignored");
                        }
                        Err(e) => tracing::warn!(error = %e, "undecodable frame during handshake"),
                    }
                }
            }
            cmd = commands.recv() => match cmd {
                None | Some(ClientCommand::Deactivate) => return Err(SessionEnd::Deactivated),
                Some(other) => tracing::debug!(?other, "command before CONNECTED dropped"),
            },
        }
    }
}

async fn session_loop(
    ws_tx: &mut WsWrite,
    ws_rx: &mut WsRead,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
    sink: &EventSink,
    heartbeat: Heartbeat,
) -> SessionEnd {
    // destination -> subscription id
    let mut subscriptions: HashMap<String, String> = HashMap::new();

    let send_every = heartbeat.send_interval();
    let receive_timeout = heartbeat.receive_timeout();

    let mut beat = tokio::time::interval(send_every.unwrap_or(IDLE_TICK));
    beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    beat.reset();
    let check_every = if heartbeat.incoming.is_zero() {
        IDLE_TICK
    } else {
        heartbeat.incoming
    };
    let mut watchdog = tokio::time::interval(check_every);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
    watchdog.reset();
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_seen = Instant::now();
                let payload = match read_payload(msg) {
                    Ok(Some(payload)) => payload,
                    Ok(None) => continue,
                    Err(reason) => return SessionEnd::Lost(reason),
                };
                for raw in split_frames(&payload) {
                    match Frame::parse(raw) {
                        Ok(frame) => {
                            if let Some(end) = handle_frame(&frame, sink) {
                                return end;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "undecodable frame dropped"),
                    }
                }
            }
            cmd = commands.recv() => {
                let cmd = cmd.unwrap_or(ClientCommand::Deactivate);
                if let Err(end) = handle_command(cmd, ws_tx, &mut subscriptions).await {
                    return end;
                }
            }
            _ = beat.tick(), if send_every.is_some() => {
                if ws_tx.send(Message::text("\n")).await.is_err() {
                    return SessionEnd::Lost("heart-beat send failed".to_string());
                }
            }
            _ = watchdog.tick(), if receive_timeout.is_some() => {
                if let Some(timeout) = receive_timeout
                    && last_seen.elapsed() > timeout
                {
                    return SessionEnd::Lost(format!(
                        "no server heart-beat for {} ms",
                        timeout.as_millis()
                    ));
                }
            }
        }
    }
}

/// Extracts the text of a WebSocket message. `Ok(None)` for control
/// frames, `Err` when the socket is gone.
fn read_payload(
    msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Result<Option<String>, String> {
    match msg {
        Some(Ok(Message::Text(text))) => Ok(Some(text.as_str().to_owned())),
        Some(Ok(Message::Binary(data))) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
        Some(Ok(Message::Close(_))) | None => Err("socket closed by server".to_string()),
        Some(Ok(_)) => Ok(None),
        Some(Err(e)) => Err(format!("websocket error: {e}")),
    }
}

/// Applies a server frame. Returns `Some` when the session must end.
fn handle_frame(frame: &Frame, sink: &EventSink) -> Option<SessionEnd> {
    match frame.command() {
        Command::Message => {
            let Some(destination) = frame.header("destination") else {
                tracing::warn!("MESSAGE frame without destination dropped");
                return None;
            };
            sink.emit(TransportEvent::Message {
                destination: destination.to_string(),
                body: frame.body().to_string(),
            });
            None
        }
        Command::Error => {
            let message = error_summary(frame);
            sink.emit(TransportEvent::StompError {
                message: message.clone(),
            });
            Some(SessionEnd::Lost(format!("server sent ERROR: {message}")))
        }
        other => {
            tracing::debug!(command = %other, "frame ignored");
            None
        }
    }
}

async fn handle_command(
    cmd: ClientCommand,
    ws_tx: &mut WsWrite,
    subscriptions: &mut HashMap<String, String>,
) -> Result<(), SessionEnd> {
    match cmd {
        ClientCommand::Subscribe(destination) => {
            if subscriptions.contains_key(&destination) {
                tracing::debug!(%destination, "already subscribed on this session");
                return Ok(());
            }
            let id = format!("sub-{}", uuid::Uuid::new_v4());
            let frame = Frame::new(Command::Subscribe)
                .with_header("id", &id)
                .with_header("destination", &destination)
                .with_header("ack", "auto");
            send_frame(ws_tx, &frame).await?;
            subscriptions.insert(destination, id);
        }
        ClientCommand::Unsubscribe(destination) => {
            let Some(id) = subscriptions.remove(&destination) else {
                tracing::debug!(%destination, "unsubscribe for unknown destination");
                return Ok(());
            };
            send_frame(ws_tx, &Frame::new(Command::Unsubscribe).with_header("id", id)).await?;
        }
        ClientCommand::Publish { destination, body } => {
            let frame = Frame::new(Command::Send)
                .with_header("destination", destination)
                .with_header("content-type", "application/json")
                .with_body(body);
            send_frame(ws_tx, &frame).await?;
        }
        ClientCommand::Deactivate => {
            let _ = send_frame(ws_tx, &Frame::new(Command::Disconnect)).await;
            return Err(SessionEnd::Deactivated);
        }
    }
    Ok(())
}

async fn send_frame(ws_tx: &mut WsWrite, frame: &Frame) -> Result<(), SessionEnd> {
    ws_tx
        .send(Message::text(frame.encode()))
        .await
        .map_err(|e| SessionEnd::Lost(format!("sending {} failed: {e}", frame.command())))
}

/// Sleeps out the transport retry delay. Returns `false` if the client was
/// deactivated meanwhile.
async fn wait_for_retry(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<ClientCommand>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            () = &mut sleep => return true,
            cmd = commands.recv() => match cmd {
                None | Some(ClientCommand::Deactivate) => return false,
                Some(other) => tracing::debug!(?other, "command while disconnected dropped"),
            },
        }
    }
}

fn connect_frame(params: &ConnectParams) -> Frame {
    let mut frame = Frame::new(Command::Connect)
        .with_header("accept-version", "1.2")
        .with_header("host", host_of(&params.url))
        .with_header("heart-beat", params.heartbeat.header_value());
    for (name, value) in &params.connect_headers {
        frame = frame.with_header(name, value);
    }
    frame
}

fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    rest.split(['/', '?']).next().unwrap_or(rest)
}

fn error_summary(frame: &Frame) -> String {
    frame
        .header("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body().trim().to_string())
}
