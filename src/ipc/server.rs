//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! daemon events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::context::ControlEvent;
use crate::events::{DaemonEvent, Trigger};
use crate::hotkey::{HotkeyMatcher, MatcherState};
use crate::rewrite::{Dispatcher, RewriteMode, RewriteRequest};
use crate::swap::Snapshot;

use super::protocol::{DaemonStatus, ModeInfo, Notification, Request, Response};

/// Largest accepted message body
const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Handles to the parts of the daemon that requests act on
#[derive(Clone)]
pub struct ServerContext {
    pub dispatcher: Arc<Snapshot<Dispatcher>>,
    pub matcher: Option<Arc<HotkeyMatcher>>,
    pub control_tx: mpsc::Sender<ControlEvent>,
    pub events_tx: broadcast::Sender<DaemonEvent>,
}

struct Shared {
    context: ServerContext,
    start_time: Instant,
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    shared: Arc<Shared>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, context: ServerContext) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to set socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            shared: Arc::new(Shared {
                context,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let shared = Arc::clone(&self.shared);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, shared) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, shared: Arc<Shared>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task so waiting for a request never
        // races with pushing an event
        let (request_tx, mut request_rx) = mpsc::channel(8);
        let read_task = tokio::spawn(async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(Some(frame)) => {
                        if request_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("client disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "failed to read from client");
                        break;
                    }
                }
            }
        });

        let mut events: Option<broadcast::Receiver<DaemonEvent>> = None;

        let result = loop {
            tokio::select! {
                frame = request_rx.recv() => {
                    let Some(frame) = frame else { break Ok(()) };

                    let response = match serde_json::from_slice::<Request>(&frame) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            if request == Request::Subscribe && events.is_none() {
                                events = Some(shared.context.events_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            Self::process_request(request, &shared).await
                        }
                        Err(e) => Response::error("bad_request", format!("failed to parse request: {e}")),
                    };

                    if let Err(e) = send_message(&mut writer, &response).await {
                        break Err(e);
                    }
                }
                event = next_event(&mut events) => {
                    match event {
                        Ok(event) => {
                            let note = Notification::Event { event };
                            if let Err(e) = send_message(&mut writer, &note).await {
                                break Err(e);
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "subscriber lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            events = None;
                        }
                    }
                }
            }
        };

        read_task.abort();
        result
    }

    /// Process a request and return a response
    async fn process_request(request: Request, shared: &Shared) -> Response {
        let ctx = &shared.context;

        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let dispatcher = ctx.dispatcher.load();
                Response::Status(DaemonStatus {
                    hotkey_registered: ctx
                        .matcher
                        .as_ref()
                        .is_some_and(|m| m.state() == MatcherState::Listening),
                    uptime_secs: shared.start_time.elapsed().as_secs(),
                    model: dispatcher.settings().model.clone(),
                    has_api_key: dispatcher.has_credential(),
                    ..DaemonStatus::default()
                })
            }

            Request::ListModes => {
                let bindings = ctx.matcher.as_ref().map(|m| m.bindings());
                let modes = RewriteMode::ALL
                    .iter()
                    .map(|&mode| ModeInfo {
                        mode,
                        display_name: mode.display_name().to_string(),
                        binding: bindings
                            .as_ref()
                            .and_then(|table| table.binding_for(mode))
                            .map(|b| b.to_string()),
                    })
                    .collect();
                Response::Modes { modes }
            }

            Request::Rewrite { mode, text } => Self::rewrite(ctx, mode, text).await,

            Request::ReloadConfig => {
                let (reply_tx, reply_rx) = oneshot::channel();
                if ctx.control_tx.send(ControlEvent::Reload(reply_tx)).await.is_err() {
                    return Response::error("unavailable", "main context is not running");
                }
                match reply_rx.await {
                    Ok(Ok(bindings)) => Response::Reloaded { bindings },
                    Ok(Err(message)) => Response::error("reload_failed", message),
                    Err(_) => Response::error("unavailable", "reload was dropped"),
                }
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Runs on the client's task; results go back to this client only
    async fn rewrite(ctx: &ServerContext, mode: RewriteMode, text: String) -> Response {
        let started = Instant::now();
        let _ = ctx.events_tx.send(DaemonEvent::started(mode, Trigger::Ipc));

        let dispatcher = ctx.dispatcher.load();
        match dispatcher.rewrite(RewriteRequest::new(text, mode)).await {
            Ok(text) => {
                let _ = ctx.events_tx.send(DaemonEvent::RewriteCompleted {
                    mode,
                    trigger: Trigger::Ipc,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Response::Rewritten { text }
            }
            Err(e) => {
                let _ = ctx.events_tx.send(DaemonEvent::RewriteFailed {
                    mode,
                    trigger: Trigger::Ipc,
                    kind: e.kind(),
                    notice: e.notice(),
                });
                Response::failed(&e)
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed frame. `None` on a clean disconnect.
async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("message too large ({len} bytes)");
    }

    let mut body = vec![0u8; len];
    reader
        .read_exact(&mut body)
        .await
        .context("failed to read message body")?;
    Ok(Some(body))
}

/// Send a length-prefixed JSON message
async fn send_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: serde::Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;

    Ok(())
}

/// Next event for a subscribed client; pending forever otherwise
async fn next_event(
    events: &mut Option<broadcast::Receiver<DaemonEvent>>,
) -> Result<DaemonEvent, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSource;
    use crate::rewrite::{
        CompletionClient, CompletionFailure, CompletionRequest, ErrorKind, ModelSettings,
        PromptTable,
    };
    use async_trait::async_trait;

    struct Upper;

    #[async_trait]
    impl CompletionClient for Upper {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionFailure> {
            Ok(request.user.to_uppercase())
        }
    }

    struct Key(Option<&'static str>);

    impl CredentialSource for Key {
        fn api_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        socket: PathBuf,
        server: Arc<Server>,
        control_rx: mpsc::Receiver<ControlEvent>,
        events_tx: broadcast::Sender<DaemonEvent>,
    }

    fn harness(key: Option<&'static str>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("daemon.sock");
        let dispatcher = Dispatcher::new(
            PromptTable::builtin(false).unwrap(),
            Arc::new(Upper),
            Arc::new(Key(key)),
            ModelSettings {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
            },
        );
        let (control_tx, control_rx) = mpsc::channel(4);
        let (events_tx, _) = broadcast::channel(16);
        let context = ServerContext {
            dispatcher: Arc::new(Snapshot::new(dispatcher)),
            matcher: None,
            control_tx,
            events_tx: events_tx.clone(),
        };
        let server = Arc::new(Server::new(&socket, context).unwrap());
        let running = Arc::clone(&server);
        tokio::spawn(async move { running.run().await });

        Harness {
            _dir: dir,
            socket,
            server,
            control_rx,
            events_tx,
        }
    }

    async fn call(stream: &mut UnixStream, request: &Request) -> serde_json::Value {
        send_message(stream, request).await.unwrap();
        let frame = read_frame(stream).await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_ping_and_status() {
        let h = harness(Some("sk-test"));
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        assert_eq!(call(&mut stream, &Request::Ping).await["type"], "pong");

        let status = call(&mut stream, &Request::GetStatus).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["model"], "gpt-4o-mini");
        assert_eq!(status["has_api_key"], true);
        assert_eq!(status["hotkey_registered"], false);
    }

    #[tokio::test]
    async fn test_socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let h = harness(None);
        let mode = std::fs::metadata(&h.socket).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn test_rewrite_round_trip() {
        let h = harness(Some("sk-test"));
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        let request = Request::Rewrite {
            mode: RewriteMode::Professional,
            text: "hey there".to_string(),
        };
        let response: Response =
            serde_json::from_value(call(&mut stream, &request).await).unwrap();
        assert_eq!(
            response,
            Response::Rewritten {
                text: "HEY THERE".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rewrite_without_key_fails_with_notice() {
        let h = harness(None);
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        let request = Request::Rewrite {
            mode: RewriteMode::Concise,
            text: "hello".to_string(),
        };
        let response: Response =
            serde_json::from_value(call(&mut stream, &request).await).unwrap();
        match response {
            Response::Failed { kind, title, .. } => {
                assert_eq!(kind, ErrorKind::MissingCredential);
                assert_eq!(title, "Vox - API Key Required");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_modes_without_matcher() {
        let h = harness(None);
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        let response: Response =
            serde_json::from_value(call(&mut stream, &Request::ListModes).await).unwrap();
        match response {
            Response::Modes { modes } => {
                assert_eq!(modes.len(), RewriteMode::ALL.len());
                assert_eq!(modes[0].display_name, "Fix Grammar");
                assert!(modes.iter().all(|m| m.binding.is_none()));
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reload_goes_through_main_context() {
        let h = harness(None);
        let mut control_rx = h.control_rx;
        tokio::spawn(async move {
            if let Some(ControlEvent::Reload(reply)) = control_rx.recv().await {
                let _ = reply.send(Ok(2));
            }
        });

        let mut stream = UnixStream::connect(&h.socket).await.unwrap();
        let response: Response =
            serde_json::from_value(call(&mut stream, &Request::ReloadConfig).await).unwrap();
        assert_eq!(response, Response::Reloaded { bindings: 2 });
    }

    #[tokio::test]
    async fn test_bad_request_keeps_connection() {
        let h = harness(None);
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        let garbage = b"{\"type\":\"nope\"}";
        stream
            .write_all(&(garbage.len() as u32).to_le_bytes())
            .await
            .unwrap();
        stream.write_all(garbage).await.unwrap();
        let frame = read_frame(&mut stream).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
        assert_eq!(value["code"], "bad_request");

        assert_eq!(call(&mut stream, &Request::Ping).await["type"], "pong");
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let h = harness(None);
        let mut stream = UnixStream::connect(&h.socket).await.unwrap();

        assert_eq!(call(&mut stream, &Request::Subscribe).await["type"], "subscribed");

        h.events_tx
            .send(DaemonEvent::BindingsReloaded { count: 4 })
            .unwrap();

        let frame = read_frame(&mut stream).await.unwrap().unwrap();
        let note: Notification = serde_json::from_slice(&frame).unwrap();
        assert_eq!(
            note,
            Notification::Event {
                event: DaemonEvent::BindingsReloaded { count: 4 }
            }
        );
    }

    #[tokio::test]
    async fn test_shutdown_removes_socket() {
        let h = harness(None);
        assert!(h.socket.exists());
        h.server.shutdown().await;
        assert!(!h.socket.exists());
    }
}
