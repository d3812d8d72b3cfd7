//! The main context
//!
//! A single task that owns the text surface and the handler table. Hotkey
//! matches, finished rewrites and control requests all arrive here over
//! channels, so handlers never run on the listener thread and results are
//! placed in one place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::events::{DaemonEvent, Trigger};
use crate::hotkey::{BindingTable, HotkeyEvent, HotkeyMatcher};
use crate::rewrite::{Dispatcher, RewriteError, RewriteMode, RewriteRequest};
use crate::surface::TextSurface;
use crate::swap::Snapshot;

use super::build_dispatcher;
use super::handlers::{HandlerTable, MissingHandler};

/// Requests from outside the hotkey path
#[derive(Debug)]
pub enum ControlEvent {
    /// Re-read configuration; replies with the number of active chords
    Reload(oneshot::Sender<Result<usize, String>>),
}

/// A finished rewrite on its way back to the main context
#[derive(Debug)]
pub struct Completion {
    generation: u64,
    mode: RewriteMode,
    trigger: Trigger,
    started: Instant,
    result: Result<String, RewriteError>,
}

/// State the handlers work on
pub struct AppState {
    dispatcher: Arc<Snapshot<Dispatcher>>,
    events_tx: broadcast::Sender<DaemonEvent>,
    surface: Box<dyn TextSurface>,
    /// Bumped for every started rewrite; only the latest may place text
    generation: u64,
    results_tx: mpsc::UnboundedSender<Completion>,
}

impl AppState {
    /// Read the selection and start a rewrite of it in the background
    pub fn rewrite_selection(&mut self, mode: RewriteMode) {
        let text = match self.surface.read_selection() {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            Ok(_) => {
                self.publish_failure(mode, Trigger::Hotkey, &RewriteError::EmptyText);
                return;
            }
            Err(e) => {
                error!(%mode, error = %format!("{e:#}"), "could not read selection");
                let failure = RewriteError::SurfaceFailure(format!("{e:#}"));
                self.publish_failure(mode, Trigger::Hotkey, &failure);
                return;
            }
        };

        self.generation += 1;
        let generation = self.generation;
        self.publish(DaemonEvent::started(mode, Trigger::Hotkey));

        let dispatcher = self.dispatcher.load();
        let results_tx = self.results_tx.clone();
        let started = Instant::now();
        debug!(%mode, generation, chars = text.chars().count(), "rewrite started");

        tokio::spawn(async move {
            let result = dispatcher.rewrite(RewriteRequest::new(text, mode)).await;
            let _ = results_tx.send(Completion {
                generation,
                mode,
                trigger: Trigger::Hotkey,
                started,
                result,
            });
        });
    }

    fn publish(&self, event: DaemonEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }

    fn publish_failure(&self, mode: RewriteMode, trigger: Trigger, error: &RewriteError) {
        let notice = error.notice();
        warn!(%mode, kind = ?error.kind(), title = %notice.title, "{}", notice.message);
        self.publish(DaemonEvent::RewriteFailed {
            mode,
            trigger,
            kind: error.kind(),
            notice,
        });
    }
}

pub struct MainContext {
    handlers: HandlerTable<AppState>,
    state: AppState,
    results_rx: mpsc::UnboundedReceiver<Completion>,
    matcher: Option<Arc<HotkeyMatcher>>,
    config_path: PathBuf,
}

impl MainContext {
    pub fn new(
        dispatcher: Arc<Snapshot<Dispatcher>>,
        events_tx: broadcast::Sender<DaemonEvent>,
        surface: Box<dyn TextSurface>,
        matcher: Option<Arc<HotkeyMatcher>>,
        config_path: PathBuf,
    ) -> Result<Self, MissingHandler> {
        let handlers = HandlerTable::for_all_modes(|state: &mut AppState, mode| {
            state.rewrite_selection(mode)
        });
        handlers.ensure_complete()?;

        let (results_tx, results_rx) = mpsc::unbounded_channel();
        Ok(Self {
            handlers,
            state: AppState {
                dispatcher,
                events_tx,
                surface,
                generation: 0,
                results_tx,
            },
            results_rx,
            matcher,
            config_path,
        })
    }

    /// Process events until both input channels are closed
    pub async fn run(
        &mut self,
        mut hotkey_rx: mpsc::Receiver<HotkeyEvent>,
        mut control_rx: mpsc::Receiver<ControlEvent>,
    ) {
        info!("main context started");

        loop {
            tokio::select! {
                Some(event) = hotkey_rx.recv() => self.handle_hotkey(event),
                Some(completion) = self.results_rx.recv() => self.handle_completion(completion),
                Some(control) = control_rx.recv() => self.handle_control(control),
                else => break,
            }
        }

        info!("main context stopped");
    }

    pub fn handle_hotkey(&mut self, event: HotkeyEvent) {
        match event {
            HotkeyEvent::Triggered(mode) => {
                if !self.handlers.invoke(mode, &mut self.state) {
                    error!(%mode, "no handler for mode");
                }
            }
            HotkeyEvent::TapDisabled => {
                warn!("hotkey tap disabled by user input, events may be missed");
                self.state.publish(DaemonEvent::HotkeyTapDisabled);
            }
        }
    }

    pub fn handle_completion(&mut self, completion: Completion) {
        let Completion {
            generation,
            mode,
            trigger,
            started,
            result,
        } = completion;

        if generation != self.state.generation {
            debug!(%mode, generation, latest = self.state.generation, "dropping stale result");
            return;
        }

        match result {
            Ok(text) => {
                if let Err(e) = self.state.surface.write_result(&text) {
                    error!(%mode, error = %format!("{e:#}"), "could not place rewritten text");
                    let failure = RewriteError::SurfaceFailure(format!("{e:#}"));
                    self.state.publish_failure(mode, trigger, &failure);
                    return;
                }
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(%mode, duration_ms, "rewritten text placed");
                self.state.publish(DaemonEvent::RewriteCompleted {
                    mode,
                    trigger,
                    duration_ms,
                });
            }
            Err(e) => self.state.publish_failure(mode, trigger, &e),
        }
    }

    pub fn handle_control(&mut self, control: ControlEvent) {
        match control {
            ControlEvent::Reload(reply) => match self.reload() {
                Ok((count, registration)) => {
                    // Registering can wait seconds for the tap; keep that off this context
                    tokio::spawn(async move {
                        if let Some(registration) = registration {
                            if let Err(e) = tokio::task::spawn_blocking(move || registration.apply()).await {
                                error!(?e, "hotkey registration task failed");
                            }
                        }
                        let _ = reply.send(Ok(count));
                    });
                }
                Err(e) => {
                    error!(error = %format!("{e:#}"), "config reload failed");
                    let _ = reply.send(Err(format!("{e:#}")));
                }
            },
        }
    }

    /// Apply the config file again.
    ///
    /// Chords and dispatcher are swapped right away. The matching
    /// register/unregister blocks, so it is handed back for the caller to run
    /// off the main context.
    pub fn reload(&mut self) -> Result<(usize, Option<Registration>)> {
        let config = Config::load_from(&self.config_path)?;

        let dispatcher = build_dispatcher(&config)?;
        self.state.dispatcher.store(dispatcher);

        let table = BindingTable::from_config(&config.hotkeys.bindings);
        let count = table.len();

        let registration = self.matcher.as_ref().map(|matcher| {
            matcher.set_bindings(table);
            Registration {
                matcher: Arc::clone(matcher),
                enabled: config.hotkeys.enabled,
            }
        });

        info!(bindings = count, model = %config.model, "configuration reloaded");
        self.state.publish(DaemonEvent::BindingsReloaded { count });
        Ok((count, registration))
    }
}

/// Pending listener state change after a reload
pub struct Registration {
    matcher: Arc<HotkeyMatcher>,
    enabled: bool,
}

impl Registration {
    /// Blocking: waits for the tap to install or the listener to exit
    pub fn apply(self) {
        if self.enabled {
            if !self.matcher.register() {
                warn!("hotkeys enabled but listener could not be registered");
            }
        } else {
            self.matcher.unregister();
        }
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
    use parking_lot::Mutex;
    use crate::hotkey::testing::{Granted, StalledBackend};
    use crate::hotkey::MatcherState;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread::{self, ThreadId};
    use std::time::Duration;

    /// Surface fed from a queue of selections, recording what it was given
    #[derive(Clone, Default)]
    struct FakeSurface {
        selections: Arc<Mutex<VecDeque<Option<String>>>>,
        written: Arc<Mutex<Vec<String>>>,
        read_on: Arc<Mutex<Option<ThreadId>>>,
        fail_read: Arc<AtomicBool>,
        fail_write: Arc<AtomicBool>,
    }

    impl FakeSurface {
        fn with_selections(selections: &[Option<&str>]) -> Self {
            let surface = Self::default();
            surface
                .selections
                .lock()
                .extend(selections.iter().map(|s| s.map(str::to_string)));
            surface
        }
    }

    impl TextSurface for FakeSurface {
        fn read_selection(&mut self) -> anyhow::Result<Option<String>> {
            *self.read_on.lock() = Some(thread::current().id());
            if self.fail_read.load(Ordering::SeqCst) {
                anyhow::bail!("pasteboard unavailable");
            }
            Ok(self.selections.lock().pop_front().flatten())
        }

        fn write_result(&mut self, text: &str) -> anyhow::Result<()> {
            if self.fail_write.load(Ordering::SeqCst) {
                anyhow::bail!("pasteboard rejected write");
            }
            self.written.lock().push(text.to_string());
            Ok(())
        }
    }

    /// Upper-cases the input, or fails with a fixed status
    struct EchoClient {
        failure: Option<CompletionFailure>,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: CompletionRequest) -> Result<String, CompletionFailure> {
            match &self.failure {
                Some(failure) => Err(failure.clone()),
                None => Ok(request.user.to_uppercase()),
            }
        }
    }

    struct Key;

    impl CredentialSource for Key {
        fn api_key(&self) -> Option<String> {
            Some("sk-test".to_string())
        }
    }

    fn context(
        surface: FakeSurface,
        failure: Option<CompletionFailure>,
    ) -> (MainContext, broadcast::Receiver<DaemonEvent>) {
        let dispatcher = Dispatcher::new(
            PromptTable::builtin(false).unwrap(),
            Arc::new(EchoClient { failure }),
            Arc::new(Key),
            ModelSettings {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
            },
        );
        let (events_tx, events_rx) = broadcast::channel(16);
        let ctx = MainContext::new(
            Arc::new(Snapshot::new(dispatcher)),
            events_tx,
            Box::new(surface),
            None,
            PathBuf::from("/nonexistent/config.toml"),
        )
        .unwrap();
        (ctx, events_rx)
    }

    #[tokio::test]
    async fn test_handler_runs_on_main_context() {
        let surface = FakeSurface::with_selections(&[Some("hello")]);
        let (mut ctx, mut events) = context(surface.clone(), None);

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::Concise));
        assert_eq!(*surface.read_on.lock(), Some(thread::current().id()));

        match events.recv().await.unwrap() {
            DaemonEvent::RewriteStarted { mode, label, .. } => {
                assert_eq!(mode, RewriteMode::Concise);
                assert_eq!(label, "Concise with Vox...");
            }
            other => panic!("unexpected event: {other}"),
        }

        let completion = ctx.results_rx.recv().await.unwrap();
        ctx.handle_completion(completion);
        assert_eq!(*surface.written.lock(), vec!["HELLO".to_string()]);
        assert!(matches!(
            events.recv().await.unwrap(),
            DaemonEvent::RewriteCompleted { mode: RewriteMode::Concise, .. }
        ));
    }

    #[tokio::test]
    async fn test_last_request_wins() {
        let surface = FakeSurface::with_selections(&[Some("first"), Some("second")]);
        let (mut ctx, _events) = context(surface.clone(), None);

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::FixGrammar));
        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::Friendly));

        for _ in 0..2 {
            let completion = ctx.results_rx.recv().await.unwrap();
            ctx.handle_completion(completion);
        }

        assert_eq!(*surface.written.lock(), vec!["SECOND".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_selection_publishes_notice_without_call() {
        let surface = FakeSurface::with_selections(&[Some("   ")]);
        let (mut ctx, mut events) = context(surface.clone(), None);

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::Professional));

        match events.recv().await.unwrap() {
            DaemonEvent::RewriteFailed { kind, notice, .. } => {
                assert_eq!(kind, ErrorKind::EmptyText);
                assert_eq!(notice.message, "No text selected");
            }
            other => panic!("unexpected event: {other}"),
        }
        assert_eq!(ctx.state.generation, 0);
        assert!(ctx.results_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_publishes_notice() {
        let surface = FakeSurface::with_selections(&[Some("hello")]);
        let failure = CompletionFailure::Status {
            status: 429,
            code: None,
            message: "slow down".to_string(),
        };
        let (mut ctx, mut events) = context(surface.clone(), Some(failure));

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::FixGrammar));
        let _started = events.recv().await.unwrap();

        let completion = ctx.results_rx.recv().await.unwrap();
        ctx.handle_completion(completion);

        match events.recv().await.unwrap() {
            DaemonEvent::RewriteFailed { kind, notice, .. } => {
                assert_eq!(kind, ErrorKind::RateLimited);
                assert_eq!(notice.title, "Vox - Rate Limit");
            }
            other => panic!("unexpected event: {other}"),
        }
        assert!(surface.written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_selection_is_surface_failure() {
        let surface = FakeSurface::with_selections(&[Some("hello")]);
        surface.fail_read.store(true, Ordering::SeqCst);
        let (mut ctx, mut events) = context(surface.clone(), None);

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::Concise));

        match events.recv().await.unwrap() {
            DaemonEvent::RewriteFailed { kind, notice, .. } => {
                assert_eq!(kind, ErrorKind::SurfaceFailure);
                assert_eq!(notice.title, "Vox - Clipboard Error");
            }
            other => panic!("unexpected event: {other}"),
        }
        assert_eq!(ctx.state.generation, 0);
        assert!(ctx.results_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unwritable_result_is_surface_failure() {
        let surface = FakeSurface::with_selections(&[Some("hello")]);
        surface.fail_write.store(true, Ordering::SeqCst);
        let (mut ctx, mut events) = context(surface.clone(), None);

        ctx.handle_hotkey(HotkeyEvent::Triggered(RewriteMode::Friendly));
        let _started = events.recv().await.unwrap();

        let completion = ctx.results_rx.recv().await.unwrap();
        ctx.handle_completion(completion);

        match events.recv().await.unwrap() {
            DaemonEvent::RewriteFailed { kind, notice, .. } => {
                assert_eq!(kind, ErrorKind::SurfaceFailure);
                assert!(!notice.message.contains("rejected"));
            }
            other => panic!("unexpected event: {other}"),
        }
        assert!(surface.written.lock().is_empty());
    }

    #[tokio::test]
    async fn test_reload_does_not_wait_for_registration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[[hotkeys.bindings]]
mode = "concise"
modifiers = "cmd+shift"
key = "c"
"#,
        )
        .unwrap();

        let (hotkey_tx, _hotkey_rx) = mpsc::channel(4);
        let matcher = Arc::new(HotkeyMatcher::new(
            BindingTable::default(),
            hotkey_tx,
            Arc::new(StalledBackend),
            Arc::new(Granted),
        ));

        let (mut ctx, _events) = context(FakeSurface::default(), None);
        ctx.config_path = path;
        ctx.matcher = Some(Arc::clone(&matcher));

        let (reply_tx, mut reply_rx) = oneshot::channel();
        let started = Instant::now();
        ctx.handle_control(ControlEvent::Reload(reply_tx));

        // Bindings are swapped at once; the reply waits for the tap
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(matcher.bindings().len(), 1);
        assert!(reply_rx.try_recv().is_err());

        let reply = tokio::time::timeout(Duration::from_secs(10), reply_rx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, Ok(1));
        assert_eq!(matcher.state(), MatcherState::Unregistered);
    }

    #[tokio::test]
    async fn test_reload_swaps_dispatcher() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "gpt-4o"

[[hotkeys.bindings]]
mode = "concise"
modifiers = "cmd+shift"
key = "c"
"#,
        )
        .unwrap();

        let (mut ctx, mut events) = context(FakeSurface::default(), None);
        ctx.config_path = path;

        let (reply_tx, reply_rx) = oneshot::channel();
        ctx.handle_control(ControlEvent::Reload(reply_tx));

        assert_eq!(reply_rx.await.unwrap(), Ok(1));
        assert_eq!(ctx.state.dispatcher.load().settings().model, "gpt-4o");
        assert_eq!(
            events.recv().await.unwrap(),
            DaemonEvent::BindingsReloaded { count: 1 }
        );
    }

    #[tokio::test]
    async fn test_reload_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();

        let (mut ctx, _events) = context(FakeSurface::default(), None);
        ctx.config_path = path;

        let (reply_tx, reply_rx) = oneshot::channel();
        ctx.handle_control(ControlEvent::Reload(reply_tx));

        let err = reply_rx.await.unwrap().unwrap_err();
        assert!(err.contains("failed to parse config file"));
        assert_eq!(ctx.state.dispatcher.load().settings().model, "gpt-4o-mini");
    }
}
