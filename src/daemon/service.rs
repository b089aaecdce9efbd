//! Main daemon service implementation

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::daemon::ipc::{DaemonRequest, DaemonResponse};
use crate::daemon::server::{CommandReceiver, IpcServer};
use crate::daemon::surface::ControlSurface;
use crate::lifecycle::LifecycleController;
use crate::notification::{NotificationPresenter, Notifier, TracingNotifier};
use crate::storage::{Database, PhaseStore};
use crate::worker::{Engine, EngineRegistry, WorkerSupervisor};

/// Run the daemon service
pub async fn run(settings: &Settings) -> Result<()> {
    info!("Starting background-work daemon");

    // Ensure directories exist
    settings.ensure_dirs()?;

    // Write PID file
    let pid = std::process::id();
    std::fs::write(settings.pid_path(), pid.to_string())?;

    let store: Arc<dyn PhaseStore> = Arc::new(Database::open(settings)?);
    let surface = control_surface(
        settings,
        store,
        Arc::new(EngineRegistry::new()),
        Arc::new(TracingNotifier),
    );

    // Create command channel
    let (cmd_tx, cmd_rx) = mpsc::channel::<(DaemonRequest, mpsc::Sender<DaemonResponse>)>(32);

    // Start IPC server
    let mut server = IpcServer::new(settings.socket_path());
    server.start().await?;

    // Spawn server task
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(cmd_tx).await {
            error!("IPC server error: {}", e);
        }
    });

    // Run command handler
    let handler_result = command_handler(settings, surface.clone(), cmd_rx).await;

    // Cleanup
    info!("Shutting down daemon");

    if let Err(e) = surface.controller().shutdown().await {
        warn!("Failed to stop session during shutdown: {}", e);
    }

    // Let connection tasks flush their last response
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Remove PID file
    let _ = std::fs::remove_file(settings.pid_path());

    // Abort spawned tasks
    server_handle.abort();

    handler_result
}

/// Wire a store, engine and notifier into a control surface
pub fn control_surface(
    settings: &Settings,
    store: Arc<dyn PhaseStore>,
    engine: Arc<dyn Engine>,
    notifier: Arc<dyn Notifier>,
) -> ControlSurface {
    let supervisor = WorkerSupervisor::new(engine, &settings.worker);
    let presenter = NotificationPresenter::new(notifier, settings.notifications.enabled);
    let controller = LifecycleController::new(Arc::clone(&store), supervisor, presenter);

    ControlSurface::new(Arc::new(controller), store)
}

/// How long an in-flight transition may finish once the handler is exiting
const TRANSITION_DRAIN: Duration = Duration::from_millis(500);

/// Handle incoming commands.
///
/// Transitions go to a single consumer task and are applied one at a time in
/// arrival order. Queries, `Shutdown` and signals are handled here and never
/// wait behind a transition.
async fn command_handler(
    settings: &Settings,
    surface: ControlSurface,
    mut cmd_rx: CommandReceiver,
) -> Result<()> {
    let default_entrypoint = settings.worker.default_entrypoint.clone();
    let exit_when_idle = settings.daemon.exit_when_idle;
    let mut idle = surface.controller().watch_idle();
    let mut sigterm = signal(SignalKind::terminate())?;

    let (transition_tx, transition_rx) = mpsc::channel(32);
    let mut transitions = tokio::spawn(apply_transitions(
        surface.clone(),
        default_entrypoint.clone(),
        transition_rx,
    ));

    loop {
        tokio::select! {
            received = cmd_rx.recv() => {
                let Some((request, resp_tx)) = received else {
                    break;
                };

                match request {
                    DaemonRequest::Shutdown => {
                        let _ = resp_tx.send(DaemonResponse::Ok).await;
                        break;
                    }
                    request if is_query(&request) => {
                        let surface = surface.clone();
                        let entrypoint = default_entrypoint.clone();
                        tokio::spawn(async move {
                            let response = handle_request(&surface, &entrypoint, request).await;
                            let _ = resp_tx.send(response).await;
                        });
                    }
                    request => {
                        if transition_tx.send((request, resp_tx)).await.is_err() {
                            error!("Transition task is gone");
                            break;
                        }
                    }
                }
            }
            changed = idle.changed(), if exit_when_idle => {
                if changed.is_err() {
                    break;
                }
                if *idle.borrow_and_update() {
                    info!("Session stopped and exit_when_idle is set");
                    break;
                }
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Let the transition in flight answer its caller, then give up on the rest
    drop(transition_tx);
    if tokio::time::timeout(TRANSITION_DRAIN, &mut transitions)
        .await
        .is_err()
    {
        warn!("Abandoning transitions still in flight");
        transitions.abort();
    }

    Ok(())
}

/// Apply queued transitions one at a time
async fn apply_transitions(
    surface: ControlSurface,
    default_entrypoint: String,
    mut rx: CommandReceiver,
) {
    while let Some((request, resp_tx)) = rx.recv().await {
        let response = handle_request(&surface, &default_entrypoint, request).await;
        let _ = resp_tx.send(response).await;
    }
}

fn is_query(request: &DaemonRequest) -> bool {
    matches!(
        request,
        DaemonRequest::QueryPhase | DaemonRequest::Prompt | DaemonRequest::Ping
    )
}

/// Answer one request against the control surface
pub async fn handle_request(
    surface: &ControlSurface,
    default_entrypoint: &str,
    request: DaemonRequest,
) -> DaemonResponse {
    let response = match request {
        DaemonRequest::Start {
            entrypoint,
            destination,
        } => {
            let entrypoint = entrypoint.unwrap_or_else(|| default_entrypoint.to_string());
            surface.start(entrypoint, destination).await.into()
        }
        DaemonRequest::Record => surface.record().await.into(),
        DaemonRequest::Save => surface.save().await.into(),
        DaemonRequest::Stop => surface.stop().await.into(),
        DaemonRequest::Tap { action } => surface.tap(action).await.into(),
        DaemonRequest::QueryPhase => surface.query_phase().into(),
        DaemonRequest::Prompt => match surface.prompt() {
            Ok(prompt) => DaemonResponse::Prompt(prompt),
            Err(e) => e.into(),
        },
        DaemonRequest::ResetState => match surface.reset_persisted_state() {
            Ok(()) => DaemonResponse::Ok,
            Err(e) => e.into(),
        },
        DaemonRequest::Ping => DaemonResponse::Pong,
        DaemonRequest::Shutdown => DaemonResponse::Ok,
    };

    if let DaemonResponse::Error { message, .. } = &response {
        warn!("Request failed: {}", message);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::server::CommandSender;
    use crate::lifecycle::ErrorKind;
    use crate::notification::Action;
    use crate::storage::Phase;
    use crate::worker::WorkerChannel;
    use async_trait::async_trait;
    use std::time::Instant;

    /// Takes a while to bring its worker up
    struct SlowEngine;

    #[async_trait]
    impl Engine for SlowEngine {
        async fn launch(&self, entrypoint: &str) -> anyhow::Result<WorkerChannel> {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            EngineRegistry::new().launch(entrypoint).await
        }
    }

    fn slow_handler() -> (ControlSurface, CommandSender, tokio::task::JoinHandle<Result<()>>) {
        let mut settings = Settings::default();
        settings.notifications.enabled = false;
        let surface = control_surface(
            &settings,
            Arc::new(Database::open_memory().unwrap()),
            Arc::new(SlowEngine),
            Arc::new(TracingNotifier),
        );

        let (tx, rx) = mpsc::channel(8);
        let handler_surface = surface.clone();
        let handler =
            tokio::spawn(async move { command_handler(&settings, handler_surface, rx).await });
        (surface, tx, handler)
    }

    async fn submit(tx: &CommandSender, request: DaemonRequest) -> mpsc::Receiver<DaemonResponse> {
        let (resp_tx, resp_rx) = mpsc::channel(1);
        tx.send((request, resp_tx)).await.unwrap();
        resp_rx
    }

    fn slow_start() -> DaemonRequest {
        DaemonRequest::Start {
            entrypoint: Some("builtin:log".into()),
            destination: "take.wav".into(),
        }
    }

    fn surface() -> ControlSurface {
        let mut settings = Settings::default();
        settings.notifications.enabled = false;
        control_surface(
            &settings,
            Arc::new(Database::open_memory().unwrap()),
            Arc::new(EngineRegistry::new()),
            Arc::new(TracingNotifier),
        )
    }

    fn phase_of(response: DaemonResponse) -> Phase {
        match response {
            DaemonResponse::Phase(phase) => phase,
            other => panic!("expected a phase, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_uses_default_entrypoint() {
        let surface = surface();
        let response = handle_request(
            &surface,
            "builtin:log",
            DaemonRequest::Start {
                entrypoint: None,
                destination: "take.wav".into(),
            },
        )
        .await;
        assert_eq!(phase_of(response), Phase::Initialized);
        assert_eq!(
            phase_of(handle_request(&surface, "builtin:log", DaemonRequest::QueryPhase).await),
            Phase::Initialized
        );
        surface.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_entrypoint_reports_worker_start_failure() {
        let surface = surface();
        let response = handle_request(
            &surface,
            "builtin:log",
            DaemonRequest::Start {
                entrypoint: Some("builtin:missing".into()),
                destination: "take.wav".into(),
            },
        )
        .await;
        match response {
            DaemonResponse::Error { kind, .. } => assert_eq!(kind, ErrorKind::WorkerStartFailed),
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(surface.query_phase().unwrap(), Phase::Stopped);
    }

    #[tokio::test]
    async fn taps_drive_the_session() {
        let surface = surface();
        surface.start("builtin:log", "take.wav").await.unwrap();

        let response =
            handle_request(&surface, "builtin:log", DaemonRequest::Tap { action: Action::Record })
                .await;
        assert_eq!(phase_of(response), Phase::Recording);

        match handle_request(&surface, "builtin:log", DaemonRequest::Prompt).await {
            DaemonResponse::Prompt(Some(prompt)) => {
                assert_eq!(prompt.actions, vec![Action::Save, Action::Stop])
            }
            other => panic!("unexpected response: {:?}", other),
        }

        let response =
            handle_request(&surface, "builtin:log", DaemonRequest::Tap { action: Action::Save })
                .await;
        assert_eq!(phase_of(response), Phase::Stopped);
    }

    #[tokio::test]
    async fn queries_are_answered_while_a_start_is_in_flight() {
        let (_surface, tx, handler) = slow_handler();

        let mut started = submit(&tx, slow_start()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let asked = Instant::now();
        let phase = submit(&tx, DaemonRequest::QueryPhase)
            .await
            .recv()
            .await
            .unwrap();
        let pong = submit(&tx, DaemonRequest::Ping).await.recv().await.unwrap();
        assert!(
            asked.elapsed() < Duration::from_millis(500),
            "queries took {:?}",
            asked.elapsed()
        );
        assert_eq!(phase_of(phase), Phase::Stopped);
        assert!(matches!(pong, DaemonResponse::Pong));

        assert_eq!(phase_of(started.recv().await.unwrap()), Phase::Initialized);
        let stopped = submit(&tx, DaemonRequest::Stop).await.recv().await.unwrap();
        assert_eq!(phase_of(stopped), Phase::Stopped);

        submit(&tx, DaemonRequest::Shutdown).await.recv().await.unwrap();
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn transitions_keep_arrival_order() {
        let (surface, tx, handler) = slow_handler();

        let mut started = submit(&tx, slow_start()).await;
        let mut recorded = submit(&tx, DaemonRequest::Record).await;

        assert_eq!(phase_of(started.recv().await.unwrap()), Phase::Initialized);
        assert_eq!(phase_of(recorded.recv().await.unwrap()), Phase::Recording);
        assert_eq!(surface.query_phase().unwrap(), Phase::Recording);

        submit(&tx, DaemonRequest::Stop).await.recv().await.unwrap();
        submit(&tx, DaemonRequest::Shutdown).await.recv().await.unwrap();
        handler.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_does_not_wait_for_a_slow_start() {
        let (surface, tx, handler) = slow_handler();

        let _started = submit(&tx, slow_start()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let asked = Instant::now();
        let ack = submit(&tx, DaemonRequest::Shutdown).await.recv().await.unwrap();
        assert!(matches!(ack, DaemonResponse::Ok));

        tokio::time::timeout(Duration::from_secs(1), handler)
            .await
            .expect("handler should exit after the drain period")
            .unwrap()
            .unwrap();
        assert!(asked.elapsed() < Duration::from_secs(1));

        // The abandoned start never committed
        assert_eq!(surface.query_phase().unwrap(), Phase::Stopped);
        assert_eq!(surface.controller().shutdown().await, Ok(Phase::Stopped));
    }

    #[test]
    fn only_reads_bypass_the_queue() {
        assert!(is_query(&DaemonRequest::QueryPhase));
        assert!(is_query(&DaemonRequest::Ping));
        assert!(!is_query(&DaemonRequest::Stop));
        assert!(!is_query(&DaemonRequest::ResetState));
    }
}
