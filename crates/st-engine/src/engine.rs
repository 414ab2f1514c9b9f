//! The engine event loop.
//!
//! One task owns the [`Tracker`] and processes, strictly in arrival order,
//! host events, presentation requests, the periodic flush tick, and the
//! retention sweep tick. Callers talk to it through an [`EngineHandle`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use st_core::EngineConfig;
use st_store::{AggregateStore, KeyValueStore};

use crate::event::FocusEvent;
use crate::facade::{Facade, Request, Response};
use crate::host::HostBrowser;
use crate::router::Tracker;

const COMMAND_QUEUE: usize = 256;
const MIN_TICK: Duration = Duration::from_secs(1);

/// The engine task is gone.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine is not running")]
    Closed,
}

#[derive(Debug)]
enum Command {
    Focus {
        event: FocusEvent,
        at: DateTime<Utc>,
        handled: Option<oneshot::Sender<()>>,
    },
    Request {
        request: Request,
        respond: oneshot::Sender<Response>,
    },
    Shutdown {
        respond: oneshot::Sender<()>,
    },
}

/// Cloneable sender side of a running engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
}

impl EngineHandle {
    /// Delivers a host event, stamped with the current instant.
    pub async fn focus(&self, event: FocusEvent) -> Result<(), EngineError> {
        self.focus_at(event, Utc::now()).await
    }

    /// Delivers a host event that happened at `at`.
    ///
    /// Flush ticks and shutdown read the wall clock, so `at` should be close
    /// to now and never earlier than the previous event.
    pub async fn focus_at(&self, event: FocusEvent, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.send(Command::Focus {
            event,
            at,
            handled: None,
        })
        .await
    }

    /// Delivers a host event and waits until the engine has routed it.
    ///
    /// Hosts that model tabs and windows from the same event stream use this
    /// so the model never runs ahead of the engine's queries.
    pub async fn deliver(&self, event: FocusEvent, at: DateTime<Utc>) -> Result<(), EngineError> {
        let (handled, done) = oneshot::channel();
        self.send(Command::Focus {
            event,
            at,
            handled: Some(handled),
        })
        .await?;
        done.await.map_err(|_| EngineError::Closed)
    }

    /// Sends a presentation request and waits for the reply.
    pub async fn request(&self, request: Request) -> Result<Response, EngineError> {
        let (respond, reply) = oneshot::channel();
        self.send(Command::Request { request, respond }).await?;
        reply.await.map_err(|_| EngineError::Closed)
    }

    pub async fn get_time_data(&self) -> Result<Response, EngineError> {
        self.request(Request::GetTimeData).await
    }

    pub async fn reset_data(&self) -> Result<Response, EngineError> {
        self.request(Request::ResetData).await
    }

    /// Flushes the active session and stops the engine.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (respond, reply) = oneshot::channel();
        self.send(Command::Shutdown { respond }).await?;
        reply.await.map_err(|_| EngineError::Closed)
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands.send(command).await.map_err(|_| EngineError::Closed)
    }
}

/// Attribution loop state.
pub struct Engine<H, S> {
    tracker: Tracker<H, S>,
    facade: Facade<S>,
}

impl<H, S> Engine<H, S>
where
    H: HostBrowser + 'static,
    S: KeyValueStore + 'static,
{
    pub fn new(host: H, store: Arc<AggregateStore<S>>, config: EngineConfig) -> Self {
        let facade = Facade::new(Arc::clone(&store), config.icon_template.clone());
        Self {
            tracker: Tracker::new(host, store, config),
            facade,
        }
    }

    /// Starts the loop on the current runtime.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
        let task = tokio::spawn(self.run(receiver));
        (EngineHandle { commands }, task)
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.tracker.start(Utc::now()).await;

        let flush_every = self.tracker.config().flush_interval.max(MIN_TICK);
        let sweep_every = self.tracker.config().sweep_interval.max(MIN_TICK);
        let mut flush = time::interval_at(Instant::now() + flush_every, flush_every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = time::interval_at(Instant::now() + sweep_every, sweep_every);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(?flush_every, ?sweep_every, "engine started");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        tracing::debug!("all engine handles dropped");
                        self.tracker.shutdown(Utc::now()).await;
                        return;
                    };
                    match command {
                        Command::Focus { event, at, handled } => {
                            self.tracker.handle(event, at).await;
                            if let Some(handled) = handled {
                                let _ = handled.send(());
                            }
                        }
                        Command::Request { request, respond } => {
                            let response = self.respond(request).await;
                            let _ = respond.send(response);
                        }
                        Command::Shutdown { respond } => {
                            self.tracker.shutdown(Utc::now()).await;
                            tracing::info!("engine stopped");
                            let _ = respond.send(());
                            return;
                        }
                    }
                }
                _ = flush.tick() => self.tracker.periodic_flush(Utc::now()).await,
                _ = sweep.tick() => {
                    if let Err(e) = self.tracker.sweep(Utc::now()).await {
                        tracing::warn!(error = %e, "retention sweep failed");
                    }
                }
            }
        }
    }

    async fn respond(&mut self, request: Request) -> Response {
        let response = self.facade.respond(request).await;
        if matches!(response, Response::Reset { success: true, .. }) {
            self.tracker.discard_backlog();
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use st_core::{Aggregates, Domain, TabId, WindowId};
    use st_store::MemoryStore;

    use crate::host::TabRegistry;

    struct Running {
        handle: EngineHandle,
        task: JoinHandle<()>,
        registry: TabRegistry,
        store: Arc<AggregateStore<MemoryStore>>,
    }

    /// Spawns an engine and waits until its startup has completed.
    async fn spawn_engine() -> Running {
        let registry = TabRegistry::new();
        let store = Arc::new(AggregateStore::new(MemoryStore::new()));
        let engine = Engine::new(registry.clone(), Arc::clone(&store), EngineConfig::default());
        let (handle, task) = engine.spawn();
        snapshot(&handle).await;
        Running {
            handle,
            task,
            registry,
            store,
        }
    }

    async fn open(running: &Running, tab: i64, url: &str, at: DateTime<Utc>) {
        let events = [
            FocusEvent::TabUpdated {
                tab_id: TabId(tab),
                url: Some(url.to_string()),
            },
            FocusEvent::TabActivated {
                tab_id: TabId(tab),
                window_id: WindowId(1),
            },
        ];
        for event in events {
            running.registry.observe(&event);
            running.handle.deliver(event, at).await.unwrap();
        }
    }

    async fn snapshot(handle: &EngineHandle) -> Aggregates {
        handle.get_time_data().await.unwrap().into_aggregates().unwrap()
    }

    fn ago(secs: i64) -> DateTime<Utc> {
        Utc::now() - chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn switch_attributes_time_through_the_handle() {
        let running = spawn_engine().await;
        open(&running, 1, "https://a.com/", ago(40)).await;
        open(&running, 2, "https://b.com/", ago(15)).await;

        let aggregates = snapshot(&running.handle).await;
        let a = Domain::new("a.com").unwrap();
        assert_eq!(aggregates.time_data[&a].total_time_secs, 25);
        assert!(!aggregates.time_data.contains_key(&Domain::new("b.com").unwrap()));

        running.handle.shutdown().await.unwrap();
        running.task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_flushes_active_session() {
        let running = spawn_engine().await;
        open(&running, 1, "https://a.com/", ago(30)).await;

        running.handle.shutdown().await.unwrap();
        running.task.await.unwrap();

        let aggregates = running.store.snapshot().await.unwrap();
        let total = aggregates.time_data[&Domain::new("a.com").unwrap()].total_time_secs;
        assert!((30..=32).contains(&total), "unexpected total {total}");
        assert_eq!(running.handle.get_time_data().await, Err(EngineError::Closed));
    }

    #[tokio::test]
    async fn reset_through_the_handle_empties_aggregates() {
        let running = spawn_engine().await;
        open(&running, 1, "https://a.com/", ago(40)).await;
        open(&running, 2, "https://b.com/", ago(20)).await;

        let response = running.handle.reset_data().await.unwrap();
        assert_eq!(
            response,
            Response::Reset {
                success: true,
                error: None
            }
        );
        let aggregates = snapshot(&running.handle).await;
        assert!(aggregates.time_data.is_empty());
        assert!(aggregates.daily_data.is_empty());

        running.handle.shutdown().await.unwrap();
        running.task.await.unwrap();
    }

    #[tokio::test]
    async fn failed_reset_reports_error() {
        let running = spawn_engine().await;
        running.store.substrate().set_unavailable(true);

        let response = running.handle.reset_data().await.unwrap();
        assert!(matches!(response, Response::Reset { success: false, error: Some(_) }));

        running.store.substrate().set_unavailable(false);
        running.handle.shutdown().await.unwrap();
        running.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn flush_tick_fires_on_interval() {
        let running = spawn_engine().await;
        open(&running, 1, "https://a.com/", ago(60)).await;

        time::sleep(Duration::from_secs(11)).await;
        let aggregates = running.store.snapshot().await.unwrap();
        let a = Domain::new("a.com").unwrap();
        assert!(aggregates.time_data[&a].total_time_secs >= 60);

        running.handle.shutdown().await.unwrap();
        running.task.await.unwrap();
    }
}
