//! A running safety session.
//!
//! The session task is the only owner of the [`TriggerEvaluator`]. Monitors,
//! responders and [`SessionHandle`]s talk to it through one mpsc channel;
//! every batch of inputs is applied in arrival order and followed by a single
//! [`Snapshot`] published on a watch channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::alert::{self, Alert};
use crate::capability::Devices;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::evaluator::{Decision, Signal, TriggerEvaluator};
use crate::event::{Coordinates, EventData};
use crate::evidence;
use crate::monitor::{self, MonitorSet, Reporter, StopHandle};
use crate::state::{SourceKind, SourceStatus, Snapshot};

/// Capacity of the session input channel.
const INPUT_CAPACITY: usize = 256;

/// How long shutdown waits for tasks before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Everything the session task consumes.
#[derive(Debug)]
pub(crate) enum Input {
    /// A trigger signal for the evaluator.
    Signal(Signal),
    /// A position fix from the location watcher.
    Position(Coordinates),
    /// No fix could be obtained; show the fallback position.
    PositionFallback,
    /// Evidence from a responder.
    Evidence(EventData),
    /// A source changed availability.
    Status(SourceKind, SourceStatus),
    /// Operator-confirmed cancel; replies whether an episode ended.
    Cancel(oneshot::Sender<bool>),
    /// Restart a source.
    ReEnable(SourceKind),
    /// Replies once every earlier input is reflected in the snapshot.
    Sync(oneshot::Sender<()>),
}

/// Replies held back until the batch is published.
#[derive(Debug)]
enum Reply {
    Cancel(oneshot::Sender<bool>, bool),
    Sync(oneshot::Sender<()>),
}

impl Reply {
    fn send(self) {
        // A caller that stopped waiting is not an error
        match self {
            Self::Cancel(tx, ended) => {
                let _ = tx.send(ended);
            }
            Self::Sync(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// A running session.
///
/// Dropping the session signals every task to stop; [`Session::shutdown`]
/// additionally waits for them so devices are released before it returns.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    stop: StopHandle,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Start a session against `devices`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn start(config: Config, devices: Devices) -> Result<Self> {
        config.validate()?;

        let evaluator =
            TriggerEvaluator::new(&config.trigger)?.with_haptics(Arc::clone(&devices.haptics));
        let (tx, rx) = mpsc::channel(INPUT_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(Arc::new(Snapshot::initial()));
        let stop = StopHandle::new();

        let core = SessionCore {
            config: Arc::new(config),
            devices,
            evaluator,
            location: None,
            sources: Snapshot::initial().sources,
            last_update: None,
            tx: tx.clone(),
            snapshots,
            monitors: MonitorSet::new(),
            tasks: JoinSet::new(),
            root: stop.clone(),
            pending_episode: None,
            replies: Vec::new(),
        };
        let task = tokio::spawn(core.run(rx));
        info!("Session started");

        Ok(Self {
            handle: SessionHandle {
                tx,
                snapshots: snapshot_rx,
            },
            stop,
            task: Some(task),
        })
    }

    /// A handle for submitting signals and reading snapshots.
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop every monitor and responder and wait for them to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the session task panicked.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.stop();
        if let Some(task) = self.task.take() {
            task.await
                .map_err(|e| Error::internal(format!("session task failed: {e}")))?;
        }
        info!("Session stopped");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Cloneable access to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Input>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
}

impl SessionHandle {
    /// Press the emergency button.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn activate(&self) -> Result<()> {
        self.submit(Signal::Manual).await
    }

    /// Deliver a signal to the evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn submit(&self, signal: Signal) -> Result<()> {
        self.tx.send(Input::Signal(signal)).await?;
        Ok(())
    }

    /// Cancel the running episode.
    ///
    /// Returns `true` if an episode was ended, `false` if none was running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn cancel(&self) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Input::Cancel(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)
    }

    /// Restart a source, typically after it became unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn re_enable(&self, kind: SourceKind) -> Result<()> {
        self.tx.send(Input::ReEnable(kind)).await?;
        Ok(())
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshots.borrow())
    }

    /// A receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session stops first.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<Arc<Snapshot>>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        let mut rx = self.snapshots.clone();
        let snapshot = Arc::clone(
            &*rx.wait_for(|s| predicate(&**s))
                .await
                .map_err(|_| Error::SessionClosed)?,
        );
        Ok(snapshot)
    }

    /// Wait until every input sent so far is reflected in the snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped.
    pub async fn settle(&self) -> Result<Arc<Snapshot>> {
        let (tx, rx) = oneshot::channel();
        self.tx.send(Input::Sync(tx)).await?;
        rx.await.map_err(|_| Error::SessionClosed)?;
        Ok(self.snapshot())
    }
}

/// State owned by the session task.
struct SessionCore {
    config: Arc<Config>,
    devices: Devices,
    evaluator: TriggerEvaluator,
    location: Option<Coordinates>,
    sources: BTreeMap<SourceKind, SourceStatus>,
    last_update: Option<DateTime<Utc>>,
    tx: mpsc::Sender<Input>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    monitors: MonitorSet,
    tasks: JoinSet<()>,
    root: StopHandle,
    pending_episode: Option<u32>,
    replies: Vec<Reply>,
}

impl SessionCore {
    async fn run(mut self, mut rx: mpsc::Receiver<Input>) {
        let stop = self.root.clone();

        let monitor = &self.config.monitor;
        let enabled = [
            (SourceKind::Sound, monitor.sound_enabled),
            (SourceKind::Voice, monitor.voice_enabled),
            (SourceKind::Location, monitor.location_enabled),
        ];
        for (kind, on) in enabled {
            if on {
                self.start_source(kind);
            }
        }
        self.publish();

        loop {
            tokio::select! {
                () = stop.stopped() => break,
                input = rx.recv() => {
                    let Some(input) = input else { break };
                    self.apply(input);
                    while let Ok(input) = rx.try_recv() {
                        self.apply(input);
                    }
                    self.publish();
                    self.start_responders();
                    for reply in self.replies.drain(..) {
                        reply.send();
                    }
                }
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Session task panicked");
                        }
                    }
                }
            }
        }

        self.stop_tasks(rx).await;
    }

    fn apply(&mut self, input: Input) {
        match input {
            Input::Signal(signal) => {
                if let Decision::Activated(_) = self.evaluator.signal(&signal) {
                    self.last_update = Some(Utc::now());
                    self.pending_episode = Some(self.evaluator.state().episode);
                }
            }
            Input::Position(coordinates) => {
                self.location = Some(coordinates);
                self.last_update = Some(Utc::now());
                self.sources.insert(SourceKind::Location, SourceStatus::Running);
                if self.evaluator.is_active() {
                    self.evaluator
                        .record_evidence(EventData::Location { coordinates });
                }
            }
            Input::PositionFallback => {
                if self.location.is_none() {
                    let fallback = self.config.fallback_location();
                    debug!(%fallback, "Using fallback location");
                    self.location = Some(fallback);
                }
            }
            Input::Evidence(data) => {
                self.evaluator.record_evidence(data);
            }
            Input::Status(kind, status) => {
                self.sources.insert(kind, status);
            }
            Input::Cancel(tx) => {
                let ended = self.evaluator.cancel();
                if ended {
                    self.last_update = Some(Utc::now());
                    self.pending_episode = None;
                }
                self.replies.push(Reply::Cancel(tx, ended));
            }
            Input::ReEnable(kind) => {
                info!(source = %kind, "Re-enabling source");
                self.start_source(kind);
            }
            Input::Sync(tx) => self.replies.push(Reply::Sync(tx)),
        }
    }

    fn publish(&self) {
        let snapshot = Snapshot {
            state: self.evaluator.state(),
            events: self.evaluator.log().shared(),
            sound: self.evaluator.sound(),
            location: self.location,
            sources: self.sources.clone(),
            last_update: self.last_update,
        };
        self.snapshots.send_replace(Arc::new(snapshot));
    }

    /// Start (or restart) the task behind `kind`.
    fn start_source(&mut self, kind: SourceKind) {
        let stop = self.root.child();
        let reporter = Reporter::new(kind, self.tx.clone());
        self.monitors.replace(kind, stop.clone());
        self.sources.insert(kind, SourceStatus::Idle);

        match kind {
            SourceKind::Sound => {
                self.tasks.spawn(monitor::sound::run(
                    Arc::clone(&self.devices.microphone),
                    self.config.frame_interval(),
                    reporter,
                    stop,
                ));
            }
            SourceKind::Voice => {
                self.tasks.spawn(monitor::voice::run(
                    Arc::clone(&self.devices.speech),
                    self.evaluator.matcher().clone(),
                    self.snapshots.subscribe(),
                    reporter,
                    stop,
                ));
            }
            SourceKind::Location => {
                self.tasks.spawn(monitor::location::run(
                    Arc::clone(&self.devices.geolocation),
                    reporter,
                    stop,
                ));
            }
            SourceKind::Recorder | SourceKind::Camera => {
                let state = self.evaluator.state();
                if state.active {
                    self.start_evidence(kind, state.episode, reporter, stop);
                }
            }
        }
    }

    fn start_evidence(&mut self, kind: SourceKind, episode: u32, reporter: Reporter, stop: StopHandle) {
        match kind {
            SourceKind::Recorder => {
                self.tasks.spawn(evidence::record_audio(
                    Arc::clone(&self.devices.microphone),
                    self.config.recording_cap(),
                    self.config.frame_interval(),
                    episode,
                    self.snapshots.subscribe(),
                    reporter,
                    stop,
                ));
            }
            SourceKind::Camera => {
                self.tasks.spawn(evidence::capture_photo(
                    Arc::clone(&self.devices.camera),
                    reporter,
                    stop,
                ));
            }
            _ => warn!(source = %kind, "Not an evidence source"),
        }
    }

    /// Start the responders for an episode that began in the last batch.
    ///
    /// Runs after the batch is published so responders observe the active
    /// state from their first look at the snapshot.
    fn start_responders(&mut self) {
        let Some(episode) = self.pending_episode.take() else {
            return;
        };

        let recording = &self.config.recording;
        let responders = [
            (SourceKind::Recorder, recording.auto_record),
            (SourceKind::Camera, recording.auto_photo),
        ];
        for (kind, on) in responders {
            if on {
                let stop = self.root.child();
                self.monitors.replace(kind, stop.clone());
                let reporter = Reporter::new(kind, self.tx.clone());
                self.start_evidence(kind, episode, reporter, stop);
            }
        }

        if self.config.alert.enabled {
            let alert = Alert {
                episode,
                location: self
                    .location
                    .unwrap_or_else(|| self.config.fallback_location()),
                contacts: self.config.notified_contacts().cloned().collect(),
            };
            debug!(episode, recipients = alert.recipient_count(), "Scheduling alert");
            self.tasks.spawn(alert::run(
                alert,
                self.config.alert_delay(),
                self.snapshots.subscribe(),
                self.tx.clone(),
                self.root.child(),
            ));
        }
    }

    async fn stop_tasks(mut self, mut rx: mpsc::Receiver<Input>) {
        self.root.stop();
        self.monitors.stop_all();
        // Senders blocked on a full channel fail once it is closed
        rx.close();

        let drain = async {
            while self.tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("Tasks did not stop in time, aborting");
            self.tasks.shutdown().await;
        }
        debug!(running = self.monitors.any_running(), "Session tasks stopped");
    }
}

impl std::fmt::Debug for SessionCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCore")
            .field("state", &self.evaluator.state())
            .field("events", &self.evaluator.log().len())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
