use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::alert::{AlertContext, Category};
use crate::workflow::{InvestigationOutcome, Pipeline};
use crate::Result;

/// Lifecycle of one submitted alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Queued,
    Running,
    Completed(Category),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Queued => write!(f, "queued"),
            RunState::Running => write!(f, "running"),
            RunState::Completed(category) => write!(f, "completed ({})", category),
        }
    }
}

/// Completed runs kept for [`TriageEngine::status`] before the oldest is evicted.
pub const COMPLETED_RUNS_RETAINED: usize = 256;

/// Run states by id. Queued and running entries stay until they complete;
/// completed entries are kept up to `retain`, oldest evicted first.
struct RunTable {
    states: HashMap<Uuid, RunState>,
    completed: VecDeque<Uuid>,
    retain: usize,
}

impl RunTable {
    fn new(retain: usize) -> Self {
        Self {
            states: HashMap::new(),
            completed: VecDeque::new(),
            retain,
        }
    }

    fn set(&mut self, run_id: Uuid, state: RunState) {
        self.states.insert(run_id, state);
    }

    fn complete(&mut self, run_id: Uuid, category: Category) {
        self.states.insert(run_id, RunState::Completed(category));
        self.completed.push_back(run_id);
        while self.completed.len() > self.retain {
            if let Some(evicted) = self.completed.pop_front() {
                self.states.remove(&evicted);
            }
        }
    }
}

struct QueuedRun {
    run_id: Uuid,
    alert: AlertContext,
    reply: oneshot::Sender<InvestigationOutcome>,
}

/// Handle returned by [`TriageEngine::submit`].
pub struct RunHandle {
    pub run_id: Uuid,
    receiver: oneshot::Receiver<InvestigationOutcome>,
}

impl RunHandle {
    pub async fn outcome(self) -> Result<InvestigationOutcome> {
        self.receiver.await.map_err(|_| {
            crate::Error::Unavailable(format!("investigation {} ended without a result", self.run_id))
        })
    }
}

/// Runs alerts concurrently: alerts arrive on a queue and each one gets its
/// own task and its own state. The pipeline is shared read-only.
pub struct TriageEngine {
    pipeline: Arc<Pipeline>,
    runs: Arc<RwLock<RunTable>>,
    queue_tx: mpsc::Sender<QueuedRun>,
    queue_rx: Mutex<Option<mpsc::Receiver<QueuedRun>>>,
}

impl TriageEngine {
    pub fn new(pipeline: Arc<Pipeline>, capacity: usize) -> Self {
        Self::with_retention(pipeline, capacity, COMPLETED_RUNS_RETAINED)
    }

    /// Like [`TriageEngine::new`], keeping at most `retain` completed runs.
    pub fn with_retention(pipeline: Arc<Pipeline>, capacity: usize, retain: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));

        Self {
            pipeline,
            runs: Arc::new(RwLock::new(RunTable::new(retain))),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        }
    }

    pub async fn start(self: Arc<Self>) {
        let Some(rx) = self.queue_rx.lock().await.take() else {
            warn!("Triage engine already started");
            return;
        };

        info!("Starting triage engine");
        let engine = self.clone();
        tokio::spawn(async move {
            engine.execution_loop(rx).await;
        });
    }

    async fn execution_loop(self: Arc<Self>, mut rx: mpsc::Receiver<QueuedRun>) {
        while let Some(queued) = rx.recv().await {
            let pipeline = self.pipeline.clone();
            let runs = self.runs.clone();

            tokio::spawn(async move {
                let QueuedRun { run_id, alert, reply } = queued;
                runs.write().await.set(run_id, RunState::Running);

                let outcome = pipeline.investigate_run(run_id, alert).await;
                runs.write().await.complete(run_id, outcome.classification);

                if reply.send(outcome).is_err() {
                    warn!("Submitter of run {} went away before the result", run_id);
                }
            });
        }
        info!("Triage queue closed; engine stopped");
    }

    /// Queue an alert. The handle resolves once the run finishes.
    pub async fn submit(&self, alert: AlertContext) -> Result<RunHandle> {
        let run_id = Uuid::new_v4();
        let (reply, receiver) = oneshot::channel();

        self.runs.write().await.set(run_id, RunState::Queued);
        self.queue_tx
            .send(QueuedRun { run_id, alert, reply })
            .await
            .map_err(|e| crate::Error::Unavailable(format!("Failed to queue alert: {}", e)))?;

        Ok(RunHandle { run_id, receiver })
    }

    /// Submit and wait.
    pub async fn investigate(&self, alert: AlertContext) -> Result<InvestigationOutcome> {
        self.submit(alert).await?.outcome().await
    }

    pub async fn status(&self, run_id: &Uuid) -> Option<RunState> {
        self.runs.read().await.states.get(run_id).copied()
    }
}
