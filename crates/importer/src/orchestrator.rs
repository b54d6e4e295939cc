//! Pipeline orchestrator.
//!
//! Executions advance one step at a time. A [`WorkUnit`] names an execution
//! and the index of its next step; workers pull units from a shared queue, run
//! the step, persist its output and enqueue the following unit. Steps of one
//! execution therefore never overlap, while different executions proceed in
//! parallel across workers.
//!
//! Every step runs in its own spawned task. A panic inside a handler surfaces
//! as a `JoinError` and the execution is marked FAILED instead of being left
//! in RUNNING forever.

use crate::context::{ExecutionInput, ExecutionOutput, StepContext};
use crate::error::{ImportError, ImportResult};
use crate::handlers::ImportHandler;
use crate::metrics;
use crate::registry::HandlerRegistry;
use crate::tracker::ExecutionTracker;
use geoingest_core::{
    ExecutionAction, ExecutionId, ExecutionStatus, HandlerKind, ImportOptions, PipelineStep,
    ResourceOverrides, UploadFiles,
};
use geoingest_metadata::MetadataStore;
use geoingest_metadata::models::ExecutionRow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

/// One step of one execution, waiting to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkUnit {
    pub execution_id: ExecutionId,
    pub step_index: usize,
}

/// Dispatches handler task lists onto the worker pool.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<HandlerRegistry>,
    tracker: ExecutionTracker,
    metadata: Arc<dyn MetadataStore>,
    queue: mpsc::UnboundedSender<WorkUnit>,
}

impl Orchestrator {
    /// Create the orchestrator and spawn `workers` worker tasks.
    pub fn start(
        registry: Arc<HandlerRegistry>,
        metadata: Arc<dyn MetadataStore>,
        workers: usize,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            registry,
            tracker: ExecutionTracker::new(metadata.clone()),
            metadata,
            queue: tx,
        });
        let rx = Arc::new(Mutex::new(rx));
        let handles = (0..workers.max(1))
            .map(|worker| tokio::spawn(worker_loop(worker, inner.clone(), rx.clone())))
            .collect();
        tracing::info!(workers = workers.max(1), "pipeline workers started");
        (Self { inner }, handles)
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.inner.tracker
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.registry
    }

    /// Accept an import and return its id. The steps run in the background.
    pub async fn dispatch(
        &self,
        handler: &dyn ImportHandler,
        files: UploadFiles,
        options: ImportOptions,
        upload_dir: Option<PathBuf>,
    ) -> ImportResult<ExecutionId> {
        let input = ExecutionInput::for_import(files, options, upload_dir);
        self.accept(handler.kind(), ExecutionAction::Import, &input)
            .await
    }

    /// Accept a copy of `resource_id` through the handler that imported it.
    /// File validation is skipped; the source is the existing table.
    pub async fn dispatch_copy(
        &self,
        handler: &dyn ImportHandler,
        resource_id: Uuid,
        overrides: ResourceOverrides,
    ) -> ImportResult<ExecutionId> {
        let input = ExecutionInput::for_copy(resource_id, overrides);
        self.accept(handler.kind(), ExecutionAction::Copy, &input)
            .await
    }

    async fn accept(
        &self,
        kind: HandlerKind,
        action: ExecutionAction,
        input: &ExecutionInput,
    ) -> ImportResult<ExecutionId> {
        if self.inner.registry.get(kind).is_none() {
            return Err(ImportError::UnknownHandler(kind.key().to_string()));
        }
        let id = ExecutionId::new();
        self.inner
            .tracker
            .create(id, action, Some(kind), &serde_json::to_value(input)?)
            .await?;
        metrics::EXECUTIONS_IN_FLIGHT.inc();

        let unit = WorkUnit {
            execution_id: id,
            step_index: 0,
        };
        if let Err(e) = self.inner.enqueue(unit) {
            self.inner.finish_failed(id, action, None, &e).await;
            return Err(e);
        }
        tracing::info!(execution_id = %id, action = %action, handler = %kind, "execution dispatched");
        Ok(id)
    }

    /// Re-enqueue every non-terminal execution at the step it last started.
    ///
    /// Steps are idempotent, so re-running a step that completed just before
    /// a restart is harmless. Returns the number of executions resumed.
    pub async fn resume_unfinished(&self) -> ImportResult<usize> {
        let rows = self.inner.metadata.get_unfinished_executions().await?;
        let mut resumed = 0;
        for row in rows {
            let id = ExecutionId::from(row.exec_id);
            match self.inner.resume_point(&row) {
                Ok(step_index) => {
                    metrics::EXECUTIONS_IN_FLIGHT.inc();
                    self.inner.enqueue(WorkUnit {
                        execution_id: id,
                        step_index,
                    })?;
                    tracing::info!(execution_id = %id, step_index, "resuming execution");
                    resumed += 1;
                }
                Err(e) => {
                    tracing::warn!(execution_id = %id, error = %e, "cannot resume execution");
                    if let Err(fail_err) = self
                        .inner
                        .tracker
                        .fail(id, None, &format!("cannot resume: {e}"))
                        .await
                    {
                        tracing::error!(execution_id = %id, error = %fail_err, "failed to mark execution as failed");
                    }
                }
            }
        }
        Ok(resumed)
    }
}

async fn worker_loop(
    worker: usize,
    inner: Arc<Inner>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<WorkUnit>>>,
) {
    loop {
        let unit = { rx.lock().await.recv().await };
        let Some(unit) = unit else {
            break;
        };
        tracing::debug!(worker, execution_id = %unit.execution_id, step_index = unit.step_index, "picked up work unit");
        if let Err(e) = inner.advance(unit).await {
            // Bookkeeping failed before or after the step itself.
            tracing::error!(execution_id = %unit.execution_id, error = %e, "pipeline step could not be run");
            let action = match inner.tracker.get(unit.execution_id).await {
                Ok(Some(row)) => row.action.parse().unwrap_or(ExecutionAction::Import),
                _ => ExecutionAction::Import,
            };
            inner.finish_failed(unit.execution_id, action, None, &e).await;
        }
    }
    tracing::debug!(worker, "pipeline worker stopped");
}

impl Inner {
    fn enqueue(&self, unit: WorkUnit) -> ImportResult<()> {
        self.queue.send(unit).map_err(|_| ImportError::QueueClosed)
    }

    fn handler_for(&self, row: &ExecutionRow) -> ImportResult<Arc<dyn ImportHandler>> {
        let key = row
            .handler
            .as_deref()
            .ok_or_else(|| ImportError::UnknownHandler("(none)".to_string()))?;
        let kind: HandlerKind = key.parse()?;
        self.registry
            .get(kind)
            .ok_or_else(|| ImportError::UnknownHandler(key.to_string()))
    }

    fn resume_point(&self, row: &ExecutionRow) -> ImportResult<usize> {
        if row.step.is_empty() {
            return Ok(0);
        }
        let action: ExecutionAction = row.action.parse()?;
        let step: PipelineStep = row.step.parse()?;
        let handler = self.handler_for(row)?;
        handler
            .tasks_for(action)
            .iter()
            .position(|s| *s == step)
            .ok_or_else(|| {
                geoingest_core::Error::InvalidStep(format!("{step} is not part of the {action} task list"))
                    .into()
            })
    }

    async fn advance(&self, unit: WorkUnit) -> ImportResult<()> {
        let id = unit.execution_id;
        let row = self.tracker.require(id).await?;
        let status: ExecutionStatus = row.status.parse()?;
        if status.is_terminal() {
            tracing::debug!(execution_id = %id, status = %status, "skipping finished execution");
            return Ok(());
        }
        let action: ExecutionAction = row.action.parse()?;
        let handler = self.handler_for(&row)?;
        let steps = handler.tasks_for(action);
        let step = *steps.get(unit.step_index).ok_or_else(|| {
            geoingest_core::Error::InvalidStep(format!("step index {} out of range", unit.step_index))
        })?;

        self.tracker
            .update(id, ExecutionStatus::Running, step, step.stage(), &format!("starting {step}"))
            .await?;

        let input: ExecutionInput = serde_json::from_str(&row.input_json)?;
        let output: ExecutionOutput = match row.output_json.as_deref() {
            Some(json) => serde_json::from_str(json)?,
            None => ExecutionOutput::default(),
        };
        let mut ctx = StepContext {
            execution_id: id,
            input,
            output,
        };

        let started = Instant::now();
        let task = tokio::spawn(async move {
            let result = handler.execute_step(step, &mut ctx).await;
            (result, ctx)
        });
        let joined = task.await;
        let elapsed = started.elapsed().as_secs_f64();

        match joined {
            Ok((Ok(()), ctx)) => {
                metrics::STEP_DURATION
                    .with_label_values(&[step.as_str(), "success"])
                    .observe(elapsed);
                self.tracker
                    .set_output(id, &serde_json::to_value(&ctx.output)?)
                    .await?;

                if unit.step_index + 1 >= steps.len() {
                    self.tracker
                        .succeed(id, step, &format!("{action} finished"))
                        .await?;
                    metrics::EXECUTIONS_IN_FLIGHT.dec();
                    metrics::EXECUTIONS_SUCCEEDED
                        .with_label_values(&[action.as_str()])
                        .inc();
                    tracing::info!(execution_id = %id, action = %action, "execution succeeded");
                } else {
                    self.enqueue(WorkUnit {
                        execution_id: id,
                        step_index: unit.step_index + 1,
                    })?;
                }
            }
            Ok((Err(e), _)) => {
                metrics::STEP_DURATION
                    .with_label_values(&[step.as_str(), "error"])
                    .observe(elapsed);
                tracing::warn!(
                    execution_id = %id,
                    step = %step,
                    error = %e,
                    kind = e.kind(),
                    "pipeline step failed"
                );
                self.finish_failed(id, action, Some(step), &e).await;
            }
            Err(join_err) => {
                metrics::STEP_DURATION
                    .with_label_values(&[step.as_str(), "panic"])
                    .observe(elapsed);
                let e = step_join_error(join_err);
                tracing::error!(execution_id = %id, step = %step, error = %e, "pipeline step panicked");
                self.finish_failed(id, action, Some(step), &e).await;
            }
        }
        Ok(())
    }

    /// Mark the execution FAILED. Errors while doing so are logged; a record
    /// that is already terminal is left as it is.
    async fn finish_failed(
        &self,
        id: ExecutionId,
        action: ExecutionAction,
        step: Option<PipelineStep>,
        error: &ImportError,
    ) {
        match self.tracker.fail(id, step, &error.to_string()).await {
            Ok(()) => {
                metrics::EXECUTIONS_IN_FLIGHT.dec();
                metrics::EXECUTIONS_FAILED
                    .with_label_values(&[action.as_str()])
                    .inc();
            }
            Err(e) => {
                tracing::error!(execution_id = %id, error = %e, "failed to record execution failure");
            }
        }
    }
}

fn step_join_error(err: JoinError) -> ImportError {
    if !err.is_panic() {
        return ImportError::StepPanicked("step task was cancelled".to_string());
    }
    metrics::STEP_PANICS.inc();
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    ImportError::StepPanicked(message)
}
