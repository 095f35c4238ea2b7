//! Launch flow for a single analysis job.
//!
//! The order matters: credits are pre-checked before anything is
//! written, the job row exists before the credit is engaged (so the
//! ledger decrement is tagged with a real job id), and the credit is
//! engaged before the request leaves the process. A failed engage marks
//! the freshly created job `error` rather than leaving an orphan.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use quantdesk_core::feature::Feature;
use quantdesk_core::outcome::{DeliverySource, JobOutcome};
use quantdesk_core::types::DbId;
use quantdesk_db::models::job::CreateJob;
use quantdesk_events::{DeskEvent, EventBus};
use quantdesk_executor::DispatchReply;

use crate::active_jobs::ActiveJobs;
use crate::dispatch::{AnalysisDispatcher, DispatchError};
use crate::poller::{poll_job, PollSchedule};
use crate::registry::{DeliveryHandler, DeliveryRegistry};
use crate::store::{CreditLedger, JobStore, StoreError};

/// A request to run one analysis feature with an opaque payload.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub feature: Feature,
    pub payload: serde_json::Value,
}

/// Why a launch was refused. All variants are rejected synchronously at
/// the `launch` call; nothing is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// No credit remaining for this feature. When `job_id` is set, a job
    /// row was created and has been marked `error` (the engage step lost
    /// a race for the last unit).
    #[error("No credits remaining for feature {feature}")]
    CreditExhausted {
        feature: Feature,
        remaining: i32,
        job_id: Option<DbId>,
    },

    /// A handler is already registered for this job id.
    #[error(transparent)]
    DuplicateRegistration(#[from] crate::registry::DuplicateRegistration),

    /// The store refused or failed the create/pre-check.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Handle returned from a successful launch.
///
/// Detaching stops the polling timers and removes the registration so no
/// late callback can fire into a torn-down consumer. Views detach their
/// handles on teardown.
pub struct JobHandle {
    job_id: DbId,
    registry: Arc<DeliveryRegistry>,
    active: Arc<ActiveJobs>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl JobHandle {
    pub fn job_id(&self) -> DbId {
        self.job_id
    }

    /// Stop polling and drop the registration.
    ///
    /// If the handler had not fired yet, the in-flight count is released
    /// here -- the consumer gave up, so the job no longer holds the
    /// session open.
    pub fn detach(&self) {
        self.cancel.cancel();
        if self.registry.unregister(self.job_id) {
            self.active.release();
        }
    }
}

/// Orchestrates launches: credit reservation, job creation, handler
/// registration, dispatch, and the polling fallback.
pub struct JobLauncher {
    store: Arc<dyn JobStore>,
    credits: Arc<dyn CreditLedger>,
    dispatcher: Arc<dyn AnalysisDispatcher>,
    registry: Arc<DeliveryRegistry>,
    active: Arc<ActiveJobs>,
    bus: Arc<EventBus>,
    schedule: PollSchedule,
    /// Root token; every per-job token is a child, so shutdown stops all
    /// polling at once.
    cancel: CancellationToken,
}

impl JobLauncher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn JobStore>,
        credits: Arc<dyn CreditLedger>,
        dispatcher: Arc<dyn AnalysisDispatcher>,
        registry: Arc<DeliveryRegistry>,
        active: Arc<ActiveJobs>,
        bus: Arc<EventBus>,
        schedule: PollSchedule,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            credits,
            dispatcher,
            registry,
            active,
            bus,
            schedule,
            cancel,
        }
    }

    /// Launch one analysis job.
    ///
    /// `handler` fires exactly once with the terminal outcome, whichever
    /// channel produces it first. One [`DeskEvent`] is published per
    /// terminal outcome on the same fire-once guarantee.
    pub async fn launch(
        &self,
        user_id: DbId,
        request: LaunchRequest,
        handler: DeliveryHandler,
    ) -> Result<JobHandle, LaunchError> {
        let feature = request.feature;

        let allowance = self.credits.can_launch(user_id, feature).await?;
        if !allowance.allowed {
            tracing::info!(user_id, feature = %feature, "Launch refused, no credits");
            return Err(LaunchError::CreditExhausted {
                feature,
                remaining: allowance.remaining,
                job_id: None,
            });
        }

        let job = self
            .store
            .create_job(
                user_id,
                &CreateJob {
                    feature,
                    request_payload: request.payload.clone(),
                },
            )
            .await?;
        let job_id = job.id;

        let engaged = self.credits.engage(user_id, feature, job_id).await?;
        if !engaged {
            // The pre-check passed but another launch consumed the last
            // unit in between. Don't leave an orphaned queued job.
            if let Err(e) = self.store.mark_error(job_id, "credit exhausted").await {
                tracing::warn!(job_id, error = %e, "Failed to mark unengaged job as error");
            }
            return Err(LaunchError::CreditExhausted {
                feature,
                remaining: 0,
                job_id: Some(job_id),
            });
        }

        let job_cancel = self.cancel.child_token();
        let wrapped = self.wrap_handler(job_id, user_id, feature, job_cancel.clone(), handler);
        self.registry.register(job_id, wrapped)?;
        self.active.acquire();

        tracing::info!(job_id, user_id, feature = %feature, "Job launched");

        self.spawn_dispatch(job_id, feature, request.payload);
        tokio::spawn(poll_job(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            job_id,
            self.schedule,
            job_cancel.clone(),
        ));

        Ok(JobHandle {
            job_id,
            registry: Arc::clone(&self.registry),
            active: Arc::clone(&self.active),
            cancel: job_cancel,
        })
    }

    /// Wrap the caller's handler with the bookkeeping that must run on
    /// the terminal outcome: release the in-flight count, stop the
    /// polling task, publish the notification event.
    fn wrap_handler(
        &self,
        job_id: DbId,
        user_id: DbId,
        feature: Feature,
        job_cancel: CancellationToken,
        handler: DeliveryHandler,
    ) -> DeliveryHandler {
        let active = Arc::clone(&self.active);
        let bus = Arc::clone(&self.bus);

        Box::new(move |outcome: JobOutcome, source: DeliverySource| {
            active.release();
            job_cancel.cancel();

            let event = match &outcome {
                JobOutcome::Done(content) => DeskEvent::JobCompleted {
                    job_id,
                    user_id,
                    feature,
                    content: content.clone(),
                    source,
                },
                JobOutcome::Error { message } => DeskEvent::JobFailed {
                    job_id,
                    user_id,
                    feature,
                    message: message.clone(),
                },
                JobOutcome::TimedOut => DeskEvent::JobTimedOut {
                    job_id,
                    user_id,
                    feature,
                },
            };
            bus.publish(event);

            handler(outcome, source);
        })
    }

    /// Fire the dispatch request in its own task. An immediate
    /// synchronous result enters the registry like any other delivery;
    /// transient failures are left to the poll/push/timeout machinery.
    fn spawn_dispatch(&self, job_id: DbId, feature: Feature, payload: serde_json::Value) {
        let dispatcher = Arc::clone(&self.dispatcher);
        let store = Arc::clone(&self.store);
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            match dispatcher.dispatch(job_id, feature, &payload).await {
                Ok(DispatchReply::Ack) => {
                    tracing::debug!(job_id, "Dispatch acknowledged");
                }
                Ok(DispatchReply::Completed(content)) => {
                    tracing::info!(job_id, "Dispatch returned synchronous result");
                    let payload = match serde_json::to_value(&content) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::warn!(job_id, error = %e, "Failed to serialize result");
                            serde_json::Value::Null
                        }
                    };
                    if let Err(e) = store.mark_done(job_id, &payload).await {
                        tracing::warn!(job_id, error = %e, "Failed to persist synchronous result");
                    }
                    registry.deliver(job_id, JobOutcome::Done(content), DeliverySource::Dispatch);
                }
                Err(DispatchError::Transient(message)) => {
                    // The service writes results into the job record
                    // out-of-band, so a lost dispatch response does not
                    // mean a lost job. The deadline is the backstop.
                    tracing::warn!(job_id, error = %message, "Dispatch failed transiently");
                }
                Err(DispatchError::Rejected(message)) => {
                    tracing::error!(job_id, error = %message, "Dispatch rejected");
                    if let Err(e) = store.mark_error(job_id, &message).await {
                        tracing::warn!(job_id, error = %e, "Failed to mark rejected job");
                    }
                    registry.deliver(
                        job_id,
                        JobOutcome::Error { message },
                        DeliverySource::Dispatch,
                    );
                }
            }
        });
    }
}
