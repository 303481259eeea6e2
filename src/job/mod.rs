// src/job/mod.rs

//! Job Coordinator.
//!
//! The engine is a single non-reentrant resource. The coordinator owns it
//! together with the execution counters and the accepted signatures and
//! licenses, and hands them out to one Job at a time:
//! - [`Coordinator::begin`] blocks until the engine is free, marks it as in
//!   use and tells the front-end it is locked
//! - dropping or finishing the returned [`Job`] releases it again
//! - [`Coordinator::cancel`] trips the job's cancellation token; the Callback
//!   Bridge turns that into an aborted download
//!
//! Nothing here is global: tests build as many coordinators as they like.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::{Approvals, CallbackBridge, EulaStore, SignatureStore};
use crate::cache_root::{CacheRoot, CacheRootSwitch};
use crate::engine::{Engine, EngineError};
use crate::errors::{JobError, JobResult};
use crate::frontend::{FrontendEvent, FrontendSink, JobId, JobReporter, Outcome};
use crate::fs::FileSystem;
use crate::ops::{self, Request};
use crate::progress::ProgressAggregator;
use crate::types::ErrorCode;

pub mod context;

pub use context::{JobContext, JobSettings};

struct EngineSlot {
    engine: Box<dyn Engine>,
    progress: ProgressAggregator,
    /// Cache path the engine target was initialised against.
    target_root: Option<PathBuf>,
    initialized: bool,
}

pub struct Coordinator {
    slot: Mutex<EngineSlot>,
    in_use: Mutex<Option<JobId>>,
    jobs: Mutex<HashMap<JobId, CancellationToken>>,
    next_id: AtomicU64,
    sink: Arc<dyn FrontendSink>,
    signatures: SignatureStore,
    eulas: EulaStore,
    cache: CacheRootSwitch,
    fs: Arc<dyn FileSystem>,
    settings: JobSettings,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("in_use", &self.in_use())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Exclusive hold on the engine for one Job.
pub struct Job<'c> {
    id: JobId,
    coordinator: &'c Coordinator,
    slot: MutexGuard<'c, EngineSlot>,
    reporter: JobReporter,
    cancel: CancellationToken,
    released: bool,
}

impl Coordinator {
    pub fn new(
        engine: Box<dyn Engine>,
        fs: Arc<dyn FileSystem>,
        cache: CacheRootSwitch,
        settings: JobSettings,
        sink: Arc<dyn FrontendSink>,
    ) -> Self {
        Self {
            slot: Mutex::new(EngineSlot {
                engine,
                progress: ProgressAggregator::new(),
                target_root: None,
                initialized: false,
            }),
            in_use: Mutex::new(None),
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            sink,
            signatures: Approvals::signatures(),
            eulas: Approvals::eulas(),
            cache,
            fs,
            settings,
        }
    }

    pub fn signatures(&self) -> &SignatureStore {
        &self.signatures
    }

    pub fn eulas(&self) -> &EulaStore {
        &self.eulas
    }

    pub fn cache(&self) -> &CacheRootSwitch {
        &self.cache
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// Job currently holding the engine.
    pub fn in_use(&self) -> Option<JobId> {
        *self.in_use.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id and a cancellation token for a new Job.
    pub fn create_job(&self) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, CancellationToken::new());
        debug!(job = %id, "job created");
        id
    }

    /// Ask `job` to stop. Returns false for unknown or finished jobs.
    pub fn cancel(&self, job: JobId) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.get(&job) {
            Some(token) => {
                info!(job = %job, "cancelling job");
                token.cancel();
                true
            }
            None => {
                debug!(job = %job, "no such job to cancel");
                false
            }
        }
    }

    fn token(&self, job: JobId) -> CancellationToken {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job)
            .or_insert_with(CancellationToken::new)
            .clone()
    }

    /// Block until the engine is free and take it for `job`.
    pub fn begin(&self, job: JobId) -> Job<'_> {
        let cancel = self.token(job);
        debug!(job = %job, "waiting for engine");
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(other) = *in_use {
                warn!(job = %job, other = %other, "engine marked in use by another job");
            }
            *in_use = Some(job);
        }
        info!(job = %job, "engine locked");

        let reporter = JobReporter::new(job, Arc::clone(&self.sink));
        reporter.emit(FrontendEvent::Locked(true));

        Job {
            id: job,
            coordinator: self,
            slot,
            reporter,
            cancel,
            released: false,
        }
    }

    /// Run `request` as a new Job and wait for it.
    pub fn execute(&self, request: &Request) -> Outcome {
        let id = self.create_job();
        self.run(id, request)
    }

    /// Run `request` as the already created Job `id`.
    pub fn run(&self, id: JobId, request: &Request) -> Outcome {
        info!(job = %id, request = request.name(), "job started");
        let mut job = self.begin(id);

        if let Err(err) = self.run_locked(&mut job, request) {
            job.reporter.error(err);
        }

        job.finish()
    }

    fn run_locked(&self, job: &mut Job<'_>, request: &Request) -> JobResult<()> {
        if let Request::InstallSignature { key_id } = request {
            return ops::install_signature(&job.reporter, &self.signatures, key_id);
        }

        let slot = &mut *job.slot;
        let wanted = CacheRoot::for_dist_upgrade(request.requires_dist_upgrade());
        self.cache.select_root(wanted, slot.engine.as_mut())?;
        self.ensure_target(slot)?;
        slot.progress.reset();

        let mut ctx = JobContext {
            engine: slot.engine.as_mut(),
            bridge: CallbackBridge::new(
                &job.reporter,
                &mut slot.progress,
                &job.cancel,
                &self.signatures,
            ),
            settings: &self.settings,
            eulas: &self.eulas,
            cache: &self.cache,
        };
        ops::dispatch(&mut ctx, request)
    }

    /// Initialise the engine target, again whenever the active cache root
    /// moved since the last initialisation.
    fn ensure_target(&self, slot: &mut EngineSlot) -> JobResult<()> {
        let active = self.cache.active_path();

        if slot.target_root.as_ref() != Some(&active) {
            match &slot.target_root {
                Some(previous) if slot.initialized => {
                    info!(
                        from = %previous.display(),
                        to = %active.display(),
                        "switching target with hot pool"
                    );
                    slot.engine.resolver_mut().reset();
                    slot.initialized = false;
                }
                _ => debug!(root = %active.display(), "setting target on init"),
            }
            slot.target_root = Some(active);
        }

        if !slot.initialized {
            self.initialize(slot.engine.as_mut())?;
            slot.initialized = true;
        }
        Ok(())
    }

    fn initialize(&self, engine: &mut dyn Engine) -> JobResult<()> {
        let root = &self.settings.engine_root;
        match engine.initialize_target(root) {
            Ok(()) => Ok(()),
            Err(err @ EngineError::Locked(_)) => {
                Err(JobError::new(ErrorCode::FailedInitialization, err.to_string()))
            }
            Err(err) => {
                warn!("initialising target failed (package database broken?): {err}");
                self.schedule_rebuild();

                if !self.run_recovery() {
                    return Err(JobError::new(
                        ErrorCode::FailedInitialization,
                        err.to_string(),
                    ));
                }

                engine.initialize_target(root).map_err(|e| {
                    error!("package database reinitialisation failed: {e}");
                    JobError::new(ErrorCode::FailedInitialization, e.to_string())
                })
            }
        }
    }

    /// Leave a marker so the database gets rebuilt on next boot.
    fn schedule_rebuild(&self) {
        let marker = &self.settings.rebuild_marker;
        match self.fs.write(marker, b"") {
            Ok(()) => info!(marker = %marker.display(), "scheduled package database rebuild"),
            Err(e) => error!(marker = %marker.display(), "could not create rebuild marker: {e:#}"),
        }
    }

    fn run_recovery(&self) -> bool {
        let Some(cmd) = self.settings.recovery_command.as_deref() else {
            warn!("no recovery command configured");
            return false;
        };

        info!(command = %cmd, "running package database recovery");
        match Command::new("sh").arg("-c").arg(cmd).status() {
            Ok(status) if status.success() => {
                info!("package database recovery successful");
                true
            }
            Ok(status) => {
                error!(?status, "package database recovery failed");
                false
            }
            Err(e) => {
                error!("could not run recovery command: {e}");
                false
            }
        }
    }

    /// Borrow the engine between jobs.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut dyn Engine) -> R) -> R {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(slot.engine.as_mut())
    }

    fn release(&self, job: JobId) {
        {
            let mut in_use = self.in_use.lock().unwrap_or_else(PoisonError::into_inner);
            if *in_use == Some(job) {
                *in_use = None;
            }
        }
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job);
        info!(job = %job, "engine unlocked");
    }
}

impl Job<'_> {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn reporter(&self) -> &JobReporter {
        &self.reporter
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.coordinator.release(self.id);
        self.reporter.emit(FrontendEvent::Locked(false));
    }

    /// Release the engine and report the outcome.
    pub fn finish(mut self) -> Outcome {
        let outcome = self.reporter.outcome();
        self.release();
        info!(job = %self.id, success = outcome.is_success(), "job finished");
        self.reporter.emit(FrontendEvent::Finished(outcome.clone()));
        outcome
    }
}

impl Drop for Job<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
