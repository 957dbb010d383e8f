use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tensormux_core::{
    ArtifactCatalog, Device, DeviceProbe, Engine, InstanceKind, ModelConfig, SessionOptions,
};
use tracing::info;

use crate::context::ExecutionContext;
use crate::error::{ContextError, RunError};
use crate::payload::Payload;

/// Context pool for one loaded model: one execution context per configured
/// instance-group member, runner index to context 1:1. The scheduler owns
/// per-slot serialization; the per-slot mutex only satisfies aliasing rules
/// and is never waited on.
pub struct ModelBackend<E: Engine> {
    name: String,
    contexts: Vec<Mutex<ExecutionContext<E::Session>>>,
}

impl<E: Engine> ModelBackend<E> {
    /// Create every context the instance-group layout calls for. The model
    /// fails to load when any one of them cannot be created.
    pub fn load(
        engine: &E,
        env: &E::Env,
        config: &ModelConfig,
        catalog: &ArtifactCatalog,
        probe: &dyn DeviceProbe,
    ) -> Result<Self, ContextError> {
        let contract = Arc::new(config.contract.clone());
        let options = SessionOptions::default();

        let mut contexts = Vec::new();
        for group in &config.instance_groups {
            for c in 0..group.count {
                match &group.kind {
                    InstanceKind::Cpu => {
                        let instance_name = format!("{}_{}_cpu", group.name, c);
                        contexts.push(Mutex::new(ExecutionContext::create(
                            engine,
                            env,
                            instance_name,
                            Device::Cpu,
                            config,
                            contract.clone(),
                            catalog,
                            probe,
                            &options,
                        )?));
                    }
                    InstanceKind::Gpu { device_ids } => {
                        for &device_id in device_ids {
                            let instance_name =
                                format!("{}_{}_gpu{}", group.name, c, device_id);
                            contexts.push(Mutex::new(ExecutionContext::create(
                                engine,
                                env,
                                instance_name,
                                Device::Cuda { device_id },
                                config,
                                contract.clone(),
                                catalog,
                                probe,
                                &options,
                            )?));
                        }
                    }
                }
            }
        }

        let backend = Self {
            name: config.name.clone(),
            contexts,
        };
        info!(
            model = %backend.name,
            engine = engine.name(),
            contexts = backend.contexts.len(),
            "model backend loaded"
        );
        Ok(backend)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    /// Sole entry point for the scheduler. Runs the batch on the context
    /// bound to `runner_idx`, unconditionally releases the context's
    /// transient run resources, then invokes `on_complete` exactly once,
    /// synchronously, with the aggregate status. Per-payload faults are on
    /// the payloads themselves and do not surface here.
    pub fn run<F>(&self, runner_idx: usize, payloads: &mut [Payload], on_complete: F)
    where
        F: FnOnce(Result<(), RunError>),
    {
        let Some(slot) = self.contexts.get(runner_idx) else {
            on_complete(Err(RunError::UnknownRunner {
                index: runner_idx,
                max: self.contexts.len(),
            }));
            return;
        };

        // The scheduler guarantees one in-flight run per slot; contention
        // here means that contract was broken.
        let Ok(mut context) = slot.try_lock() else {
            on_complete(Err(RunError::ContextBusy { index: runner_idx }));
            return;
        };

        // Metering only; inert for payloads that never set a queue stamp.
        let start = Instant::now();
        for payload in payloads.iter_mut() {
            if let Some(queued_at) = payload.queued_at.take() {
                payload.timings.queued_us = start.duration_since(queued_at).as_micros() as u64;
            }
            payload.compute_started = Some(start);
        }

        let status = context.run(payloads);
        context.release_run_resources();

        let done = Instant::now();
        for payload in payloads.iter_mut() {
            if let Some(compute_started) = payload.compute_started.take() {
                payload.timings.compute_us =
                    done.duration_since(compute_started).as_micros() as u64;
            }
        }

        on_complete(status);
    }

    /// Inspect the context bound to `runner_idx`; `None` when the index is
    /// unbound or the context is mid-run.
    pub fn with_context<R>(
        &self,
        runner_idx: usize,
        f: impl FnOnce(&ExecutionContext<E::Session>) -> R,
    ) -> Option<R> {
        let guard = self.contexts.get(runner_idx)?.try_lock().ok()?;
        Some(f(&guard))
    }
}

impl<E: Engine> fmt::Debug for ModelBackend<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBackend")
            .field("name", &self.name)
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl<E: Engine> fmt::Display for ModelBackend<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "name={}", self.name)?;
        writeln!(f, "contexts:")?;
        for slot in &self.contexts {
            if let Ok(context) = slot.try_lock() {
                writeln!(
                    f,
                    "  name={}, device={}, max_batch_size={}",
                    context.name(),
                    context.device(),
                    context.batch_limit()
                )?;
            }
        }
        Ok(())
    }
}
