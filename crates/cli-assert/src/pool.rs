//! Worker pools for stream consumers and the stdin producer.
//!
//! A process-wide pool is created lazily on first use and never shut down.
//! A command may instead carry its own local pool, created at `start` and
//! disposed when the command terminates, or run its workers on a
//! caller-supplied runtime handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::error::PoolError;

/// Sizing for a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Runtime worker threads. `0` is clamped to one thread.
    pub core_size: usize,
    /// Upper bound on blocking worker threads (`None` leaves the runtime
    /// default in place).
    pub max_size: Option<usize>,
    /// How long an idle blocking worker is kept alive.
    pub keep_alive: Duration,
    /// Thread name prefix; threads are named `<prefix>-<seq>`.
    pub prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 0,
            max_size: None,
            keep_alive: Duration::from_secs(60),
            prefix: "cli-assert-io".to_string(),
        }
    }
}

/// Global sequence for thread names, shared by every pool in the process.
static THREAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Per-`start` sequence; the index names the command's workers
/// (`cli-assert-io-<index>-stdout` and friends).
static START_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) fn next_start_index() -> u64 {
    START_SEQ.fetch_add(1, Ordering::Relaxed)
}

static SHARED: OnceLock<Runtime> = OnceLock::new();
static SHARED_CONFIG: Mutex<Option<PoolConfig>> = Mutex::new(None);

fn build_runtime(config: &PoolConfig) -> std::io::Result<Runtime> {
    let prefix = config.prefix.clone();
    let mut builder = Builder::new_multi_thread();
    builder
        .worker_threads(config.core_size.max(1))
        .thread_keep_alive(config.keep_alive)
        .thread_name_fn(move || {
            let seq = THREAD_SEQ.fetch_add(1, Ordering::Relaxed);
            format!("{prefix}-{seq}")
        })
        .enable_all();
    if let Some(max) = config.max_size {
        builder.max_blocking_threads(max.max(1));
    }
    builder.build()
}

/// Configure the process-wide pool. Only allowed before its first use;
/// afterwards the configuration is frozen.
pub fn configure_shared_pool(config: PoolConfig) -> Result<(), PoolError> {
    if SHARED.get().is_some() {
        return Err(PoolError::AlreadyCreated);
    }
    let mut slot = SHARED_CONFIG.lock().expect("pool config lock poisoned");
    // Racy double-check: creation may have happened while waiting on the lock.
    if SHARED.get().is_some() {
        return Err(PoolError::AlreadyCreated);
    }
    *slot = Some(config);
    Ok(())
}

fn shared_runtime() -> &'static Runtime {
    SHARED.get_or_init(|| {
        let config = SHARED_CONFIG
            .lock()
            .expect("pool config lock poisoned")
            .take()
            .unwrap_or_default();
        tracing::debug!(?config.core_size, ?config.max_size, "creating process-wide worker pool");
        build_runtime(&config).expect("failed to build the process-wide worker pool")
    })
}

/// A local pool owned by one command; disposed without blocking so that
/// dropping is legal from async contexts.
#[derive(Debug)]
struct LocalPool {
    runtime: Option<Runtime>,
}

impl LocalPool {
    fn handle(&self) -> &Handle {
        self.runtime
            .as_ref()
            .expect("local pool used after disposal")
            .handle()
    }
}

impl Drop for LocalPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Where a command's workers run.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    kind: Kind,
}

#[derive(Debug, Clone, Default)]
enum Kind {
    /// The lazily-created process-wide pool.
    #[default]
    Shared,
    /// A pool created for one command and disposed with it.
    Local(Arc<LocalPool>),
    /// A caller-supplied runtime.
    External(Handle),
}

impl WorkerPool {
    /// The process-wide pool (created on first use).
    pub fn shared() -> Self {
        Self { kind: Kind::Shared }
    }

    /// A fresh pool for a single command.
    pub fn local(config: PoolConfig) -> std::io::Result<Self> {
        let runtime = build_runtime(&config)?;
        Ok(Self {
            kind: Kind::Local(Arc::new(LocalPool {
                runtime: Some(runtime),
            })),
        })
    }

    /// Run workers on a caller-owned runtime.
    pub fn external(handle: Handle) -> Self {
        Self {
            kind: Kind::External(handle),
        }
    }

    fn handle(&self) -> Handle {
        match &self.kind {
            Kind::Shared => shared_runtime().handle().clone(),
            Kind::Local(pool) => pool.handle().clone(),
            Kind::External(handle) => handle.clone(),
        }
    }

    pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle().spawn(future)
    }

    pub(crate) fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle().spawn_blocking(f)
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
