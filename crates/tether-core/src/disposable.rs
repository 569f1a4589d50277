//! Release handles for per-subscription server resources.
//!
//! A [`Disposable`] wraps a one-shot release action. [`DisposableCollection`]
//! owns the handles of one connection and releases them in reverse order when
//! the connection ends.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Release = Box<dyn FnOnce() -> Result<(), DisposeError> + Send>;

/// A release action failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("dispose '{label}' failed: {message}")]
pub struct DisposeError {
    /// Label of the handle that failed.
    pub label: String,
    /// Failure description.
    pub message: String,
}

/// Idempotent release handle.
pub struct Disposable {
    label: String,
    release: Mutex<Option<Release>>,
}

impl Disposable {
    /// Handle around an infallible release action.
    pub fn from_fn(label: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self::try_from_fn(label, move || {
            release();
            Ok(())
        })
    }

    /// Handle around a fallible release action.
    pub fn try_from_fn(
        label: impl Into<String>,
        release: impl FnOnce() -> Result<(), DisposeError> + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            release: Mutex::new(Some(Box::new(release))),
        }
    }

    /// Handle that aborts a spawned producer task.
    pub fn from_task<T: Send + 'static>(label: impl Into<String>, task: JoinHandle<T>) -> Self {
        Self::from_fn(label, move || task.abort())
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the release action has already run.
    pub fn is_disposed(&self) -> bool {
        self.release.lock().is_none()
    }

    /// Run the release action once. Later calls return `Ok(())`.
    ///
    /// A panicking release is reported as an error.
    pub fn dispose(&self) -> Result<(), DisposeError> {
        let Some(release) = self.release.lock().take() else {
            return Ok(());
        };
        match catch_unwind(AssertUnwindSafe(release)) {
            Ok(result) => result,
            Err(panic) => Err(DisposeError {
                label: self.label.clone(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("label", &self.label)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_owned()
    }
}

/// Ordered set of handles released together.
#[derive(Debug, Default)]
pub struct DisposableCollection {
    handles: Vec<Arc<Disposable>>,
}

impl DisposableCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handle; the returned `Arc` can release it early.
    pub fn push(&mut self, handle: Disposable) -> Arc<Disposable> {
        let handle = Arc::new(handle);
        self.handles.push(Arc::clone(&handle));
        handle
    }

    /// Forget a handle without releasing it. Returns whether it was present.
    pub fn remove(&mut self, handle: &Arc<Disposable>) -> bool {
        let before = self.handles.len();
        self.handles.retain(|h| !Arc::ptr_eq(h, handle));
        self.handles.len() != before
    }

    /// Number of held handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no handles are held.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Release every handle, last-added first.
    ///
    /// Failures are logged and returned; the remaining handles still run.
    /// The collection is empty afterwards.
    pub fn dispose(&mut self) -> Vec<DisposeError> {
        let handles = std::mem::take(&mut self.handles);
        let count = handles.len();
        let mut failures = Vec::new();
        for handle in handles.into_iter().rev() {
            if let Err(err) = handle.dispose() {
                warn!(label = %err.label, error = %err.message, "dispose failed");
                failures.push(err);
            }
        }
        if count > 0 {
            debug!(count, failed = failures.len(), "disposed collection");
        }
        failures
    }
}
