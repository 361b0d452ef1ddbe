use anyhow::Error as AnyError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;

/// Raised when an adapter or caller breaks the engine's contract: an out-of-sequence block handed
/// to the reorg window, a block that fails its own consistency checks, or a send on a closed
/// channel. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractViolation {
    message: String,
}

impl ContractViolation {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true when `error` (or any error in its chain) is a contract violation.
    pub fn is_violation(error: &AnyError) -> bool {
        error
            .chain()
            .any(|cause| cause.downcast_ref::<ContractViolation>().is_some())
    }
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "contract violation: {}", self.message)
    }
}

impl std::error::Error for ContractViolation {}

/// Routes fatal errors of a run: the first one is kept, and both the run-scoped and root tokens
/// are cancelled so every task of the run (and any sibling run) winds down.
#[derive(Clone)]
pub struct FatalErrorHandler {
    first: Arc<OnceLock<SharedError>>,
    root_shutdown: CancellationToken,
    run_shutdown: CancellationToken,
}

/// An `anyhow::Error` that can be handed out more than once while keeping its source chain, so
/// [`ContractViolation::is_violation`] still sees through it.
#[derive(Clone)]
struct SharedError(Arc<AnyError>);

impl fmt::Debug for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.0.as_ref(), f)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0.as_ref())
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref().as_ref())
    }
}

impl FatalErrorHandler {
    pub fn new(root_shutdown: CancellationToken, run_shutdown: CancellationToken) -> Self {
        Self {
            first: Arc::new(OnceLock::new()),
            root_shutdown,
            run_shutdown,
        }
    }

    /// Records `error` if it is the first fatal error and shuts the run down. Later errors are
    /// returned untouched; they are usually fallout of the first one.
    pub fn trigger(&self, context: &str, error: AnyError) -> AnyError {
        let shared = SharedError(Arc::new(error));
        if let Err(rejected) = self.first.set(shared.clone()) {
            tracing::debug!(context, error = %rejected, "ignoring fatal error after shutdown");
            return rejected.into();
        }

        tracing::error!(context, error = %shared, "fatal sync error; initiating shutdown");
        self.run_shutdown.cancel();
        self.root_shutdown.cancel();
        shared.into()
    }

    pub fn is_triggered(&self) -> bool {
        self.first.get().is_some()
    }

    pub fn error(&self) -> Option<AnyError> {
        self.first.get().cloned().map(AnyError::from)
    }
}
