//! Tokio runtime management for the blocking facade

use std::sync::Arc;
use std::sync::OnceLock;
use tokio::runtime::Runtime;

/// Get or create the shared Tokio runtime backing blocking storage calls
pub(crate) fn get_runtime() -> Arc<Runtime> {
    static RUNTIME: OnceLock<Arc<Runtime>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .thread_name("depot-worker")
                .build()
                .expect("Failed to create Tokio runtime");

            Arc::new(runtime)
        })
        .clone()
}
