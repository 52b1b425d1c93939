pub mod builders;
pub mod fake_foreign;
pub mod scripted;

use std::sync::{Arc, Once};

use cascade::{DedupCache, ExecutionController, InterruptToken};
use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{ModuleConfigBuilder, PipelineConfigBuilder};
pub use fake_foreign::{FakeForeignRuntime, FakeHandle};
pub use scripted::{CallLog, ScriptedModule};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Controller with an in-memory dedup cache and a fresh interrupt token.
pub fn test_controller() -> Arc<ExecutionController> {
    test_controller_with(InterruptToken::new(), None)
}

/// Controller with an in-memory cache, the given token and, optionally, a
/// fake foreign runtime.
pub fn test_controller_with(
    token: InterruptToken,
    foreign: Option<Arc<FakeForeignRuntime>>,
) -> Arc<ExecutionController> {
    let mut builder = ExecutionController::builder()
        .cache(Arc::new(DedupCache::in_memory()))
        .interrupt(token);
    if let Some(runtime) = foreign {
        builder = builder.foreign_runtime(runtime);
    }
    Arc::new(builder.build())
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}
