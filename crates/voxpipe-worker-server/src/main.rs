//! Worker binary. Spawned by `WorkerClient` to host one model in isolation.

use std::env;
use std::sync::Arc;
use voxpipe_worker_server::{GraphRuntime, ModelRuntime, Result, RuntimeFactory, WorkerError, WorkerServer};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let socket_path = env::args().nth(1).ok_or_else(|| {
        WorkerError::InvalidConfig("socket path required as first argument".to_string())
    })?;

    let factory: RuntimeFactory = Arc::new(|| Box::new(GraphRuntime::new()) as Box<dyn ModelRuntime>);
    let mut server = WorkerServer::new(socket_path, factory);
    server.run().await
}
