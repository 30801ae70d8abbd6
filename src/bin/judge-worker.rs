//! Worker process entry point: loads configuration, wires the Repository,
//! Submission Log Store, and Checker Cache into an Orchestrator, and keeps
//! a bounded pool of judging workers alive.
//!
//! Grounded on the teacher's `main.rs` bootstrap sequence (tracing init,
//! `dotenvy::dotenv()`, then construct-and-loop) with the Redis
//! pop-dispatch-store loop replaced by `worker::WorkerPool` and the
//! in-process queue it owns.

use std::sync::Arc;

use anyhow::Result;
use judge_core::config::{self, Config};
use judge_core::log_store::SubmissionLogStore;
use judge_core::orchestrator::Orchestrator;
use judge_core::repository::{FileRepository, SharedRepository};
use judge_core::spj::CheckerCache;
use judge_core::worker::WorkerPool;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("judge_core=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let cfg = Config::from_env();
    config::init_config(cfg.clone());
    info!(
        "starting judge-worker: {} workers, fallback_executor={}",
        cfg.worker_count, cfg.allow_fallback_executor
    );

    let repository: SharedRepository = Arc::new(FileRepository::new(&cfg.data_dir));
    let log_store = Arc::new(SubmissionLogStore::new(&cfg.log_dir));
    let checker_cache = Arc::new(CheckerCache::new(&cfg.checker_cache_dir));

    let orchestrator = Arc::new(Orchestrator::new(
        repository,
        log_store,
        checker_cache,
        cfg.allow_fallback_executor,
    ));

    let _pool = WorkerPool::spawn(orchestrator, cfg.worker_count, cfg.queue_capacity);

    info!("judge-worker ready, waiting for submissions");
    // The worker pool's tasks run for the lifetime of the process; this
    // binary has no external queue to poll, so it simply parks here. A
    // real deployment wires `worker::submit` behind whatever intake
    // mechanism (HTTP handler, queue consumer) the surrounding service
    // exposes.
    std::future::pending::<()>().await;
    Ok(())
}
