//! Rendering engine capability.
//!
//! The engine is opaque: it is handed the topology document, a seed
//! document and a worker count, and reports success or failure. No
//! timeout is imposed and a started job is never cancelled.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio::process::Command;
use tracing::debug;

use crate::error::{SeedError, SeedResult};
use crate::seed_doc::SEED_TASK;

pub type RenderFuture<'a> = Pin<Box<dyn Future<Output = SeedResult<()>> + Send + 'a>>;

/// One engine invocation.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub cluster: &'a str,
    pub topology: &'a Path,
    pub seed: &'a Path,
    pub concurrency: u32,
}

pub trait TileRenderer: Send + Sync {
    /// Render one job. Failures come back as `EngineInvocationFailed`.
    fn invoke<'a>(&'a self, job: RenderJob<'a>) -> RenderFuture<'a>;
}

/// Runs the `mapproxy-seed` executable.
pub struct MapProxySeed {
    program: String,
}

impl MapProxySeed {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, job: &RenderJob<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-f")
            .arg(job.topology)
            .arg("-s")
            .arg(job.seed)
            .arg("-c")
            .arg(job.concurrency.to_string())
            .arg("--seed")
            .arg(SEED_TASK);
        cmd
    }
}

impl TileRenderer for MapProxySeed {
    fn invoke<'a>(&'a self, job: RenderJob<'a>) -> RenderFuture<'a> {
        Box::pin(async move {
            let failed = |reason: String| SeedError::EngineInvocationFailed {
                cluster: job.cluster.to_string(),
                reason,
            };
            debug!(cluster = %job.cluster, program = %self.program, "invoking engine");
            let status = self
                .command(&job)
                .status()
                .await
                .map_err(|e| failed(format!("failed to run {}: {e}", self.program)))?;
            if !status.success() {
                let code = status.code().unwrap_or(-1);
                return Err(failed(format!("{} exited with code {code}", self.program)));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job<'a>(topology: &'a Path, seed: &'a Path) -> RenderJob<'a> {
        RenderJob {
            cluster: "N1-M10",
            topology,
            seed,
            concurrency: 4,
        }
    }

    #[test]
    fn command_line_matches_engine_contract() {
        let engine = MapProxySeed::new("mapproxy-seed");
        let cmd = engine.command(&job(Path::new("/t.yaml"), Path::new("/s.yaml")));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec!["-f", "/t.yaml", "-s", "/s.yaml", "-c", "4", "--seed", "seed_prog"]
        );
    }

    #[tokio::test]
    async fn missing_program_is_an_invocation_failure() {
        let engine = MapProxySeed::new("/nonexistent/tilesync-engine");
        let err = engine
            .invoke(job(Path::new("/t.yaml"), Path::new("/s.yaml")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SeedError::EngineInvocationFailed { cluster, .. } if cluster == "N1-M10"
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_an_invocation_failure() {
        let engine = MapProxySeed::new("false");
        let err = engine
            .invoke(job(Path::new("/t.yaml"), Path::new("/s.yaml")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 1"));
    }
}
