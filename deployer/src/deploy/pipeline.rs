//! Deployment pipeline: descriptor synthesis followed by the compose phases

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::deploy::compose::DescriptorSynthesizer;
use crate::deploy::executor::{ComposeExecutor, DeploymentOutcome, Phase};
use crate::deploy::fsm::{RequestEvent, RequestFsm};
use crate::deploy::ports::{AllocationLedger, DirectoryLedger};
use crate::errors::DeployerError;
use crate::models::deployment::{DeploymentRequest, RepoIdentity};

pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(120);

/// What a successful deployment did
#[derive(Debug, Clone)]
pub struct DeploymentReport {
    pub identity: RepoIdentity,
    pub tag: String,

    /// Allocated external port, template mode only
    pub port: Option<u16>,
    pub descriptor_path: PathBuf,
    pub outcome: DeploymentOutcome,
}

/// Runs deployments end to end
#[derive(Debug)]
pub struct Deployer<L = DirectoryLedger> {
    synthesizer: DescriptorSynthesizer<L>,
    executor: ComposeExecutor,
    phase_timeout: Duration,
    repo_locks: StdMutex<HashMap<RepoIdentity, Arc<Mutex<()>>>>,
}

impl<L: AllocationLedger> Deployer<L> {
    pub fn new(
        synthesizer: DescriptorSynthesizer<L>,
        executor: ComposeExecutor,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            synthesizer,
            executor,
            phase_timeout,
            repo_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn synthesizer(&self) -> &DescriptorSynthesizer<L> {
        &self.synthesizer
    }

    pub fn executor(&self) -> &ComposeExecutor {
        &self.executor
    }

    pub fn phase_timeout(&self) -> Duration {
        self.phase_timeout
    }

    /// Lock shared by every in-flight deployment of `identity`. Entries
    /// nobody holds any more are dropped on the way.
    fn repo_lock(&self, identity: &RepoIdentity) -> Result<Arc<Mutex<()>>, DeployerError> {
        let mut locks = self
            .repo_locks
            .lock()
            .map_err(|_| DeployerError::Internal("repository lock table poisoned".to_string()))?;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(locks.entry(identity.clone()).or_default().clone())
    }

    /// Deploy a validated request, advancing `fsm` from `PayloadValidated`
    /// to `StartDone`. A compose phase exiting non-zero is returned as
    /// [`DeployerError::PhaseFailed`].
    pub async fn deploy(
        &self,
        request: &DeploymentRequest,
        fsm: &mut RequestFsm,
    ) -> Result<DeploymentReport, DeployerError> {
        let lock = self.repo_lock(&request.identity)?;
        let _repo_guard = lock.lock().await;
        debug!(repo = %request.identity, "Acquired repository lock");

        let materialized = self.synthesizer.synthesize(request).await?;
        fsm.advance(RequestEvent::DirectoryCreated)?;
        fsm.advance(RequestEvent::DescriptorWritten)?;

        let descriptor = materialized.workspace.descriptor.path();
        let working_dir = materialized.workspace.dir.path();
        let executed = self
            .executor
            .execute(descriptor, working_dir, self.phase_timeout)
            .await;

        // Whatever happened during start, pull got through first
        let reached_start = match &executed {
            Ok(outcome) => outcome.phase == Phase::Start,
            Err(DeployerError::Timeout { phase, .. })
            | Err(DeployerError::ExecutionError { phase, .. }) => *phase == Phase::Start,
            Err(_) => false,
        };
        if reached_start {
            fsm.advance(RequestEvent::PullSucceeded)?;
        }

        let outcome = executed?;
        if !outcome.succeeded {
            return Err(DeployerError::PhaseFailed(Box::new(outcome)));
        }
        fsm.advance(RequestEvent::StartSucceeded)?;

        info!(
            repo = %request.identity,
            tag = %request.tag,
            port = ?materialized.port,
            "Deployment complete"
        );
        Ok(DeploymentReport {
            identity: request.identity.clone(),
            tag: request.tag.clone(),
            port: materialized.port,
            descriptor_path: descriptor.to_path_buf(),
            outcome,
        })
    }
}
