//! External port allocation
//!
//! Ports are derived, not stored: each owner gets a block of 1000 ports
//! starting at `2000 + 1000 × ownerRank`, and each repository takes
//! `block + repoRank + 1`. Ranks are positions in the byte-wise sorted
//! listings of the ledger, or the listing length for a newcomer.
//!
//! The result only stays stable while new owners and repositories sort after
//! the existing ones; inserting a name that sorts earlier shifts every later
//! rank.

use async_trait::async_trait;
use tracing::debug;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::models::deployment::RepoIdentity;

pub const BASE_PORT: u32 = 2000;
pub const OWNER_BLOCK: u32 = 1000;

/// Source of the existing owner and repository names
#[async_trait]
pub trait AllocationLedger: Send + Sync {
    /// Every known owner, in any order
    async fn owners(&self) -> Result<Vec<String>, DeployerError>;

    /// Every known repository of `owner`, in any order. Empty for an unknown
    /// owner.
    async fn repositories(&self, owner: &str) -> Result<Vec<String>, DeployerError>;
}

/// Ledger read from the deployment root: owners are its subdirectories,
/// repositories are theirs.
#[derive(Debug, Clone)]
pub struct DirectoryLedger {
    root: Dir,
}

impl DirectoryLedger {
    pub fn new(root: Dir) -> Self {
        Self { root }
    }

    async fn list(dir: &Dir) -> Result<Vec<String>, DeployerError> {
        if !dir.exists().await {
            return Ok(Vec::new());
        }
        dir.list_dir_names().await.map_err(|e| {
            DeployerError::AllocationError(format!(
                "unable to list {}: {}",
                dir.path().display(),
                e
            ))
        })
    }
}

#[async_trait]
impl AllocationLedger for DirectoryLedger {
    async fn owners(&self) -> Result<Vec<String>, DeployerError> {
        Self::list(&self.root).await
    }

    async fn repositories(&self, owner: &str) -> Result<Vec<String>, DeployerError> {
        Self::list(&self.root.subdir(owner)).await
    }
}

/// Derives the external port of a repository from a ledger snapshot
#[derive(Debug, Clone)]
pub struct PortAllocator<L = DirectoryLedger> {
    ledger: L,
}

impl<L: AllocationLedger> PortAllocator<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub async fn allocate(&self, identity: &RepoIdentity) -> Result<u16, DeployerError> {
        let mut owners = self.ledger.owners().await?;
        owners.sort();
        let owner_index = rank(&owners, identity.owner());

        let mut repos = self.ledger.repositories(identity.owner()).await?;
        repos.sort();
        let repo_index = rank(&repos, identity.name());

        let port = compute_port(owner_index, repo_index)?;
        debug!(
            repo = %identity,
            owner_index,
            repo_index,
            port,
            "Allocated port"
        );
        Ok(port)
    }
}

/// Position of `name` in a sorted listing, or the listing length if absent
pub fn rank(sorted: &[String], name: &str) -> usize {
    sorted
        .iter()
        .position(|existing| existing == name)
        .unwrap_or(sorted.len())
}

/// `2000 + 1000 × owner_index + repo_index + 1`, refusing anything that would
/// spill into the next owner's block or past the last TCP port.
pub fn compute_port(owner_index: usize, repo_index: usize) -> Result<u16, DeployerError> {
    let repo_offset = u32::try_from(repo_index)
        .ok()
        .map(|i| i + 1)
        .filter(|offset| *offset < OWNER_BLOCK)
        .ok_or_else(|| {
            DeployerError::AllocationError(format!(
                "owner port block exhausted (repository rank {repo_index})"
            ))
        })?;

    u32::try_from(owner_index)
        .ok()
        .and_then(|i| i.checked_mul(OWNER_BLOCK))
        .and_then(|block| block.checked_add(BASE_PORT + repo_offset))
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| {
            DeployerError::AllocationError(format!(
                "port range exhausted (owner rank {owner_index})"
            ))
        })
}
