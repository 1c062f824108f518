//! On-disk deployment layout
//!
//! ```text
//! <root>/<owner>/<name>/docker-compose.yml
//! <root>/<owner>/<name>/.env
//! <root>/<owner>/<name>/data/
//! ```
//!
//! The owner and repository directory names are also the allocation ledger
//! for ports, so nothing else should be created directly under the root.

use std::path::PathBuf;

use crate::errors::DeployerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deployment::RepoIdentity;

pub const DEFAULT_DEPLOY_ROOT: &str = "/apps";
pub const DESCRIPTOR_FILE_NAME: &str = "docker-compose.yml";
pub const ENV_FILE_NAME: &str = ".env";
pub const DATA_DIR_NAME: &str = "data";

/// Deployment root layout
#[derive(Debug, Clone)]
pub struct DeployLayout {
    /// Directory holding one subdirectory per owner
    pub root: PathBuf,
}

impl DeployLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root_dir(&self) -> Dir {
        Dir::new(&self.root)
    }

    pub fn owner_dir(&self, owner: &str) -> Dir {
        self.root_dir().subdir(owner)
    }

    /// Paths owned by one repository
    pub fn workspace(&self, identity: &RepoIdentity) -> RepoWorkspace {
        let dir = self.owner_dir(identity.owner()).subdir(identity.name());
        RepoWorkspace {
            descriptor: dir.file(DESCRIPTOR_FILE_NAME),
            env_file: dir.file(ENV_FILE_NAME),
            data_dir: dir.subdir(DATA_DIR_NAME),
            dir,
        }
    }

    /// Create the root directory
    pub async fn setup(&self) -> Result<(), DeployerError> {
        self.root_dir().create().await
    }
}

impl Default for DeployLayout {
    fn default() -> Self {
        Self::new(DEFAULT_DEPLOY_ROOT)
    }
}

/// Working directory of a single repository
#[derive(Debug, Clone)]
pub struct RepoWorkspace {
    pub dir: Dir,
    pub descriptor: File,
    pub env_file: File,
    pub data_dir: Dir,
}

impl RepoWorkspace {
    /// Create the directory tree, the data volume directory and an empty env
    /// file. An existing env file is left alone.
    pub async fn ensure(&self) -> Result<(), DeployerError> {
        self.dir.create().await?;
        self.data_dir.create().await?;
        self.env_file.create_if_missing().await
    }
}
