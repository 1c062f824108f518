//! Docker Compose descriptor synthesis
//!
//! A descriptor is either rendered from [`DescriptorTemplate`] or taken
//! verbatim from the caller, and always lands at
//! `<root>/<owner>/<name>/docker-compose.yml`, replacing what was there.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::deploy::ports::{AllocationLedger, DirectoryLedger, PortAllocator};
use crate::errors::DeployerError;
use crate::models::deployment::{DeploymentRequest, RepoIdentity};
use crate::storage::layout::{DeployLayout, RepoWorkspace, DATA_DIR_NAME, ENV_FILE_NAME};

/// Settings baked into generated descriptors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorTemplate {
    /// Registry host (and optional path prefix) images are pulled from
    pub registry: String,

    /// Port the application listens on inside the container
    pub container_port: u16,

    /// Compose restart policy
    pub restart_policy: String,

    /// Mount point of the `data/` volume inside the container
    pub data_mount: String,

    /// Pre-existing network to attach the service to
    pub network: Option<String>,
}

impl Default for DescriptorTemplate {
    fn default() -> Self {
        Self {
            registry: "ghcr.io".to_string(),
            container_port: 5000,
            restart_policy: "unless-stopped".to_string(),
            data_mount: "/app/data".to_string(),
            network: None,
        }
    }
}

impl DescriptorTemplate {
    /// `registry/owner/name:tag`
    pub fn image_reference(&self, identity: &RepoIdentity, tag: &str) -> String {
        format!(
            "{}/{}/{}:{}",
            self.registry.trim_end_matches('/'),
            identity.owner(),
            identity.name(),
            tag
        )
    }

    /// Render the compose file. Pure: the same inputs give the same bytes.
    pub fn render(&self, identity: &RepoIdentity, tag: &str, external_port: u16) -> String {
        let mut out = format!(
            r#"services:
  app:
    image: {image}
    env_file:
      - {ENV_FILE_NAME}
    environment:
      - IN_DOCKER=1
    ports:
      - "{external_port}:{container_port}"
    volumes:
      - ./{DATA_DIR_NAME}:{data_mount}
    restart: {restart_policy}
"#,
            image = self.image_reference(identity, tag),
            container_port = self.container_port,
            data_mount = self.data_mount,
            restart_policy = self.restart_policy,
        );

        if let Some(network) = &self.network {
            out.push_str(&format!(
                r#"    networks:
      - {network}

networks:
  {network}:
    external: true
"#
            ));
        }
        out
    }
}

/// Descriptor contents ready to be written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDescriptor {
    pub contents: Vec<u8>,

    /// External port, for template descriptors only
    pub port: Option<u16>,
}

/// Where a descriptor was written
#[derive(Debug, Clone)]
pub struct MaterializedDescriptor {
    pub workspace: RepoWorkspace,
    pub port: Option<u16>,
}

/// Produces and persists descriptors
#[derive(Debug)]
pub struct DescriptorSynthesizer<L = DirectoryLedger> {
    layout: DeployLayout,
    allocator: PortAllocator<L>,
    template: DescriptorTemplate,
    allocation_lock: Mutex<()>,
}

impl DescriptorSynthesizer<DirectoryLedger> {
    /// Synthesizer allocating ports from the directories under the layout root
    pub fn new(layout: DeployLayout, template: DescriptorTemplate) -> Self {
        let ledger = DirectoryLedger::new(layout.root_dir());
        Self::with_ledger(layout, template, ledger)
    }
}

impl<L: AllocationLedger> DescriptorSynthesizer<L> {
    pub fn with_ledger(layout: DeployLayout, template: DescriptorTemplate, ledger: L) -> Self {
        Self {
            layout,
            allocator: PortAllocator::new(ledger),
            template,
            allocation_lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &DeployLayout {
        &self.layout
    }

    pub fn template(&self) -> &DescriptorTemplate {
        &self.template
    }

    /// Produce the descriptor contents for `request`. Template mode consults
    /// the port allocator, so this must run before the repository directory
    /// is created.
    async fn render(
        &self,
        request: &DeploymentRequest,
    ) -> Result<RenderedDescriptor, DeployerError> {
        match &request.descriptor {
            Some(supplied) => Ok(RenderedDescriptor {
                contents: supplied.as_bytes().to_vec(),
                port: None,
            }),
            None => {
                let port = self.allocator.allocate(&request.identity).await?;
                let contents = self.template.render(&request.identity, &request.tag, port);
                Ok(RenderedDescriptor {
                    contents: contents.into_bytes(),
                    port: Some(port),
                })
            }
        }
    }

    /// Create the repository's working directory tree
    async fn ensure_workspace(
        &self,
        identity: &RepoIdentity,
    ) -> Result<RepoWorkspace, DeployerError> {
        let workspace = self.layout.workspace(identity);
        workspace.ensure().await?;
        debug!(path = %workspace.dir.path().display(), "Workspace ready");
        Ok(workspace)
    }

    /// Overwrite the workspace descriptor
    async fn write(
        &self,
        workspace: &RepoWorkspace,
        rendered: &RenderedDescriptor,
    ) -> Result<(), DeployerError> {
        workspace.descriptor.write_atomic(&rendered.contents).await?;
        info!(
            path = %workspace.descriptor.path().display(),
            port = ?rendered.port,
            bytes = rendered.contents.len(),
            "Wrote compose descriptor"
        );
        Ok(())
    }

    /// Render, create the workspace and write. Concurrent requests sharing
    /// this deployment root are serialised from allocation until the
    /// descriptor is on disk.
    pub async fn synthesize(
        &self,
        request: &DeploymentRequest,
    ) -> Result<MaterializedDescriptor, DeployerError> {
        let _guard = self.allocation_lock.lock().await;
        let rendered = self.render(request).await?;
        let workspace = self.ensure_workspace(&request.identity).await?;
        self.write(&workspace, &rendered).await?;
        Ok(MaterializedDescriptor {
            workspace,
            port: rendered.port,
        })
    }
}
