//! The disposable simulation branch.

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::VcsError;
use crate::vcs::VcsGateway;

/// Exclusively owned temporary branch that trial merges are committed to.
///
/// Created once per exhaustive run and reset to the base before each
/// permutation. Its name carries a random suffix so it never aliases a
/// branch that already exists. Call [`teardown`](Self::teardown) on every
/// exit path; it restores the checkout that was current at creation.
pub struct SimulationWorkspace<'a> {
    gateway: &'a dyn VcsGateway,
    name: String,
    base_revision: String,
    original_checkout: String,
}

impl<'a> SimulationWorkspace<'a> {
    pub async fn create(
        gateway: &'a dyn VcsGateway,
        prefix: &str,
        base_revision: &str,
    ) -> Result<SimulationWorkspace<'a>, VcsError> {
        let original_checkout = gateway.current_checkout().await?;
        let name = branch_name(prefix);
        if gateway.branch_exists(&name).await? {
            return Err(VcsError::BranchExists(name));
        }
        gateway.reset_branch(&name, base_revision).await?;
        info!(branch = %name, base = %base_revision, "created simulation branch");
        Ok(Self {
            gateway,
            name,
            base_revision: base_revision.to_string(),
            original_checkout,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn original_checkout(&self) -> &str {
        &self.original_checkout
    }

    /// Point the branch back at the base, discarding earlier trials.
    pub async fn reset(&mut self) -> Result<(), VcsError> {
        self.gateway
            .reset_branch(&self.name, &self.base_revision)
            .await?;
        debug!(branch = %self.name, "simulation branch reset to base");
        Ok(())
    }

    /// Abort any merge in progress, restore the original checkout and delete
    /// the branch.
    pub async fn teardown(self) -> Result<(), VcsError> {
        if let Err(e) = self.gateway.abort_merge().await {
            debug!(error = %e, "no merge to abort during teardown");
        }
        self.gateway.checkout(&self.original_checkout).await?;
        self.gateway.delete_branch(&self.name).await?;
        info!(branch = %self.name, restored = %self.original_checkout, "simulation branch removed");
        Ok(())
    }

    /// Teardown on a failure path: errors are logged, not returned.
    pub async fn teardown_best_effort(self) {
        let name = self.name.clone();
        if let Err(e) = self.teardown().await {
            warn!(branch = %name, error = %e, "could not clean up simulation branch");
        }
    }
}

fn branch_name(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &suffix[..8])
}
