// ABOUTME: The build-and-deploy pipeline: checkout, secrets, build, publish, release, prune.
// ABOUTME: Holds the deploy lock for the whole run; prune runs even when a stage fails.

mod error;

pub use error::PipelineError;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::{Config, RestartPolicy, resolve_env_map};
use crate::deploy::{
    DeployLock, Deployment, Initialized, ReleaseSpec, Slot, manual_rollback,
};
use crate::output::Output;
use crate::runtime::{
    BuildContext, ContainerFilters, ContainerOps, ContainerSummary, ImageOps, PruneReport,
    RestartPolicyConfig,
};
use crate::scm;
use crate::secrets::SecretFile;
use crate::types::{BuildTag, ContainerId, ImageId, ImageRef};

/// The floating tag every successful run moves to the new build.
const LATEST_TAG: &str = "latest";

/// What a completed pipeline run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub build: BuildTag,
    /// The image reference the release runs, pinned to the build tag.
    pub image: ImageRef,
    /// Daemon id of the image built in this run.
    pub image_id: ImageId,
    pub commit: String,
    pub branch: String,
    /// Name of the container now serving.
    pub container: String,
    /// Dangling layers removed by the cleanup pass, when it succeeded.
    pub pruned: Option<PruneReport>,
}

/// One end-to-end pipeline run for a service.
pub struct Pipeline<'a, R> {
    config: &'a Config,
    runtime: &'a R,
    workspace: PathBuf,
    build: BuildTag,
    skip_push: bool,
    force: bool,
}

impl<'a, R> Pipeline<'a, R>
where
    R: ImageOps + ContainerOps,
{
    pub fn new(
        config: &'a Config,
        runtime: &'a R,
        workspace: PathBuf,
        build: BuildTag,
    ) -> Self {
        Self {
            config,
            runtime,
            workspace,
            build,
            skip_push: false,
            force: false,
        }
    }

    /// Skip the registry publish stage (local-only runs).
    pub fn skip_push(mut self, skip: bool) -> Self {
        self.skip_push = skip;
        self
    }

    /// Break a held deploy lock instead of failing.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Run the pipeline to completion.
    ///
    /// The deploy lock is held for the entire run. The dangling-image prune
    /// runs whether or not the stages succeeded, so a failed build never
    /// leaves untagged layers piling up on the host.
    pub async fn run(&self, output: &Output) -> Result<RunReport, PipelineError> {
        let lock = DeployLock::acquire(&self.config.service, self.force)?;

        let outcome = self.run_stages(output).await;

        output.progress("  → Pruning dangling images...");
        let pruned = match self.runtime.prune_dangling().await {
            Ok(report) => {
                if report.deleted > 0 {
                    output.progress(&format!(
                        "  → Removed {} dangling image(s), reclaimed {} bytes",
                        report.deleted, report.reclaimed_bytes
                    ));
                }
                Some(report)
            }
            Err(e) => {
                output.warning(&format!("dangling image prune failed: {}", e));
                None
            }
        };

        if let Err(e) = lock.release() {
            output.warning(&format!("failed to release deploy lock: {}", e));
        }

        let mut report = outcome?;
        report.pruned = pruned;
        Ok(report)
    }

    async fn run_stages(&self, output: &Output) -> Result<RunReport, PipelineError> {
        // Stage 1: checkout
        output.progress(&format!(
            "  → Checking out {} ({})...",
            self.config.source.url, self.config.source.branch
        ));
        let checkout = scm::checkout(&self.config.source, &self.workspace)?;
        output.progress(&format!("  → At commit {}", checkout.commit));

        // Stage 2: secrets. The guard keeps the env file in place through
        // the build and removes it when this function returns.
        let secret = self.stage_secret(output)?;

        // Stage 3: build
        let build_ref = self.config.image.with_tag(&self.build.to_string());
        let latest_ref = self.config.image.with_tag(LATEST_TAG);

        output.progress(&format!("  → Building {}...", build_ref));
        let context = BuildContext {
            dir: self.workspace.join(&self.config.build.context),
            dockerfile: self.config.build.dockerfile.clone(),
        };
        let image_id = self
            .runtime
            .build_image(&context, &build_ref)
            .await
            .map_err(PipelineError::Build)?;
        self.runtime
            .tag_image(&build_ref, &latest_ref)
            .await
            .map_err(PipelineError::Build)?;

        // Stage 4: publish
        if self.skip_push {
            output.progress("  → Skipping push");
        } else {
            self.stage_publish(&build_ref, &latest_ref, output).await?;
        }

        // Stage 5: release. The container runs the numeric tag so what is
        // serving stays identifiable after `latest` moves on.
        let container = self
            .stage_release(&build_ref, secret.as_ref(), output)
            .await?;

        Ok(RunReport {
            build: self.build,
            image: build_ref,
            image_id,
            commit: checkout.commit,
            branch: checkout.branch,
            container,
            pruned: None,
        })
    }

    fn stage_secret(&self, output: &Output) -> Result<Option<SecretFile>, PipelineError> {
        let Some(secret_config) = &self.config.secret else {
            return Ok(None);
        };

        let source = secret_config
            .source
            .resolve()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        output.progress(&format!(
            "  → Staging secret env file as {}...",
            secret_config.target
        ));

        let secret = SecretFile::materialize(
            Path::new(&source),
            &self.workspace,
            &secret_config.target,
        )?;

        Ok(Some(secret))
    }

    async fn stage_publish(
        &self,
        build_ref: &ImageRef,
        latest_ref: &ImageRef,
        output: &Output,
    ) -> Result<(), PipelineError> {
        // Credentials are resolved here and dropped when the stage ends;
        // bollard sends them per request, so there is nothing to log out of.
        let auth = match &self.config.registry {
            Some(registry) => Some(
                registry
                    .auth()
                    .map_err(|e| PipelineError::Config(e.to_string()))?,
            ),
            None => None,
        };

        output.progress(&format!("  → Pushing {}...", build_ref));
        self.runtime
            .push_image(build_ref, auth.as_ref())
            .await
            .map_err(PipelineError::Publish)?;

        output.progress(&format!("  → Pushing {}...", latest_ref));
        self.runtime
            .push_image(latest_ref, auth.as_ref())
            .await
            .map_err(PipelineError::Publish)?;

        Ok(())
    }

    async fn stage_release(
        &self,
        build_ref: &ImageRef,
        secret: Option<&SecretFile>,
        output: &Output,
    ) -> Result<String, PipelineError> {
        let spec = self.release_spec(build_ref, secret)?;

        let previous = find_previous_release(self.runtime, self.config).await?;

        let deployment: Deployment<Initialized> = match previous {
            Some(previous) => {
                output.progress(&format!(
                    "  → Replacing container {} (slot {})",
                    previous.id, previous.slot
                ));
                Deployment::new_update(spec, previous.id, previous.running, previous.slot)
            }
            None => {
                output.progress("  → No existing container (first release)");
                Deployment::new(spec)
            }
        };

        output.progress("  → Stopping previous container...");
        let deployment = deployment.stop_old(self.runtime).await?;

        output.progress("  → Starting new container...");
        let deployment = match deployment.start_container(self.runtime).await {
            Ok(d) => d,
            Err((failed, e)) => {
                output.error(&format!("start failed: {}", e));
                output.progress("  → Restoring previous container...");
                failed.rollback(self.runtime).await?;
                return Err(e.into());
            }
        };

        output.progress("  → Waiting for readiness...");
        let deployment = match deployment
            .health_check(self.runtime, self.config.health_timeout)
            .await
        {
            Ok(d) => d,
            Err((failed, e)) => {
                output.error(&format!("readiness gate failed: {}", e));
                output.progress("  → Restoring previous container...");
                failed.rollback(self.runtime).await?;
                return Err(e.into());
            }
        };

        let completed = deployment.complete();
        let name = completed.container_name();
        output.progress(&format!("  ✓ Serving from container: {}", name));

        Ok(name)
    }

    /// Assemble the release spec from config, build tag, and staged secrets.
    fn release_spec(
        &self,
        build_ref: &ImageRef,
        secret: Option<&SecretFile>,
    ) -> Result<ReleaseSpec, PipelineError> {
        // Secret vars first so explicit config env wins on collision
        let mut env: HashMap<String, String> = secret
            .map(|s| s.vars().clone())
            .unwrap_or_default();
        env.extend(
            resolve_env_map(&self.config.env)
                .map_err(|e| PipelineError::Config(e.to_string()))?,
        );

        let restart = match &self.config.restart {
            RestartPolicy::No => RestartPolicyConfig::No,
            RestartPolicy::Always => RestartPolicyConfig::Always,
            RestartPolicy::UnlessStopped => RestartPolicyConfig::UnlessStopped,
            RestartPolicy::OnFailure { max_retries } => RestartPolicyConfig::OnFailure {
                max_retries: *max_retries,
            },
        };

        Ok(ReleaseSpec {
            service: self.config.service.clone(),
            image: build_ref.clone(),
            build: self.build,
            env,
            labels: self.config.labels.clone(),
            ports: self.config.ports.clone(),
            command: self.config.launcher.as_ref().map(|l| l.command()),
            restart,
            healthcheck: self.config.healthcheck.clone(),
            health_timeout: self.config.health_timeout,
            stop_timeout: self.config.stop_timeout(),
        })
    }
}

/// The container a new release replaces.
#[derive(Debug)]
struct PreviousRelease {
    id: ContainerId,
    running: bool,
    slot: Slot,
}

/// Find the container the new release replaces.
///
/// Prefers a running container; with none running (e.g. after a crash) the
/// most recently stopped managed container is treated as the incumbent so
/// slots keep alternating.
async fn find_previous_release<R: ContainerOps>(
    runtime: &R,
    config: &Config,
) -> Result<Option<PreviousRelease>, PipelineError> {
    let filters = ContainerFilters::for_service(&config.service, true);
    let containers = runtime
        .list_containers(&filters)
        .await
        .map_err(|e| PipelineError::Config(format!("failed to list containers: {}", e)))?;

    let (running, stopped): (Vec<_>, Vec<_>) =
        containers.into_iter().partition(|c| c.state == "running");

    let incumbent = running.into_iter().next().map(|c| (c, true)).or_else(|| {
        stopped
            .into_iter()
            .max_by_key(|c| build_label(c))
            .map(|c| (c, false))
    });

    Ok(incumbent.map(|(c, running)| {
        let slot = c
            .labels
            .get("gantry.slot")
            .and_then(|s| Slot::parse(s))
            .unwrap_or_else(Slot::first);
        PreviousRelease {
            id: c.id,
            running,
            slot,
        }
    }))
}

fn build_label(container: &ContainerSummary) -> u64 {
    container
        .labels
        .get("gantry.build")
        .and_then(|b| b.parse().ok())
        .unwrap_or(0)
}

/// Swap back to the previous release for a service.
pub async fn rollback<R: ContainerOps>(
    runtime: &R,
    config: &Config,
    output: &Output,
) -> Result<(), PipelineError> {
    let lock = DeployLock::acquire(&config.service, false)?;

    output.progress("  → Swapping containers...");
    let result = manual_rollback(runtime, &config.service).await;

    if let Err(e) = lock.release() {
        output.warning(&format!("failed to release deploy lock: {}", e));
    }

    let report = result?;
    if let Some(stopped) = &report.stopped {
        output.progress(&format!("  → Stopped {}", stopped));
    }
    output.progress(&format!("  ✓ Serving from container: {}", report.started));

    Ok(())
}
