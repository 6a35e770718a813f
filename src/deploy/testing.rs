// ABOUTME: In-memory runtime double for exercising rollover and pipeline logic.
// ABOUTME: Containers live in a Vec; every operation appends to an ordered event log.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::runtime::{
    BuildContext, ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps,
    ContainerState, ContainerSummary, ImageError, ImageOps, PruneReport, RegistryAuth, Sealed,
};
use crate::types::{ContainerId, ImageId, ImageRef};

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub(crate) id: ContainerId,
    pub(crate) name: String,
    pub(crate) running: bool,
    pub(crate) labels: HashMap<String, String>,
}

#[derive(Default)]
pub(crate) struct FakeRuntime {
    pub(crate) containers: Mutex<Vec<FakeContainer>>,
    next_id: Mutex<u64>,
    pub(crate) fail_start: Mutex<bool>,
    pub(crate) fail_build: Mutex<bool>,
    pub(crate) healthy: Mutex<bool>,
    events: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        FakeRuntime {
            healthy: Mutex::new(true),
            ..Default::default()
        }
    }

    /// Plant a managed container named `{service}-{slot}` with the full
    /// gantry label set.
    pub(crate) fn seed(&self, service: &str, slot: &str, running: bool, build: u64) -> ContainerId {
        let id = self.alloc_id();
        let mut labels = HashMap::new();
        labels.insert("gantry.service".to_string(), service.to_string());
        labels.insert("gantry.managed".to_string(), "true".to_string());
        labels.insert("gantry.slot".to_string(), slot.to_string());
        labels.insert("gantry.build".to_string(), build.to_string());
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.clone(),
            name: format!("{}-{}", service, slot),
            running,
            labels,
        });
        id
    }

    fn alloc_id(&self) -> ContainerId {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        ContainerId::new(format!("fake-{}", next))
    }

    pub(crate) fn running_names(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.running)
            .map(|c| c.name.clone())
            .collect()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn name_of(&self, id: &ContainerId) -> String {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.to_string())
    }
}

impl Sealed for FakeRuntime {}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(&self, config: &ContainerConfig) -> Result<ContainerId, ContainerError> {
        let id = self.alloc_id();
        self.record(format!("create {}", config.name));
        self.containers.lock().unwrap().push(FakeContainer {
            id: id.clone(),
            name: config.name.clone(),
            running: false,
            labels: config.labels.clone(),
        });
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        if *self.fail_start.lock().unwrap() {
            return Err(ContainerError::Runtime("start refused".to_string()));
        }
        self.record(format!("start {}", self.name_of(id)));
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if container.running {
            return Err(ContainerError::AlreadyRunning(id.to_string()));
        }
        container.running = true;
        Ok(())
    }

    async fn stop_container(&self, id: &ContainerId, _timeout: Duration) -> Result<(), ContainerError> {
        self.record(format!("stop {}", self.name_of(id)));
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        if !container.running {
            return Err(ContainerError::NotRunning(id.to_string()));
        }
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        self.record(format!("remove {}", self.name_of(id)));
        let mut containers = self.containers.lock().unwrap();
        let before = containers.len();
        containers.retain(|c| &c.id != id);
        if containers.len() == before {
            return Err(ContainerError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        Ok(ContainerInfo {
            id: container.id.clone(),
            name: container.name.clone(),
            image: "fake".to_string(),
            state: if container.running {
                ContainerState::Running
            } else {
                ContainerState::Exited
            },
            created: String::new(),
            labels: container.labels.clone(),
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|c| filters.all || c.running)
            .filter(|c| {
                filters
                    .name
                    .as_ref()
                    .is_none_or(|name| c.name.contains(name.as_str()))
            })
            .filter(|c| {
                filters
                    .labels
                    .iter()
                    .all(|(k, v)| c.labels.get(k) == Some(v))
            })
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                name: c.name.clone(),
                image: "fake".to_string(),
                state: if c.running { "running" } else { "exited" }.to_string(),
                status: String::new(),
                labels: c.labels.clone(),
            })
            .collect())
    }

    async fn run_healthcheck(
        &self,
        _id: &ContainerId,
        _cmd: &[String],
    ) -> Result<bool, ContainerError> {
        Ok(*self.healthy.lock().unwrap())
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn build_image(
        &self,
        _context: &BuildContext,
        tag: &ImageRef,
    ) -> Result<ImageId, ImageError> {
        if *self.fail_build.lock().unwrap() {
            return Err(ImageError::BuildFailed(tag.to_string()));
        }
        self.record(format!("build {}", tag));
        Ok(ImageId::new(format!("fake-image-{}", tag)))
    }

    async fn tag_image(&self, source: &ImageRef, target: &ImageRef) -> Result<(), ImageError> {
        self.record(format!("tag {} {}", source, target));
        Ok(())
    }

    async fn push_image(
        &self,
        reference: &ImageRef,
        _auth: Option<&RegistryAuth>,
    ) -> Result<(), ImageError> {
        self.record(format!("push {}", reference));
        Ok(())
    }

    async fn image_exists(&self, reference: &ImageRef) -> Result<bool, ImageError> {
        let built = format!("build {}", reference);
        let tagged = format!(" {}", reference);
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .any(|e| e == &built || (e.starts_with("tag ") && e.ends_with(&tagged))))
    }

    async fn remove_image(&self, reference: &ImageRef, _force: bool) -> Result<(), ImageError> {
        self.record(format!("rmi {}", reference));
        Ok(())
    }

    async fn prune_dangling(&self) -> Result<PruneReport, ImageError> {
        self.record("prune".to_string());
        Ok(PruneReport {
            deleted: 2,
            reclaimed_bytes: 4096,
        })
    }
}
