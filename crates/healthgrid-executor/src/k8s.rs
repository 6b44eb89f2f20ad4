//! Kubernetes pod backend.
//!
//! Each unit is a single-container pod with `restartPolicy: Never`, so the
//! pod phase settles on `Succeeded` or `Failed` once the container exits.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::backend::{UnitPhase, UnitSpec, WorkloadBackend};
use crate::error::{BackendError, BackendResult};

const CONTAINER_NAME: &str = "check";

/// Runs check units as pods through the Kubernetes API.
#[derive(Clone)]
pub struct KubeBackend {
    client: Client,
}

impl KubeBackend {
    /// Connect using the in-cluster config or the local kubeconfig.
    pub async fn try_default() -> BackendResult<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Build the pod manifest for a unit.
pub fn pod_manifest(namespace: &str, spec: &UnitSpec) -> Pod {
    let non_empty = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());

    Pod {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(spec.labels.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            restart_policy: Some("Never".to_string()),
            containers: vec![Container {
                name: CONTAINER_NAME.to_string(),
                image: Some(spec.image.clone()),
                command: non_empty(&spec.command),
                args: non_empty(&spec.args),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_phase(pod: &Pod) -> UnitPhase {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .map(UnitPhase::parse)
        .unwrap_or(UnitPhase::Unknown)
}

#[async_trait]
impl WorkloadBackend for KubeBackend {
    async fn create_unit(&self, namespace: &str, spec: &UnitSpec) -> BackendResult<()> {
        let pod = pod_manifest(namespace, spec);
        self.pods(namespace)
            .create(&PostParams::default(), &pod)
            .await
            .map_err(|e| BackendError::api("create pod", e))?;
        debug!(%namespace, pod = %spec.name, "pod created");
        Ok(())
    }

    async fn read_phase(&self, namespace: &str, name: &str) -> BackendResult<UnitPhase> {
        let pod = self
            .pods(namespace)
            .get_status(name)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref resp) if resp.code == 404 => BackendError::NotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
                other => BackendError::api("read pod status", other),
            })?;
        Ok(pod_phase(&pod))
    }

    async fn read_logs(&self, namespace: &str, name: &str) -> BackendResult<String> {
        self.pods(namespace)
            .logs(name, &LogParams::default())
            .await
            .map_err(|e| BackendError::api("read pod logs", e))
    }

    async fn delete_unit(&self, namespace: &str, name: &str) -> BackendResult<()> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| BackendError::api("delete pod", e))?;
        Ok(())
    }
}
