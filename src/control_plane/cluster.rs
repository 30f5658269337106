// ABOUTME: ControlPlane implementation backed by a Kubernetes API server.
// ABOUTME: Server-side apply of dynamic objects; API status codes mapped to the error taxonomy.

use async_trait::async_trait;
use kube::api::{ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams};
use kube::config::KubeConfigOptions;
use kube::{Api, Client};
use snafu::ResultExt;
use tracing::{debug, info};

use super::client::{ControlPlane, HealthSignal};
use super::error::{ClientSnafu, ConnectError, ControlPlaneError, InferSnafu, KubeconfigSnafu};
use super::manifest::{self, FIELD_MANAGER};
use super::readiness;
use crate::plan::ResourceSpec;

pub struct KubeControlPlane {
    client: Client,
}

impl KubeControlPlane {
    /// Connect using the named kubeconfig context, or the inferred environment.
    ///
    /// Probes the server version so an unreachable cluster fails here rather
    /// than on the first apply.
    pub async fn connect(context: Option<&str>) -> Result<Self, ConnectError> {
        debug!(?context, "Initializing control-plane client");

        let config = match context {
            Some(ctx) => {
                let options = KubeConfigOptions {
                    context: Some(ctx.to_string()),
                    ..Default::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .context(KubeconfigSnafu { context: ctx })?
            }
            None => kube::Config::infer().await.context(InferSnafu)?,
        };

        let client = Client::try_from(config).context(ClientSnafu)?;
        let version = client.apiserver_version().await.context(ClientSnafu)?;
        info!(version = %version.git_version, "Connected to control plane");

        Ok(Self { client })
    }

    fn api(&self, spec: &ResourceSpec) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(spec.kind.group(), spec.kind.version(), spec.kind.as_str());
        let resource = ApiResource::from_gvk(&gvk);
        match &spec.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns.as_str(), &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

/// Map a client error onto the control-plane taxonomy.
fn classify(err: kube::Error) -> ControlPlaneError {
    match err {
        kube::Error::Api(response) => {
            ControlPlaneError::from_status(response.code, response.message)
        }
        other => {
            let message = other.to_string();
            if message.contains("timed out") || message.contains("timeout") {
                ControlPlaneError::Timeout(message)
            } else {
                ControlPlaneError::Unavailable(message)
            }
        }
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn apply(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        let object = manifest::render(spec);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        self.api(spec)
            .patch(spec.name.as_str(), &params, &Patch::Apply(&object))
            .await
            .map_err(classify)?;
        debug!(resource = %spec.id, "Applied");
        Ok(())
    }

    async fn get_status(&self, spec: &ResourceSpec) -> Result<HealthSignal, ControlPlaneError> {
        let object = self
            .api(spec)
            .get_opt(spec.name.as_str())
            .await
            .map_err(classify)?
            .ok_or_else(|| ControlPlaneError::NotFound(spec.id.to_string()))?;

        let value = serde_json::to_value(&object)
            .map_err(|e| ControlPlaneError::Invalid(format!("unreadable object: {}", e)))?;
        Ok(readiness::evaluate(spec.kind, &value))
    }

    async fn delete(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        self.api(spec)
            .delete(spec.name.as_str(), &DeleteParams::background())
            .await
            .map_err(classify)?;
        debug!(resource = %spec.id, "Deleted");
        Ok(())
    }
}
