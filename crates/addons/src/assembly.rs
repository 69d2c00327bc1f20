//! Builds the versioned pipelines, routers and controllers.

use std::fmt;
use std::sync::Arc;

use keel_core::{Error, Result};
use keel_reconciler::{
    wrap, Controller, MetricsRecorder, Pipeline, ReconcileContext, Resource, Router,
    TracingRecorder,
};
use tracing::info;

use crate::bundle;
use crate::config::OperatorConfig;
use crate::keys;
use crate::kind::{Cluster, MachineDeployment, TenantScoped};
use crate::platform::{ControlPlane, EventRecorder, TenantClientFactory};
use crate::provider::ProviderConfig;
use crate::resources::{
    clusterconfigmap, clusterstatus, configmap, cpnamespace, keepforinfrarefs,
    machinedeploymentstatus, tenantclients, workercount, ClusterConfigMap, ClusterStatusResource,
    ControlPlaneNamespace, KeepForInfraRefs, MachineDeploymentStatusResource, TenantClients,
    TenantConfigMaps, WorkerCounter,
};

/// Collaborators shared by every pipeline.
#[derive(Clone)]
pub struct Deps {
    pub config: OperatorConfig,
    pub provider: ProviderConfig,
    pub control_plane: Arc<dyn ControlPlane>,
    pub tenants: Arc<dyn TenantClientFactory>,
    pub events: Arc<dyn EventRecorder>,
    pub recorder: Arc<dyn MetricsRecorder>,
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deps")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

impl Deps {
    /// Fails if the config is invalid or names another provider.
    pub fn new(
        config: OperatorConfig,
        provider: ProviderConfig,
        control_plane: Arc<dyn ControlPlane>,
        tenants: Arc<dyn TenantClientFactory>,
        events: Arc<dyn EventRecorder>,
    ) -> Result<Self> {
        config.validate()?;
        if config.provider != provider.provider {
            return Err(Error::invalid_config(format!(
                "configured provider '{}' does not match provider '{}'",
                config.provider, provider.provider
            )));
        }
        Ok(Self {
            config,
            provider,
            control_plane,
            tenants,
            events,
            recorder: Arc::new(TracingRecorder),
        })
    }

    /// Record resource calls somewhere other than the tracing subscriber.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn MetricsRecorder>) -> Self {
        self.recorder = recorder;
        self
    }
}

/// API endpoint of a tenant cluster.
pub fn tenant_endpoint(cluster_id: &str, base_domain: &str) -> String {
    format!("api.{cluster_id}.k8s.{base_domain}")
}

fn seed_endpoint<O: TenantScoped>(
    base_domain: String,
) -> impl Fn(&mut ReconcileContext, &O) -> Result<()> + Send + Sync + 'static {
    move |ctx: &mut ReconcileContext, obj: &O| {
        // Without a base domain the tenant side is skipped.
        if !base_domain.is_empty() {
            ctx.insert(
                keys::TENANT_ENDPOINT,
                tenant_endpoint(obj.cluster_id(), &base_domain),
            );
        }
        Ok(())
    }
}

fn cluster_resource(name: &str, deps: &Deps) -> Result<Resource<Cluster>> {
    let resource = match name {
        tenantclients::NAME => Resource::ensure(TenantClients::new(Arc::clone(&deps.tenants))),
        workercount::NAME => Resource::ensure(WorkerCounter::new()),
        clusterstatus::NAME => Resource::ensure(ClusterStatusResource::new(
            Arc::clone(&deps.control_plane),
            Arc::clone(&deps.events),
        )),
        cpnamespace::NAME => Resource::crud(ControlPlaneNamespace::new(
            Arc::clone(&deps.control_plane),
            &deps.config.project_name,
        )?),
        clusterconfigmap::NAME => Resource::crud(ClusterConfigMap::new(
            Arc::clone(&deps.control_plane),
            deps.config.clone(),
            Arc::clone(&deps.provider.cluster_values),
        )?),
        configmap::NAME => {
            Resource::crud(TenantConfigMaps::new(deps.config.clone(), &deps.provider)?)
        }
        keepforinfrarefs::NAME => {
            Resource::ensure(KeepForInfraRefs::new(Arc::clone(&deps.control_plane)))
        }
        other => {
            return Err(Error::invalid_config(format!(
                "no cluster resource named '{other}'"
            )))
        }
    };
    Ok(resource)
}

fn machine_deployment_resource(name: &str, deps: &Deps) -> Result<Resource<MachineDeployment>> {
    let resource = match name {
        tenantclients::NAME => Resource::ensure(TenantClients::new(Arc::clone(&deps.tenants))),
        workercount::NAME => Resource::ensure(WorkerCounter::new()),
        machinedeploymentstatus::NAME => Resource::ensure(MachineDeploymentStatusResource::new(
            Arc::clone(&deps.control_plane),
            Arc::clone(&deps.events),
        )),
        keepforinfrarefs::NAME => {
            Resource::ensure(KeepForInfraRefs::new(Arc::clone(&deps.control_plane)))
        }
        other => {
            return Err(Error::invalid_config(format!(
                "no machine deployment resource named '{other}'"
            )))
        }
    };
    Ok(resource)
}

/// Cluster pipeline of one generation, every resource wrapped with retry
/// and metrics.
pub fn cluster_pipeline(version: &str, deps: &Deps) -> Result<Pipeline<Cluster>> {
    let resources = bundle::cluster_resources(version)?
        .iter()
        .map(|name| cluster_resource(name, deps))
        .collect::<Result<Vec<_>>>()?;
    let descriptor =
        bundle::descriptor(&deps.config.project_name, &deps.provider.provider, version)?;

    Pipeline::builder(descriptor)
        .resources(wrap(
            resources,
            &deps.config.retry_policy(),
            Arc::clone(&deps.recorder),
        ))
        .init_context(seed_endpoint::<Cluster>(deps.config.base_domain.clone()))
        .build()
}

/// Machine deployment pipeline of one generation.
pub fn machine_deployment_pipeline(
    version: &str,
    deps: &Deps,
) -> Result<Pipeline<MachineDeployment>> {
    let resources = bundle::machine_deployment_resources(version)?
        .iter()
        .map(|name| machine_deployment_resource(name, deps))
        .collect::<Result<Vec<_>>>()?;
    let descriptor =
        bundle::descriptor(&deps.config.project_name, &deps.provider.provider, version)?;

    Pipeline::builder(descriptor)
        .resources(wrap(
            resources,
            &deps.config.retry_policy(),
            Arc::clone(&deps.recorder),
        ))
        .init_context(seed_endpoint::<MachineDeployment>(
            deps.config.base_domain.clone(),
        ))
        .build()
}

/// Router over every shipped cluster generation.
pub fn cluster_router(deps: &Deps) -> Result<Router<Cluster>> {
    let pipelines = bundle::GENERATIONS
        .iter()
        .map(|version| cluster_pipeline(version, deps).map(Arc::new))
        .collect::<Result<Vec<_>>>()?;
    Router::by_version(pipelines)
}

/// Router over the generations that reconcile machine deployments.
pub fn machine_deployment_router(deps: &Deps) -> Result<Router<MachineDeployment>> {
    let mut pipelines = Vec::new();
    for version in bundle::GENERATIONS {
        if bundle::machine_deployment_resources(version)?.is_empty() {
            continue;
        }
        pipelines.push(Arc::new(machine_deployment_pipeline(version, deps)?));
    }
    Router::by_version(pipelines)
}

pub fn cluster_controller(deps: &Deps) -> Result<Controller<Cluster>> {
    let controller = Controller::new(&deps.config.project_name, cluster_router(deps)?)?;
    info!(
        controller = %controller.name(),
        provider = %deps.provider.provider,
        generations = controller.router().len(),
        "Assembled cluster controller"
    );
    Ok(controller)
}

pub fn machine_deployment_controller(deps: &Deps) -> Result<Controller<MachineDeployment>> {
    let name = format!("{}-machine-deployment", deps.config.project_name);
    let controller = Controller::new(name, machine_deployment_router(deps)?)?;
    info!(
        controller = %controller.name(),
        provider = %deps.provider.provider,
        generations = controller.router().len(),
        "Assembled machine deployment controller"
    );
    Ok(controller)
}
