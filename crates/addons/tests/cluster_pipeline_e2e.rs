//! End-to-end passes of the assembled cluster and machine deployment
//! controllers against the in-memory platform.

#![allow(clippy::unwrap_used)]

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use keel_addons::{
    bundle, cluster_controller, label, machine_deployment_controller, Cluster, ConfigMap,
    ControlPlane, Deps, InMemoryControlPlane, InMemoryEventRecorder, InMemoryTenantCluster,
    InMemoryTenantFactory, InfrastructureObject, Labels, MachineDeployment,
    MachineDeploymentStatus, Node, ObjectRef, OperatorConfig, ProviderConfig, RetrySettings,
    TenantClient, TenantClientFactory,
};
use keel_core::{Error, Result};
use keel_reconciler::{InMemoryRecorder, Operation, Outcome, ReconcileOutcome};

struct Fixture {
    control_plane: Arc<InMemoryControlPlane>,
    tenants: Arc<InMemoryTenantFactory>,
    events: Arc<InMemoryEventRecorder>,
    metrics: Arc<InMemoryRecorder>,
    deps: Deps,
}

fn config() -> OperatorConfig {
    OperatorConfig::default()
        .base_domain("example.com")
        .retry(RetrySettings {
            max_attempts: 1,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_multiplier: 1.0,
            jitter: false,
        })
}

fn fixture_with(config: OperatorConfig) -> Fixture {
    // Only the first test to get here installs the subscriber.
    let _ = keel_core::telemetry::init("warn");

    let control_plane = InMemoryControlPlane::new_arc();
    let tenants = Arc::new(InMemoryTenantFactory::new());
    let events = Arc::new(InMemoryEventRecorder::new());
    let metrics = Arc::new(InMemoryRecorder::new());
    let deps = Deps::new(
        config,
        ProviderConfig::aws(),
        control_plane.clone(),
        tenants.clone(),
        events.clone(),
    )
    .unwrap()
    .with_recorder(metrics.clone());

    Fixture {
        control_plane,
        tenants,
        events,
        metrics,
        deps,
    }
}

fn fixture() -> Fixture {
    fixture_with(config())
}

fn infra_ref() -> ObjectRef {
    ObjectRef::new("AWSCluster", "org-acme", "a1b2c")
}

fn infra(conditions: &[&str]) -> InfrastructureObject {
    InfrastructureObject {
        kind: "AWSCluster".to_string(),
        namespace: "org-acme".to_string(),
        name: "a1b2c".to_string(),
        conditions: conditions.iter().map(ToString::to_string).collect(),
    }
}

fn cluster(version: &str) -> Cluster {
    Cluster::new("a1b2c", "org-acme", "acme")
        .with_operator_version(version)
        .with_infrastructure_ref(infra_ref())
}

async fn seed(f: &Fixture, cluster: &Cluster) {
    f.control_plane.insert_cluster(cluster.clone()).await;
}

fn register_tenant(f: &Fixture) -> Arc<InMemoryTenantCluster> {
    f.tenants.register("a1b2c")
}

#[tokio::test]
async fn test_fresh_cluster_converges_control_plane_before_tenant_is_up() {
    // GIVEN a new cluster whose tenant API is not reachable yet
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    let controller = cluster_controller(&f.deps).unwrap();

    // WHEN the controller reconciles it
    let outcome = controller.reconcile(&cluster).await.unwrap();

    // THEN control-plane objects exist and the tenant side was skipped
    assert_eq!(outcome, ReconcileOutcome::Converged);
    assert!(f.control_plane.get_namespace("a1b2c").await.is_ok());
    let config_maps = f.control_plane.config_maps().await;
    assert_eq!(config_maps.len(), 1);
    assert_eq!(config_maps[0].name, "a1b2c-cluster-values");
    assert!(config_maps[0].data["values"].contains("baseDomain: a1b2c.k8s.example.com"));

    assert_eq!(
        f.tenants.requested_endpoints(),
        vec!["api.a1b2c.k8s.example.com"]
    );
    let canceled: Vec<_> = f
        .metrics
        .records()
        .into_iter()
        .filter(|r| r.outcome == Outcome::Canceled)
        .map(|r| r.resource)
        .collect();
    assert!(canceled.contains(&"tenantclients".to_string()));
    assert!(canceled.contains(&"configmap".to_string()));
}

#[tokio::test]
async fn test_tenant_config_maps_follow_once_tenant_is_up() {
    // GIVEN a converged control plane and a reachable tenant cluster
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    let controller = cluster_controller(&f.deps).unwrap();
    controller.reconcile(&cluster).await.unwrap();
    let tenant = register_tenant(&f);
    tenant
        .set_nodes(vec![
            Node::master("m0", true),
            Node::worker("w0", "pool0", true),
        ])
        .await;

    // WHEN the next pass runs
    controller.reconcile(&cluster).await.unwrap();

    // THEN every managed chart has its values config map
    let names: Vec<_> = tenant
        .config_maps()
        .await
        .into_iter()
        .map(|cm| cm.name)
        .collect();
    assert_eq!(
        names,
        vec![
            "coredns-values",
            "kube-state-metrics-values",
            "nginx-ingress-controller-values",
            "node-exporter-values",
        ]
    );
}

#[tokio::test]
async fn test_second_pass_applies_nothing() {
    // GIVEN a fully converged cluster
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    register_tenant(&f);
    let controller = cluster_controller(&f.deps).unwrap();
    controller.reconcile(&cluster).await.unwrap();
    let applied = |f: &Fixture| {
        f.metrics
            .records()
            .into_iter()
            .filter(|r| {
                matches!(
                    r.operation,
                    Operation::ApplyCreate
                        | Operation::ApplyUpdate
                        | Operation::ApplyDelete
                )
            })
            .count()
    };
    let after_first = applied(&f);
    assert!(after_first > 0);

    // WHEN the same desired state is reconciled again
    controller.reconcile(&cluster).await.unwrap();

    // THEN no CRUD resource applied a change
    assert_eq!(applied(&f), after_first);
}

#[tokio::test]
async fn test_drifted_cluster_values_are_restored() {
    // GIVEN a converged cluster whose values config map was hand-edited
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    let controller = cluster_controller(&f.deps).unwrap();
    controller.reconcile(&cluster).await.unwrap();
    let edited: ConfigMap = f
        .control_plane
        .config_maps()
        .await
        .remove(0)
        .with_data("values", "baseDomain: hand.edited\n");
    f.control_plane.update_config_map(&edited).await.unwrap();

    // WHEN the controller reconciles
    controller.reconcile(&cluster).await.unwrap();

    // THEN the desired values are back
    let restored = f.control_plane.config_maps().await.remove(0);
    assert!(restored.data["values"].contains("a1b2c.k8s.example.com"));
}

#[tokio::test]
async fn test_created_infrastructure_marks_cluster_ready_and_ends_pass() {
    // GIVEN infrastructure that reports the Created condition
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    f.control_plane.insert_infrastructure(infra(&["Created"])).await;
    let controller = cluster_controller(&f.deps).unwrap();

    // WHEN the controller reconciles
    let outcome = controller.reconcile(&cluster).await.unwrap();

    // THEN the status is written and later resources wait for the next pass
    assert_eq!(outcome, ReconcileOutcome::Converged);
    let stored = f.control_plane.get_cluster("org-acme", "a1b2c").await.unwrap();
    assert!(stored.status.is_ready());
    assert_eq!(f.events.with_reason("ClusterStatusUpdated").len(), 1);
    assert!(f.control_plane.get_namespace("a1b2c").await.is_err());

    // WHEN the next pass sees the updated cluster
    controller.reconcile(&stored).await.unwrap();

    // THEN the remaining resources converge and no second event is emitted
    assert!(f.control_plane.get_namespace("a1b2c").await.is_ok());
    assert_eq!(f.events.with_reason("ClusterStatusUpdated").len(), 1);
}

#[tokio::test]
async fn test_first_generation_never_touches_status() {
    // GIVEN a cluster still labelled with the first generation
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_1);
    seed(&f, &cluster).await;
    f.control_plane.insert_infrastructure(infra(&["Created"])).await;
    let controller = cluster_controller(&f.deps).unwrap();

    // WHEN the controller reconciles
    controller.reconcile(&cluster).await.unwrap();

    // THEN it ran the first generation's resources only
    let stored = f.control_plane.get_cluster("org-acme", "a1b2c").await.unwrap();
    assert!(!stored.status.is_ready());
    assert!(f.control_plane.get_namespace("a1b2c").await.is_ok());
    assert!(f.metrics.records_for("clusterstatus").is_empty());
    assert!(f.metrics.records_for("workercount").is_empty());
}

#[tokio::test]
async fn test_unknown_version_is_ignored() {
    let f = fixture();
    let controller = cluster_controller(&f.deps).unwrap();

    let unlabelled = Cluster::new("a1b2c", "org-acme", "acme");
    assert_eq!(
        controller.reconcile(&unlabelled).await.unwrap(),
        ReconcileOutcome::Ignored
    );
    let future = cluster("9.0.0");
    assert_eq!(
        controller.reconcile(&future).await.unwrap(),
        ReconcileOutcome::Ignored
    );
    assert!(f.metrics.records().is_empty());
}

#[tokio::test]
async fn test_deletion_waits_for_infrastructure() {
    // GIVEN a converged cluster marked for deletion whose infrastructure
    // still exists
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    let tenant = register_tenant(&f);
    let controller = cluster_controller(&f.deps).unwrap();
    controller.reconcile(&cluster).await.unwrap();
    f.control_plane.insert_infrastructure(infra(&[])).await;
    let deleted = cluster.clone().deleted_at(Utc::now());

    // WHEN the deletion pass runs
    let outcome = controller.reconcile(&deleted).await.unwrap();

    // THEN owned objects are gone but the finalizer stays
    assert_eq!(outcome, ReconcileOutcome::FinalizerKept);
    assert!(f.control_plane.namespaces().await.is_empty());
    assert!(f.control_plane.config_maps().await.is_empty());
    assert!(tenant.config_maps().await.is_empty());

    // WHEN the provider removed the infrastructure
    f.control_plane.remove_infrastructure(&infra_ref()).await;

    // THEN the finalizer may go
    assert_eq!(
        controller.reconcile(&deleted).await.unwrap(),
        ReconcileOutcome::FinalizerRemovable
    );
}

/// Tenant whose API drops every delete call.
struct DeletesTimeOut(Arc<InMemoryTenantCluster>);

#[async_trait]
impl TenantClient for DeletesTimeOut {
    fn cluster_id(&self) -> &str {
        self.0.cluster_id()
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.0.list_nodes().await
    }

    async fn list_config_maps(&self, namespace: &str, selector: &Labels) -> Result<Vec<ConfigMap>> {
        self.0.list_config_maps(namespace, selector).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.0.create_config_map(config_map).await
    }

    async fn update_config_map(&self, config_map: &ConfigMap) -> Result<()> {
        self.0.update_config_map(config_map).await
    }

    async fn delete_config_map(&self, _namespace: &str, _name: &str) -> Result<()> {
        Err(Error::tenant_not_available(self.0.cluster_id(), "request timed out"))
    }
}

struct DeletesTimeOutFactory(Arc<DeletesTimeOut>);

#[async_trait]
impl TenantClientFactory for DeletesTimeOutFactory {
    async fn new_client(&self, _cluster_id: &str, _endpoint: &str) -> Result<Arc<dyn TenantClient>> {
        Ok(self.0.clone())
    }
}

#[tokio::test]
async fn test_deletion_keeps_finalizer_when_tenant_drops_mid_delete() {
    // GIVEN a converged cluster whose tenant API fails every delete call
    let control_plane = InMemoryControlPlane::new_arc();
    let tenant = Arc::new(InMemoryTenantCluster::new("a1b2c"));
    let deps = Deps::new(
        config(),
        ProviderConfig::aws(),
        control_plane.clone(),
        Arc::new(DeletesTimeOutFactory(Arc::new(DeletesTimeOut(tenant.clone())))),
        Arc::new(InMemoryEventRecorder::new()),
    )
    .unwrap();
    let controller = cluster_controller(&deps).unwrap();
    let cluster = cluster(bundle::GENERATION_2);
    control_plane.insert_cluster(cluster.clone()).await;
    controller.reconcile(&cluster).await.unwrap();
    assert_eq!(tenant.config_maps().await.len(), 4);

    // AND its infrastructure object still exists
    control_plane.insert_infrastructure(infra(&[])).await;

    // WHEN the deletion pass is canceled by the tenant outage
    let outcome = controller
        .reconcile(&cluster.deleted_at(Utc::now()))
        .await
        .unwrap();

    // THEN the finalizer stays so the deletion is retried later
    assert_eq!(outcome, ReconcileOutcome::FinalizerKept);
    assert_eq!(tenant.config_maps().await.len(), 4);
}

#[tokio::test]
async fn test_deleted_machine_deployment_waits_for_infrastructure() {
    // GIVEN a deleted pool whose status is current but whose infrastructure
    // object still exists
    let f = fixture();
    register_tenant(&f);
    let md_ref = ObjectRef::new("AWSMachineDeployment", "org-acme", "pool0");
    f.control_plane
        .insert_infrastructure(InfrastructureObject {
            kind: md_ref.kind.clone(),
            namespace: md_ref.namespace.clone(),
            name: md_ref.name.clone(),
            conditions: Vec::new(),
        })
        .await;
    let md = MachineDeployment::new("pool0", "org-acme", "a1b2c", "acme")
        .with_operator_version(bundle::GENERATION_2)
        .with_infrastructure_ref(md_ref.clone())
        .deleted_at(Utc::now());
    f.control_plane.insert_machine_deployment(md.clone()).await;
    let controller = machine_deployment_controller(&f.deps).unwrap();

    // WHEN the deletion pass runs
    // THEN the finalizer stays until the provider removes the object
    assert_eq!(
        controller.reconcile(&md).await.unwrap(),
        ReconcileOutcome::FinalizerKept
    );

    f.control_plane.remove_infrastructure(&md_ref).await;
    assert_eq!(
        controller.reconcile(&md).await.unwrap(),
        ReconcileOutcome::FinalizerRemovable
    );
}

#[tokio::test]
async fn test_deletion_of_unreachable_tenant_still_completes() {
    let f = fixture();
    let mut cluster = cluster(bundle::GENERATION_2);
    cluster.infrastructure_ref = None;
    seed(&f, &cluster).await;
    let controller = cluster_controller(&f.deps).unwrap();
    controller.reconcile(&cluster).await.unwrap();

    let outcome = controller
        .reconcile(&cluster.deleted_at(Utc::now()))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::FinalizerRemovable);
    assert!(f.control_plane.namespaces().await.is_empty());
}

#[tokio::test]
async fn test_platform_outage_surfaces_transient_error() {
    // GIVEN an unreachable management API
    let f = fixture();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    f.control_plane.set_available(false);
    let controller = cluster_controller(&f.deps).unwrap();

    // WHEN the controller reconciles
    let err = controller.reconcile(&cluster).await.unwrap_err();

    // THEN the caller sees a retryable error and the failing call was
    // retried once before giving up
    assert!(err.is_transient());
    let status_calls = f.metrics.records_for("clusterstatus");
    assert_eq!(status_calls.len(), 1);
    assert_eq!(status_calls[0].outcome, Outcome::Error);
}

#[tokio::test]
async fn test_machine_deployment_status_tracks_tenant_nodes() {
    // GIVEN a machine pool whose tenant cluster runs two of its nodes
    let f = fixture();
    let tenant = register_tenant(&f);
    tenant
        .set_nodes(vec![
            Node::master("m0", true),
            Node::worker("w0", "pool0", true),
            Node::worker("w1", "pool0", false),
        ])
        .await;
    let md = MachineDeployment::new("pool0", "org-acme", "a1b2c", "acme")
        .with_operator_version(bundle::GENERATION_2);
    f.control_plane.insert_machine_deployment(md.clone()).await;
    let controller = machine_deployment_controller(&f.deps).unwrap();

    // WHEN the controller reconciles it
    controller.reconcile(&md).await.unwrap();

    // THEN the status mirrors the node counts
    let stored = f
        .control_plane
        .get_machine_deployment("org-acme", "pool0")
        .await
        .unwrap();
    assert_eq!(
        stored.status,
        MachineDeploymentStatus {
            replicas: 2,
            ready_replicas: 1
        }
    );
    assert_eq!(f.events.with_reason("MachineDeploymentUpdated").len(), 1);

    // AND a first-generation pool is not handled at all
    let old = MachineDeployment::new("pool1", "org-acme", "a1b2c", "acme")
        .with_operator_version(bundle::GENERATION_1);
    assert_eq!(
        controller.reconcile(&old).await.unwrap(),
        ReconcileOutcome::Ignored
    );
}

#[tokio::test]
async fn test_deleted_machine_deployment_keeps_finalizer_while_status_changes() {
    let f = fixture();
    let tenant = register_tenant(&f);
    tenant
        .set_nodes(vec![Node::worker("w0", "pool0", true)])
        .await;
    let md = MachineDeployment::new("pool0", "org-acme", "a1b2c", "acme")
        .with_operator_version(bundle::GENERATION_2)
        .deleted_at(Utc::now());
    f.control_plane.insert_machine_deployment(md.clone()).await;
    let controller = machine_deployment_controller(&f.deps).unwrap();

    assert_eq!(
        controller.reconcile(&md).await.unwrap(),
        ReconcileOutcome::FinalizerKept
    );

    tenant.set_nodes(Vec::new()).await;
    f.control_plane
        .update_machine_deployment_status("org-acme", "pool0", MachineDeploymentStatus::default())
        .await
        .unwrap();
    assert_eq!(
        controller.reconcile(&md).await.unwrap(),
        ReconcileOutcome::FinalizerRemovable
    );
}

#[tokio::test]
async fn test_controller_from_config_file() {
    // GIVEN an operator config on disk
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
project_name = "addon-operator"
provider = "aws"
base_domain = "example.com"

[retry]
max_attempts = 0
"#
    )
    .unwrap();
    let config = OperatorConfig::from_path(file.path()).unwrap();

    // WHEN the controller is assembled from it
    let f = fixture_with(config);
    let controller = cluster_controller(&f.deps).unwrap();
    let cluster = cluster(bundle::GENERATION_2);
    seed(&f, &cluster).await;
    controller.reconcile(&cluster).await.unwrap();

    // THEN names derive from the configured project
    assert_eq!(controller.finalizer_name(), "keel.io/addon-operator");
    assert!(controller
        .descriptors()
        .iter()
        .all(|d| d.name == "addon-operator"));
    let namespace = f.control_plane.get_namespace("a1b2c").await.unwrap();
    assert_eq!(
        namespace.labels.get(label::MANAGED_BY).map(String::as_str),
        Some("addon-operator")
    );
}
