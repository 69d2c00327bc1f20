//! Pipeline generations shipped with the operator.
//!
//! Each generation is a version descriptor plus the ordered resource names
//! of its pipelines. Objects stay on the generation their version label
//! names until they are upgraded externally.

use keel_core::{Error, Result};
use keel_reconciler::{ChangeKind, Changelog, Component, VersionDescriptor};

use crate::resources::{
    clusterconfigmap, clusterstatus, configmap, cpnamespace, keepforinfrarefs,
    machinedeploymentstatus, tenantclients, workercount,
};

pub const GENERATION_1: &str = "1.0.0";
pub const GENERATION_2: &str = "2.0.0";

/// Every shipped generation, oldest first.
pub const GENERATIONS: [&str; 2] = [GENERATION_1, GENERATION_2];

/// Ordered cluster resources of a generation.
///
/// `keepforinfrarefs` follows the context resources directly. Every later
/// resource may cancel the pass, and the finalizer must be kept first.
pub fn cluster_resources(version: &str) -> Result<&'static [&'static str]> {
    match version {
        GENERATION_1 => Ok(&[
            tenantclients::NAME,
            keepforinfrarefs::NAME,
            cpnamespace::NAME,
            clusterconfigmap::NAME,
            configmap::NAME,
        ]),
        GENERATION_2 => Ok(&[
            tenantclients::NAME,
            workercount::NAME,
            keepforinfrarefs::NAME,
            clusterstatus::NAME,
            cpnamespace::NAME,
            clusterconfigmap::NAME,
            configmap::NAME,
        ]),
        other => Err(unknown(other)),
    }
}

/// Ordered machine deployment resources of a generation. Empty when the
/// generation does not reconcile machine deployments.
pub fn machine_deployment_resources(version: &str) -> Result<&'static [&'static str]> {
    match version {
        GENERATION_1 => Ok(&[]),
        GENERATION_2 => Ok(&[
            tenantclients::NAME,
            workercount::NAME,
            keepforinfrarefs::NAME,
            machinedeploymentstatus::NAME,
        ]),
        other => Err(unknown(other)),
    }
}

/// Descriptor of one generation for a provider.
pub fn descriptor(project: &str, provider: &str, version: &str) -> Result<VersionDescriptor> {
    let base = VersionDescriptor::new(project, provider, version);
    let with_ingress = provider != "kvm";

    let descriptor = match version {
        GENERATION_1 => {
            let d = base
                .with_component(Component::new("coredns", "1.6.2"))
                .with_component(Component::new("kube-state-metrics", "1.7.2"))
                .with_component(Component::new("node-exporter", "0.18.0"))
                .with_changelog(Changelog::new(
                    project,
                    ChangeKind::Added,
                    "Manage control-plane namespace and cluster values config map.",
                ))
                .with_changelog(Changelog::new(
                    project,
                    ChangeKind::Added,
                    "Keep cluster finalizers while infrastructure references exist.",
                ));
            if with_ingress {
                d.with_component(Component::new("nginx-ingress-controller", "0.25.1"))
            } else {
                d
            }
        }
        GENERATION_2 => {
            let d = base
                .with_component(Component::new("coredns", "1.6.5"))
                .with_component(Component::new("kube-state-metrics", "1.9.2"))
                .with_component(Component::new("node-exporter", "0.18.1"))
                .with_changelog(
                    Changelog::new(
                        "kube-state-metrics",
                        ChangeKind::Changed,
                        "Update to 1.9.2.",
                    )
                    .with_url(
                        "https://github.com/kubernetes/kube-state-metrics/blob/master/CHANGELOG.md",
                    ),
                )
                .with_changelog(Changelog::new(
                    project,
                    ChangeKind::Added,
                    "Set cluster status once the infrastructure is created.",
                ))
                .with_changelog(Changelog::new(
                    project,
                    ChangeKind::Added,
                    "Report worker node counts in machine deployment status.",
                ));
            if with_ingress {
                d.with_component(Component::new("nginx-ingress-controller", "0.26.1"))
            } else {
                d
            }
        }
        other => return Err(unknown(other)),
    };

    Ok(descriptor)
}

/// Descriptors of every shipped generation for a provider, oldest first.
pub fn descriptors(project: &str, provider: &str) -> Result<Vec<VersionDescriptor>> {
    GENERATIONS
        .iter()
        .map(|version| descriptor(project, provider, version))
        .collect()
}

fn unknown(version: &str) -> Error {
    Error::invalid_version(version, "no such generation is shipped")
}
