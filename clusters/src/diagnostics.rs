use crate::error::{self, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams};
use kube::ResourceExt;
use log::{debug, info, warn};
use snafu::ResultExt;
use std::fs;
use std::path::PathBuf;

const DIAGNOSTIC_DIR_PREFIX: &str = "mesh-smoke-diag-";
const POD_LOGS_DIR: &str = "pod_logs";
const FAILURES_FILE: &str = "pod_logs_failures.txt";

/// Collect diagnostics for a cluster into a fresh temporary directory.
///
/// The directory contains `meta.txt` (the caller's identification string),
/// `pod_logs/<namespace>_<pod>` with the logs of every container of every
/// pod, and `pod_logs_failures.txt` listing the pods whose logs could not be
/// collected. Returns the directory path.
pub async fn dump_diagnostics(client: &kube::Client, meta: &str) -> Result<PathBuf> {
    let out_dir = tempfile::Builder::new()
        .prefix(DIAGNOSTIC_DIR_PREFIX)
        .tempdir()
        .context(error::TempDirSnafu)?
        .into_path();
    info!("Dumping cluster diagnostics to '{}'", out_dir.display());

    fs::write(out_dir.join("meta.txt"), meta).context(error::WriteFileSnafu {
        path: out_dir.join("meta.txt").display().to_string(),
    })?;

    let logs_dir = out_dir.join(POD_LOGS_DIR);
    fs::create_dir(&logs_dir).context(error::WriteFileSnafu {
        path: logs_dir.display().to_string(),
    })?;

    let pods: Api<Pod> = Api::all(client.clone());
    let pod_list = pods.list(&ListParams::default()).await.context(
        error::KubeApiSnafu {
            what: "listing pods for diagnostics",
        },
    )?;

    let mut failures: Vec<String> = Vec::new();
    for pod in pod_list {
        let namespace = pod.namespace().unwrap_or_else(|| "default".to_string());
        let name = pod.name_any();
        match pod_logs(client, &pod, &namespace, &name).await {
            Ok(logs) => {
                let log_file = logs_dir.join(format!("{}_{}", namespace, name));
                fs::write(&log_file, logs).context(error::WriteFileSnafu {
                    path: log_file.display().to_string(),
                })?;
            }
            Err(e) => {
                warn!("Could not collect logs for pod {}/{}: {}", namespace, name, e);
                failures.push(format!("{}/{}: {}", namespace, name, e));
            }
        }
    }

    if !failures.is_empty() {
        let failures_file = out_dir.join(FAILURES_FILE);
        fs::write(&failures_file, failures.join("\n") + "\n").context(
            error::WriteFileSnafu {
                path: failures_file.display().to_string(),
            },
        )?;
    }

    Ok(out_dir)
}

/// Fetch the logs of every container in a pod, concatenated with a header per
/// container.
async fn pod_logs(
    client: &kube::Client,
    pod: &Pod,
    namespace: &str,
    name: &str,
) -> Result<String> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let containers: Vec<String> = pod
        .spec
        .iter()
        .flat_map(|spec| spec.containers.iter())
        .map(|container| container.name.clone())
        .collect();
    debug!(
        "Collecting logs of {} container(s) of pod {}/{}",
        containers.len(),
        namespace,
        name
    );

    let mut combined = String::new();
    for container in containers {
        let params = LogParams {
            container: Some(container.clone()),
            ..LogParams::default()
        };
        let logs = api
            .logs(name, &params)
            .await
            .context(error::KubeApiSnafu {
                what: format!(
                    "reading logs of container '{}' of pod {}/{}",
                    container, namespace, name
                ),
            })?;
        combined.push_str(&format!("==> container {} <==\n", container));
        combined.push_str(&logs);
        if !logs.ends_with('\n') {
            combined.push('\n');
        }
    }
    Ok(combined)
}
