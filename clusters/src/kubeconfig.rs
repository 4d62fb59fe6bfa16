use crate::error::{self, Result};
use kube::config::{
    AuthInfo, Cluster as KubeconfigCluster, Context, KubeConfigOptions, Kubeconfig,
    NamedAuthInfo, NamedCluster, NamedContext,
};
use secrecy::{ExposeSecret, SecretString};
use snafu::{OptionExt, ResultExt};
use std::fs;
use std::io::Write;

/// The name used for the single auth-info entry in generated kubeconfigs.
const DEFAULT_AUTH_INFO: &str = "default";

/// The connection settings for a cluster's API server, which every handle
/// carries and every kubeconfig is rendered from.
///
/// Bearer tokens are short-lived and opaque; regeneration is cheap and happens
/// whenever a fresh handle is built.
#[derive(Clone, Debug, Default)]
pub struct RestConfig {
    pub host: String,
    pub ca_data: Vec<u8>,
    pub bearer_token: Option<String>,
    pub client_certificate_data: Option<Vec<u8>>,
    pub client_key_data: Option<Vec<u8>>,
    pub insecure_skip_tls_verify: bool,
}

/// Render a kubeconfig document with one cluster, one context and one
/// auth-info entry for `env_name`.
pub fn kubeconfig_for(env_name: &str, config: &RestConfig) -> Kubeconfig {
    let auth_info = AuthInfo {
        token: config
            .bearer_token
            .as_ref()
            .map(|token| SecretString::new(token.clone())),
        client_certificate_data: config
            .client_certificate_data
            .as_ref()
            .map(|data| base64::encode(data)),
        client_key_data: config
            .client_key_data
            .as_ref()
            .map(|data| SecretString::new(base64::encode(data))),
        ..AuthInfo::default()
    };

    Kubeconfig {
        api_version: Some("v1".to_string()),
        kind: Some("Config".to_string()),
        clusters: vec![NamedCluster {
            name: env_name.to_string(),
            cluster: Some(KubeconfigCluster {
                server: Some(config.host.clone()),
                certificate_authority_data: if config.ca_data.is_empty() {
                    None
                } else {
                    Some(base64::encode(&config.ca_data))
                },
                insecure_skip_tls_verify: config.insecure_skip_tls_verify.then_some(true),
                ..KubeconfigCluster::default()
            }),
        }],
        contexts: vec![NamedContext {
            name: env_name.to_string(),
            context: Some(Context {
                cluster: env_name.to_string(),
                user: DEFAULT_AUTH_INFO.to_string(),
                ..Context::default()
            }),
        }],
        auth_infos: vec![NamedAuthInfo {
            name: DEFAULT_AUTH_INFO.to_string(),
            auth_info: Some(auth_info),
        }],
        current_context: Some(env_name.to_string()),
        ..Kubeconfig::default()
    }
}

/// Reconstruct a [`RestConfig`] from the first cluster and auth-info entries
/// of a kubeconfig document.
pub fn rest_config_from_kubeconfig(kubeconfig: &Kubeconfig) -> Result<RestConfig> {
    let cluster = kubeconfig
        .clusters
        .first()
        .and_then(|named| named.cluster.as_ref())
        .context(error::MissingSnafu {
            what: "a cluster entry",
            from: "the kubeconfig document",
        })?;
    let host = cluster.server.clone().context(error::MissingSnafu {
        what: "the server address",
        from: "the kubeconfig cluster entry",
    })?;
    let ca_data = match &cluster.certificate_authority_data {
        Some(data) => base64::decode(data).context(error::Base64DecodeSnafu)?,
        None => Vec::new(),
    };

    let auth_info = kubeconfig
        .auth_infos
        .first()
        .and_then(|named| named.auth_info.as_ref())
        .context(error::MissingSnafu {
            what: "an auth-info entry",
            from: "the kubeconfig document",
        })?;
    let client_certificate_data = match &auth_info.client_certificate_data {
        Some(data) => Some(base64::decode(data).context(error::Base64DecodeSnafu)?),
        None => None,
    };
    let client_key_data = match &auth_info.client_key_data {
        Some(data) => {
            Some(base64::decode(data.expose_secret()).context(error::Base64DecodeSnafu)?)
        }
        None => None,
    };

    Ok(RestConfig {
        host,
        ca_data,
        bearer_token: auth_info
            .token
            .as_ref()
            .map(|token| token.expose_secret().clone()),
        client_certificate_data,
        client_key_data,
        insecure_skip_tls_verify: cluster.insecure_skip_tls_verify.unwrap_or_default(),
    })
}

/// Write the kubeconfig for `env_name` to `output`, with `-` meaning the
/// caller-provided stream (normally stdout).
pub fn write_kubeconfig<W: Write>(
    env_name: &str,
    config: &RestConfig,
    output: &str,
    mut stream: W,
) -> Result<()> {
    let kubeconfig = kubeconfig_for(env_name, config);
    let content =
        serde_yaml::to_string(&kubeconfig).context(error::SerializeKubeconfigSnafu)?;
    if output == "-" {
        stream
            .write_all(content.as_bytes())
            .context(error::WriteFileSnafu { path: "-" })
    } else {
        fs::write(output, content).context(error::WriteFileSnafu { path: output })
    }
}

/// Build a Kubernetes client for a [`RestConfig`] by round-tripping it
/// through an in-memory kubeconfig document.
pub async fn client_for_rest_config(env_name: &str, config: &RestConfig) -> Result<kube::Client> {
    let kubeconfig = kubeconfig_for(env_name, config);
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context(error::KubeconfigLoadSnafu)?;
    kube::Client::try_from(config).context(error::KubeClientSnafu)
}

#[cfg(test)]
mod test {
    use super::*;

    fn token_config() -> RestConfig {
        RestConfig {
            host: "https://abcdef.gr7.us-west-2.eks.amazonaws.com".to_string(),
            ca_data: b"-----BEGIN CERTIFICATE-----\nfake\n-----END CERTIFICATE-----\n".to_vec(),
            bearer_token: Some("k8s-aws-v1.dG9rZW4".to_string()),
            ..RestConfig::default()
        }
    }

    #[test]
    fn kubeconfig_round_trips() {
        let config = token_config();
        let rendered = serde_yaml::to_string(&kubeconfig_for("smoke-abc", &config)).unwrap();
        let reparsed: Kubeconfig = serde_yaml::from_str(&rendered).unwrap();

        assert_eq!(reparsed.current_context.as_deref(), Some("smoke-abc"));
        let restored = rest_config_from_kubeconfig(&reparsed).unwrap();
        assert_eq!(restored.host, config.host);
        assert_eq!(restored.ca_data, config.ca_data);
        assert_eq!(restored.bearer_token, config.bearer_token);
        assert!(!restored.insecure_skip_tls_verify);
    }

    #[test]
    fn client_certificates_round_trip() {
        let config = RestConfig {
            host: "https://127.0.0.1:6443".to_string(),
            client_certificate_data: Some(b"cert".to_vec()),
            client_key_data: Some(b"key".to_vec()),
            ..RestConfig::default()
        };
        let kubeconfig = kubeconfig_for("local", &config);
        let restored = rest_config_from_kubeconfig(&kubeconfig).unwrap();
        assert_eq!(restored.client_certificate_data, Some(b"cert".to_vec()));
        assert_eq!(restored.client_key_data, Some(b"key".to_vec()));
        assert_eq!(restored.bearer_token, None);
    }

    #[test]
    fn dash_writes_to_the_provided_stream() {
        let mut out = Vec::new();
        write_kubeconfig("smoke-abc", &token_config(), "-", &mut out).unwrap();
        let document = String::from_utf8(out).unwrap();
        assert!(document.contains("current-context: smoke-abc"));
        assert!(document.contains("server: https://abcdef.gr7.us-west-2.eks.amazonaws.com"));
    }

    #[test]
    fn other_outputs_are_file_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubeconfig.yaml");
        let mut unused = Vec::new();
        write_kubeconfig(
            "smoke-abc",
            &token_config(),
            path.to_str().unwrap(),
            &mut unused,
        )
        .unwrap();
        assert!(unused.is_empty());
        let reparsed: Kubeconfig =
            serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(reparsed.clusters.len(), 1);
    }
}
