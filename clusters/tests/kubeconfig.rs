use smoke_clusters::{
    kubeconfig_for, rest_config_from_kubeconfig, write_kubeconfig, RestConfig,
};

fn sample_config() -> RestConfig {
    RestConfig {
        host: "https://0123456789abcdef.gr7.us-west-2.eks.amazonaws.com".to_string(),
        ca_data: b"-----BEGIN CERTIFICATE-----\ntest\n-----END CERTIFICATE-----\n".to_vec(),
        bearer_token: Some("k8s-aws-v1.aHR0cHM6Ly9zdHM".to_string()),
        ..RestConfig::default()
    }
}

#[test]
fn rendered_documents_reparse_to_the_same_connection_settings() {
    let config = sample_config();

    let mut rendered = Vec::new();
    write_kubeconfig("smoke-abc1234567", &config, "-", &mut rendered).unwrap();
    let reparsed: kube::config::Kubeconfig =
        serde_yaml::from_str(&String::from_utf8(rendered).unwrap()).unwrap();

    assert_eq!(reparsed.current_context.as_deref(), Some("smoke-abc1234567"));
    assert_eq!(reparsed.clusters[0].name, "smoke-abc1234567");

    let restored = rest_config_from_kubeconfig(&reparsed).unwrap();
    assert_eq!(restored.host, config.host);
    assert_eq!(restored.ca_data, config.ca_data);
    assert_eq!(restored.bearer_token, config.bearer_token);
}

#[test]
fn file_output_writes_the_document_to_the_given_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kubeconfig.yaml");

    write_kubeconfig(
        "smoke-abc1234567",
        &sample_config(),
        path.to_str().unwrap(),
        std::io::sink(),
    )
    .unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let reparsed: kube::config::Kubeconfig = serde_yaml::from_str(&raw).unwrap();
    let restored = rest_config_from_kubeconfig(&reparsed).unwrap();
    assert_eq!(restored.host, sample_config().host);
}

#[test]
fn generated_documents_reference_one_context_and_user() {
    let kubeconfig = kubeconfig_for("smoke-abc1234567", &sample_config());
    assert_eq!(kubeconfig.clusters.len(), 1);
    assert_eq!(kubeconfig.contexts.len(), 1);
    assert_eq!(kubeconfig.auth_infos.len(), 1);
    let context = kubeconfig.contexts[0].context.as_ref().unwrap();
    assert_eq!(context.cluster, "smoke-abc1234567");
    assert_eq!(context.user, kubeconfig.auth_infos[0].name);
}
