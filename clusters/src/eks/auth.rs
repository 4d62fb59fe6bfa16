use crate::error::{self, Result};
use crate::kubeconfig::{self, RestConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    sign, SignableRequest, SignatureLocation, SigningParams, SigningSettings,
};
use aws_types::SdkConfig;
use log::debug;
use snafu::{OptionExt, ResultExt};
use std::time::{Duration, SystemTime};

/// The literal prefix of every bearer token handed to the cluster.
pub(crate) const TOKEN_PREFIX: &str = "k8s-aws-v1.";
/// The signed header that carries the cluster the token is scoped to.
pub(crate) const CLUSTER_ID_HEADER: &str = "x-k8s-aws-id";
/// Tokens expire after this long; regeneration is cheap.
const TOKEN_EXPIRY: Duration = Duration::from_secs(3600);
const STS_SERVICE: &str = "sts";
const CALLER_IDENTITY_QUERY: &str = "Action=GetCallerIdentity&Version=2011-06-15";

/// Produce an authenticated `(RestConfig, Client)` pair for a named cluster.
pub(crate) async fn client_for_cluster(
    config: &SdkConfig,
    cluster_name: &str,
) -> Result<(RestConfig, kube::Client)> {
    let eks_client = aws_sdk_eks::Client::new(config);
    let cluster = eks_client
        .describe_cluster()
        .name(cluster_name)
        .send()
        .await
        .context(error::DescribeClusterSnafu { cluster_name })?
        .cluster
        .context(error::MissingSnafu {
            what: "the cluster field",
            from: "the describe-cluster response",
        })?;

    let endpoint = cluster.endpoint().context(error::MissingSnafu {
        what: "the endpoint",
        from: "the cluster description",
    })?;
    let certificate = cluster
        .certificate_authority()
        .and_then(|authority| authority.data())
        .context(error::MissingSnafu {
            what: "the certificate authority data",
            from: "the cluster description",
        })?;
    let ca_data =
        base64::decode(certificate).context(error::DecodeCertificateSnafu { cluster_name })?;

    let bearer_token = generate_bearer_token(config, cluster_name).await?;
    let rest_config = RestConfig {
        host: endpoint.to_string(),
        ca_data,
        bearer_token: Some(bearer_token),
        insecure_skip_tls_verify: false,
        ..RestConfig::default()
    };

    let client = kubeconfig::client_for_rest_config(cluster_name, &rest_config).await?;
    Ok((rest_config, client))
}

/// Build a short-lived bearer token for the cluster API.
///
/// The token is an identity-verification URL pre-signed for the security-token
/// service with the cluster identifier in the signed headers, wrapped in the
/// `k8s-aws-v1.` envelope. Signing is done locally from the resolved
/// credentials; no request is sent.
async fn generate_bearer_token(config: &SdkConfig, cluster_name: &str) -> Result<String> {
    let region = config
        .region()
        .context(error::MissingRegionSnafu)?
        .to_string();
    let credentials = config
        .credentials_provider()
        .context(error::MissingSnafu {
            what: "a credentials provider",
            from: "the AWS configuration",
        })?
        .provide_credentials()
        .await
        .context(error::ProvideCredentialsSnafu)?;
    debug!("Generating a bearer token for cluster '{}'", cluster_name);
    presign_caller_identity(&credentials, &region, cluster_name, SystemTime::now())
}

fn presign_caller_identity(
    credentials: &Credentials,
    region: &str,
    cluster_name: &str,
    time: SystemTime,
) -> Result<String> {
    let mut settings = SigningSettings::default();
    settings.signature_location = SignatureLocation::QueryParams;
    settings.expires_in = Some(TOKEN_EXPIRY);

    let mut params_builder = SigningParams::builder()
        .access_key(credentials.access_key_id())
        .secret_key(credentials.secret_access_key())
        .region(region)
        .service_name(STS_SERVICE)
        .time(time)
        .settings(settings);
    if let Some(session_token) = credentials.session_token() {
        params_builder = params_builder.security_token(session_token);
    }
    let params = params_builder.build().context(error::SigningParamsSnafu)?;

    let mut request = http::Request::builder()
        .method("GET")
        .uri(format!(
            "https://sts.{}.amazonaws.com/?{}",
            region, CALLER_IDENTITY_QUERY
        ))
        .header(CLUSTER_ID_HEADER, cluster_name)
        .body(String::new())
        .context(error::HttpRequestSnafu)?;

    let (instructions, _signature) = sign(SignableRequest::from(&request), &params)
        .context(error::SignTokenSnafu { cluster_name })?
        .into_parts();
    instructions.apply_to_request(&mut request);

    Ok(format!(
        "{}{}",
        TOKEN_PREFIX,
        base64::encode_config(request.uri().to_string(), base64::URL_SAFE_NO_PAD)
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    fn signed_url() -> String {
        let credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            None,
            None,
            "static",
        );
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let token =
            presign_caller_identity(&credentials, "us-west-2", "smoke-abc1234567", time).unwrap();

        assert!(token.starts_with(TOKEN_PREFIX));
        let suffix = &token[TOKEN_PREFIX.len()..];
        assert!(!suffix.starts_with('.'));
        let decoded = base64::decode_config(suffix, base64::URL_SAFE_NO_PAD).unwrap();
        String::from_utf8(decoded).unwrap()
    }

    #[test]
    fn token_decodes_to_a_presigned_caller_identity_url() {
        let url = signed_url();
        assert!(url.starts_with("https://sts.us-west-2.amazonaws.com/?"));
        assert!(url.contains("Action=GetCallerIdentity"));
        assert!(url.contains("Version=2011-06-15"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Credential=AKIDEXAMPLE"));
    }

    #[test]
    fn token_expires_at_3600_seconds() {
        assert!(signed_url().contains("X-Amz-Expires=3600"));
    }

    #[test]
    fn cluster_id_header_is_signed() {
        let url = signed_url();
        let signed_headers = url
            .split('&')
            .find(|param| param.starts_with("X-Amz-SignedHeaders="))
            .unwrap();
        assert!(signed_headers.contains("x-k8s-aws-id"));
    }

    #[test]
    fn session_tokens_are_carried_as_security_tokens() {
        let credentials = Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            Some("the-session-token".to_string()),
            None,
            "static",
        );
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let token =
            presign_caller_identity(&credentials, "us-west-2", "smoke-abc1234567", time).unwrap();
        let decoded = base64::decode_config(
            &token[TOKEN_PREFIX.len()..],
            base64::URL_SAFE_NO_PAD,
        )
        .unwrap();
        let url = String::from_utf8(decoded).unwrap();
        assert!(url.contains("X-Amz-Security-Token="));
    }
}
