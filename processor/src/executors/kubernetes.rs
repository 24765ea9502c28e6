use super::http::params::{AUTHORIZATION_HEADER, PASSWORD, TRUSTED_CERTS, URL, USER};
use super::http::{HttpExecutor, auth};
use crate::executors::{ExecutionContext, ExecutorError, ExecutorResult};
use kube::config::Kubeconfig;
use secrecy::ExposeSecret;
use std::collections::HashMap;

const API_VERSION: &str = "apiVersion";
const NAMESPACE: &str = "namespace";
const RESOURCE_TYPE: &str = "resourceType";
const RESOURCE_NAME: &str = "resourceName";
const PATH: &str = "path";
const QUERY: &str = "query";
const SHOULD_USE_LOCAL_DATA: &str = "shouldUseLocalData";
const KUBECONFIG: &str = "kubeconfig";
const CERT_AUTHORITY_DATA: &str = "certificateAuthorityData";
const TOKEN: &str = "token";
const SERVER: &str = "server";

const RESPONSE_BODY: &str = "body";
const RESPONSE_STATUS: &str = "status";

const API_V1: &str = "v1";
const CORE_V1_RESOURCE_TYPES: [&str; 16] = [
    "componentstatuses",
    "configmaps",
    "endpoints",
    "events",
    "limitranges",
    "namespaces",
    "persistentvolumeclaims",
    "pods",
    "podtemplates",
    "replicationcontrollers",
    "resourcequotas",
    "secrets",
    "serviceaccounts",
    "services",
    "nodes",
    "persistentvolumes",
];

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Runs one request against a Kubernetes API server by deriving plain HTTP
/// task input (URL, credentials, trust material) from the task fields and an
/// optional kubeconfig, then delegating to the HTTP executor. Only `body`
/// and `status` survive into the task output.
pub async fn execute(ctx: &ExecutionContext) -> ExecutorResult {
    let derived = match prepare(ctx) {
        Ok(derived) => derived,
        Err(err) => return ExecutorResult::failed(&err),
    };

    let inner = HttpExecutor::new().execute(&derived).await;
    let mut output = HashMap::new();
    for key in [RESPONSE_BODY, RESPONSE_STATUS] {
        if let Some(value) = inner.output.get(key) {
            output.insert(key.to_string(), value.clone());
        }
    }
    ExecutorResult {
        output,
        status: inner.status,
        error: inner.error,
    }
}

/// Access material for one cluster, resolved from a kubeconfig or the
/// in-cluster service account.
#[derive(Debug, Default)]
struct ClusterAccess {
    server: String,
    user: String,
    password: String,
    token: String,
    ca_data: String,
}

fn prepare(ctx: &ExecutionContext) -> Result<ExecutionContext, ExecutorError> {
    let config = load_config(ctx)?;
    if config.is_none() && needs_config(ctx) {
        return Err(ExecutorError::NonRetryable(
            "kubeconfig needed but could not be resolved".to_string(),
        ));
    }
    let config = config.unwrap_or_default();

    let mut input = ctx.input().clone();

    let user = non_empty_or(ctx.get_string(USER), &config.user);
    let password = non_empty_or(ctx.get_string(PASSWORD), &config.password);
    input.insert(USER.to_string(), user);
    input.insert(PASSWORD.to_string(), password);

    let token = non_empty_or(ctx.get_string(TOKEN), &config.token);
    if !token.is_empty() {
        input.insert(AUTHORIZATION_HEADER.to_string(), auth::bearer(&token));
    }

    let server = non_empty_or(ctx.get_string(SERVER), &config.server);
    input.insert(URL.to_string(), build_url(ctx, &server));

    let trusted_certs = non_empty_or(ctx.get_string(CERT_AUTHORITY_DATA), &config.ca_data);
    input.insert(TRUSTED_CERTS.to_string(), trusted_certs);

    Ok(ExecutionContext::derived(input, ctx.store().clone()))
}

fn load_config(ctx: &ExecutionContext) -> Result<Option<ClusterAccess>, ExecutorError> {
    if ctx.get_boolean(SHOULD_USE_LOCAL_DATA)? {
        return local_cluster_access().map(Some);
    }

    let blob = ctx.get_string(KUBECONFIG);
    if blob.is_empty() {
        return Ok(None);
    }
    let kubeconfig = Kubeconfig::from_yaml(&blob).map_err(|err| {
        ExecutorError::NonRetryable(format!("failed to parse the provided kubeconfig: {err}"))
    })?;
    cluster_access(kubeconfig).map(Some)
}

/// A kubeconfig is required whenever the explicit fields cannot authenticate
/// on their own.
fn needs_config(ctx: &ExecutionContext) -> bool {
    let token = ctx.get_string(TOKEN);
    ctx.get_string(SERVER).is_empty()
        || (ctx.get_string(USER).is_empty() && token.is_empty())
        || (ctx.get_string(PASSWORD).is_empty() && token.is_empty())
}

fn local_cluster_access() -> Result<ClusterAccess, ExecutorError> {
    match Kubeconfig::read() {
        Ok(kubeconfig) => cluster_access(kubeconfig),
        Err(_) => in_cluster_access(),
    }
}

fn in_cluster_access() -> Result<ClusterAccess, ExecutorError> {
    let host = std::env::var("KUBERNETES_SERVICE_HOST");
    let port = std::env::var("KUBERNETES_SERVICE_PORT");
    let (Ok(host), Ok(port)) = (host, port) else {
        return Err(ExecutorError::NonRetryable(
            "no kubeconfig and no in-cluster environment available".to_string(),
        ));
    };
    let token = std::fs::read_to_string(SERVICE_ACCOUNT_TOKEN).map_err(|err| {
        ExecutorError::NonRetryable(format!("failed to read the service account token: {err}"))
    })?;
    let ca_data = std::fs::read_to_string(SERVICE_ACCOUNT_CA).unwrap_or_default();
    Ok(ClusterAccess {
        server: format!("https://{host}:{port}"),
        token: token.trim().to_string(),
        ca_data,
        ..Default::default()
    })
}

fn cluster_access(kubeconfig: Kubeconfig) -> Result<ClusterAccess, ExecutorError> {
    let context_name = kubeconfig
        .current_context
        .clone()
        .or_else(|| kubeconfig.contexts.first().map(|named| named.name.clone()))
        .ok_or_else(|| {
            ExecutorError::NonRetryable("kubeconfig does not name any context".to_string())
        })?;
    let context = kubeconfig
        .contexts
        .iter()
        .find(|named| named.name == context_name)
        .and_then(|named| named.context.clone())
        .ok_or_else(|| {
            ExecutorError::NonRetryable(format!(
                "kubeconfig context '{context_name}' is not defined"
            ))
        })?;

    let cluster = kubeconfig
        .clusters
        .iter()
        .find(|named| named.name == context.cluster)
        .and_then(|named| named.cluster.clone())
        .ok_or_else(|| {
            ExecutorError::NonRetryable(format!(
                "kubeconfig cluster '{}' is not defined",
                context.cluster
            ))
        })?;

    let user_name = context.user.clone().unwrap_or_default();
    let auth_info = kubeconfig
        .auth_infos
        .iter()
        .find(|named| named.name == user_name)
        .and_then(|named| named.auth_info.clone());

    let mut access = ClusterAccess {
        server: cluster.server.clone().unwrap_or_default(),
        ca_data: cluster.certificate_authority_data.clone().unwrap_or_default(),
        ..Default::default()
    };
    if let Some(auth_info) = auth_info {
        access.user = auth_info.username.clone().unwrap_or_default();
        access.password = auth_info
            .password
            .as_ref()
            .map(|secret| secret.expose_secret().to_string())
            .unwrap_or_default();
        access.token = auth_info
            .token
            .as_ref()
            .map(|secret| secret.expose_secret().to_string())
            .unwrap_or_default();
    }
    Ok(access)
}

fn build_url(ctx: &ExecutionContext, server: &str) -> String {
    let api_version = ctx.get_string(API_VERSION);
    let resource_type = ctx.get_string(RESOURCE_TYPE);

    let api_path = if api_version == API_V1
        && CORE_V1_RESOURCE_TYPES.contains(&resource_type.as_str())
    {
        "api"
    } else {
        "apis"
    };

    let mut url = format!("{server}/{api_path}/{api_version}");
    let namespace = ctx.get_string(NAMESPACE);
    if !namespace.is_empty() {
        url.push_str(&format!("/namespaces/{namespace}"));
    }
    if !resource_type.is_empty() {
        url.push_str(&format!("/{resource_type}"));
    }
    let resource_name = ctx.get_string(RESOURCE_NAME);
    if !resource_name.is_empty() {
        url.push_str(&format!("/{resource_name}"));
    }
    url.push_str(&ctx.get_string(PATH));
    url.push_str(&ctx.get_string(QUERY));
    url
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(entries: &[(&str, &str)]) -> ExecutionContext {
        let input = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ExecutionContext::new(input, HashMap::new())
    }

    #[test]
    fn core_v1_resources_use_the_legacy_api_root() {
        let ctx = context(&[
            ("apiVersion", "v1"),
            ("namespace", "default"),
            ("resourceType", "pods"),
            ("resourceName", "web-0"),
        ]);
        assert_eq!(
            build_url(&ctx, "https://cluster"),
            "https://cluster/api/v1/namespaces/default/pods/web-0"
        );
    }

    #[test]
    fn group_resources_use_the_apis_root() {
        let ctx = context(&[
            ("apiVersion", "apps/v1"),
            ("namespace", "default"),
            ("resourceType", "deployments"),
        ]);
        assert_eq!(
            build_url(&ctx, "https://cluster"),
            "https://cluster/apis/apps/v1/namespaces/default/deployments"
        );
    }

    #[test]
    fn v1_non_core_resource_types_stay_under_apis() {
        let ctx = context(&[("apiVersion", "v1"), ("resourceType", "widgets")]);
        assert_eq!(
            build_url(&ctx, "https://cluster"),
            "https://cluster/apis/v1/widgets"
        );
    }

    #[test]
    fn path_and_query_are_appended_verbatim() {
        let ctx = context(&[
            ("apiVersion", "v1"),
            ("resourceType", "pods"),
            ("path", "/status"),
            ("query", "?watch=true"),
        ]);
        assert_eq!(
            build_url(&ctx, "https://cluster"),
            "https://cluster/api/v1/pods/status?watch=true"
        );
    }

    #[test]
    fn config_requirement_follows_the_credential_rule() {
        assert!(needs_config(&context(&[])));
        assert!(needs_config(&context(&[("server", "https://c")])));
        assert!(needs_config(&context(&[
            ("server", "https://c"),
            ("user", "u"),
        ])));
        assert!(!needs_config(&context(&[
            ("server", "https://c"),
            ("user", "u"),
            ("password", "p"),
        ])));
        assert!(!needs_config(&context(&[
            ("server", "https://c"),
            ("token", "t"),
        ])));
    }

    #[test]
    fn explicit_fields_win_over_the_kubeconfig() {
        let kubeconfig = r#"
apiVersion: v1
kind: Config
current-context: main
contexts:
  - name: main
    context:
      cluster: c1
      user: u1
clusters:
  - name: c1
    cluster:
      server: https://from-config
      certificate-authority-data: Y2EtZGF0YQ==
users:
  - name: u1
    user:
      username: config-user
      password: config-pass
"#;
        let ctx = context(&[
            ("kubeconfig", kubeconfig),
            ("apiVersion", "v1"),
            ("resourceType", "pods"),
            ("user", "explicit-user"),
        ]);
        let derived = prepare(&ctx).unwrap();
        assert_eq!(derived.get_string(USER), "explicit-user");
        assert_eq!(derived.get_string(PASSWORD), "config-pass");
        assert_eq!(derived.get_string(TRUSTED_CERTS), "Y2EtZGF0YQ==");
        assert_eq!(
            derived.get_string(URL),
            "https://from-config/api/v1/pods"
        );
    }

    #[test]
    fn token_becomes_a_bearer_authorization_header() {
        let ctx = context(&[
            ("server", "https://cluster"),
            ("token", "tok"),
            ("apiVersion", "v1"),
            ("resourceType", "pods"),
        ]);
        let derived = prepare(&ctx).unwrap();
        assert_eq!(derived.get_string(AUTHORIZATION_HEADER), "Bearer tok");
    }

    #[test]
    fn missing_kubeconfig_is_a_non_retryable_failure() {
        let ctx = context(&[("apiVersion", "v1"), ("resourceType", "pods")]);
        let err = prepare(&ctx).unwrap_err();
        assert!(matches!(err, ExecutorError::NonRetryable(_)));
    }
}
