use crate::args::Options;
use rwp_common::env;

pub const SESSION_ID_HEADER: &str = "x-autopilot-sessionid";
pub const BINARY_VERSION_HEADER: &str = "x-autopilot-binaryversion";

const OPERATOR_ID_VAR: &str = "RWP_OPERATOR_ID";
const ENVIRONMENT_VAR: &str = "RWP_ENVIRONMENT";
const INSTANCE_ID_VAR: &str = "RWP_INSTANCE_ID";
const AUTOPI_HOST_VAR: &str = "AUTOPI_HOSTNAME";
const AUTOPI_PORT_VAR: &str = "AUTOPI_PORT";
const LOCALDEV_VAR: &str = "RWP_LOCALDEV";

/// Identity of this processor towards the control plane, attached to every
/// session as request metadata.
#[derive(Clone, Debug)]
pub struct Metadata {
    operator_id: String,
    environment: String,
    instance_id: String,
    version: &'static str,
    autopi_host: String,
    autopi_port: String,
    localdev: bool,
}

impl Metadata {
    pub fn load(opts: &Options) -> Result<Self, env::MissingEnv> {
        let instance_id = env::optional(INSTANCE_ID_VAR).unwrap_or_else(|| opts.instance_id.clone());
        Ok(Self {
            operator_id: env::required(OPERATOR_ID_VAR)?,
            environment: env::required(ENVIRONMENT_VAR)?,
            instance_id,
            version: env!("CARGO_PKG_VERSION"),
            autopi_host: env::required(AUTOPI_HOST_VAR)?,
            autopi_port: env::required(AUTOPI_PORT_VAR)?,
            localdev: env::is_set(LOCALDEV_VAR),
        })
    }

    pub fn session_id(&self) -> String {
        format!(
            "{}:{}:{}",
            self.operator_id, self.environment, self.instance_id
        )
    }

    pub fn binary_version(&self) -> &str {
        self.version
    }

    /// Local development runs against a plaintext endpoint.
    pub fn localdev(&self) -> bool {
        self.localdev
    }

    pub fn endpoint(&self) -> String {
        let scheme = if self.localdev { "http" } else { "https" };
        format!("{}://{}:{}", scheme, self.autopi_host, self.autopi_port)
    }
}

#[cfg(test)]
impl Metadata {
    /// Identity pointing at a local plaintext fixture endpoint.
    pub(crate) fn for_tests(host: &str, port: u16) -> Self {
        Self {
            operator_id: "operator".to_string(),
            environment: "test".to_string(),
            instance_id: "instance".to_string(),
            version: "0.0.0-test",
            autopi_host: host.to_string(),
            autopi_port: port.to_string(),
            localdev: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            operator_id: "operator".to_string(),
            environment: "dev".to_string(),
            instance_id: "instance".to_string(),
            version: "1.2.3",
            autopi_host: "autopi.example.com".to_string(),
            autopi_port: "443".to_string(),
            localdev: false,
        }
    }

    #[test]
    fn session_id_renders_the_identity_triple() {
        assert_eq!(sample().session_id(), "operator:dev:instance");
    }

    #[test]
    fn endpoint_scheme_follows_localdev() {
        let mut metadata = sample();
        assert_eq!(metadata.endpoint(), "https://autopi.example.com:443");
        metadata.localdev = true;
        assert_eq!(metadata.endpoint(), "http://autopi.example.com:443");
    }
}
