use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rwp_common::env;
use std::path::Path;
use tonic::transport::{ClientTlsConfig, Identity};

const CERT_MOUNT_PATH: &str = "/etc/auth";
const CERT_FILE: &str = "crt";
const KEY_FILE: &str = "pk";

const CERT_CHAIN_VAR: &str = "CERT_CHAIN";
const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
const LOCALDEV_VAR: &str = "RWP_LOCALDEV";

/// Transport credentials for the AutoPi session.
///
/// In-cluster deployments mount the client certificate under /etc/auth;
/// standalone mode carries it in base64 PEM environment variables.
/// RWP_LOCALDEV skips TLS entirely.
#[derive(Clone)]
pub enum TransportConfig {
    Plaintext,
    Tls(ClientTlsConfig),
}

impl TransportConfig {
    pub fn load(standalone: bool) -> Result<Self> {
        if env::is_set(LOCALDEV_VAR) {
            return Ok(Self::Plaintext);
        }

        let (cert, key) = if standalone {
            identity_from_env()?
        } else {
            identity_from_files()?
        };

        Ok(Self::Tls(
            ClientTlsConfig::new()
                .identity(Identity::from_pem(cert, key))
                .with_enabled_roots(),
        ))
    }
}

fn identity_from_files() -> Result<(Vec<u8>, Vec<u8>)> {
    let cert_path = Path::new(CERT_MOUNT_PATH).join(CERT_FILE);
    let key_path = Path::new(CERT_MOUNT_PATH).join(KEY_FILE);
    let cert = std::fs::read(&cert_path)
        .with_context(|| format!("could not read client certificate at {}", cert_path.display()))?;
    let key = std::fs::read(&key_path)
        .with_context(|| format!("could not read private key at {}", key_path.display()))?;
    Ok((cert, key))
}

fn identity_from_env() -> Result<(Vec<u8>, Vec<u8>)> {
    let cert = BASE64
        .decode(env::required(CERT_CHAIN_VAR)?)
        .with_context(|| format!("{CERT_CHAIN_VAR} is not valid base64"))?;
    let key = BASE64
        .decode(env::required(PRIVATE_KEY_VAR)?)
        .with_context(|| format!("{PRIVATE_KEY_VAR} is not valid base64"))?;
    Ok((cert, key))
}
