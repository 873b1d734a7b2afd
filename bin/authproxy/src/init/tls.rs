//! Load TLS material for the proxy listener.
use std::sync::Arc;

use anyhow::Context as _;
use anyhow::Result;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::ServerConfig;

use authproxy_conf::HttpConf;

/// Unable to load TLS material from the given file.
#[derive(Debug, thiserror::Error)]
#[error("unable to load TLS {kind} from '{path}'")]
pub struct TlsMaterialError {
    pub kind: &'static str,
    pub path: String,
}

/// The certificate file does not contain any certificate.
#[derive(Debug, thiserror::Error)]
#[error("no certificates found in '{0}'")]
pub struct NoCertificates(String);

/// Build the rustls server configuration from the PEM certificate chain and private key.
pub fn server_config(conf: &HttpConf) -> Result<ServerConfig> {
    let certs = CertificateDer::pem_file_iter(&conf.tls_cert)
        .and_then(|certs| certs.collect::<Result<Vec<_>, _>>())
        .with_context(|| TlsMaterialError {
            kind: "certificates",
            path: conf.tls_cert.clone(),
        })?;
    if certs.is_empty() {
        anyhow::bail!(NoCertificates(conf.tls_cert.clone()));
    }
    let key = PrivateKeyDer::from_pem_file(&conf.tls_key).with_context(|| TlsMaterialError {
        kind: "private key",
        path: conf.tls_key.clone(),
    })?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(config)
}
