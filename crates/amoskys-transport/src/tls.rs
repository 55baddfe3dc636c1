//! Building `rustls` configs from PEM material on disk (§6.1, §6.2).

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CoreError> {
    let file = File::open(path).map_err(|e| {
        CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to open certificate file").with_cause(e)
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to parse certificate file").with_cause(e)
        })
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CoreError> {
    let file = File::open(path).map_err(|e| {
        CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to open private key file").with_cause(e)
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| {
            CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to parse private key file").with_cause(e)
        })?
        .ok_or_else(|| CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "private key file contained no key"))
}

fn load_root_store(path: &Path) -> Result<RootCertStore, CoreError> {
    let mut store = RootCertStore::empty();
    for cert in load_certs(path)? {
        store.add(cert).map_err(|e| {
            CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to add CA certificate to root store")
                .with_cause(e)
        })?;
    }
    Ok(store)
}

/// Builds the bus's server-side TLS config. When `ca_path` is set, client
/// certificates are required and verified against it (mTLS); otherwise
/// the bus accepts unauthenticated TLS clients and relies on higher-layer
/// checks (the trust map keyed by the envelope's `source_identity`).
pub fn load_server_config(
    cert_path: &Path,
    key_path: &Path,
    ca_path: Option<&Path>,
) -> Result<ServerConfig, CoreError> {
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;

    let builder = ServerConfig::builder();
    let config = match ca_path {
        Some(ca_path) => {
            let root_store = Arc::new(load_root_store(ca_path)?);
            let verifier = WebPkiClientVerifier::builder(root_store).build().map_err(|e| {
                CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to build client verifier")
                    .with_cause(e)
            })?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
        }
        None => builder.with_no_client_auth().with_single_cert(certs, key),
    }
    .map_err(|e| {
        CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to assemble server TLS config").with_cause(e)
    })?;

    Ok(config)
}

/// Builds the agent's client-side TLS config: trusts `ca_path`, and
/// presents its own certificate when `client_cert_path`/`client_key_path`
/// are set (mTLS from the agent's side).
pub fn load_client_config(
    ca_path: &Path,
    client_cert_path: Option<&Path>,
    client_key_path: Option<&Path>,
) -> Result<ClientConfig, CoreError> {
    let root_store = load_root_store(ca_path)?;
    let builder = ClientConfig::builder().with_root_certificates(root_store);

    let config = match (client_cert_path, client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder.with_client_auth_cert(certs, key).map_err(|e| {
                CoreError::new(codes::TRANSPORT_TLS_HANDSHAKE_FAILED, "failed to assemble client TLS config")
                    .with_cause(e)
            })?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(config)
}
