//! Support for setting up RusTLS in a consistent fashion.

use std::sync::Arc;

use rustls::{crypto::aws_lc_rs, ClientConfig, RootCertStore};
use rustls_native_certs::load_native_certs;

use crate::common::*;

/// Standard RusTLS `ClientConfig` setup, trusting the platform's root
/// certificates.
///
/// We share this between our HTTP client and our PostgreSQL connections.
pub(crate) fn rustls_client_config() -> Result<ClientConfig> {
    let cert_result = load_native_certs();
    for err in &cert_result.errors {
        warn!("error loading native certs: {}", err);
    }

    let mut root_store = RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(cert_result.certs);
    debug!("loaded {} native root certs ({} ignored)", added, ignored);

    // Pick our crypto provider explicitly, so we don't depend on which other
    // providers some dependency might have enabled.
    let provider = Arc::new(aws_lc_rs::default_provider());
    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .context("could not configure TLS protocol versions")?
        .with_root_certificates(root_store)
        .with_no_client_auth())
}

#[test]
fn rustls_client_config_builds() {
    rustls_client_config().unwrap();
}
