//! TLS configuration helpers for the enrollment client.
//!
//! This module builds the reqwest client used for both SOAP traffic and
//! issuer certificate downloads, and loads CA bundles from disk.

use std::path::Path;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::auth::Authenticator;
use crate::config::{CepClientConfig, ClientIdentity, TrustAnchors};
use crate::error::{CepError, Result};

/// Build a reqwest Client with the appropriate TLS configuration.
///
/// The authenticator gets a chance to attach transport-level credentials,
/// such as a client certificate, before the client is built.
pub fn build_http_client(config: &CepClientConfig, auth: &Authenticator) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .use_rustls_tls()
        .user_agent(crate::USER_AGENT);

    match &config.trust_anchors {
        TrustAnchors::WebPki => {
            builder = builder.tls_built_in_root_certs(true);
        }
        TrustAnchors::Explicit(ca_bundles) => {
            builder = builder.tls_built_in_root_certs(false);
            for bundle in ca_bundles {
                let certs = reqwest::Certificate::from_pem_bundle(bundle)
                    .map_err(|e| CepError::tls(format!("Failed to parse CA certificate: {}", e)))?;
                for cert in certs {
                    builder = builder.add_root_certificate(cert);
                }
            }
        }
        TrustAnchors::InsecureAcceptAny => {
            tracing::warn!("Server certificate verification is disabled");
            builder = builder
                .tls_built_in_root_certs(false)
                .danger_accept_invalid_certs(true);
        }
    }

    builder = auth.configure_client(builder)?;

    builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in &config.additional_headers {
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::try_from(name.as_str()),
            reqwest::header::HeaderValue::try_from(value.as_str()),
        ) {
            headers.insert(name, value);
        }
    }
    builder = builder.default_headers(headers);

    builder
        .build()
        .map_err(|e| CepError::tls(format!("Failed to build HTTP client: {}", e)))
}

/// Build a reqwest Identity from PEM-encoded certificate and key.
pub(crate) fn build_reqwest_identity(identity: &ClientIdentity) -> Result<reqwest::Identity> {
    let mut pem_data = identity.cert_pem.clone();
    pem_data.extend_from_slice(b"\n");
    pem_data.extend_from_slice(&identity.key_pem);

    reqwest::Identity::from_pem(&pem_data)
        .map_err(|e| CepError::tls(format!("Failed to create client identity: {}", e)))
}

/// Resolve the `cas` setting into trust anchors.
///
/// `None` selects the built-in roots and the empty string disables
/// verification. A directory contributes every regular file that holds at
/// least one PEM certificate; a file must hold at least one.
pub fn load_trust_anchors(cas: Option<&str>) -> Result<TrustAnchors> {
    let path = match cas {
        None => return Ok(TrustAnchors::WebPki),
        Some("") => return Ok(TrustAnchors::InsecureAcceptAny),
        Some(p) => Path::new(p),
    };

    if path.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        entries.sort();

        let mut bundles = Vec::new();
        for entry in entries {
            let data = std::fs::read(&entry)?;
            if parse_pem_certificates(&data).is_ok() {
                bundles.push(data);
            } else {
                tracing::debug!("Skipping {}: no PEM certificates", entry.display());
            }
        }
        if bundles.is_empty() {
            return Err(CepError::tls(format!(
                "No CA certificates found in {}",
                path.display()
            )));
        }
        Ok(TrustAnchors::Explicit(bundles))
    } else {
        let data = std::fs::read(path).map_err(|e| {
            CepError::tls(format!("Failed to read CA bundle {}: {}", path.display(), e))
        })?;
        parse_pem_certificates(&data)?;
        Ok(TrustAnchors::Explicit(vec![data]))
    }
}

/// Parse PEM-encoded certificates.
pub fn parse_pem_certificates(pem_data: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = std::io::BufReader::new(pem_data);
    let certs: Vec<_> = rustls_pemfile::certs(&mut reader)
        .filter_map(|result| result.ok())
        .collect();

    if certs.is_empty() {
        return Err(CepError::invalid_pem("No certificates found in PEM data"));
    }

    Ok(certs)
}

/// Parse a PEM-encoded private key.
pub fn parse_pem_private_key(pem_data: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = std::io::BufReader::new(pem_data);

    loop {
        match rustls_pemfile::read_one(&mut reader) {
            Ok(Some(rustls_pemfile::Item::Pkcs8Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs8(key));
            }
            Ok(Some(rustls_pemfile::Item::Pkcs1Key(key))) => {
                return Ok(PrivateKeyDer::Pkcs1(key));
            }
            Ok(Some(rustls_pemfile::Item::Sec1Key(key))) => {
                return Ok(PrivateKeyDer::Sec1(key));
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                return Err(CepError::invalid_pem(format!("Failed to parse PEM: {}", e)));
            }
        }
    }

    Err(CepError::invalid_pem("No private key found in PEM data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_PEM: &[u8] = include_bytes!("../tests/fixtures/pki/root.pem");
    const LEAF_KEY: &[u8] = include_bytes!("../tests/fixtures/pki/leaf.key");

    #[test]
    fn test_parse_pem_certificates() {
        let certs = parse_pem_certificates(ROOT_PEM).unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn test_parse_pem_private_key() {
        assert!(parse_pem_private_key(LEAF_KEY).is_ok());
        assert!(parse_pem_private_key(ROOT_PEM).is_err());
    }

    #[test]
    fn test_invalid_pem() {
        let result = parse_pem_certificates(b"not valid pem");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_trust_anchors_modes() {
        assert!(matches!(load_trust_anchors(None).unwrap(), TrustAnchors::WebPki));
        assert!(matches!(
            load_trust_anchors(Some("")).unwrap(),
            TrustAnchors::InsecureAcceptAny
        ));
    }

    #[test]
    fn test_load_trust_anchors_from_file_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let ca = dir.path().join("root.pem");
        std::fs::write(&ca, ROOT_PEM).unwrap();
        std::fs::write(dir.path().join("README"), b"not a certificate").unwrap();

        match load_trust_anchors(ca.to_str()).unwrap() {
            TrustAnchors::Explicit(bundles) => assert_eq!(bundles.len(), 1),
            other => panic!("Expected explicit anchors, got {:?}", other),
        }
        match load_trust_anchors(dir.path().to_str()).unwrap() {
            TrustAnchors::Explicit(bundles) => assert_eq!(bundles.len(), 1),
            other => panic!("Expected explicit anchors, got {:?}", other),
        }

        let missing = dir.path().join("missing.pem");
        assert!(matches!(
            load_trust_anchors(missing.to_str()),
            Err(CepError::Tls(_))
        ));
    }
}
