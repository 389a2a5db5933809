//! TLS acceptor from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsPaths;
use crate::error::{ServerError, ServerResult};

/// Builds a TLS acceptor from a PEM certificate chain and private key.
///
/// The acceptor only offers HTTP/1.1 over ALPN.
pub fn load_tls_acceptor(paths: &TlsPaths) -> ServerResult<TlsAcceptor> {
    let certs = load_certs(&paths.cert_file)?;
    let key = load_key(&paths.key_file)?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| ServerError::tls(format!("unsupported protocol versions: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::tls(format!("invalid certificate or key: {e}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> ServerResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::tls(format!("failed to open {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> ServerResult<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(format!("failed to parse {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(ServerError::tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> ServerResult<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::tls(format!("failed to parse {}: {e}", path.display())))?
        .ok_or_else(|| ServerError::tls(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn paths(cert: &Path, key: &Path) -> TlsPaths {
        TlsPaths {
            cert_file: cert.to_path_buf(),
            key_file: key.to_path_buf(),
        }
    }

    #[test]
    fn test_missing_files() {
        let err = load_tls_acceptor(&paths(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        ))
        .err().unwrap();
        assert!(matches!(err, ServerError::Tls(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        File::create(&cert).unwrap();
        File::create(&key).unwrap();

        let err = load_tls_acceptor(&paths(&cert, &key)).err().unwrap();
        assert!(err.to_string().contains("no certificates found"));
    }

    #[test]
    fn test_certificate_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        let mut file = File::create(&cert).unwrap();
        writeln!(file, "-----BEGIN CERTIFICATE-----").unwrap();
        writeln!(file, "MIIBszCCAVmgAwIBAgIUJ1X0").unwrap();
        writeln!(file, "-----END CERTIFICATE-----").unwrap();
        File::create(&key).unwrap();

        let err = load_tls_acceptor(&paths(&cert, &key)).err().unwrap();
        assert!(matches!(err, ServerError::Tls(_)));
    }
}
