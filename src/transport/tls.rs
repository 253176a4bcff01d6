//! TLS acceptor construction for the DoH and DoT listeners. Certificate and
//! key loading is the only TLS responsibility the core carries (§6) — no
//! generation, rotation, or trust-chain validation beyond what `rustls`
//! already does.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::error::{Error, Result};

pub fn build_acceptor(certfile: &str, keyfile: &str) -> Result<TlsAcceptor> {
    let certs = load_certs(certfile)?;
    let key = load_key(keyfile)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| Error::Tls(err.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|err| Error::Tls(format!("reading {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| Error::Tls(format!("parsing certificate {path}: {err}")))
}

fn load_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|err| Error::Tls(format!("reading {path}: {err}")))?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|err| Error::Tls(format!("parsing private key {path}: {err}")))?
        .ok_or_else(|| Error::Tls(format!("no private key found in {path}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn self_signed_pair() -> (String, String) {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        (cert.cert.pem(), cert.signing_key.serialize_pem())
    }

    #[test]
    fn builds_an_acceptor_from_a_valid_cert_and_key() {
        let (cert_pem, key_pem) = self_signed_pair();
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        File::create(&cert_path).unwrap().write_all(cert_pem.as_bytes()).unwrap();
        File::create(&key_path).unwrap().write_all(key_pem.as_bytes()).unwrap();

        let result = build_acceptor(cert_path.to_str().unwrap(), key_path.to_str().unwrap());
        assert!(result.is_ok());
    }

    #[test]
    fn missing_cert_file_is_a_tls_error() {
        let result = build_acceptor("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(result, Err(Error::Tls(_))));
    }
}
