//! Certificate and key validation for Listener and client validation
//! Secrets.

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use x509_parser::prelude::*;

use crate::ir;

pub(crate) const SECRET_TYPE_TLS: &str = "kubernetes.io/tls";
pub(crate) const TLS_CERT_KEY: &str = "tls.crt";
pub(crate) const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
pub(crate) const CA_CERT_KEY: &str = "ca.crt";

const PEM_CERTIFICATE: &str = "CERTIFICATE";
const PEM_PKCS8_KEY: &str = "PRIVATE KEY";
const PEM_PKCS1_KEY: &str = "RSA PRIVATE KEY";
const PEM_EC_KEY: &str = "EC PRIVATE KEY";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TlsError {
    #[error("unable to decode pem data in {0}")]
    InvalidPem(&'static str),

    #[error("no certificate found in {0}")]
    MissingCertificate(&'static str),

    #[error("unable to parse certificate in {key}: {message}")]
    InvalidCertificate { key: &'static str, message: String },

    #[error("certificate {name} has expired since {not_after}")]
    Expired { name: String, not_after: String },

    #[error("certificate {name} will be valid after {not_before}")]
    NotYetValid { name: String, not_before: String },

    #[error("no private key found in {0}")]
    MissingKey(&'static str),

    #[error("{format} key format found in {key}, supported formats are PKCS1, PKCS8 or EC")]
    UnsupportedKeyFormat { format: String, key: &'static str },

    #[error("unable to parse private key in {0}")]
    InvalidKey(&'static str),
}

/// A validated serving certificate and what it can be used for.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ServingCertificate {
    pub(crate) certificate: ir::TlsCertificate,
    pub(crate) key_algorithm: &'static str,
    pub(crate) domains: Vec<String>,
}

/// Read a `kubernetes.io/tls` Secret into a serving certificate.
///
/// Errors are formatted for use directly as a condition message.
pub(crate) fn serving_certificate(secret: &Secret) -> Result<ServingCertificate, String> {
    let secret_name = format!(
        "{}/{}",
        secret.namespace().unwrap_or_default(),
        secret.name_any()
    );

    if secret.type_.as_deref() != Some(SECRET_TYPE_TLS) {
        return Err(format!(
            "Secret {secret_name} must be of type {SECRET_TYPE_TLS}."
        ));
    }

    let (Some(cert), Some(key)) = (
        secret_value(secret, TLS_CERT_KEY),
        secret_value(secret, TLS_PRIVATE_KEY_KEY),
    ) else {
        return Err(format!(
            "Secret {secret_name} must contain {TLS_CERT_KEY} and {TLS_PRIVATE_KEY_KEY}."
        ));
    };

    let invalid = |e: TlsError| {
        format!("Secret {secret_name} must contain valid {TLS_CERT_KEY} and {TLS_PRIVATE_KEY_KEY}, {e}.")
    };

    let (key_algorithm, domains) = validate_certificate(cert, TLS_CERT_KEY).map_err(invalid)?;
    validate_private_key(key, TLS_PRIVATE_KEY_KEY).map_err(invalid)?;

    Ok(ServingCertificate {
        certificate: ir::TlsCertificate {
            name: secret_name.replace('/', "-"),
            certificate: String::from_utf8_lossy(cert).into_owned(),
            private_key: String::from_utf8_lossy(key).into_owned(),
        },
        key_algorithm,
        domains,
    })
}

pub(crate) fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    let value = secret.data.as_ref()?.get(key)?;
    (!value.0.is_empty()).then_some(value.0.as_slice())
}

/// Check that `data` is a PEM bundle of one or more valid certificates.
pub fn validate_ca_bundle(data: &[u8], key: &'static str) -> Result<(), TlsError> {
    let certs = certificate_blocks(data, key)?;
    for der in certs {
        parse_certificate(&der, key)?;
    }
    Ok(())
}

/// Validate the first certificate in a PEM bundle, returning its public key
/// algorithm and the domains it is valid for.
fn validate_certificate(
    data: &[u8],
    key: &'static str,
) -> Result<(&'static str, Vec<String>), TlsError> {
    let certs = certificate_blocks(data, key)?;
    let cert = parse_certificate(&certs[0], key)?;

    let algorithm = match cert.public_key().parsed() {
        Ok(x509_parser::public_key::PublicKey::RSA(_)) => "RSA",
        Ok(x509_parser::public_key::PublicKey::EC(_)) => "ECDSA",
        _ => "Unknown",
    };

    let mut domains: Vec<String> = match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => vec![],
    };
    if domains.is_empty() {
        domains.extend(common_name(&cert));
    }

    Ok((algorithm, domains))
}

fn certificate_blocks(data: &[u8], key: &'static str) -> Result<Vec<Vec<u8>>, TlsError> {
    let blocks = ::pem::parse_many(data).map_err(|_| TlsError::InvalidPem(key))?;

    let certs: Vec<_> = blocks
        .into_iter()
        .filter(|b| b.tag() == PEM_CERTIFICATE)
        .map(|b| b.into_contents())
        .collect();

    if certs.is_empty() {
        return Err(TlsError::MissingCertificate(key));
    }
    Ok(certs)
}

fn parse_certificate<'a>(
    der: &'a [u8],
    key: &'static str,
) -> Result<X509Certificate<'a>, TlsError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| TlsError::InvalidCertificate {
            key,
            message: e.to_string(),
        })?;

    let validity = cert.validity();
    let now = ASN1Time::now();
    let name = common_name(&cert).unwrap_or_else(|| cert.subject().to_string());

    if now > validity.not_after {
        return Err(TlsError::Expired {
            name,
            not_after: validity.not_after.to_string(),
        });
    }
    if now < validity.not_before {
        return Err(TlsError::NotYetValid {
            name,
            not_before: validity.not_before.to_string(),
        });
    }

    Ok(cert)
}

fn common_name(cert: &X509Certificate) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// Check that a PEM block holds a PKCS1, PKCS8 or EC private key. Only the
/// first block is considered.
fn validate_private_key(data: &[u8], key: &'static str) -> Result<(), TlsError> {
    let block = ::pem::parse_many(data)
        .map_err(|_| TlsError::InvalidPem(key))?
        .into_iter()
        .next()
        .ok_or(TlsError::MissingKey(key))?;

    match block.tag() {
        PEM_PKCS8_KEY | PEM_PKCS1_KEY | PEM_EC_KEY => (),
        other => {
            return Err(TlsError::UnsupportedKeyFormat {
                format: other.to_string(),
                key,
            })
        }
    }

    // every supported format is a DER sequence
    match x509_parser::der_parser::der::parse_der(block.contents()) {
        Ok((rest, obj)) if rest.is_empty() && obj.as_sequence().is_ok() => Ok(()),
        _ => Err(TlsError::InvalidKey(key)),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    const RSA_CERT: &str = include_str!("../testdata/tls/rsa.crt");
    const RSA_PKCS8_KEY: &str = include_str!("../testdata/tls/rsa-pkcs8.key");
    const RSA_PKCS1_KEY: &str = include_str!("../testdata/tls/rsa-pkcs1.key");
    const EC_CERT: &str = include_str!("../testdata/tls/ec.crt");
    const EC_KEY: &str = include_str!("../testdata/tls/ec.key");
    const EXPIRED_CERT: &str = include_str!("../testdata/tls/expired.crt");
    const EXPIRED_KEY: &str = include_str!("../testdata/tls/expired.key");

    fn tls_secret(cert: &str, key: &str) -> Secret {
        let mut secret = Secret {
            type_: Some(SECRET_TYPE_TLS.to_string()),
            data: Some(BTreeMap::from([
                (TLS_CERT_KEY.to_string(), ByteString(cert.as_bytes().to_vec())),
                (TLS_PRIVATE_KEY_KEY.to_string(), ByteString(key.as_bytes().to_vec())),
            ])),
            ..Default::default()
        };
        secret.metadata.namespace = Some("envoy-gateway".to_string());
        secret.metadata.name = Some("tls-secret-1".to_string());
        secret
    }

    #[test]
    fn test_rsa_certificates() {
        for key in [RSA_PKCS8_KEY, RSA_PKCS1_KEY] {
            let cert = serving_certificate(&tls_secret(RSA_CERT, key)).unwrap();
            assert_eq!(cert.key_algorithm, "RSA");
            assert_eq!(cert.domains, vec!["foo.envoyproxy.io", "*.envoyproxy.io"]);
            assert_eq!(cert.certificate.name, "envoy-gateway-tls-secret-1");
            assert_eq!(cert.certificate.certificate, RSA_CERT);
        }
    }

    #[test]
    fn test_ec_certificate_uses_common_name() {
        let cert = serving_certificate(&tls_secret(EC_CERT, EC_KEY)).unwrap();
        assert_eq!(cert.key_algorithm, "ECDSA");
        assert_eq!(cert.domains, vec!["bar.envoyproxy.io"]);
    }

    #[test]
    fn test_serving_certificate_is_stable() {
        let secret = tls_secret(EC_CERT, EC_KEY);
        assert_eq!(
            serving_certificate(&secret).unwrap(),
            serving_certificate(&secret).unwrap()
        );
        assert_ne!(
            serving_certificate(&secret).unwrap(),
            serving_certificate(&tls_secret(RSA_CERT, RSA_PKCS8_KEY)).unwrap()
        );
    }

    #[test]
    fn test_expired_certificate() {
        let err = serving_certificate(&tls_secret(EXPIRED_CERT, EXPIRED_KEY)).unwrap_err();
        assert!(
            err.starts_with(
                "Secret envoy-gateway/tls-secret-1 must contain valid tls.crt and tls.key, \
                 certificate old.envoyproxy.io has expired since"
            ),
            "unexpected message: {err}"
        );
    }

    #[test]
    fn test_unsupported_key_format() {
        let key = EC_KEY.replace("EC PRIVATE KEY", "ENCRYPTED PRIVATE KEY");
        let err = serving_certificate(&tls_secret(EC_CERT, &key)).unwrap_err();
        assert_eq!(
            err,
            "Secret envoy-gateway/tls-secret-1 must contain valid tls.crt and tls.key, \
             ENCRYPTED PRIVATE KEY key format found in tls.key, supported formats are PKCS1, PKCS8 or EC."
        );
    }

    #[test]
    fn test_invalid_secrets() {
        // swapped cert and key
        assert!(serving_certificate(&tls_secret(EC_KEY, EC_CERT)).is_err());
        // garbage
        assert!(serving_certificate(&tls_secret("not a cert", EC_KEY)).is_err());

        let mut secret = tls_secret(RSA_CERT, RSA_PKCS8_KEY);
        secret.type_ = Some("Opaque".to_string());
        assert_eq!(
            serving_certificate(&secret).unwrap_err(),
            "Secret envoy-gateway/tls-secret-1 must be of type kubernetes.io/tls."
        );

        assert_eq!(
            serving_certificate(&tls_secret(RSA_CERT, "")).unwrap_err(),
            "Secret envoy-gateway/tls-secret-1 must contain tls.crt and tls.key."
        );
    }

    #[test]
    fn test_ca_bundle() {
        let bundle = format!("{RSA_CERT}{EC_CERT}");
        assert_eq!(validate_ca_bundle(bundle.as_bytes(), CA_CERT_KEY), Ok(()));
        assert_eq!(
            validate_ca_bundle(EC_KEY.as_bytes(), CA_CERT_KEY),
            Err(TlsError::MissingCertificate(CA_CERT_KEY))
        );
        assert!(matches!(
            validate_ca_bundle(EXPIRED_CERT.as_bytes(), CA_CERT_KEY),
            Err(TlsError::Expired { .. })
        ));
    }
}
