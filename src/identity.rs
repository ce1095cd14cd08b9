//! Client identity from a PEM certificate bundle.
//!
//! The bundle holds one certificate block and one private-key block, possibly
//! alongside other blocks (chain certificates, parameters) which are ignored.
//! The key may be encrypted either the legacy OpenSSL way
//! (`Proc-Type: 4,ENCRYPTED` headers) or as PKCS#8 (`ENCRYPTED PRIVATE KEY`);
//! both are decrypted with the caller's passphrase.
//!
//! No I/O happens here: callers hand over the bundle bytes.

use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::X509;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::CertificateError;

/// A PEM block located in a bundle.
#[derive(Debug)]
struct PemBlock {
    label: String,
    /// Full block text, BEGIN and END lines included.
    text: String,
    encrypted: bool,
}

impl PemBlock {
    fn is_certificate(&self) -> bool {
        self.label == "CERTIFICATE"
    }

    fn is_private_key(&self) -> bool {
        self.label.ends_with("PRIVATE KEY")
    }
}

/// Split a bundle into its PEM blocks, in order. Unterminated blocks are dropped.
fn pem_blocks(bundle: &str) -> Vec<PemBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<PemBlock> = None;

    for line in bundle.lines().map(str::trim) {
        let Some(block) = current.as_mut() else {
            if let Some(label) = line
                .strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
            {
                current = Some(PemBlock {
                    label: label.to_string(),
                    text: format!("{line}\n"),
                    encrypted: label == "ENCRYPTED PRIVATE KEY",
                });
            }
            continue;
        };

        block.text.push_str(line);
        block.text.push('\n');
        if line.starts_with("Proc-Type:") && line.contains("ENCRYPTED") {
            block.encrypted = true;
        }
        let finished = line.strip_prefix("-----END ").and_then(|rest| rest.strip_suffix("-----"))
            == Some(block.label.as_str());
        if finished {
            blocks.extend(current.take());
        }
    }

    blocks
}

/// Certificate + private key ready to present as a TLS client identity.
pub struct Identity {
    certificate: CertificateDer<'static>,
    key: PrivateKeyDer<'static>,
    common_name: Option<String>,
}

impl Identity {
    /// Load from a PEM bundle, decrypting the key with `passphrase` if needed.
    ///
    /// # Errors
    ///
    /// - [`CertificateError::CertificateParse`] if no certificate block parses
    /// - [`CertificateError::KeyParse`] if no key block is present or it does not parse
    /// - [`CertificateError::Decryption`] if the key is encrypted and the passphrase is
    ///   missing or wrong
    /// - [`CertificateError::Identity`] if the key does not belong to the certificate
    pub fn from_pem(bundle: &[u8], passphrase: Option<&[u8]>) -> Result<Self, CertificateError> {
        let text = String::from_utf8_lossy(bundle);
        let blocks = pem_blocks(&text);

        let cert_block = blocks
            .iter()
            .find(|b| b.is_certificate())
            .ok_or_else(|| CertificateError::CertificateParse("no CERTIFICATE block".into()))?;
        let key_block = blocks
            .iter()
            .find(|b| b.is_private_key())
            .ok_or_else(|| CertificateError::KeyParse("no PRIVATE KEY block".into()))?;

        let cert = X509::from_pem(cert_block.text.as_bytes())
            .map_err(|e| CertificateError::CertificateParse(e.to_string()))?;

        let pass = passphrase.unwrap_or_default();
        let key = PKey::private_key_from_pem_callback(key_block.text.as_bytes(), |buf| {
            // Too long for OpenSSL's buffer: report no passphrase, decryption fails below
            if pass.len() > buf.len() {
                return Ok(0);
            }
            buf[..pass.len()].copy_from_slice(pass);
            Ok(pass.len())
        })
        .map_err(|e| {
            if key_block.encrypted {
                let reason = if pass.is_empty() {
                    "passphrase required".to_string()
                } else {
                    format!("wrong passphrase ({e})")
                };
                CertificateError::Decryption(reason)
            } else {
                CertificateError::KeyParse(e.to_string())
            }
        })?;

        let cert_public = cert
            .public_key()
            .map_err(|e| CertificateError::CertificateParse(e.to_string()))?;
        if !cert_public.public_eq(&key) {
            return Err(CertificateError::Identity(
                "private key does not match certificate".into(),
            ));
        }

        let cert_der = cert
            .to_der()
            .map_err(|e| CertificateError::CertificateParse(e.to_string()))?;
        let key_der = key
            .private_key_to_pkcs8()
            .map_err(|e| CertificateError::KeyParse(e.to_string()))?;

        let common_name = cert
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|cn| cn.to_string());

        log::debug!(
            "[Identity] Loaded certificate {} (key {})",
            common_name.as_deref().unwrap_or("<no CN>"),
            if key_block.encrypted { "decrypted" } else { "plain" }
        );

        Ok(Self {
            certificate: CertificateDer::from(cert_der),
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
            common_name,
        })
    }

    /// Certificate chain to present (the single leaf certificate).
    pub fn cert_chain(&self) -> Vec<CertificateDer<'static>> {
        vec![self.certificate.clone()]
    }

    /// PKCS#8 private key.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        self.key.clone_key()
    }

    /// Subject common name, when the certificate has one.
    pub fn common_name(&self) -> Option<&str> {
        self.common_name.as_deref()
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            certificate: self.certificate.clone(),
            key: self.key.clone_key(),
            common_name: self.common_name.clone(),
        }
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("common_name", &self.common_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::bn::BigNum;
    use openssl::hash::MessageDigest;
    use openssl::pkey::Private;
    use openssl::rsa::Rsa;
    use openssl::symm::Cipher;
    use openssl::x509::X509NameBuilder;

    fn keypair() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn self_signed(key: &PKey<Private>) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "Push Services: com.example.app").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn bundle(cert: &X509, key_pem: &[u8]) -> Vec<u8> {
        let mut out = b"Bag Attributes\n    friendlyName: Push Services\n".to_vec();
        out.extend_from_slice(&cert.to_pem().unwrap());
        out.extend_from_slice(key_pem);
        out
    }

    #[test]
    fn test_plain_key_bundle() {
        let key = keypair();
        let cert = self_signed(&key);
        let pem = bundle(&cert, &key.private_key_to_pem_pkcs8().unwrap());

        let identity = Identity::from_pem(&pem, None).unwrap();
        assert_eq!(identity.common_name(), Some("Push Services: com.example.app"));
        assert_eq!(identity.cert_chain().len(), 1);
        assert!(matches!(identity.private_key(), PrivateKeyDer::Pkcs8(_)));
    }

    #[test]
    fn test_legacy_encrypted_rsa_key() {
        let key = keypair();
        let cert = self_signed(&key);
        let key_pem = key
            .rsa()
            .unwrap()
            .private_key_to_pem_passphrase(Cipher::aes_128_cbc(), b"s3cret")
            .unwrap();
        assert!(String::from_utf8_lossy(&key_pem).contains("Proc-Type: 4,ENCRYPTED"));
        let pem = bundle(&cert, &key_pem);

        assert!(Identity::from_pem(&pem, Some(b"s3cret")).is_ok());
        assert!(matches!(
            Identity::from_pem(&pem, Some(b"wrong")),
            Err(CertificateError::Decryption(_))
        ));
        assert!(matches!(
            Identity::from_pem(&pem, None),
            Err(CertificateError::Decryption(_))
        ));
    }

    #[test]
    fn test_pkcs8_encrypted_key() {
        let key = keypair();
        let cert = self_signed(&key);
        let key_pem = key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), b"s3cret")
            .unwrap();
        let pem = bundle(&cert, &key_pem);

        assert!(Identity::from_pem(&pem, Some(b"s3cret")).is_ok());
        assert!(matches!(
            Identity::from_pem(&pem, Some(b"nope")),
            Err(CertificateError::Decryption(_))
        ));
    }

    #[test]
    fn test_missing_certificate() {
        let key = keypair();
        let pem = key.private_key_to_pem_pkcs8().unwrap();
        assert!(matches!(
            Identity::from_pem(&pem, None),
            Err(CertificateError::CertificateParse(_))
        ));
    }

    #[test]
    fn test_missing_key() {
        let key = keypair();
        let pem = self_signed(&key).to_pem().unwrap();
        assert!(matches!(
            Identity::from_pem(&pem, None),
            Err(CertificateError::KeyParse(_))
        ));
    }

    #[test]
    fn test_mismatched_key() {
        let cert = self_signed(&keypair());
        let other = keypair();
        let pem = bundle(&cert, &other.private_key_to_pem_pkcs8().unwrap());
        assert!(matches!(
            Identity::from_pem(&pem, None),
            Err(CertificateError::Identity(_))
        ));
    }

    #[test]
    fn test_pem_blocks_skip_unrelated_and_unterminated() {
        let text = "junk\n-----BEGIN DH PARAMETERS-----\nAAAA\n-----END DH PARAMETERS-----\n\
                    -----BEGIN CERTIFICATE-----\nBBBB\n";
        let blocks = pem_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].label, "DH PARAMETERS");
        assert!(!blocks[0].is_certificate());
    }
}
