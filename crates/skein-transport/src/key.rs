use pbkdf2::pbkdf2_hmac;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use sha1::Sha1;

use crate::{TransportConfig, TransportError};

/// PKCS#8 v1 prefix for a bare Ed25519 seed (RFC 8410).
const ED25519_PKCS8_PREFIX: [u8; 16] = [
    0x30, 0x2e, 0x02, 0x01, 0x00, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x04, 0x22, 0x04, 0x20,
];

/// Derive a symmetric key from a password and salt with PBKDF2-HMAC-SHA1.
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32, len: usize) -> Vec<u8> {
    let mut key = vec![0u8; len];
    pbkdf2_hmac::<Sha1>(password, salt, iterations, &mut key);
    key
}

/// TLS identity shared by every party that knows the password and salt.
///
/// The derived key seeds an Ed25519 keypair; the self-signed certificate
/// built from it is both what each side presents and the only trust anchor
/// each side accepts.
pub struct SessionIdentity {
    cert: CertificateDer<'static>,
    key: PrivatePkcs8KeyDer<'static>,
}

impl SessionIdentity {
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        if config.key_len < 32 {
            return Err(TransportError::Config(format!(
                "key length {} is shorter than 32",
                config.key_len
            )));
        }
        if config.key_iterations == 0 {
            return Err(TransportError::Config(
                "key iterations must be positive".to_string(),
            ));
        }

        let key = derive_key(
            &config.password,
            &config.salt,
            config.key_iterations,
            config.key_len,
        );

        let mut pkcs8 = Vec::with_capacity(ED25519_PKCS8_PREFIX.len() + 32);
        pkcs8.extend_from_slice(&ED25519_PKCS8_PREFIX);
        pkcs8.extend_from_slice(&key[..32]);
        let pkcs8 = PrivatePkcs8KeyDer::from(pkcs8);

        let key_pair = rcgen::KeyPair::from_pkcs8_der_and_sign_algo(&pkcs8, &rcgen::PKCS_ED25519)
            .map_err(|e| TransportError::Tls(e.into()))?;

        // Fixed validity and serial keep the certificate identical on both ends.
        let mut params = rcgen::CertificateParams::new(vec![config.server_name.clone()])
            .map_err(|e| TransportError::Tls(e.into()))?;
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(4000, 1, 1);
        params.serial_number = Some(rcgen::SerialNumber::from_slice(&[1]));
        params.extended_key_usages = vec![
            rcgen::ExtendedKeyUsagePurpose::ServerAuth,
            rcgen::ExtendedKeyUsagePurpose::ClientAuth,
        ];

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| TransportError::Tls(e.into()))?;

        Ok(Self {
            cert: cert.der().clone(),
            key: pkcs8,
        })
    }

    /// The pinned certificate.
    pub fn cert(&self) -> CertificateDer<'static> {
        self.cert.clone()
    }

    /// The private key matching [`cert`](Self::cert).
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(self.key.clone_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn derive_key_matches_rfc6070_vectors() {
        let key = derive_key(b"password", b"salt", 1, 20);
        assert_eq!(hex(&key), "0c60c80f961f0e71f3a9b524af6012062fe037a6");

        let key = derive_key(b"password", b"salt", 2, 20);
        assert_eq!(hex(&key), "ea6c014dc72d6f8ccd1ed92ace1d41f0d8de8957");
    }

    #[test]
    fn derive_key_respects_length() {
        assert_eq!(derive_key(b"pw", b"salt", 1024, 32).len(), 32);
        assert_eq!(derive_key(b"pw", b"salt", 1024, 48).len(), 48);
    }

    #[test]
    fn identity_is_deterministic() {
        let config = TransportConfig::new("127.0.0.1:0".parse().unwrap())
            .password(b"test password")
            .salt(b"test salt");

        let a = SessionIdentity::from_config(&config).unwrap();
        let b = SessionIdentity::from_config(&config).unwrap();
        assert_eq!(a.cert(), b.cert());
    }

    #[test]
    fn identity_depends_on_password() {
        let base = TransportConfig::new("127.0.0.1:0".parse().unwrap()).salt(b"salt");
        let a = SessionIdentity::from_config(&base.clone().password(b"one")).unwrap();
        let b = SessionIdentity::from_config(&base.password(b"two")).unwrap();
        assert_ne!(a.cert(), b.cert());
    }

    #[test]
    fn short_key_is_rejected() {
        let config = TransportConfig::new("127.0.0.1:0".parse().unwrap()).key_len(16);
        let err = SessionIdentity::from_config(&config).err().unwrap();
        assert!(matches!(err, TransportError::Config(_)));
    }
}
