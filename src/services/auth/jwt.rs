use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, error};

use crate::services::auth::error::AuthError;

const ALGORITHM: Algorithm = Algorithm::HS256;

/// HS256 signer/verifier.
///
/// Verification only accepts HS256; a token whose header names any other
/// algorithm is rejected before its claims are looked at.
/// Debug output omits key material.
#[derive(Clone)]
pub struct JwtCodec {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtCodec")
            .field("issuer", &self.issuer)
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtCodec {
    pub fn new(secret: &[u8], issuer: String, leeway_seconds: u64) -> Result<Self, AuthError> {
        if secret.is_empty() {
            error!("refusing to build JWT codec with an empty secret");
            return Err(AuthError::Signing);
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "iss"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // Audience is per-application; it is checked against the claims afterwards.
        validation.validate_aud = false;
        validation.leeway = leeway_seconds;

        Ok(Self {
            issuer,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        let mut header = Header::new(ALGORITHM);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign JWT");
            AuthError::Signing
        })
    }

    pub fn verify<T: DeserializeOwned + Clone>(&self, token: &str) -> Result<T, AuthError> {
        let data = jsonwebtoken::decode::<T>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "JWT verification failed");
                classify(e.kind())
            })?;

        Ok(data.claims)
    }
}

fn classify(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm | ErrorKind::InvalidIssuer => {
            AuthError::BadSignature
        }
        // Structure, encoding, missing claims, not-yet-valid.
        _ => AuthError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret!";

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Probe {
        sub: String,
        iss: String,
        nbf: i64,
        exp: i64,
    }

    fn probe(iss: &str, offset: i64) -> Probe {
        let now = chrono::Utc::now().timestamp();
        Probe {
            sub: "s".to_string(),
            iss: iss.to_string(),
            nbf: now,
            exp: now + offset,
        }
    }

    #[test]
    fn sign_then_verify() {
        let codec = JwtCodec::new(SECRET, "iss".to_string(), 0).unwrap();
        let token = codec.sign(&probe("iss", 60)).unwrap();
        let back: Probe = codec.verify(&token).unwrap();
        assert_eq!(back.sub, "s");
    }

    #[test]
    fn other_algorithm_with_same_secret_is_rejected() {
        let codec = JwtCodec::new(SECRET, "iss".to_string(), 0).unwrap();
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS512),
            &probe("iss", 60),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        assert!(matches!(
            codec.verify::<Probe>(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn foreign_secret_is_bad_signature() {
        let ours = JwtCodec::new(SECRET, "iss".to_string(), 0).unwrap();
        let theirs = JwtCodec::new(b"another-secret-another-secret-000", "iss".to_string(), 0)
            .unwrap();
        let token = theirs.sign(&probe("iss", 60)).unwrap();

        assert!(matches!(
            ours.verify::<Probe>(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn wrong_issuer_is_rejected() {
        let codec = JwtCodec::new(SECRET, "iss".to_string(), 0).unwrap();
        let other = JwtCodec::new(SECRET, "elsewhere".to_string(), 0).unwrap();
        let token = other.sign(&probe("elsewhere", 60)).unwrap();

        assert!(matches!(
            codec.verify::<Probe>(&token),
            Err(AuthError::BadSignature)
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = JwtCodec::new(SECRET, "iss".to_string(), 0).unwrap();
        assert!(matches!(
            codec.verify::<Probe>("not-a-jwt"),
            Err(AuthError::Malformed)
        ));
    }

    #[test]
    fn past_exp_beyond_leeway_is_expired() {
        let codec = JwtCodec::new(SECRET, "iss".to_string(), 5).unwrap();
        let token = codec.sign(&probe("iss", -60)).unwrap();
        assert!(matches!(
            codec.verify::<Probe>(&token),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(
            JwtCodec::new(b"", "iss".to_string(), 0),
            Err(AuthError::Signing)
        ));
    }
}
