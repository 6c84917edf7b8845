use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde_json::json;
use url::Url;

use crate::config::VapidConfig;
use crate::error::{AppError, Result};

/// Token lifetime. Tokens are signed fresh for every send and never cached
/// across this window; signing is cheap.
const TOKEN_TTL_SECS: i64 = 3600;

/// Holds the process-wide key pair. Built once at startup, read-only
/// afterwards, so it can be shared across sends without locking.
pub struct VapidSigner {
    signing_key: SigningKey,
    public_key: String,
    subject: String,
}

impl VapidSigner {
    pub fn from_config(config: &VapidConfig) -> Result<Self> {
        let secret = URL_SAFE_NO_PAD
            .decode(&config.private_key)
            .map_err(|e| AppError::Config(format!("Invalid VAPID private key encoding: {e}")))?;
        let signing_key = SigningKey::from_slice(&secret)
            .map_err(|e| AppError::Config(format!("Invalid VAPID private key: {e}")))?;

        Ok(Self {
            signing_key,
            public_key: config.public_key.clone(),
            subject: config.subject.clone(),
        })
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    /// Sign one ES256 JWT scoped to the destination endpoint's origin.
    /// The audience must be the specific origin of the endpoint being
    /// pushed to; a token for one host is never valid for another.
    pub fn sign_for_endpoint(&self, endpoint: &str, now: DateTime<Utc>) -> Result<String> {
        let audience = endpoint_origin(endpoint)?;

        let header = json!({ "typ": "JWT", "alg": "ES256" });
        let claims = json!({
            "aud": audience,
            "exp": now.timestamp() + TOKEN_TTL_SECS,
            "sub": self.subject,
        });

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
        );

        // ECDSA P-256 over SHA-256; the JWT carries the raw r||s bytes
        let signature: Signature = self.signing_key.sign(signing_input.as_bytes());
        let encoded_signature = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(format!("{signing_input}.{encoded_signature}"))
    }

    /// Full Authorization header value for a VAPID-authenticated provider.
    pub fn authorization_for(&self, endpoint: &str, now: DateTime<Utc>) -> Result<String> {
        let token = self.sign_for_endpoint(endpoint, now)?;
        Ok(format!("vapid t={token}, k={}", self.public_key))
    }
}

/// `<scheme>://<host[:port]>` of a push endpoint URL.
pub fn endpoint_origin(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint)
        .map_err(|e| AppError::Signing(format!("Invalid endpoint URL {endpoint}: {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| AppError::Signing(format!("Endpoint URL has no host: {endpoint}")))?;

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Verifier, VerifyingKey};
    use rand_core::OsRng;

    fn test_signer() -> (VapidSigner, VerifyingKey) {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = VerifyingKey::from(&signing_key);
        let public_key =
            URL_SAFE_NO_PAD.encode(verifying_key.to_encoded_point(false).as_bytes());

        let signer = VapidSigner {
            signing_key,
            public_key,
            subject: "mailto:ops@example.com".to_string(),
        };
        (signer, verifying_key)
    }

    #[test]
    fn endpoint_origin_keeps_scheme_host_and_port() {
        assert_eq!(
            endpoint_origin("https://fcm.googleapis.com/fcm/send/abc123").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            endpoint_origin("https://push.example.net:8443/sub/xyz").unwrap(),
            "https://push.example.net:8443"
        );
        assert!(endpoint_origin("not a url").is_err());
    }

    #[test]
    fn token_round_trips_and_verifies() {
        let (signer, verifying_key) = test_signer();
        let now = Utc::now();
        let token = signer
            .sign_for_endpoint("https://updates.push.services.mozilla.com/wpush/v2/abc", now)
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[0]).unwrap()).unwrap();
        assert_eq!(header["typ"], "JWT");
        assert_eq!(header["alg"], "ES256");

        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        assert_eq!(claims["aud"], "https://updates.push.services.mozilla.com");
        assert_eq!(claims["sub"], "mailto:ops@example.com");
        let exp = claims["exp"].as_i64().unwrap();
        assert!((exp - now.timestamp() - 3600).abs() <= 1);

        let signature =
            Signature::from_slice(&URL_SAFE_NO_PAD.decode(parts[2]).unwrap()).unwrap();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        verifying_key
            .verify(signing_input.as_bytes(), &signature)
            .unwrap();
    }

    #[test]
    fn tokens_are_scoped_per_destination_host() {
        let (signer, _) = test_signer();
        let now = Utc::now();

        let aud_of = |endpoint: &str| {
            let token = signer.sign_for_endpoint(endpoint, now).unwrap();
            let parts: Vec<&str> = token.split('.').collect();
            let claims: serde_json::Value =
                serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
            claims["aud"].as_str().unwrap().to_string()
        };

        assert_eq!(
            aud_of("https://fcm.googleapis.com/fcm/send/a"),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            aud_of("https://web.push.apple.com/QOth"),
            "https://web.push.apple.com"
        );
    }

    #[test]
    fn authorization_header_carries_token_and_public_key() {
        let (signer, _) = test_signer();
        let header = signer
            .authorization_for("https://web.push.apple.com/QOth", Utc::now())
            .unwrap();
        assert!(header.starts_with("vapid t="));
        assert!(header.contains(&format!(", k={}", signer.public_key())));
    }

    #[test]
    fn from_config_rejects_garbage_keys() {
        let bad = VapidConfig {
            public_key: "whatever".to_string(),
            private_key: "!!not-base64!!".to_string(),
            subject: "mailto:ops@example.com".to_string(),
        };
        assert!(matches!(
            VapidSigner::from_config(&bad),
            Err(AppError::Config(_))
        ));
    }
}
