use url::Url;

/// Provider family, derived from the endpoint host. Only used to pick the
/// auth strategy; the payload is identical everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushProvider {
    Fcm,
    Apns,
    Mozilla,
    Generic,
}

/// How the Authorization header is built for a provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// Freshly signed VAPID token scoped to the endpoint origin.
    Vapid,
    /// Legacy `key=<server_key>` header. Compatibility special-case for
    /// the FCM family only; likely an obsolete shim from an earlier
    /// integration, kept until confirmed dead.
    LegacyKey,
}

impl PushProvider {
    pub fn from_endpoint(endpoint: &str) -> Self {
        let host = Url::parse(endpoint)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();

        if host == "fcm.googleapis.com" || host == "android.googleapis.com" {
            PushProvider::Fcm
        } else if host.ends_with("push.apple.com") {
            PushProvider::Apns
        } else if host.ends_with("push.services.mozilla.com") {
            PushProvider::Mozilla
        } else {
            PushProvider::Generic
        }
    }

    pub fn auth_scheme(&self) -> AuthScheme {
        match self {
            PushProvider::Fcm => AuthScheme::LegacyKey,
            PushProvider::Apns | PushProvider::Mozilla | PushProvider::Generic => AuthScheme::Vapid,
        }
    }
}
