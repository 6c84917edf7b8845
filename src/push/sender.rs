use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{NotificationPayload, PushSubscription};
use crate::push::provider::{AuthScheme, PushProvider};
use crate::push::vapid::VapidSigner;

/// TTL header on outbound pushes: how long the provider may hold an
/// undelivered message.
const PUSH_TTL_SECS: u32 = 86400;

const MAX_CONCURRENT_SENDS: usize = 4;

/// Outcome of one delivery attempt to one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent,
    /// Provider says the endpoint no longer exists (404/410). Terminal.
    Gone,
    /// Timeout, 5xx, other 4xx, or a signing failure. The subscription is
    /// retained; no retry within this call.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub endpoint: String,
    pub error: String,
}

/// Per-user aggregate of a fan-out. `to_delete_ids` feeds the follow-up
/// pending-delete marking; it never triggers deletion inside the send path.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FanoutReport {
    pub sent: Vec<String>,
    pub failed: Vec<FailedDelivery>,
    pub to_delete: Vec<String>,
    #[serde(skip)]
    pub to_delete_ids: Vec<i64>,
    pub total_subscriptions: usize,
}

impl FanoutReport {
    pub fn any_sent(&self) -> bool {
        !self.sent.is_empty()
    }
}

pub struct PushSender {
    client: Client,
    signer: Option<VapidSigner>,
    fcm_server_key: Option<String>,
}

impl PushSender {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.push_timeout_secs))
            .connect_timeout(Duration::from_secs(config.push_timeout_secs))
            .user_agent("push-dispatch/1.0")
            .build()?;

        let signer = config
            .vapid
            .as_ref()
            .map(VapidSigner::from_config)
            .transpose()?;

        Ok(Self {
            client,
            signer,
            fcm_server_key: config.fcm_server_key.clone(),
        })
    }

    /// Fails fast when the key pair is missing, so a batch run aborts
    /// before any send rather than failing per subscription.
    pub fn ensure_configured(&self) -> Result<()> {
        if self.signer.is_none() {
            return Err(AppError::Config(
                "VAPID keys are not configured".to_string(),
            ));
        }
        Ok(())
    }

    /// Send the payload to every subscription of one user. Sends run
    /// concurrently; each targets an independent endpoint and touches no
    /// shared state.
    pub async fn fan_out(
        &self,
        subscriptions: Vec<PushSubscription>,
        payload: &NotificationPayload,
    ) -> FanoutReport {
        let total = subscriptions.len();
        let results: Vec<_> = stream::iter(subscriptions)
            .map(|subscription| async move {
                let outcome = self.send_to_subscription(&subscription, payload).await;
                (subscription, outcome)
            })
            .buffer_unordered(MAX_CONCURRENT_SENDS)
            .collect()
            .await;

        let mut report = FanoutReport {
            total_subscriptions: total,
            ..Default::default()
        };
        for (subscription, outcome) in results {
            match outcome {
                DeliveryOutcome::Sent => report.sent.push(subscription.endpoint),
                DeliveryOutcome::Gone => {
                    report.to_delete.push(subscription.endpoint);
                    report.to_delete_ids.push(subscription.id);
                }
                DeliveryOutcome::Failed { error } => report.failed.push(FailedDelivery {
                    endpoint: subscription.endpoint,
                    error,
                }),
            }
        }
        report
    }

    pub async fn send_to_subscription(
        &self,
        subscription: &PushSubscription,
        payload: &NotificationPayload,
    ) -> DeliveryOutcome {
        // Signing failures count against this one subscription only
        let authorization = match self.authorization(&subscription.endpoint) {
            Ok(value) => value,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("Authorization", authorization)
            .header("TTL", PUSH_TTL_SECS)
            .json(payload)
            .send()
            .await;

        match response {
            Ok(response) => classify_status(response.status()),
            Err(e) => DeliveryOutcome::Failed {
                error: e.to_string(),
            },
        }
    }

    /// Auth strategy resolved once per subscription, per the provider
    /// family of its endpoint.
    fn authorization(&self, endpoint: &str) -> Result<String> {
        match PushProvider::from_endpoint(endpoint).auth_scheme() {
            AuthScheme::Vapid => {
                let signer = self.signer.as_ref().ok_or_else(|| {
                    AppError::Config("VAPID keys are not configured".to_string())
                })?;
                signer.authorization_for(endpoint, Utc::now())
            }
            AuthScheme::LegacyKey => {
                let key = self.fcm_server_key.as_ref().ok_or_else(|| {
                    AppError::Config("FCM server key is not configured".to_string())
                })?;
                Ok(format!("key={key}"))
            }
        }
    }
}

fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Sent
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        DeliveryOutcome::Gone
    } else {
        DeliveryOutcome::Failed {
            error: format!("HTTP {status}"),
        }
    }
}
