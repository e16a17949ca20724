//! HTTP dispatch to the per-account upstream endpoint (spec.md §6) and the
//! status-code classification that drives the gateway's retry loop (§4.8
//! step 5).

use kiro_core::types::Account;
use kiro_translate::Envelope;
use uuid::Uuid;

const SDK_VERSION: &str = "1.0.0";
const IDE_VERSION: &str = "0.1.0";

/// Process-wide HTTP client wrapper over the single upstream endpoint shape.
/// Cheap to clone — `reqwest::Client` is `Arc`-backed internally.
#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Send the translated envelope to `account`'s upstream endpoint and
    /// return the raw response — the caller decodes its event-stream body.
    pub async fn dispatch(
        &self,
        account: &Account,
        access_token: &str,
        envelope: &Envelope,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let url = format!(
            "https://q.{}.amazonaws.com/generateAssistantResponse",
            account.region
        );
        let machine_id = derive_machine_id(&account.profile_arn);

        self.http
            .post(url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {access_token}"))
            .header("amz-sdk-invocation-id", Uuid::new_v4().to_string())
            .header("amz-sdk-request", "attempt=1; max=1")
            .header("x-amzn-kiro-agent-mode", "vibe")
            .header(
                "x-amz-user-agent",
                format!("aws-sdk-js/{SDK_VERSION} KiroIDE-{IDE_VERSION}-{machine_id}"),
            )
            .header(
                "User-Agent",
                format!(
                    "aws-sdk-js/{SDK_VERSION} ua/2.1 os/other lang/js md/nodejs api/codewhispererstreaming#{SDK_VERSION} m/E KiroIDE-{IDE_VERSION}-{machine_id}"
                ),
            )
            .header("Connection", "close")
            .body(serde_json::to_vec(envelope).unwrap_or_default())
            .send()
            .await
    }
}

/// Deterministically derive a 16-hex-character machine id by XOR-folding
/// `profile_arn`'s bytes into an 8-byte accumulator. Not a cryptographic
/// hash — matches the upstream's own (undocumented) derivation exactly.
pub fn derive_machine_id(profile_arn: &str) -> String {
    let mut folded = [0u8; 8];
    for (i, byte) in profile_arn.as_bytes().iter().enumerate() {
        folded[i % folded.len()] ^= byte;
    }
    hex::encode(folded)
}

/// The classified outcome of an upstream HTTP response, driving the health
/// tracker transition and retry decision in spec.md §4.8 step 5.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamOutcome {
    Success,
    /// 402 — quota exhausted for the billing period.
    QuotaExhausted,
    /// 429, 529, or 403 — rate-limited, overloaded, or forbidden.
    RateLimitedOrForbidden,
    /// 400 with an upstream message indicating the request body was too
    /// large for the model's context window.
    RequestTooLarge,
    /// 400 "Improperly formed request" — recoverable via the tools-injection
    /// retry (spec.md §4.5 step 7).
    ImproperlyFormed,
    /// Any other 400 — the model is likely unsupported for this account.
    UnsupportedModel,
    /// Any other non-success status, not otherwise classified.
    Other { status: u16, body: String },
}

const REQUEST_TOO_LARGE_MARKERS: &[&str] =
    &["Input is too long", "CONTENT_LENGTH_EXCEEDS_THRESHOLD"];
const IMPROPERLY_FORMED_MARKER: &str = "Improperly formed request";

pub fn classify(status: u16, body: &str) -> UpstreamOutcome {
    match status {
        s if s < 400 => UpstreamOutcome::Success,
        402 => UpstreamOutcome::QuotaExhausted,
        429 | 529 | 403 => UpstreamOutcome::RateLimitedOrForbidden,
        400 => {
            if REQUEST_TOO_LARGE_MARKERS.iter().any(|m| body.contains(m)) {
                UpstreamOutcome::RequestTooLarge
            } else if body.contains(IMPROPERLY_FORMED_MARKER) {
                UpstreamOutcome::ImproperlyFormed
            } else {
                UpstreamOutcome::UnsupportedModel
            }
        }
        other => UpstreamOutcome::Other {
            status: other,
            body: body.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_is_16_hex_chars_and_deterministic() {
        let a = derive_machine_id("arn:aws:codewhisperer:us-east-1:123:profile/p1");
        let b = derive_machine_id("arn:aws:codewhisperer:us-east-1:123:profile/p1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn machine_id_differs_for_different_arns() {
        let a = derive_machine_id("arn:aws:codewhisperer:us-east-1:123:profile/p1");
        let b = derive_machine_id("arn:aws:codewhisperer:us-east-1:123:profile/p2");
        assert_ne!(a, b);
    }

    #[test]
    fn classify_maps_status_codes() {
        assert_eq!(classify(200, ""), UpstreamOutcome::Success);
        assert_eq!(classify(402, ""), UpstreamOutcome::QuotaExhausted);
        assert_eq!(classify(429, ""), UpstreamOutcome::RateLimitedOrForbidden);
        assert_eq!(classify(529, ""), UpstreamOutcome::RateLimitedOrForbidden);
        assert_eq!(classify(403, ""), UpstreamOutcome::RateLimitedOrForbidden);
    }

    #[test]
    fn classify_distinguishes_400_variants() {
        assert_eq!(
            classify(400, "Input is too long for this model"),
            UpstreamOutcome::RequestTooLarge
        );
        assert_eq!(
            classify(400, "CONTENT_LENGTH_EXCEEDS_THRESHOLD: 123"),
            UpstreamOutcome::RequestTooLarge
        );
        assert_eq!(
            classify(400, "Improperly formed request"),
            UpstreamOutcome::ImproperlyFormed
        );
        assert_eq!(
            classify(400, "some other validation error"),
            UpstreamOutcome::UnsupportedModel
        );
    }

    #[test]
    fn classify_falls_back_to_other_for_unmapped_status() {
        assert_eq!(
            classify(500, "boom"),
            UpstreamOutcome::Other {
                status: 500,
                body: "boom".to_string()
            }
        );
    }
}
