use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Order as created at the payment provider. `amount` is in minor currency
/// units; `receipt` echoes whatever we passed in (the booking id).
#[derive(Debug, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub amount: u64,
    pub receipt: String,
}

/// Boundary to the payment provider. The engine only ever needs to open an
/// order for a pending booking; settlement comes back through the webhook.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, amount: u64, receipt: &str) -> Result<PaymentOrder, String>;

    /// Publishable key the client needs to drive the provider's checkout.
    fn public_key(&self) -> &str;
}

/// Gateway that mints deterministic local order ids without talking to any
/// provider. Used in tests and in deployments that confirm out of band.
pub struct StaticGateway {
    key: String,
}

impl StaticGateway {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[async_trait]
impl PaymentGateway for StaticGateway {
    async fn create_order(&self, amount: u64, receipt: &str) -> Result<PaymentOrder, String> {
        Ok(PaymentOrder {
            order_id: format!("order_{}", ulid::Ulid::new()),
            amount,
            receipt: receipt.to_string(),
        })
    }

    fn public_key(&self) -> &str {
        &self.key
    }
}

/// Check a webhook body against its hex-encoded HMAC-SHA256 signature.
/// Comparison runs over the decoded MAC, so it is constant time.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 of `body`, as the provider would sign it. Test helper,
/// also handy for local curl runs.
pub fn sign_webhook_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
