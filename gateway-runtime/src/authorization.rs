//! Transaction authorization tokens for metered service calls.
//!
//! Every outbound paid call carries a fresh ES256 JWT asserting a capped
//! `transfer` from the caller's wallet to the service's payee account.
//! Issuance fails closed: missing key material yields no token rather than
//! an error, and the remote service rejects the unauthenticated call.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::types::{DEFAULT_TOKEN_TTL_SECS, WalletCredentials};
use crate::wallet_cipher;

pub const OPERATION_TRANSFER: &str = "transfer";
pub const RESOURCE_CREDITS: &str = "credits";
pub const SUBJECT_TENANT: &str = "kbId";

/// Claim set of a transaction authorization token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferClaims {
    pub operation: String,
    pub resource_id: String,
    pub transaction_id: String,
    pub from_account_id: Option<String>,
    pub from_account_public_key: Option<String>,
    pub to_account_id: String,
    pub message: String,
    pub subject_id: Option<String>,
    pub subject: String,
    pub max_amount: u64,
    pub iat: i64,
    pub exp: i64,
}

/// Inputs for a single issuance.
#[derive(Debug, Clone)]
pub struct IssueRequest<'a> {
    pub to_account_id: &'a str,
    pub credentials: &'a WalletCredentials,
    /// Cap requested for this call; clamped to the declared cap.
    pub max_amount: Option<u64>,
    pub message: Option<&'a str>,
}

/// `<epoch millis>-<6 digit random>`.
///
/// No collision check: two calls in the same millisecond have a one in
/// 900,000 chance of sharing an id.
pub fn generate_transaction_id() -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    format!("{}-{suffix}", Utc::now().timestamp_millis())
}

/// Cap for one token: the requested cap, never above the declared one.
pub fn effective_cap(requested: Option<u64>, credentials: &WalletCredentials) -> u64 {
    let declared = credentials.declared_cap();
    requested.map_or(declared, |r| r.min(declared))
}

#[derive(Debug, Clone)]
pub struct TransactionIssuer {
    ttl_secs: i64,
    resource_id: String,
}

impl Default for TransactionIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionIssuer {
    pub fn new() -> Self {
        Self {
            ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            resource_id: RESOURCE_CREDITS.to_string(),
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Build the claim set for `request` at the current time.
    pub fn claims(&self, request: &IssueRequest<'_>) -> TransferClaims {
        let iat = Utc::now().timestamp();
        let creds = request.credentials;

        TransferClaims {
            operation: OPERATION_TRANSFER.to_string(),
            resource_id: self.resource_id.clone(),
            transaction_id: generate_transaction_id(),
            from_account_id: creds.account_id.clone(),
            from_account_public_key: creds.public_key.clone(),
            to_account_id: request.to_account_id.to_string(),
            message: request.message.unwrap_or_default().to_string(),
            subject_id: creds.tenant_id.clone(),
            subject: SUBJECT_TENANT.to_string(),
            max_amount: effective_cap(request.max_amount, creds),
            iat,
            exp: iat + self.ttl_secs,
        }
    }

    /// Issue a signed token, or `None` when key material is missing or any
    /// step fails. Failures are logged, never propagated.
    pub fn issue(&self, request: &IssueRequest<'_>) -> Option<String> {
        match self.try_issue(request) {
            Ok(token) => Some(token),
            Err(GatewayError::AuthorizationUnavailable(reason)) => {
                tracing::debug!("No transaction token issued: {reason}");
                None
            }
            Err(e) => {
                tracing::warn!(to_account_id = %request.to_account_id, "Transaction signing failed: {e}");
                None
            }
        }
    }

    pub fn try_issue(&self, request: &IssueRequest<'_>) -> Result<String, GatewayError> {
        let creds = request.credentials;

        let aes_key = creds
            .aes_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| GatewayError::AuthorizationUnavailable("no symmetric key".into()))?;
        let encrypted = creds
            .encrypted_private_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                GatewayError::AuthorizationUnavailable("no encrypted private key".into())
            })?;

        let decrypted = wallet_cipher::decrypt(encrypted, aes_key)?;
        let der = STANDARD
            .decode(decrypted.trim())
            .map_err(|e| GatewayError::Crypto(format!("private key is not base64: {e}")))?;

        sign_claims(&self.claims(request), &der)
    }
}

/// Sign `claims` with a PKCS#8 DER encoded P-256 private key.
pub fn sign_claims(claims: &TransferClaims, pkcs8_der: &[u8]) -> Result<String, GatewayError> {
    let mut header = Header::new(Algorithm::ES256);
    header.typ = Some("JWT".to_string());

    jsonwebtoken::encode(&header, claims, &EncodingKey::from_ec_der(pkcs8_der))
        .map_err(|e| GatewayError::Crypto(format!("ES256 signing failed: {e}")))
}

/// Verify signature and expiry against a PEM (SPKI) public key.
pub fn verify_token(token: &str, public_key_pem: &str) -> Result<TransferClaims, GatewayError> {
    let key = DecodingKey::from_ec_pem(public_key_pem.as_bytes())
        .map_err(|e| GatewayError::Crypto(format!("invalid public key: {e}")))?;

    jsonwebtoken::decode::<TransferClaims>(token, &key, &Validation::new(Algorithm::ES256))
        .map(|data| data.claims)
        .map_err(|e| GatewayError::Crypto(format!("token rejected: {e}")))
}

/// Source of per-call authorization tokens for the metered service client.
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    /// Token authorizing a transfer to `payee_account_id`, if one can be issued.
    async fn authorize(&self, payee_account_id: &str, max_amount: Option<u64>) -> Option<String>;
}

/// Issues tokens from the wallet credentials of one execution request.
#[derive(Debug, Clone)]
pub struct WalletAuthorizer {
    issuer: TransactionIssuer,
    credentials: WalletCredentials,
}

impl WalletAuthorizer {
    pub fn new(issuer: TransactionIssuer, credentials: WalletCredentials) -> Self {
        Self { issuer, credentials }
    }
}

#[async_trait]
impl TransactionProvider for WalletAuthorizer {
    async fn authorize(&self, payee_account_id: &str, max_amount: Option<u64>) -> Option<String> {
        self.issuer.issue(&IssueRequest {
            to_account_id: payee_account_id,
            credentials: &self.credentials,
            max_amount,
            message: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    /// Fresh P-256 key pair as (base64 PKCS#8 DER private key, SPKI PEM public key).
    pub fn generate() -> (String, String) {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        let der = secret.to_pkcs8_der().unwrap();
        let pem = secret.public_key().to_public_key_pem(LineEnding::LF).unwrap();
        (STANDARD.encode(der.as_bytes()), pem)
    }
}
