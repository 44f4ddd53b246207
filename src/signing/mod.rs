//! Order signing and CLOB authentication.
//!
//! Signers are derived once per key and cached; every order and every
//! authenticated request is signed with the wallet's secp256k1 key.

use std::hash::{Hash, Hasher};
use std::time::Instant;

use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use strum::Display;
use tracing::debug;

use crate::error::TradingError;
use crate::metrics;
use crate::trading::order::{OrderSpec, SignedOrder};

/// Seconds an order signature stays valid.
pub const ORDER_TTL_SECS: i64 = 3600;

/// Signers keyed by a hash of the private key, so raw keys are never map keys.
static SIGNER_CACHE: Lazy<DashMap<u64, PrivateKeySigner>> = Lazy::new(DashMap::new);

fn key_hash(private_key: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    private_key.hash(&mut hasher);
    hasher.finish()
}

/// Wallet flavor behind the signing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum WalletKind {
    /// Externally owned account.
    Eoa,
    /// Magic.link proxy wallet.
    Proxy,
    /// Gnosis Safe.
    GnosisSafe,
}

impl WalletKind {
    /// Map the configured signature type; unknown values mean EOA.
    pub fn from_u8(sig_type: u8) -> Self {
        match sig_type {
            1 => WalletKind::Proxy,
            2 => WalletKind::GnosisSafe,
            _ => WalletKind::Eoa,
        }
    }
}

/// Create a signer from a hex-encoded private key, with or without `0x`.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| TradingError::SigningError(format!("Invalid private key hex: {}", e)))?;

    let key_bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        TradingError::SigningError(format!("Private key must be 32 bytes, got {}", bytes.len()))
    })?;

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| TradingError::SigningError(format!("Failed to create signer: {}", e)))
}

/// Cached signer for `private_key`.
pub fn get_or_create_signer(private_key: &str) -> Result<PrivateKeySigner, TradingError> {
    let hash = key_hash(private_key);
    if let Some(signer) = SIGNER_CACHE.get(&hash) {
        return Ok(signer.clone());
    }

    let signer = create_signer(private_key)?;
    debug!("Caching new signer");
    Ok(SIGNER_CACHE.entry(hash).or_insert(signer).clone())
}

/// Checksummed wallet address for a private key.
pub fn address_from_private_key(private_key: &str) -> Result<String, TradingError> {
    let signer = create_signer(private_key)?;
    Ok(format!("{:?}", signer.address()))
}

/// Canonical message covered by an order signature.
pub fn order_message(spec: &OrderSpec, nonce: &str, expiration: i64) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}",
        spec.token_id, spec.side, spec.price, spec.size, nonce, expiration
    )
}

/// Sign an order spec.
pub async fn sign_order(private_key: &str, spec: &OrderSpec) -> Result<SignedOrder, TradingError> {
    spec.validate().map_err(TradingError::InvalidParams)?;

    let start = Instant::now();
    let signer = get_or_create_signer(private_key)?;
    let now = chrono::Utc::now();
    let nonce = now.timestamp_millis().to_string();
    let expiration = now.timestamp() + ORDER_TTL_SECS;

    let message = order_message(spec, &nonce, expiration);
    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign order: {}", e)))?;
    metrics::record_signing_latency(start);

    Ok(SignedOrder {
        spec: spec.clone(),
        maker: format!("{:?}", signer.address()),
        nonce,
        expiration,
        signature: format!("0x{}", hex::encode(signature.as_bytes())),
    })
}

/// Headers proving wallet ownership on authenticated CLOB requests.
pub async fn auth_headers(private_key: &str) -> Result<Vec<(String, String)>, TradingError> {
    let signer = get_or_create_signer(private_key)?;
    let address = format!("{:?}", signer.address());
    let timestamp = chrono::Utc::now().timestamp_millis().to_string();
    let message = format!("polymarket:{}", timestamp);

    let signature = signer
        .sign_message(message.as_bytes())
        .await
        .map_err(|e| TradingError::SigningError(format!("Failed to sign auth message: {}", e)))?;

    Ok(vec![
        ("POLY_ADDRESS".to_string(), address),
        ("POLY_SIGNATURE".to_string(), format!("0x{}", hex::encode(signature.as_bytes()))),
        ("POLY_TIMESTAMP".to_string(), timestamp),
        ("POLY_NONCE".to_string(), "0".to_string()),
    ])
}
