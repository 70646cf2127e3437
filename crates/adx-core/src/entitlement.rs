//! Client-side premium entitlement.
//!
//! Payment happens on external hosted checkout pages; all this module knows
//! is the flag the extension stores once a payment has been confirmed.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::{keys, load_value, save_value, KeyValueStore, StorageError};

/// Features that require premium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PremiumFeature {
    CustomBlock,
    Vpn,
}

impl fmt::Display for PremiumFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CustomBlock => f.write_str("custom blocking"),
            Self::Vpn => f.write_str("VPN"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Paypal,
    Payhere,
    Manual,
}

#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    #[error("Premium is required for {feature}")]
    PremiumRequired { feature: PremiumFeature },
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Persisted entitlement state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entitlement {
    pub is_premium: bool,
    pub purchase_date: Option<DateTime<Utc>>,
    pub payment_method: Option<PaymentMethod>,
    pub session_id: Option<String>,
    pub verified: bool,
}

/// Entitlement bound to its persistence.
pub struct EntitlementGate<S: KeyValueStore + ?Sized> {
    storage: Arc<S>,
}

impl<S: KeyValueStore + ?Sized> EntitlementGate<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Read the stored state. Malformed auxiliary fields read as absent.
    pub async fn load(&self) -> Result<Entitlement, StorageError> {
        let storage = &*self.storage;
        Ok(Entitlement {
            is_premium: self.is_premium().await?,
            purchase_date: lenient(storage, keys::PREMIUM_PURCHASE_DATE).await?,
            payment_method: lenient(storage, keys::PAYMENT_METHOD).await?,
            session_id: lenient(storage, keys::PAYMENT_SESSION_ID).await?,
            verified: lenient(storage, keys::PAYMENT_VERIFIED).await?.unwrap_or(false),
        })
    }

    /// Only the flag is consulted. Anything but a literal `true` is not
    /// premium.
    pub async fn is_premium(&self) -> Result<bool, StorageError> {
        Ok(lenient::<_, bool>(&*self.storage, keys::IS_PREMIUM)
            .await?
            .unwrap_or(false))
    }

    /// Fail with `PremiumRequired` unless premium is active.
    pub async fn require(&self, feature: PremiumFeature) -> Result<(), EntitlementError> {
        if self.is_premium().await? {
            Ok(())
        } else {
            log::debug!("Premium check failed for {}", feature);
            Err(EntitlementError::PremiumRequired { feature })
        }
    }

    /// Record a confirmed payment.
    pub async fn activate(
        &self,
        method: PaymentMethod,
        session_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Entitlement, StorageError> {
        let storage = &*self.storage;
        save_value(storage, keys::IS_PREMIUM, &true).await?;
        save_value(storage, keys::PREMIUM_PURCHASE_DATE, &now).await?;
        save_value(storage, keys::PAYMENT_METHOD, &method).await?;
        save_value(storage, keys::PAYMENT_SESSION_ID, &session_id).await?;
        save_value(storage, keys::PAYMENT_VERIFIED, &true).await?;
        log::info!("Premium activated via {:?}", method);
        self.load().await
    }

    pub async fn deactivate(&self) -> Result<(), StorageError> {
        let storage = &*self.storage;
        save_value(storage, keys::IS_PREMIUM, &false).await?;
        save_value(storage, keys::PAYMENT_VERIFIED, &false).await
    }
}

async fn lenient<S, T>(storage: &S, key: &str) -> Result<Option<T>, StorageError>
where
    S: KeyValueStore + ?Sized,
    T: serde::de::DeserializeOwned,
{
    match load_value(storage, key).await {
        Ok(value) => Ok(value),
        Err(StorageError::Serialization(e)) => {
            log::warn!("Ignoring malformed '{}': {}", key, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
