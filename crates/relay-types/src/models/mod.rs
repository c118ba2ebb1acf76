//! Data models shared across the relay.

mod account;
mod fingerprint;
mod quota;
mod token;

pub use account::{Account, AccountSource, AccountStatus, SafeAccountView};
pub use fingerprint::{
    Arch, ClientMetadata, DeviceFingerprint, FingerprintPlatform, FingerprintReason,
    FingerprintRecord, MAX_FINGERPRINT_HISTORY,
};
pub use quota::{ModelQuota, Subscription, SubscriptionTier};
pub use token::CachedToken;
