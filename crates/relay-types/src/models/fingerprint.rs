//! Device fingerprint types for account isolation.
//!
//! Each account carries a synthetic device identity: a stable set of
//! identifiers and a browser-like User-Agent that make all requests from
//! one account look like they come from one editor install on one machine.
//! The generation logic lives in `relay-core`; these are the persisted
//! shapes.

use serde::{Deserialize, Serialize};

/// Cap on per-account fingerprint history entries.
pub const MAX_FINGERPRINT_HISTORY: usize = 5;

/// Platform reported in client metadata, matching the upstream enum values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FingerprintPlatform {
    /// Unknown or intentionally unreported platform.
    #[serde(rename = "PLATFORM_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "WINDOWS")]
    Windows,
    #[serde(rename = "LINUX")]
    Linux,
    #[serde(rename = "MACOS")]
    Macos,
}

/// CPU architecture reported in client metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    X64,
    Arm64,
}

/// Editor client metadata sent as the JSON `Client-Metadata` header.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    /// IDE identifier (e.g. `IDE_UNSPECIFIED`, `VSCODE`)
    pub ide_type: String,
    pub platform: FingerprintPlatform,
    /// Plugin identifier (e.g. `CLOUD_CODE`)
    pub plugin_type: String,
    /// OS version string consistent with the User-Agent
    pub os_version: String,
    pub arch: Arch,
    /// SQM telemetry ID in `{UUID}` format (uppercase, braces)
    pub sqm_id: String,
}

/// A synthetic device identity bound to one account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceFingerprint {
    /// Device ID (UUID v4)
    pub device_id: String,

    /// Session token: 16 random bytes, hex-encoded
    pub session_token: String,

    /// Browser-like User-Agent embedding OS, editor, and engine versions
    pub user_agent: String,

    /// Upstream SDK identifier for the `X-Goog-Api-Client` header
    pub api_client: String,

    /// Opaque per-device quota key: `device-<16 hex>`
    pub quota_user: String,

    pub client_metadata: ClientMetadata,

    /// Creation timestamp (epoch ms)
    pub created_at: i64,
}

/// Why a fingerprint was moved into history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintReason {
    /// Replaced by a freshly generated fingerprint
    Regenerated,
    /// Replaced by an older fingerprint pulled back from history
    Restored,
    /// Retired because the upstream flagged it
    Invalidated,
}

/// Historical fingerprint entry for rollback support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FingerprintRecord {
    pub fingerprint: DeviceFingerprint,
    pub reason: FingerprintReason,
    /// When the fingerprint was retired (epoch ms)
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_fingerprint() -> DeviceFingerprint {
        DeviceFingerprint {
            device_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
            session_token: "a1b2c3d4e5f60718293a4b5c6d7e8f90".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) \
                         Code/1.96.2 Chrome/128.0.6613.186 Electron/32.2.6 Safari/537.36"
                .to_string(),
            api_client: "gl-node/20.11.0".to_string(),
            quota_user: "device-a1b2c3d4e5f60718".to_string(),
            client_metadata: ClientMetadata {
                ide_type: "IDE_UNSPECIFIED".to_string(),
                platform: FingerprintPlatform::Linux,
                plugin_type: "CLOUD_CODE".to_string(),
                os_version: "6.5.0".to_string(),
                arch: Arch::X64,
                sqm_id: "{770E8400-E29B-41D4-A716-446655440002}".to_string(),
            },
            created_at: 1_760_000_000_000,
        }
    }

    #[test]
    fn fingerprint_roundtrip() {
        let fp = sample_fingerprint();
        let json = serde_json::to_string(&fp).unwrap();
        let parsed: DeviceFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(fp, parsed);
    }

    #[test]
    fn fingerprint_uses_camel_case_keys() {
        let json = serde_json::to_value(sample_fingerprint()).unwrap();
        assert!(json.get("deviceId").is_some());
        assert!(json.get("sessionToken").is_some());
        assert!(json.get("quotaUser").is_some());
        assert_eq!(json["clientMetadata"]["platform"], "LINUX");
        assert_eq!(json["clientMetadata"]["arch"], "x64");
    }

    #[test]
    fn history_reason_serializes_lowercase() {
        let record = FingerprintRecord {
            fingerprint: sample_fingerprint(),
            reason: FingerprintReason::Regenerated,
            timestamp: 1_760_000_000_000,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reason"], "regenerated");
    }
}
