//! Device fingerprint engine.
//!
//! Generates randomized synthetic device identities and the HTTP headers
//! that present them. A fingerprint is drawn fresh per generation — all
//! random fields independent — and stays stable for an account because
//! the pool persists it; per-account stability comes from storage, not
//! from seeding.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use uuid::Uuid;

use relay_types::models::{Arch, ClientMetadata, DeviceFingerprint, FingerprintPlatform};

/// Header name for the serialized client metadata.
pub const CLIENT_METADATA_HEADER: &str = "Client-Metadata";

/// Legacy User-Agent prefix from pre-rebrand installs.
const LEGACY_UA_PREFIX: &str = "antigravity/";

/// Host platforms a fingerprint can claim.
const PLATFORMS: &[&str] = &["darwin", "win32", "linux"];

/// Per-platform OS version pools (kept plausible and current-ish).
const DARWIN_VERSIONS: &[&str] = &["13.6.7", "14.4.1", "14.5", "15.1"];
const WINDOWS_VERSIONS: &[&str] = &["10.0.19045", "10.0.22621", "10.0.22631"];
const LINUX_VERSIONS: &[&str] = &["5.15.0", "6.5.0", "6.8.0"];

/// Editor release pool embedded as `Code/<version>` in the User-Agent.
const EDITOR_VERSIONS: &[&str] = &["1.93.1", "1.94.2", "1.95.3", "1.96.2"];

/// Chromium engine versions paired with the editor builds above.
const CHROME_VERSIONS: &[&str] =
    &["122.0.6261.156", "124.0.6367.243", "126.0.6478.234", "128.0.6613.186"];

/// Electron shell versions.
const ELECTRON_VERSIONS: &[&str] = &["29.4.6", "30.5.1", "32.2.6"];

/// Node runtimes reported in the API client string.
const NODE_VERSIONS: &[&str] = &["18.19.1", "20.11.1", "20.12.2"];

/// Auth library versions reported in the API client string.
const AUTH_VERSIONS: &[&str] = &["9.14.2", "9.15.0", "9.15.1"];

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
}

/// Produce a fully random fingerprint.
///
/// Platform is uniform over darwin/win32/linux; OS version and CPU
/// architecture are uniform over that platform's allowed sets; the
/// User-Agent follows the platform template.
pub fn generate() -> DeviceFingerprint {
    let mut rng = rand::thread_rng();

    let platform = *PLATFORMS.choose(&mut rng).expect("platform pool is non-empty");
    let (os_version, arch, metadata_platform) = match platform {
        "darwin" => (
            *DARWIN_VERSIONS.choose(&mut rng).expect("version pool"),
            *[Arch::X64, Arch::Arm64].choose(&mut rng).expect("arch pool"),
            FingerprintPlatform::Macos,
        ),
        "win32" => (
            *WINDOWS_VERSIONS.choose(&mut rng).expect("version pool"),
            *[Arch::X64, Arch::Arm64].choose(&mut rng).expect("arch pool"),
            FingerprintPlatform::Windows,
        ),
        _ => (
            *LINUX_VERSIONS.choose(&mut rng).expect("version pool"),
            Arch::X64,
            FingerprintPlatform::Linux,
        ),
    };

    let editor = *EDITOR_VERSIONS.choose(&mut rng).expect("editor pool");
    let chrome = *CHROME_VERSIONS.choose(&mut rng).expect("chrome pool");
    let electron = *ELECTRON_VERSIONS.choose(&mut rng).expect("electron pool");

    let user_agent = build_user_agent(platform, os_version, editor, chrome, electron);

    let node = *NODE_VERSIONS.choose(&mut rng).expect("node pool");
    let auth = *AUTH_VERSIONS.choose(&mut rng).expect("auth pool");

    let sqm_id = format!("{{{}}}", Uuid::new_v4().to_string().to_uppercase());

    DeviceFingerprint {
        device_id: Uuid::new_v4().to_string(),
        session_token: random_hex(32),
        user_agent,
        api_client: format!("gl-node/{node} auth/{auth}"),
        quota_user: format!("device-{}", random_hex(16)),
        client_metadata: ClientMetadata {
            ide_type: "IDE_UNSPECIFIED".to_string(),
            platform: metadata_platform,
            plugin_type: "CLOUD_CODE".to_string(),
            os_version: os_version.to_string(),
            arch,
            sqm_id,
        },
        created_at: chrono::Utc::now().timestamp_millis(),
    }
}

fn build_user_agent(
    platform: &str,
    os_version: &str,
    editor: &str,
    chrome: &str,
    electron: &str,
) -> String {
    let os_segment = match platform {
        "darwin" => {
            format!("Macintosh; Intel Mac OS X {}", os_version.replace('.', "_"))
        },
        "win32" => {
            // NT version is the first two components of the build string
            let nt: Vec<&str> = os_version.split('.').take(2).collect();
            format!("Windows NT {}; Win64; x64", nt.join("."))
        },
        _ => "X11; Linux x86_64".to_string(),
    };

    format!(
        "Mozilla/5.0 ({os_segment}) AppleWebKit/537.36 (KHTML, like Gecko) \
         Code/{editor} Chrome/{chrome} Electron/{electron} Safari/537.36"
    )
}

/// Assemble the outbound identity headers for a fingerprint.
///
/// Returns the empty map when no fingerprint is present.
pub fn build_headers(fingerprint: Option<&DeviceFingerprint>) -> HashMap<String, String> {
    let Some(fp) = fingerprint else {
        return HashMap::new();
    };

    let metadata_json = serde_json::to_string(&fp.client_metadata).unwrap_or_else(|_| "{}".into());

    HashMap::from([
        ("User-Agent".to_string(), fp.user_agent.clone()),
        ("X-Goog-Api-Client".to_string(), fp.api_client.clone()),
        (CLIENT_METADATA_HEADER.to_string(), metadata_json),
        ("X-Goog-QuotaUser".to_string(), fp.quota_user.clone()),
        ("X-Client-Device-Id".to_string(), fp.device_id.clone()),
    ])
}

/// Upgrade a fingerprint whose User-Agent predates the browser-style
/// format.
///
/// Legacy `antigravity/…` agents get a freshly generated User-Agent and
/// client metadata while keeping `device_id`, `session_token`,
/// `quota_user`, and `created_at` — the device identity survives the
/// upgrade. Anything else is returned unchanged.
pub fn update_version(fp: DeviceFingerprint) -> DeviceFingerprint {
    if !fp.user_agent.starts_with(LEGACY_UA_PREFIX) {
        return fp;
    }

    let fresh = generate();
    DeviceFingerprint {
        device_id: fp.device_id,
        session_token: fp.session_token,
        user_agent: fresh.user_agent,
        api_client: fresh.api_client,
        quota_user: fp.quota_user,
        client_metadata: fresh.client_metadata,
        created_at: fp.created_at,
    }
}
