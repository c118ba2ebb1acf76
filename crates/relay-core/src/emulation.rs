//! Browser TLS/JA3/HTTP2 fingerprint emulation for the upstream client.
//!
//! Standard Rust HTTP clients produce unique, easily identifiable TLS
//! fingerprints. The throttled fetch layer instead builds its client with
//! a `wreq-util` Chrome emulation profile so the ClientHello, header
//! order, and HTTP/2 settings match a real desktop Chrome on the actual
//! host OS (`en-US` locale, desktop device class — both properties of the
//! Chrome profiles).

use rand::seq::SliceRandom;
use wreq_util::{Emulation, EmulationOS, EmulationOption};

/// Desktop Chrome profiles to rotate across client builds.
///
/// Everything here is Chrome ≥ 110; mixing several versions keeps the
/// relay's population from sharing a single JA3.
const EMULATION_POOL: &[Emulation] = &[
    Emulation::Chrome131,
    Emulation::Chrome132,
    Emulation::Chrome133,
    Emulation::Chrome134,
    Emulation::Chrome135,
    Emulation::Chrome136,
    Emulation::Chrome137,
];

/// Map the compile-time host OS to the emulated OS.
///
/// darwin → macOS, linux → Linux, windows → Windows, anything else falls
/// back to Windows (the most common desktop).
fn host_emulation_os() -> EmulationOS {
    if cfg!(target_os = "macos") {
        EmulationOS::MacOS
    } else if cfg!(target_os = "linux") {
        EmulationOS::Linux
    } else {
        EmulationOS::Windows
    }
}

/// Pick a Chrome profile at random, pinned to the host OS.
pub fn chrome_emulation() -> EmulationOption {
    let emulation =
        *EMULATION_POOL.choose(&mut rand::thread_rng()).expect("emulation pool is non-empty");
    EmulationOption::builder().emulation(emulation).emulation_os(host_emulation_os()).build()
}
