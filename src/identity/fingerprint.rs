//! Emulated client fingerprints.
//!
//! A fingerprint tied to an authenticated identity must not change between
//! requests, so it is derived from a hash of the identity id. Sessions without
//! an identity get a random one.

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::scrapers::IMPERSONATE_USER_AGENTS;

const VIEWPORTS: &[(u32, u32)] = &[
    (1920, 1080),
    (1536, 864),
    (1440, 900),
    (1366, 768),
    (1680, 1050),
    (2560, 1440),
];

const GPUS: &[(&str, &str)] = &[
    ("Intel Inc.", "Intel Iris OpenGL Engine"),
    (
        "Google Inc. (NVIDIA)",
        "ANGLE (NVIDIA, NVIDIA GeForce GTX 1660 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    (
        "Google Inc. (Intel)",
        "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
    ("Apple Inc.", "Apple M1"),
    (
        "Google Inc. (AMD)",
        "ANGLE (AMD, AMD Radeon RX 580 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    ),
];

const TIMEZONES: &[&str] = &[
    "America/New_York",
    "America/Chicago",
    "America/Denver",
    "America/Los_Angeles",
    "Europe/London",
];

const LANGUAGES: &[&str] = &["en-US", "en-GB"];

/// Client characteristics a browser session presents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub timezone: String,
    pub language: String,
    pub platform: String,
}

impl Fingerprint {
    /// Stable fingerprint for an identity id.
    pub fn for_identity(id: &str) -> Self {
        let digest = Sha256::digest(id.as_bytes());
        Self::from_indices(|slot, len| digest[slot] as usize % len)
    }

    /// Fresh fingerprint for a session without stored credentials.
    pub fn random() -> Self {
        let mut rng = rand::rng();
        Self::from_indices(|_, len| rng.random_range(0..len))
    }

    fn from_indices(mut pick: impl FnMut(usize, usize) -> usize) -> Self {
        let user_agent = IMPERSONATE_USER_AGENTS[pick(0, IMPERSONATE_USER_AGENTS.len())];
        let viewport = VIEWPORTS[pick(1, VIEWPORTS.len())];
        let (vendor, renderer) = GPUS[pick(2, GPUS.len())];
        let timezone = TIMEZONES[pick(3, TIMEZONES.len())];
        let language = LANGUAGES[pick(4, LANGUAGES.len())];

        Self {
            user_agent: user_agent.to_string(),
            viewport,
            webgl_vendor: vendor.to_string(),
            webgl_renderer: renderer.to_string(),
            timezone: timezone.to_string(),
            language: language.to_string(),
            platform: platform_for(user_agent).to_string(),
        }
    }
}

/// `navigator.platform` consistent with the user agent.
fn platform_for(user_agent: &str) -> &'static str {
    if user_agent.contains("Windows") {
        "Win32"
    } else if user_agent.contains("Macintosh") {
        "MacIntel"
    } else {
        "Linux x86_64"
    }
}
