//! Value pools drawn from when synthesizing records

use std::sync::LazyLock;

pub const EVENT_TYPES: &[&str] = &[
    "[CLY]_session",
    "[CLY]_view",
    "[CLY]_action",
    "[CLY]_crash",
    "[CLY]_star_rating",
    "[CLY]_push",
];

pub const CAMPAIGN_CHANNELS: &[&str] = &["Organic", "Direct", "Email", "Paid"];

/// Number of distinct session-group keys (`k0001` ..= `k8000`)
pub const SG_KEY_COUNT: usize = 8_000;

/// Session-group keys `k0001` ..= `k8000`
pub static SG_KEYS: LazyLock<Vec<String>> =
    LazyLock::new(|| (1..=SG_KEY_COUNT).map(|i| format!("k{:04}", i)).collect());

/// Single-pair customer properties
pub const CUSTOM_PROPERTIES: &[(&str, &str)] = &[
    ("Account Types", "Savings"),
    ("Account Types", "Investment"),
    ("Communication Preference", "Phone"),
    ("Communication Preference", "Email"),
    ("Credit Cards", "Premium"),
    ("Credit Cards", "Basic"),
    ("Customer Type", "Retail"),
    ("Customer Type", "Business"),
    ("Total Assets", "$0 - $50,000"),
    ("Total Assets", "$50,000 - $500,000"),
];

pub const LANGUAGE_CODES: &[&str] = &["en", "de", "fr", "es", "pt", "ru", "zh", "ja", "ko", "hi"];

pub const COUNTRY_CODES: &[&str] = &[
    "US", "DE", "FR", "ES", "PT", "RU", "CN", "JP", "KR", "IN", "GB", "CA", "AU", "BR", "MX",
];

pub const PLATFORMS: &[&str] = &["Macintosh", "Windows", "Linux", "iOS", "Android"];

pub const OS_NAMES: &[&str] = &["MacOS", "Windows", "Android", "iOS"];

pub const RESOLUTIONS: &[&str] = &["360x640", "768x1024", "1920x1080"];

pub const BROWSERS: &[&str] = &["Chrome", "Firefox", "Edge", "Safari"];

pub const SOURCES: &[&str] = &["MacOS", "Windows", "Android", "iOS", "Web"];

pub const SOURCE_CHANNELS: &[&str] = &["Direct", "Search", "Email", "Social"];

pub const VIEW_NAMES: &[&str] = &[
    "Settings",
    "Home",
    "Profile",
    "Dashboard",
    "ProductPage",
    "Checkout",
];

pub const SAMPLE_WORDS: &[&str] = &[
    "lorem",
    "ipsum",
    "dolor",
    "sit",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
];

pub const POSTFIXES: &[&str] = &["S", "V", "A"];

/// Placeholder for geo fields that are never resolved
pub const UNKNOWN: &str = "Unknown";
