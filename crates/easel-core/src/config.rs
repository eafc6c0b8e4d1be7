//! Image loading configuration.

use serde::Deserialize;

/// Configuration shared by every image surface of a host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Query parameter appended to cross-origin locators on first use so the
    /// request bypasses any cached response lacking CORS headers.
    /// Default: **"time"**.
    pub cache_bust_param: String,

    /// URL of the hosting page. Locators resolving to another origin are
    /// requested in anonymous cross-origin mode. `None` treats every locator
    /// as same-origin.
    pub page_url: Option<String>,

    /// Build the pixel buffer after each load. Display-only hosts can turn
    /// this off to skip the offscreen copy. Default: **true**.
    pub materialize_pixels: bool,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cache_bust_param: "time".to_string(),
            page_url: None,
            materialize_pixels: true,
        }
    }
}
