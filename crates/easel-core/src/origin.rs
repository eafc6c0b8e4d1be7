//! Cross-origin request planning and the shared cache-busted locator map.
//!
//! A cross-origin image only exposes its pixels when it was fetched in
//! anonymous CORS mode. A response already sitting in the browser cache may
//! lack the `Access-Control-Allow-Origin` header, so the first request for a
//! cross-origin locator gets a unique query parameter. The augmented form is
//! remembered and reused for every later load of the same locator.

use crate::config::ImageConfig;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use url::Url;
use web_time::{SystemTime, UNIX_EPOCH};

static SHARED: LazyLock<SourceCache> = LazyLock::new(SourceCache::new);

/// Map of original locator → cache-busted locator.
///
/// Cloning yields another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct SourceCache {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl SourceCache {
    /// An independent, empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn shared() -> Self {
        SHARED.clone()
    }

    /// Look up `locator`, inserting `make()` on first use.
    pub fn get_or_insert_with(&self, locator: &str, make: impl FnOnce() -> String) -> String {
        let mut map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(locator.to_string()).or_insert_with(make).clone()
    }

    pub fn get(&self, locator: &str) -> Option<String> {
        let map = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        map.get(locator).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Where and how to fetch a locator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Locator actually handed to the image decoder.
    pub src: String,
    /// Request with anonymous cross-origin credentials.
    pub cross_origin: bool,
}

/// Decides cross-origin mode for locators relative to the hosting page.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    page: Option<Url>,
    cache: SourceCache,
    cache_bust_param: String,
}

impl OriginPolicy {
    /// Policy with no page URL: every locator is fetched as same-origin.
    pub fn same_origin() -> Self {
        Self {
            page: None,
            cache: SourceCache::new(),
            cache_bust_param: ImageConfig::default().cache_bust_param,
        }
    }

    pub fn new(page_url: &str, cache: SourceCache) -> Self {
        let page = match Url::parse(page_url) {
            Ok(url) => Some(url),
            Err(e) => {
                log::warn!(
                    "page URL {page_url:?} is not absolute ({e}); treating images as same-origin"
                );
                None
            }
        };
        Self {
            page,
            cache,
            cache_bust_param: ImageConfig::default().cache_bust_param,
        }
    }

    pub fn from_config(config: &ImageConfig, cache: SourceCache) -> Self {
        let mut policy = match config.page_url.as_deref() {
            Some(page) => Self::new(page, cache),
            None => Self {
                cache,
                ..Self::same_origin()
            },
        };
        policy.cache_bust_param = config.cache_bust_param.clone();
        policy
    }

    pub fn cache(&self) -> &SourceCache {
        &self.cache
    }

    /// Whether `locator` resolves to an origin other than the page's.
    pub fn is_cross_origin(&self, locator: &str) -> bool {
        let Some(page) = &self.page else {
            return false;
        };
        match page.join(locator) {
            Ok(target) => target.origin() != page.origin(),
            Err(_) => false,
        }
    }

    /// Plan the request for `locator`.
    pub fn resolve(&self, locator: &str) -> ResolvedSource {
        if !self.is_cross_origin(locator) {
            return ResolvedSource {
                src: locator.to_string(),
                cross_origin: false,
            };
        }
        let src = self.cache.get_or_insert_with(locator, || {
            let busted = cache_busted(locator, &self.cache_bust_param, unix_millis());
            log::debug!("cross-origin image {locator} will be fetched as {busted}");
            busted
        });
        ResolvedSource {
            src,
            cross_origin: true,
        }
    }
}

fn cache_busted(locator: &str, param: &str, stamp: u128) -> String {
    let sep = if locator.contains('?') { '&' } else { '?' };
    format!("{locator}{sep}{param}={stamp}")
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
