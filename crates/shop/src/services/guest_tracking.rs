//! Visitor tracking.
//!
//! Derives the guest's language, operating system and browser from request
//! headers. Operating system and browser names are resolved to ids in small
//! reference tables; the ids are cached in process since the tables only
//! ever grow.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use regex::Regex;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{debug, instrument};

use thirtybees_core::{
    CustomerId, GuestId, ObjectModel, OperatingSystemId, ShopContext, WebBrowserId,
};

use crate::db::{GuestRepository, RepositoryError};
use crate::models::guest::Guest;

// =============================================================================
// Header Parsing
// =============================================================================

static ACCEPT_LANGUAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([a-z]{2}(-[a-z]{2})?)\s*(;\s*q\s*=\s*(1|0\.[0-9]+))?")
        .expect("valid accept-language pattern")
});

/// Operating systems in match order: the first substring found wins.
pub const OPERATING_SYSTEMS: &[(&str, &str)] = &[
    ("Windows 10", "Windows NT 10"),
    ("Windows 8.1", "Windows NT 6.3"),
    ("Windows 8", "Windows NT 6.2"),
    ("Windows 7", "Windows NT 6.1"),
    ("Windows Vista", "Windows NT 6.0"),
    ("Windows XP", "Windows NT 5"),
    ("MacOsX", "Mac OS X"),
    ("Android", "Android"),
    ("Linux", "X11"),
];

/// Browsers in match order: the first substring found wins.
pub const BROWSERS: &[(&str, &str)] = &[
    ("Chrome", "Chrome/"),
    ("Safari", "Safari"),
    ("Safari iPad", "iPad"),
    ("Firefox", "Firefox/"),
    ("Opera", "Opera"),
    ("IE 11", "Trident"),
    ("IE 10", "MSIE 10"),
    ("IE 9", "MSIE 9"),
    ("IE 8", "MSIE 8"),
    ("IE 7", "MSIE 7"),
    ("IE 6", "MSIE 6"),
];

/// Lowercase fragments of crawler user agents.
const CRAWLERS: &[&str] = &[
    "bot",
    "crawl",
    "spider",
    "slurp",
    "facebookexternalhit",
    "mediapartners",
    "bingpreview",
    "yandex",
    "baiduspider",
];

/// Fragments of mobile user agents.
const MOBILES: &[&str] = &[
    "Mobile",
    "Android",
    "iPhone",
    "iPod",
    "BlackBerry",
    "Opera Mini",
    "IEMobile",
    "Windows Phone",
];

/// Highest weighted language tag of an `Accept-Language` header.
///
/// Tags without a `q` weight count as 1. When several tags share the best
/// weight the one listed first wins. A tag listed twice keeps its first
/// position and its last weight. Returns an empty string when no tag
/// matches.
#[must_use]
pub fn preferred_language(accept_language: &str) -> String {
    let mut tags: Vec<(&str, f64)> = Vec::new();

    for caps in ACCEPT_LANGUAGE.captures_iter(accept_language) {
        let Some(tag) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };
        let weight = caps
            .get(4)
            .and_then(|q| q.as_str().parse::<f64>().ok())
            .unwrap_or(1.0);

        match tags.iter_mut().find(|(t, _)| *t == tag) {
            Some(entry) => entry.1 = weight,
            None => tags.push((tag, weight)),
        }
    }

    let mut best: Option<(&str, f64)> = None;
    for (tag, weight) in tags {
        if best.is_none_or(|(_, w)| weight > w) {
            best = Some((tag, weight));
        }
    }
    best.map(|(tag, _)| tag.to_owned()).unwrap_or_default()
}

fn first_match(
    user_agent: &str,
    table: &'static [(&'static str, &'static str)],
) -> Option<&'static str> {
    table
        .iter()
        .find(|(_, needle)| user_agent.contains(needle))
        .map(|(name, _)| *name)
}

/// Operating system name of a user agent.
#[must_use]
pub fn detect_operating_system(user_agent: &str) -> Option<&'static str> {
    first_match(user_agent, OPERATING_SYSTEMS)
}

/// Browser name of a user agent.
#[must_use]
pub fn detect_browser(user_agent: &str) -> Option<&'static str> {
    first_match(user_agent, BROWSERS)
}

/// Whether the user agent belongs to a crawler.
#[must_use]
pub fn is_crawler(user_agent: &str) -> bool {
    let lower = user_agent.to_lowercase();
    CRAWLERS.iter().any(|c| lower.contains(c))
}

/// Whether the user agent belongs to a mobile device.
#[must_use]
pub fn is_mobile(user_agent: &str) -> bool {
    MOBILES.iter().any(|m| user_agent.contains(m))
}

// =============================================================================
// Reference Cache
// =============================================================================

/// In-process cache of operating system and browser ids.
#[derive(Clone)]
pub struct ReferenceCache {
    inner: Arc<ReferenceCacheInner>,
}

struct ReferenceCacheInner {
    operating_systems: Cache<&'static str, OperatingSystemId>,
    browsers: Cache<&'static str, WebBrowserId>,
}

impl ReferenceCache {
    #[must_use]
    pub fn new() -> Self {
        fn build<V: Clone + Send + Sync + 'static>() -> Cache<&'static str, V> {
            Cache::builder()
                .max_capacity(64)
                .time_to_idle(Duration::from_secs(3600))
                .build()
        }

        Self {
            inner: Arc::new(ReferenceCacheInner {
                operating_systems: build(),
                browsers: build(),
            }),
        }
    }

    async fn operating_system_id(
        &self,
        repo: &GuestRepository<'_>,
        name: &'static str,
    ) -> Result<OperatingSystemId, RepositoryError> {
        if let Some(id) = self.inner.operating_systems.get(&name).await {
            debug!(name, "Cache hit for operating system");
            return Ok(id);
        }
        let id = repo.operating_system_id(name).await?;
        self.inner.operating_systems.insert(name, id).await;
        Ok(id)
    }

    async fn web_browser_id(
        &self,
        repo: &GuestRepository<'_>,
        name: &'static str,
    ) -> Result<WebBrowserId, RepositoryError> {
        if let Some(id) = self.inner.browsers.get(&name).await {
            debug!(name, "Cache hit for browser");
            return Ok(id);
        }
        let id = repo.web_browser_id(name).await?;
        self.inner.browsers.insert(name, id).await;
        Ok(id)
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tracker
// =============================================================================

/// Headers used to describe a visitor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitorRequest {
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: String,
}

/// Creates and maintains guest records.
pub struct GuestTracker<'a> {
    repo: GuestRepository<'a>,
    cache: &'a ReferenceCache,
}

impl<'a> GuestTracker<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, shops: &'a ShopContext, cache: &'a ReferenceCache) -> Self {
        Self {
            repo: GuestRepository::new(pool, shops),
            cache,
        }
    }

    /// Guest record of a customer; `None` for zero or unknown customers.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn from_customer(
        &self,
        customer: Option<CustomerId>,
    ) -> Result<Option<GuestId>, RepositoryError> {
        match customer {
            Some(customer) => self.repo.guest_of_customer(customer).await,
            None => Ok(None),
        }
    }

    /// Fill the header-derived fields of `guest`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a reference id cannot be resolved.
    pub async fn apply_user_agent(
        &self,
        guest: &mut Guest,
        request: &VisitorRequest,
    ) -> Result<(), RepositoryError> {
        guest.accept_language = preferred_language(&request.accept_language);

        guest.operating_system_id = match detect_operating_system(&request.user_agent) {
            Some(name) => Some(self.cache.operating_system_id(&self.repo, name).await?),
            None => None,
        };
        guest.web_browser_id = match detect_browser(&request.user_agent) {
            Some(name) => Some(self.cache.web_browser_id(&self.repo, name).await?),
            None => None,
        };
        guest.mobile_theme = is_mobile(&request.user_agent);
        Ok(())
    }

    /// Record a visit and return the visitor's guest id.
    ///
    /// Crawlers are not tracked. A known customer reuses their guest record.
    /// A guest created for a logged-in customer is bound to that customer
    /// straight away, so their next visit finds it through
    /// [`from_customer`](Self::from_customer).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the guest cannot be read or saved.
    #[instrument(skip(self, request))]
    pub async fn track(
        &self,
        request: &VisitorRequest,
        customer: Option<CustomerId>,
        now: DateTime<Utc>,
    ) -> Result<Option<GuestId>, RepositoryError> {
        if is_crawler(&request.user_agent) {
            debug!("Crawler ignored");
            return Ok(None);
        }

        let mut guest = match self.from_customer(customer).await? {
            Some(id) => self.repo.get_by_id(id).await?.unwrap_or_default(),
            None => Guest::new(),
        };
        if guest.customer_id.is_none() {
            guest.customer_id = customer.filter(CustomerId::is_valid);
        }

        self.apply_user_agent(&mut guest, request).await?;
        let id = self.repo.save(&mut guest, now).await?;

        tracing::info!(guest_id = %id, "Guest tracked");
        Ok(Some(id))
    }

    /// Fold `guest` into the customer's existing guest record.
    ///
    /// Connections move to `target`, `guest` is deleted and its values are
    /// written onto `target` together with the customer id. Nothing is
    /// written unless every step succeeds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if `guest` has no id or `target`
    /// does not exist.
    /// Returns `RepositoryError::Conflict` if `target` is `guest` itself.
    /// Returns `RepositoryError` if a statement fails.
    #[instrument(skip(self, guest), fields(guest_id = ?guest.id()))]
    pub async fn merge_with_customer(
        &self,
        guest: Guest,
        target: GuestId,
        customer: CustomerId,
        now: DateTime<Utc>,
    ) -> Result<Guest, RepositoryError> {
        let current = guest.id().ok_or(RepositoryError::NotFound)?;

        let mut merged = guest.rebind(target);
        merged.customer_id = Some(customer);
        let moved = self.repo.merge_into(current, &merged, now).await?;

        tracing::info!(%target, moved, "Guest merged into customer guest");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_2) AppleWebKit/605.1.15 \
        (KHTML, like Gecko) Version/17.2 Safari/605.1.15";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const IE_11: &str = "Mozilla/5.0 (Windows NT 6.1; Trident/7.0; rv:11.0) like Gecko";
    const GOOGLEBOT: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_preferred_language_highest_weight() {
        assert_eq!(preferred_language("fr;q=0.5, de;q=0.8, en;q=0.3"), "de");
    }

    #[test]
    fn test_preferred_language_missing_weight_is_one() {
        assert_eq!(preferred_language("en;q=0.9, fr"), "fr");
    }

    #[test]
    fn test_preferred_language_ties_keep_order() {
        assert_eq!(preferred_language("nl, de, fr"), "nl");
        assert_eq!(preferred_language("it;q=0.7, es;q=0.7"), "it");
    }

    #[test]
    fn test_preferred_language_with_region() {
        assert_eq!(preferred_language("pt-br;q=0.9, pt;q=0.8"), "pt-br");
    }

    #[test]
    fn test_preferred_language_repeated_tag_takes_last_weight() {
        // "en-US" only matches "en" (uppercase region); the later "en;q=0.9"
        // overrides its weight and "fr" wins.
        assert_eq!(preferred_language("en-US, fr, en;q=0.9"), "fr");
    }

    #[test]
    fn test_preferred_language_empty() {
        assert_eq!(preferred_language(""), "");
        assert_eq!(preferred_language("*"), "");
    }

    #[test]
    fn test_detect_operating_system() {
        assert_eq!(detect_operating_system(CHROME_WINDOWS), Some("Windows 10"));
        assert_eq!(detect_operating_system(SAFARI_MAC), Some("MacOsX"));
        assert_eq!(detect_operating_system(FIREFOX_LINUX), Some("Linux"));
        assert_eq!(detect_operating_system(IE_11), Some("Windows 7"));
        assert_eq!(detect_operating_system("Windows NT 5.1"), Some("Windows XP"));
        assert_eq!(detect_operating_system("unknown"), None);
    }

    #[test]
    fn test_detect_browser_first_match_wins() {
        // Chrome's user agent also mentions Safari; Chrome is checked first.
        assert_eq!(detect_browser(CHROME_WINDOWS), Some("Chrome"));
        assert_eq!(detect_browser(SAFARI_MAC), Some("Safari"));
        assert_eq!(detect_browser(FIREFOX_LINUX), Some("Firefox"));
        assert_eq!(detect_browser(IE_11), Some("IE 11"));
        assert_eq!(detect_browser("Mozilla/4.0 (compatible; MSIE 8.0)"), Some("IE 8"));
        assert_eq!(detect_browser("Mozilla/5.0 (iPad; CPU OS 9_0)"), Some("Safari iPad"));
        assert_eq!(detect_browser("curl/8.0"), None);
    }

    #[test]
    fn test_is_crawler() {
        assert!(is_crawler(GOOGLEBOT));
        assert!(is_crawler("Mozilla/5.0 (compatible; YandexBot/3.0)"));
        assert!(!is_crawler(CHROME_WINDOWS));
    }

    #[test]
    fn test_is_mobile() {
        assert!(is_mobile(
            "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile/15E148"
        ));
        assert!(is_mobile("Mozilla/5.0 (Linux; Android 14; Pixel 8)"));
        assert!(!is_mobile(FIREFOX_LINUX));
    }

    #[tokio::test]
    async fn test_reference_cache_starts_empty() {
        let cache = ReferenceCache::new();
        assert!(cache.inner.operating_systems.get(&"Linux").await.is_none());
        cache
            .inner
            .browsers
            .insert("Chrome", WebBrowserId::new(1))
            .await;
        assert_eq!(
            cache.inner.browsers.get(&"Chrome").await,
            Some(WebBrowserId::new(1))
        );
    }
}
