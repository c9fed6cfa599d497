use std::{sync::Arc, time::Duration};

use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use regex::Regex;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Any Vercel preview deployment.
const PREVIEW_PATTERN: &str = r"^https://[\w-]+\.vercel\.app$";

pub struct OriginPolicy {
    exact: Vec<String>,
    preview: Regex,
}

impl OriginPolicy {
    pub fn new(origins: &[String]) -> Result<Self, regex::Error> {
        Ok(Self {
            exact: origins.to_vec(),
            preview: Regex::new(PREVIEW_PATTERN)?,
        })
    }

    /// Requests without an `Origin` (curl, same-origin) are always allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => {
                self.exact.iter().any(|allowed| allowed == origin) || self.preview.is_match(origin)
            }
        }
    }
}

pub fn cors_layer(policy: Arc<OriginPolicy>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| policy.allows(Some(origin)))
                .unwrap_or(false)
        }))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn policy() -> OriginPolicy {
        OriginPolicy::new(&Config::default().allowed_origins).unwrap()
    }

    #[test]
    fn test_known_origins() {
        let policy = policy();

        assert!(policy.allows(None));
        assert!(policy.allows(Some("http://localhost:3000")));
        assert!(policy.allows(Some("https://sproj-p08-silk.vercel.app")));
    }

    #[test]
    fn test_vercel_previews() {
        let policy = policy();

        assert!(policy.allows(Some("https://sproj-p08-git-feature-x.vercel.app")));
        assert!(!policy.allows(Some("http://preview.vercel.app")));
        assert!(!policy.allows(Some("https://a.b.vercel.app")));
        assert!(!policy.allows(Some("https://evil.vercel.app.attacker.com")));
    }

    #[test]
    fn test_rejects_others() {
        let policy = policy();

        assert!(!policy.allows(Some("http://localhost:3001")));
        assert!(!policy.allows(Some("https://example.com")));
        assert!(!policy.allows(Some("")));
    }
}
