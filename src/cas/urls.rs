//! URLs exchanged with the browser during login and logout.

use std::collections::BTreeMap;

use url::{Url, form_urlencoded};

use super::client::{CasClientError, base_url};
use crate::config::{CasConfig, is_relative_path};

/// Query parameter carrying the post-login destination.
pub const NEXT_PARAM: &str = "next";

#[derive(Debug, Clone)]
pub struct CasUrls {
    server_url: Url,
    service_base: String,
    service_root: Url,
    service_origin: url::Origin,
    login_path: String,
    redirect_url: String,
    ignore_referer: bool,
    extra_login_params: BTreeMap<String, String>,
}

impl CasUrls {
    pub fn new(config: &CasConfig) -> Result<Self, CasClientError> {
        let service = Url::parse(&config.service_base_url).map_err(|e| {
            CasClientError::InvalidServerUrl {
                url: config.service_base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            server_url: base_url(&config.server_url)?,
            service_base: config.service_base_url.trim_end_matches('/').to_string(),
            service_origin: service.origin(),
            service_root: service,
            login_path: config.login_path.clone(),
            redirect_url: config.redirect_url.clone(),
            ignore_referer: config.ignore_referer,
            extra_login_params: config.extra_login_params.clone(),
        })
    }

    /// CAS login page for `service`, with any configured extra parameters.
    pub fn login_url(&self, service: &str) -> String {
        let mut url = self.cas_endpoint("login");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("service", service);
            for (key, value) in &self.extra_login_params {
                query.append_pair(key, value);
            }
        }
        url.into()
    }

    /// CAS logout page. With `next`, the CAS server is asked to send the
    /// user back to that path on this service afterwards.
    pub fn logout_url(&self, next: Option<&str>) -> String {
        let mut url = self.cas_endpoint("logout");
        if let Some(next) = next {
            url.query_pairs_mut()
                .append_pair("url", &format!("{}{}", self.service_base, next));
        }
        url.into()
    }

    /// Absolute URL of `path` on this service, with `next` as a query
    /// parameter when given.
    pub fn service_url(&self, path: &str, next: Option<&str>) -> String {
        let service = format!("{}{}", self.service_base, path);
        match next {
            None => service,
            Some(next) => {
                let separator = if service.contains('?') { '&' } else { '?' };
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(NEXT_PARAM, next)
                    .finish();
                format!("{service}{separator}{query}")
            }
        }
    }

    /// Service URL of the login route, as registered with the CAS server.
    pub fn login_service_url(&self, next: Option<&str>) -> String {
        self.service_url(&self.login_path, next)
    }

    /// Where to send the user once login or logout is done.
    ///
    /// An explicit `next` wins, then the Referer (unless ignored), then the
    /// configured default. Anything that would leave this service is
    /// replaced by the default. The result is the path and query as parsed
    /// against the service URL, so it is always percent-encoded ASCII.
    pub fn redirect_target(&self, next: Option<&str>, referer: Option<&str>) -> String {
        let candidate = match next.filter(|n| !n.is_empty()) {
            Some(next) => Some(next.to_string()),
            None if self.ignore_referer => None,
            None => referer.and_then(|r| self.referer_path(r)),
        };
        let Some(candidate) = candidate else {
            return self.redirect_url.clone();
        };
        match self.local_target(&candidate) {
            Some(target) => target,
            None => {
                tracing::debug!(redirect = ?candidate, "Ignoring off-site redirect target");
                self.redirect_url.clone()
            }
        }
    }

    /// `target` resolved against this service, if it stays on its origin.
    fn local_target(&self, target: &str) -> Option<String> {
        if !is_relative_path(target) {
            return None;
        }
        let url = self.service_root.join(target).ok()?;
        if url.origin() != self.service_origin {
            return None;
        }
        let resolved = path_and_query(&url);
        // The parser may collapse a path into `//host`; never emit one.
        is_relative_path(&resolved).then_some(resolved)
    }

    /// Path and query of a Referer pointing at this service.
    fn referer_path(&self, referer: &str) -> Option<String> {
        if referer.starts_with('/') {
            return Some(referer.to_string());
        }
        let url = Url::parse(referer).ok()?;
        (url.origin() == self.service_origin).then(|| path_and_query(&url))
    }

    fn cas_endpoint(&self, path: &str) -> Url {
        self.server_url
            .join(path)
            .unwrap_or_else(|_| self.server_url.clone())
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::cas::tests::test_config;

    fn urls() -> CasUrls {
        CasUrls::new(&test_config("https://sso.example.edu/cas")).unwrap()
    }

    #[test]
    fn test_login_url() {
        let mut config = test_config("https://sso.example.edu/cas/");
        config.extra_login_params.insert("renew".into(), "true".into());
        let urls = CasUrls::new(&config).unwrap();

        assert_eq!(
            urls.login_url("https://app.example.edu/cas/login?next=%2Fa"),
            "https://sso.example.edu/cas/login?service=https%3A%2F%2Fapp.example.edu%2Fcas%2Flogin%3Fnext%3D%252Fa&renew=true"
        );
    }

    #[test]
    fn test_logout_url() {
        let urls = urls();
        assert_eq!(urls.logout_url(None), "https://sso.example.edu/cas/logout");
        assert_eq!(
            urls.logout_url(Some("/bye")),
            "https://sso.example.edu/cas/logout?url=https%3A%2F%2Fapp.example.edu%2Fbye"
        );
    }

    #[test]
    fn test_service_url() {
        let urls = urls();
        assert_eq!(
            urls.service_url("/cas/login", None),
            "https://app.example.edu/cas/login"
        );
        assert_eq!(
            urls.service_url("/cas/login", Some("/reports?y=2024")),
            "https://app.example.edu/cas/login?next=%2Freports%3Fy%3D2024"
        );
        assert_eq!(
            urls.service_url("/cas/login?gateway=1", Some("/")),
            "https://app.example.edu/cas/login?gateway=1&next=%2F"
        );
        assert_eq!(urls.login_service_url(None), "https://app.example.edu/cas/login");
    }

    #[rstest]
    #[case::next_wins(Some("/inbox"), Some("/from-referer"), "/inbox")]
    #[case::relative_referer(None, Some("/from-referer"), "/from-referer")]
    #[case::same_origin_referer(None, Some("https://app.example.edu/page?x=1"), "/page?x=1")]
    #[case::foreign_referer(None, Some("https://evil.example/page"), "/")]
    #[case::absolute_next(Some("https://evil.example/"), None, "/")]
    #[case::protocol_relative_next(Some("//evil.example/"), None, "/")]
    #[case::empty_next(Some(""), None, "/")]
    #[case::tab_next(Some("/\t/evil.example"), None, "/")]
    #[case::newline_next(Some("/\n/evil.example"), None, "/")]
    #[case::carriage_return_next(Some("/\r/evil.example"), None, "/")]
    #[case::double_slash_referer(None, Some("https://app.example.edu//evil.example/x"), "/")]
    #[case::tab_referer(None, Some("/\t/evil.example"), "/")]
    #[case::dot_segments(Some("/a/../b?c=d"), None, "/b?c=d")]
    #[case::non_ascii_encoded(Some("/caf\u{e9}"), None, "/caf%C3%A9")]
    #[case::nothing(None, None, "/")]
    fn test_redirect_target(
        #[case] next: Option<&str>,
        #[case] referer: Option<&str>,
        #[case] expected: &str,
    ) {
        assert_eq!(urls().redirect_target(next, referer), expected);
    }

    #[test]
    fn test_redirect_target_ignores_referer_when_configured() {
        let mut config = test_config("https://sso.example.edu/cas/");
        config.ignore_referer = true;
        config.redirect_url = "/home".into();
        let urls = CasUrls::new(&config).unwrap();

        assert_eq!(urls.redirect_target(None, Some("/from-referer")), "/home");
        assert_eq!(urls.redirect_target(Some("/inbox"), Some("/from-referer")), "/inbox");
    }
}
