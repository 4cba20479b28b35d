use url::Url;

/// Normalize a URL so trivially different spellings share one cache key
///
/// Lowercases the host, drops default ports, a bare trailing slash and the
/// fragment, and sorts query parameters by key. Unparseable input is returned
/// unchanged.
pub fn normalize_url(url: &str) -> String {
    let mut normalized = match Url::parse(url.trim()) {
        Ok(url) => url,
        Err(_) => return url.to_string(),
    };

    // The url crate already lowercases hosts and drops default ports on
    // special schemes; re-apply the port rule for explicit ones.
    if let Some(port) = normalized.port() {
        if (normalized.scheme() == "http" && port == 80)
            || (normalized.scheme() == "https" && port == 443)
        {
            let _ = normalized.set_port(None);
        }
    }

    normalized.set_fragment(None);

    if let Some(query) = normalized.query() {
        if query.is_empty() {
            normalized.set_query(None);
        } else {
            let mut params: Vec<(&str, &str)> = query
                .split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
                .collect();
            params.sort_by(|a, b| a.0.cmp(b.0));

            let sorted = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            normalized.set_query(Some(&sorted));
        }
    }

    let mut out = normalized.to_string();
    if normalized.path() == "/" && normalized.query().is_none() {
        out.pop();
    }
    out
}

/// `{scheme}://{host}[:port]` of a URL, if it has one
pub fn origin(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

/// Whether the string is an absolute http(s) URL
pub fn is_http_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        // Host case
        assert_eq!(
            normalize_url("https://EXAMPLE.com/path"),
            "https://example.com/path"
        );

        // Default port
        assert_eq!(
            normalize_url("https://example.com:443/path"),
            "https://example.com/path"
        );

        // Trailing slash on the root
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");

        // Query order
        assert_eq!(
            normalize_url("https://example.com/search?b=2&a=1"),
            "https://example.com/search?a=1&b=2"
        );

        // Fragment
        assert_eq!(
            normalize_url("https://example.com/page#section"),
            "https://example.com/page"
        );

        assert_eq!(normalize_url("not a url"), "not a url");
    }

    #[test]
    fn test_equivalent_spellings_collide() {
        assert_eq!(
            normalize_url("HTTPS://Example.com:443/?b=2&a=1#top"),
            normalize_url("https://example.com/?a=1&b=2")
        );
    }

    #[test]
    fn test_origin_and_scheme_check() {
        let url = Url::parse("http://localhost:8080/a/b?c").unwrap();
        assert_eq!(origin(&url).as_deref(), Some("http://localhost:8080"));

        let url = Url::parse("https://example.com/x").unwrap();
        assert_eq!(origin(&url).as_deref(), Some("https://example.com"));

        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }
}
