use std::time::SystemTime;

use anyhow::{Result, anyhow};
use hyper::header::{HeaderMap, HeaderValue};
use tracing::{debug, warn};

/// Extract cookie value by name
pub fn get_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (name, value) = cookie.trim().split_once('=')?;
            if name.trim() == cookie_name {
                debug!("Cookie found: {}", cookie_name);
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .or_else(|| {
            debug!("Cookie not found: {}", cookie_name);
            None
        })
}

/// Set a cookie with options
pub fn set_cookie(
    name: &str,
    value: &str,
    expires: Option<SystemTime>,
    path: Option<&str>,
    http_only: bool,
    secure: bool,
) -> Result<HeaderValue> {
    let mut cookie = format!("{}={}", name, value);

    if let Some(at) = expires {
        cookie.push_str(&format!("; Expires={}", httpdate::fmt_http_date(at)));
    }

    if let Some(p) = path {
        cookie.push_str(&format!("; Path={}", p));
    }

    if http_only {
        cookie.push_str("; HttpOnly");
    }

    if secure {
        cookie.push_str("; Secure");
    }

    cookie.push_str("; SameSite=Strict");

    debug!("Setting cookie: {}", name);

    HeaderValue::from_str(&cookie).map_err(|e| {
        warn!("Failed to create cookie header for {}: {}", name, e);
        anyhow!("Invalid cookie value: {}", e)
    })
}

/// Allow the browser front-end at `origin` to call the API with credentials.
pub fn add_cors_headers<T>(res: &mut hyper::Response<T>, origin: &str) {
    let headers = res.headers_mut();

    match HeaderValue::from_str(origin) {
        Ok(value) => {
            headers.insert("access-control-allow-origin", value);
        }
        Err(e) => {
            warn!("Configured origin {:?} is not a valid header: {}", origin, e);
            return;
        }
    }
    headers.insert(
        "access-control-allow-credentials",
        HeaderValue::from_static("true"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
    headers.insert("vary", HeaderValue::from_static("origin"));
}

/// Add no-cache headers; API responses depend on the session.
pub fn add_no_cache_headers<T>(res: &mut hyper::Response<T>) {
    let headers = res.headers_mut();

    headers.insert(
        "cache-control",
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    fn with_cookie(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn cookie_is_found_among_others() {
        let headers = with_cookie("theme=dark; jwt=abc+/=; lang=en");
        assert_eq!(get_cookie(&headers, "jwt").as_deref(), Some("abc+/="));
        assert_eq!(get_cookie(&headers, "lang").as_deref(), Some("en"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn cookie_prefix_does_not_match() {
        let headers = with_cookie("jwtx=1");
        assert_eq!(get_cookie(&headers, "jwt"), None);
    }

    #[test]
    fn no_cookie_header() {
        assert_eq!(get_cookie(&HeaderMap::new(), "jwt"), None);
    }

    #[test]
    fn set_cookie_renders_attributes() {
        let at = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let value = set_cookie("jwt", "v", Some(at), Some("/"), true, true).unwrap();
        assert_eq!(
            value.to_str().unwrap(),
            "jwt=v; Expires=Sun, 06 Nov 1994 08:49:37 GMT; Path=/; HttpOnly; Secure; SameSite=Strict"
        );
    }

    #[test]
    fn set_cookie_rejects_control_characters() {
        assert!(set_cookie("jwt", "bad\nvalue", None, None, false, false).is_err());
    }

    #[test]
    fn cors_headers_name_the_origin() {
        let mut res = hyper::Response::new(());
        add_cors_headers(&mut res, "http://localhost:5000");
        let headers = res.headers();
        assert_eq!(
            headers["access-control-allow-origin"],
            "http://localhost:5000"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
    }
}
