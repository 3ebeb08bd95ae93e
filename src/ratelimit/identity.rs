//! Request abstraction and caller identity extraction.

use std::sync::Arc;

use http::Method;

/// Identity shared by every caller whose address cannot be determined.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Client address header set by the edge proxy.
pub const EDGE_CLIENT_IP_HEADER: &str = "cf-connecting-ip";

/// Standard proxy chain header; the first entry is the originating client.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// The parts of an inbound request a limiter can look at.
pub trait RequestContext {
    /// HTTP method.
    fn method(&self) -> &Method;

    /// Request path, without query string.
    fn path(&self) -> &str;

    /// Header value by case-insensitive name.
    ///
    /// Values that are not visible ASCII are reported as absent.
    fn header(&self, name: &str) -> Option<&str>;
}

impl<B> RequestContext for http::Request<B> {
    fn method(&self) -> &Method {
        http::Request::method(self)
    }

    fn path(&self) -> &str {
        self.uri().path()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers().get(name)?.to_str().ok()
    }
}

impl RequestContext for http::request::Parts {
    fn method(&self) -> &Method {
        &self.method
    }

    fn path(&self) -> &str {
        self.uri.path()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

/// Derives the identity a request is counted under.
pub type KeyFn = Arc<dyn Fn(&dyn RequestContext) -> String + Send + Sync>;

/// Default identity: the client address reported by proxy headers.
///
/// Precedence is the edge client IP header verbatim, then the first
/// `x-forwarded-for` entry trimmed, then [`UNKNOWN_IDENTITY`].
pub fn client_ip(request: &dyn RequestContext) -> String {
    if let Some(ip) = request.header(EDGE_CLIENT_IP_HEADER) {
        return ip.to_string();
    }

    if let Some(chain) = request.header(FORWARDED_FOR_HEADER) {
        // split always yields at least one item
        let first = chain.split(',').next().unwrap_or_default();
        return first.trim().to_string();
    }

    UNKNOWN_IDENTITY.to_string()
}

/// Identity from a named header, with a fixed fallback when it is absent.
///
/// Useful for API-key or per-tenant limiting.
pub fn header_key(name: impl Into<String>, fallback: impl Into<String>) -> KeyFn {
    let name = name.into();
    let fallback = fallback.into();
    Arc::new(move |request: &dyn RequestContext| {
        request
            .header(&name)
            .map(str::to_string)
            .unwrap_or_else(|| fallback.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder().uri("/test?x=1");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_edge_header_wins() {
        let req = request(&[
            ("cf-connecting-ip", "1.1.1.1"),
            ("x-forwarded-for", "2.2.2.2"),
        ]);
        assert_eq!(client_ip(&req), "1.1.1.1");
    }

    #[test]
    fn test_edge_header_used_verbatim() {
        let req = request(&[("cf-connecting-ip", " 1.1.1.1")]);
        assert_eq!(client_ip(&req), " 1.1.1.1");
    }

    #[test]
    fn test_forwarded_for_first_entry_trimmed() {
        let req = request(&[("x-forwarded-for", " 3.3.3.3 , 4.4.4.4")]);
        assert_eq!(client_ip(&req), "3.3.3.3");
    }

    #[test]
    fn test_missing_headers_fall_back_to_unknown() {
        let req = request(&[]);
        assert_eq!(client_ip(&req), UNKNOWN_IDENTITY);
    }

    #[test]
    fn test_request_context_path_strips_query() {
        let req = request(&[]);
        assert_eq!(RequestContext::path(&req), "/test");
        assert_eq!(RequestContext::method(&req), &Method::GET);

        let (parts, _) = req.into_parts();
        assert_eq!(RequestContext::path(&parts), "/test");
    }

    #[test]
    fn test_header_key_with_fallback() {
        let key_fn = header_key("x-api-key", "anon");

        assert_eq!(key_fn(&request(&[("x-api-key", "key-a")])), "key-a");
        assert_eq!(key_fn(&request(&[])), "anon");
    }
}
