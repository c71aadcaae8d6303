use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use hyper::header::{AsHeaderName, AUTHORIZATION};
use hyper::http::request::Parts;

static BEARER_PREFIX: &str = "Bearer ";
static BASIC_PREFIX: &str = "Basic ";

pub trait HeaderExt {
    fn get_header<K: AsHeaderName>(&self, header: K) -> Option<String>;
    fn bearer_token(&self) -> Option<String>;
    fn basic_auth(&self) -> Option<(String, String)>;
}

impl HeaderExt for Parts {
    fn get_header<K>(&self, header: K) -> Option<String>
    where
        K: AsHeaderName,
    {
        self.headers
            .get(header)
            .and_then(|header| header.to_str().ok())
            .map(ToString::to_string)
    }

    fn bearer_token(&self) -> Option<String> {
        let authorization = self.get_header(AUTHORIZATION)?;
        authorization
            .strip_prefix(BEARER_PREFIX)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(ToString::to_string)
    }

    fn basic_auth(&self) -> Option<(String, String)> {
        let authorization = self.get_header(AUTHORIZATION)?;

        let value = authorization.strip_prefix(BASIC_PREFIX)?;
        let value = BASE64_STANDARD.decode(value.trim()).ok()?;
        let value = String::from_utf8(value).ok()?;

        let (username, password) = value.split_once(':')?;
        Some((username.to_string(), password.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use hyper::Request;

    use super::*;

    fn parts_with_authorization(value: &str) -> Parts {
        let (parts, ()) = Request::builder()
            .header(AUTHORIZATION, value)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    #[test]
    fn test_get_header() {
        let parts = parts_with_authorization("Bearer abc");
        assert_eq!(parts.get_header(AUTHORIZATION), Some("Bearer abc".to_string()));
        assert_eq!(parts.get_header("x-missing"), None);
    }

    #[test]
    fn test_bearer_token() {
        let parts = parts_with_authorization("Bearer abc.def.ghi");
        assert_eq!(parts.bearer_token(), Some("abc.def.ghi".to_string()));

        let parts = parts_with_authorization("Bearer ");
        assert_eq!(parts.bearer_token(), None);

        let parts = parts_with_authorization("Basic dXNlcjpwYXNz");
        assert_eq!(parts.bearer_token(), None);
    }

    #[test]
    fn test_basic_auth() {
        let encoded = BASE64_STANDARD.encode("user1:pass:word");
        let parts = parts_with_authorization(&format!("Basic {encoded}"));
        assert_eq!(
            parts.basic_auth(),
            Some(("user1".to_string(), "pass:word".to_string()))
        );
    }

    #[test]
    fn test_basic_auth_malformed() {
        let parts = parts_with_authorization("Basic not-base64!");
        assert_eq!(parts.basic_auth(), None);

        let encoded = BASE64_STANDARD.encode("no-separator");
        let parts = parts_with_authorization(&format!("Basic {encoded}"));
        assert_eq!(parts.basic_auth(), None);

        let parts = parts_with_authorization("Bearer token");
        assert_eq!(parts.basic_auth(), None);
    }

    #[test]
    fn test_no_authorization_header() {
        let (parts, ()) = Request::builder().body(()).unwrap().into_parts();
        assert_eq!(parts.basic_auth(), None);
        assert_eq!(parts.bearer_token(), None);
    }
}
