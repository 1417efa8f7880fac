//! Signed cookies for the OAuth half-trip.
//!
//! Cookies carry only the material that must survive the authorize/callback
//! round trip: the `state` double-submit value, the PKCE code verifier, and
//! the post-auth redirect target. Values are MACed with HMAC-SHA256 so a
//! tampered cookie reads as absent.

use crate::utils::{base64url, base64url_decode};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// State double-submit cookie.
pub const STATE_COOKIE: &str = "auth_state";

/// PKCE code-verifier cookie.
pub const PKCE_COOKIE: &str = "auth_pkce";

/// Post-auth redirect target cookie.
pub const REDIRECT_COOKIE: &str = "auth_redirect_to";

/// MAC a cookie value: `base64url(value)|base64url(mac)`.
#[must_use]
pub fn seal(key: &[u8], value: &str) -> String {
    // HMAC accepts any key length; the Err arm is unreachable.
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return String::new();
    };
    mac.update(value.as_bytes());
    format!("{}|{}", base64url(value.as_bytes()), base64url(&mac.finalize().into_bytes()))
}

/// Verify and open a sealed cookie value.
#[must_use]
pub fn open(key: &[u8], sealed: &str) -> Option<String> {
    let (value_b64, tag_b64) = sealed.split_once('|')?;
    let value = base64url_decode(value_b64)?;
    let tag = base64url_decode(tag_b64)?;
    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(&value);
    mac.verify_slice(&tag).ok()?;
    String::from_utf8(value).ok()
}

/// Build a `Set-Cookie` header value for a sealed ceremony cookie.
#[must_use]
pub fn set_cookie(name: &str, sealed_value: &str, secure: bool, max_age_secs: i64) -> String {
    let mut cookie = format!(
        "{name}={sealed_value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Build a `Set-Cookie` header value that clears a ceremony cookie.
#[must_use]
pub fn clear_cookie(name: &str, secure: bool) -> String {
    set_cookie(name, "", secure, 0)
}

/// Extract a named cookie from a `Cookie` request header.
#[must_use]
pub fn get_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k == name).then_some(v)
    })
}
