use aliri_braid::braid;
use std::fmt;

macro_rules! limited_reveal {
    ($ty:ty: $hidden:literal, $default:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    limited_reveal(&self.0, &mut *f, $default)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    limited_reveal(&self.0, &mut *f, usize::MAX)
                } else {
                    f.write_str(concat!("***", $hidden, "***"))
                }
            }
        }
    };
}

fn limited_reveal(unprotected: &str, f: &mut fmt::Formatter, default_len: usize) -> fmt::Result {
    let max_len = f.width().unwrap_or(default_len);
    if max_len <= 1 {
        f.write_str("…")
    } else if max_len > unprotected.len() {
        f.write_str(unprotected)
    } else {
        match unprotected.char_indices().nth(max_len - 2) {
            Some((idx, c)) if idx + c.len_utf8() < unprotected.len() => {
                f.write_str(&unprotected[0..idx + c.len_utf8()])?;
                f.write_str("…")
            }
            _ => f.write_str(unprotected),
        }
    }
}

/// A bearer token presented to authenticate API calls
#[braid(serde, debug = "owned", display = "owned")]
pub struct BearerToken;

limited_reveal!(BearerTokenRef: "BEARER TOKEN", 8);

/// An SSO access token, exchanged for service credentials
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

limited_reveal!(AccessTokenRef: "ACCESS TOKEN", 8);

/// A refresh token used to renew an SSO access token
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

limited_reveal!(RefreshTokenRef: "REFRESH TOKEN", 5);

/// A client ID registered with the SSO service
#[braid(serde)]
pub struct ClientId;

/// A client secret registered with the SSO service
#[braid(serde, debug = "owned", display = "owned")]
pub struct ClientSecret;

limited_reveal!(ClientSecretRef: "CLIENT SECRET", 5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_redacted_by_default() {
        let token = BearerToken::from_static("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(format!("{:?}", token), "***BEARER TOKEN***");
        assert_eq!(format!("{}", token), "***BEARER TOKEN***");
    }

    #[test]
    fn alternate_debug_reveals_a_prefix() {
        let token = BearerToken::from_static("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(format!("{:#?}", token), "\"abcdefg…\"");
    }

    #[test]
    fn width_bounds_the_revealed_prefix() {
        let token = BearerToken::from_static("abcdefghijklmnopqrstuvwxyz");
        assert_eq!(format!("{:#1?}", token), "\"…\"");
        assert_eq!(format!("{:#2?}", token), "\"a…\"");
        assert_eq!(format!("{:#3?}", token), "\"ab…\"");
        assert_eq!(format!("{:#3}", token), "ab…");
    }

    #[test]
    fn width_beyond_the_secret_reveals_it_whole() {
        let secret = ClientSecret::from_static("abc");
        assert_eq!(format!("{:#4}", secret), "abc");
        assert_eq!(format!("{:#4?}", secret), "\"abc\"");
        assert_eq!(format!("{:#3}", secret), "ab…");
        assert_eq!(format!("{:#2}", secret), "a…");
    }

    #[test]
    fn short_secrets_are_revealed_whole_in_alternate_form() {
        let secret = ClientSecret::from_static("abc");
        assert_eq!(format!("{:#}", secret), "abc");
    }
}
