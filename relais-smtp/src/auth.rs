//! `AUTH PLAIN` (RFC 4616) decoding.

use base64::Engine;

use crate::error::AuthError;

/// The identities carried by a `PLAIN` response.
///
/// The relay never checks the password; the authentication identity only
/// names the submitting application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub authzid: Option<String>,
    pub authcid: String,
    pub password: String,
}

impl Credentials {
    ///
    /// Decode a base64 `PLAIN` response: `[authzid] NUL authcid NUL passwd`.
    ///
    /// A two-field payload without the leading authorization identity is
    /// accepted as well.
    ///
    /// # Errors
    /// [`AuthError::Cancelled`] for the `*` response, [`AuthError::Encoding`]
    /// when the payload is not valid base64 and [`AuthError::Malformed`] when
    /// the decoded fields don't add up.
    ///
    pub fn decode_plain(response: &str) -> Result<Self, AuthError> {
        let response = response.trim();
        if response == "*" {
            return Err(AuthError::Cancelled);
        }

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(response)
            .map_err(|_| AuthError::Encoding)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Encoding)?;

        let fields: Vec<&str> = decoded.split('\0').collect();
        let (authzid, authcid, password) = match fields.as_slice() {
            [authzid, authcid, password] => (Some(*authzid), *authcid, *password),
            [authcid, password] => (None, *authcid, *password),
            _ => return Err(AuthError::Malformed),
        };

        if authcid.is_empty() {
            return Err(AuthError::Malformed);
        }

        Ok(Self {
            authzid: authzid.filter(|id| !id.is_empty()).map(str::to_string),
            authcid: authcid.to_string(),
            password: password.to_string(),
        })
    }
}
