//! OAuth 1.0a (HMAC-SHA1) request signing for the X API.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::Sha1;
use thiserror::Error;
use url::Url;

use crate::config::Credentials;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters are the only ones left as-is.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const NONCE_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HMAC key rejected: {0}")]
    Key(String),
}

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Signs requests on behalf of one user account.
#[derive(Clone, Debug)]
pub struct OAuthSigner {
    credentials: Credentials,
}

impl OAuthSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build the `Authorization` header value for a request.
    ///
    /// `params` holds form-encoded body parameters; query parameters are taken
    /// from `url`. JSON bodies are not part of the signature.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<String, SignError> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(method, url, params, &nonce, &timestamp)
    }

    /// Same as [`authorization_header`](Self::authorization_header) with a fixed
    /// nonce and timestamp.
    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, SignError> {
        let mut oauth_params = self.oauth_params(nonce, timestamp);
        let signature = self.signature(method, url, params, &oauth_params)?;
        oauth_params.push(("oauth_signature", signature));
        oauth_params.sort();

        let fields: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .collect();
        Ok(format!("OAuth {}", fields.join(", ")))
    }

    fn oauth_params(&self, nonce: &str, timestamp: &str) -> Vec<(&'static str, String)> {
        vec![
            ("oauth_consumer_key", self.credentials.api_key.clone()),
            ("oauth_nonce", nonce.to_string()),
            ("oauth_signature_method", "HMAC-SHA1".to_string()),
            ("oauth_timestamp", timestamp.to_string()),
            ("oauth_token", self.credentials.access_token.clone()),
            ("oauth_version", "1.0".to_string()),
        ]
    }

    fn signature(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        oauth_params: &[(&'static str, String)],
    ) -> Result<String, SignError> {
        let base = signature_base_string(method, url, params, oauth_params)?;
        let key = format!(
            "{}&{}",
            percent_encode(&self.credentials.api_secret),
            percent_encode(&self.credentials.access_token_secret)
        );
        let mut mac =
            HmacSha1::new_from_slice(key.as_bytes()).map_err(|e| SignError::Key(e.to_string()))?;
        mac.update(base.as_bytes());
        Ok(BASE64.encode(mac.finalize().into_bytes()))
    }
}

/// `METHOD&encoded-base-url&encoded-sorted-params`.
fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    oauth_params: &[(&'static str, String)],
) -> Result<String, SignError> {
    let mut parsed = Url::parse(url)?;

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (percent_encode(&k), percent_encode(&v)))
        .collect();
    pairs.extend(
        params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v))),
    );
    pairs.extend(
        oauth_params
            .iter()
            .map(|(k, v)| (percent_encode(k), percent_encode(v))),
    );
    pairs.sort();

    let param_string = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    parsed.set_query(None);
    parsed.set_fragment(None);

    Ok(format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(parsed.as_str()),
        percent_encode(&param_string)
    ))
}
