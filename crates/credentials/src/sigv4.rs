//! AWS Signature Version 4 request signing.
//!
//! Only what Secrets Manager needs: a single JSON `POST /` with no query
//! string. Header names must already be lowercase.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secbridge_core::types::CloudProvider;
use sha2::{Digest, Sha256};

use crate::error::SecretStoreError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS access keys.
#[derive(Clone)]
pub struct AwsKeys {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKeys")
            .field("access_key_id", &self.access_key_id)
            .field("session_token", &self.session_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Request parts covered by the signature.
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub path: &'a str,
    /// Lowercase header names and values, excluding `host` and `x-amz-date`.
    pub headers: &'a [(&'a str, &'a str)],
    pub payload: &'a [u8],
}

/// Signs requests for one region and service.
#[derive(Debug, Clone)]
pub struct SigV4Signer {
    keys: AwsKeys,
    region: String,
    service: &'static str,
}

impl SigV4Signer {
    pub fn new(keys: AwsKeys, region: impl Into<String>, service: &'static str) -> Self {
        Self {
            keys,
            region: region.into(),
            service,
        }
    }

    /// Returns the headers to attach: `x-amz-date`, optional
    /// `x-amz-security-token` and `authorization`.
    pub fn sign(
        &self,
        request: &SignableRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(&'static str, String)>, SecretStoreError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.trim().to_owned()))
            .collect();
        headers.push(("host".to_owned(), request.host.to_owned()));
        headers.push(("x-amz-date".to_owned(), amz_date.clone()));
        if let Some(token) = &self.keys.session_token {
            headers.push(("x-amz-security-token".to_owned(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            request.method,
            request.path,
            canonical_headers,
            signed_headers,
            hex::encode(Sha256::digest(request.payload)),
        );

        let scope = format!("{date}/{}/{}/aws4_request", self.region, self.service);
        let string_to_sign = format!(
            "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes())),
        );

        let key = signing_key(&self.keys.secret_access_key, &date, &self.region, self.service)?;
        let signature = hex::encode(hmac(&key, string_to_sign.as_bytes())?);

        let mut out = vec![("x-amz-date", amz_date)];
        if let Some(token) = &self.keys.session_token {
            out.push(("x-amz-security-token", token.clone()));
        }
        out.push((
            "authorization",
            format!(
                "{ALGORITHM} Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
                self.keys.access_key_id,
            ),
        ));
        Ok(out)
    }
}

fn hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SecretStoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SecretStoreError::Unavailable {
            store: CloudProvider::Aws,
            reason: format!("invalid signing key: {e}"),
        })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SecretStoreError> {
    let k_date = hmac(format!("AWS4{secret}").as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, service.as_bytes())?;
    hmac(&k_service, b"aws4_request")
}
