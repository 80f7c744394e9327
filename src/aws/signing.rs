//! AWS Signature Version 4
//!
//! Request signing for the JSON and REST services this crate talks to.
//! Callers hand over an already encoded path and canonical query string;
//! the signer only adds `x-amz-date`, the optional session token header
//! and `authorization`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::credentials::AwsCredentials;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Request parts covered by the signature
#[derive(Debug)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    /// `host[:port]` as sent on the wire
    pub host: &'a str,
    /// URI-encoded absolute path
    pub path: &'a str,
    /// Canonical (sorted, encoded) query string without `?`
    pub query: &'a str,
    /// Extra headers sent with the request; all of them are signed
    pub headers: &'a [(&'static str, String)],
    /// Hex SHA-256 of the body
    pub payload_hash: &'a str,
}

/// Hex SHA-256 of a payload
pub fn payload_hash(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Canonical query string: pairs encoded and sorted by name, then value
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(name, value)| {
            (
                urlencoding::encode(name).into_owned(),
                urlencoding::encode(value).into_owned(),
            )
        })
        .collect();
    encoded.sort();

    encoded
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// URI-encode a path, keeping `/` separators
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn normalize_header_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sign a request and return the headers to attach to it
pub fn sign(
    request: &SignableRequest<'_>,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    time: DateTime<Utc>,
) -> Vec<(&'static str, String)> {
    let amz_date = time.format("%Y%m%dT%H%M%SZ").to_string();
    let date = time.format("%Y%m%d").to_string();

    let mut added: Vec<(&'static str, String)> = vec![("x-amz-date", amz_date.clone())];
    if let Some(token) = &credentials.session_token {
        added.push(("x-amz-security-token", token.clone()));
    }

    let mut canonical_headers: Vec<(String, String)> = request
        .headers
        .iter()
        .chain(added.iter())
        .map(|(name, value)| (name.to_ascii_lowercase(), normalize_header_value(value)))
        .collect();
    canonical_headers.push(("host".to_string(), request.host.to_string()));
    canonical_headers.sort();

    let signed_headers = canonical_headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let header_block: String = canonical_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.path,
        request.query,
        header_block,
        signed_headers,
        request.payload_hash
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        payload_hash(canonical_request.as_bytes())
    );

    let k_date = hmac(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        &date,
    );
    let k_region = hmac(&k_date, region);
    let k_service = hmac(&k_region, service);
    let k_signing = hmac(&k_service, "aws4_request");
    let signature = hex::encode(hmac(&k_signing, &string_to_sign));

    added.push((
        "authorization",
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
        ),
    ));
    added
}
