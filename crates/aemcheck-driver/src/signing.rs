//! Storage account key signing: SharedKeyLite request headers and
//! service SAS tokens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::DriverError;

type HmacSha256 = Hmac<Sha256>;

/// REST version sent as `x-ms-version` and used as the SAS `sv`.
pub const STORAGE_SERVICE_VERSION: &str = "2018-11-09";

/// `x-ms-date` / `Date` header format.
pub fn rfc1123(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// base64(HMAC-SHA256(base64decode(key), data))
pub fn sign(key_b64: &str, data: &str) -> Result<String, DriverError> {
    let key = BASE64
        .decode(key_b64)
        .map_err(|e| DriverError::Signing(format!("account key is not valid base64: {}", e)))?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| DriverError::Signing(format!("hmac key: {}", e)))?;
    mac.update(data.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// ── SharedKeyLite ─────────────────────────────────────────────────────────────

/// `Authorization` value for a Table service request.
///
/// String-to-sign: `x-ms-date\n/{account}{path}`. `path` excludes the query.
pub fn table_shared_key_lite(
    account: &str,
    key_b64: &str,
    date: &str,
    path: &str,
) -> Result<String, DriverError> {
    let string_to_sign = format!("{}\n/{}{}", date, account, path);
    Ok(format!("SharedKeyLite {}:{}", account, sign(key_b64, &string_to_sign)?))
}

/// `Authorization` value for a Blob service request.
///
/// String-to-sign: `VERB\n\n\n\n` + canonical `x-ms-*` headers + canonical
/// resource. Only the `comp` query parameter is part of the resource.
pub fn blob_shared_key_lite(
    account: &str,
    key_b64: &str,
    verb: &str,
    ms_headers: &[(&str, &str)],
    path: &str,
    comp: Option<&str>,
) -> Result<String, DriverError> {
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();

    let mut resource = format!("/{}{}", account, path);
    if let Some(comp) = comp {
        resource.push_str("?comp=");
        resource.push_str(comp);
    }

    let string_to_sign = format!("{}\n\n\n\n{}{}", verb, canonical_headers, resource);
    Ok(format!("SharedKeyLite {}:{}", account, sign(key_b64, &string_to_sign)?))
}

// ── Service SAS ───────────────────────────────────────────────────────────────

/// Read-only service SAS for a single blob, HTTPS only.
///
/// Returns the query string without the leading `?`.
pub fn blob_read_sas(
    account: &str,
    key_b64: &str,
    container: &str,
    blob: &str,
    expiry: DateTime<Utc>,
) -> Result<String, DriverError> {
    let permissions = "r";
    let signed_expiry = expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let canonical_resource = format!("/blob/{}/{}/{}", account, container, blob);
    let protocol = "https";
    let resource = "b";

    // sp, st, se, resource, si, sip, spr, sv, sr, snapshot, rscc, rscd, rsce, rscl, rsct
    let fields: [&str; 15] = [
        permissions,
        "",
        signed_expiry.as_str(),
        canonical_resource.as_str(),
        "",
        "",
        protocol,
        STORAGE_SERVICE_VERSION,
        resource,
        "",
        "",
        "",
        "",
        "",
        "",
    ];
    let string_to_sign = fields.join("\n");
    let signature = sign(key_b64, &string_to_sign)?;

    Ok(url::form_urlencoded::Serializer::new(String::new())
        .append_pair("sv", STORAGE_SERVICE_VERSION)
        .append_pair("se", &signed_expiry)
        .append_pair("sr", resource)
        .append_pair("sp", permissions)
        .append_pair("spr", protocol)
        .append_pair("sig", &signature)
        .finish())
}
