use async_trait::async_trait;
use aemcheck_domain::{
    LoggingOperations, LoggingProperties, MetricsLevel, MetricsProperties, ServiceProperties,
};
use chrono::Utc;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::data_plane::{StorageContext, StorageDataPlane};
use crate::error::DriverError;
use crate::signing::{blob_shared_key_lite, rfc1123, table_shared_key_lite, STORAGE_SERVICE_VERSION};
use crate::xml::XmlElement;

const TABLE_ACCEPT: &str = "application/json;odata=nometadata";

/// [`StorageDataPlane`] over the Blob and Table REST APIs, authenticated
/// with the account key (SharedKeyLite) or a caller-supplied SAS.
#[derive(Clone, Default)]
pub struct AzureStorageDataPlane {
    client: reqwest::Client,
}

impl AzureStorageDataPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed GET against the Table service. `resource` is the path used for
    /// both the URL and the canonical resource, e.g. `/Tables`.
    async fn table_get(
        &self,
        ctx: &StorageContext,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, DriverError> {
        let url = format!("{}{}", ctx.table_base, resource);
        let date = rfc1123(Utc::now());
        let auth = table_shared_key_lite(&ctx.account_name, &ctx.key, &date, resource)?;
        debug!(url, "Table GET");

        self.client
            .get(&url)
            .query(query)
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_SERVICE_VERSION)
            .header("x-ms-client-request-id", Uuid::new_v4().to_string())
            .header("Accept", TABLE_ACCEPT)
            .header("DataServiceVersion", "3.0;NetFx")
            .header("MaxDataServiceVersion", "3.0;NetFx")
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| DriverError::Request(format!("GET {}: {}", url, e)))
    }
}

#[async_trait]
impl StorageDataPlane for AzureStorageDataPlane {
    async fn blob_length(&self, blob_url: &str) -> Result<u64, DriverError> {
        // Never log the SAS.
        let display_url = blob_url.split('?').next().unwrap_or(blob_url);
        debug!(url = display_url, "Blob HEAD");
        let resp = self
            .client
            .head(blob_url)
            .header("x-ms-version", STORAGE_SERVICE_VERSION)
            .send()
            .await
            .map_err(|e| DriverError::Request(format!("HEAD {}: {}", display_url, e)))?;

        match resp.status() {
            s if s.is_success() => {}
            StatusCode::NOT_FOUND => return Err(DriverError::NotFound(display_url.to_string())),
            s => {
                return Err(DriverError::Status {
                    url: display_url.to_string(),
                    status: s.as_u16(),
                    message: storage_error_code(resp.headers()),
                })
            }
        }

        resp.headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| DriverError::Decode(format!("HEAD {}: no Content-Length", display_url)))
    }

    async fn list_tables(&self, ctx: &StorageContext) -> Result<Vec<String>, DriverError> {
        let mut names = Vec::new();
        let mut next: Option<String> = None;

        loop {
            let query: Vec<(&str, &str)> = match next.as_deref() {
                Some(n) => vec![("NextTableName", n)],
                None => Vec::new(),
            };
            let resp = self.table_get(ctx, "/Tables", &query).await?;
            let resp = check_status(resp, "list tables").await?;
            let continuation = resp
                .headers()
                .get("x-ms-continuation-NextTableName")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body: Value = resp
                .json()
                .await
                .map_err(|e| DriverError::Decode(format!("list tables: {}", e)))?;

            if let Some(items) = body["value"].as_array() {
                names.extend(
                    items
                        .iter()
                        .filter_map(|t| t["TableName"].as_str().map(str::to_string)),
                );
            }

            match continuation {
                Some(n) if !n.is_empty() => next = Some(n),
                _ => break,
            }
        }

        Ok(names)
    }

    async fn table_exists(&self, ctx: &StorageContext, table: &str) -> Result<bool, DriverError> {
        let resource = format!("/Tables('{}')", table);
        let resp = self.table_get(ctx, &resource, &[]).await?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => check_status(resp, "table exists").await.map(|_| true),
        }
    }

    async fn query_entities(
        &self,
        ctx: &StorageContext,
        table: &str,
        filter: &str,
        top: Option<u32>,
    ) -> Result<Vec<Value>, DriverError> {
        let resource = format!("/{}()", table);
        let mut rows: Vec<Value> = Vec::new();
        let mut next: Option<(String, Option<String>)> = None;

        loop {
            let remaining = top.map(|t| t.saturating_sub(rows.len() as u32).to_string());
            let mut query = vec![("$filter", filter)];
            if let Some(t) = remaining.as_deref() {
                query.push(("$top", t));
            }
            if let Some((partition, row)) = &next {
                query.push(("NextPartitionKey", partition.as_str()));
                if let Some(row) = row {
                    query.push(("NextRowKey", row.as_str()));
                }
            }

            let resp = self.table_get(ctx, &resource, &query).await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Err(DriverError::NotFound(format!("table {}", table)));
            }
            let resp = check_status(resp, "query entities").await?;
            let header = |name: &str| {
                resp.headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
            };
            let next_partition = header("x-ms-continuation-NextPartitionKey");
            let next_row = header("x-ms-continuation-NextRowKey");
            let body: Value = resp
                .json()
                .await
                .map_err(|e| DriverError::Decode(format!("query {}: {}", table, e)))?;
            if let Some(page) = body["value"].as_array() {
                rows.extend(page.iter().cloned());
            }

            if let Some(t) = top.map(|t| t as usize) {
                if rows.len() >= t {
                    rows.truncate(t);
                    break;
                }
            }
            match next_partition {
                Some(partition) => {
                    debug!(table, partition, "following query continuation");
                    next = Some((partition, next_row));
                }
                None => break,
            }
        }

        Ok(rows)
    }

    async fn service_properties(&self, ctx: &StorageContext) -> Result<ServiceProperties, DriverError> {
        let url = format!("{}/", ctx.blob_base);
        let date = rfc1123(Utc::now());
        let auth = blob_shared_key_lite(
            &ctx.account_name,
            &ctx.key,
            "GET",
            &[("x-ms-date", &date), ("x-ms-version", STORAGE_SERVICE_VERSION)],
            "/",
            Some("properties"),
        )?;
        debug!(url, "Blob service properties GET");

        let resp = self
            .client
            .get(&url)
            .query(&[("restype", "service"), ("comp", "properties")])
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_SERVICE_VERSION)
            .header("Authorization", auth)
            .send()
            .await
            .map_err(|e| DriverError::Request(format!("GET {}: {}", url, e)))?;
        let resp = check_status(resp, "service properties").await?;
        let body = resp
            .text()
            .await
            .map_err(|e| DriverError::Decode(format!("service properties: {}", e)))?;
        parse_service_properties(&body)
    }
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, DriverError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().path().to_string();
    let code = storage_error_code(resp.headers());
    let body = resp.text().await.unwrap_or_default();
    Err(DriverError::Status {
        url,
        status: status.as_u16(),
        message: format!("{}: {} {}", what, code, body.trim()),
    })
}

fn storage_error_code(headers: &reqwest::header::HeaderMap) -> String {
    headers
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("Unknown")
        .to_string()
}

/// Parse a `StorageServiceProperties` document.
pub fn parse_service_properties(xml: &str) -> Result<ServiceProperties, DriverError> {
    let root = XmlElement::parse(xml)?;
    if root.name != "StorageServiceProperties" {
        return Err(DriverError::Decode(format!(
            "expected StorageServiceProperties, found <{}>",
            root.name
        )));
    }

    let logging = root.child("Logging").map(|l| {
        let mut operations = LoggingOperations::NONE;
        if is_true(l.child_text("Read")) {
            operations |= LoggingOperations::READ;
        }
        if is_true(l.child_text("Write")) {
            operations |= LoggingOperations::WRITE;
        }
        if is_true(l.child_text("Delete")) {
            operations |= LoggingOperations::DELETE;
        }
        LoggingProperties {
            operations,
            retention_days: l.child("RetentionPolicy").and_then(retention_days),
        }
    });

    let minute_metrics = root.child("MinuteMetrics").map(|m| {
        let level = match (is_true(m.child_text("Enabled")), is_true(m.child_text("IncludeAPIs"))) {
            (false, _) => MetricsLevel::None,
            (true, false) => MetricsLevel::Service,
            (true, true) => MetricsLevel::ServiceAndApi,
        };
        MetricsProperties {
            level,
            retention_days: m.child("RetentionPolicy").and_then(retention_days),
        }
    });

    Ok(ServiceProperties { logging, minute_metrics })
}

fn is_true(text: Option<&str>) -> bool {
    text.is_some_and(|t| t.trim().eq_ignore_ascii_case("true"))
}

fn retention_days(policy: &XmlElement) -> Option<i32> {
    if !is_true(policy.child_text("Enabled")) {
        return None;
    }
    policy.child_text("Days").and_then(|d| d.trim().parse().ok())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{header_exists, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    // base64("secret-key")
    const KEY: &str = "c2VjcmV0LWtleQ==";

    const PROPS: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<StorageServiceProperties>
  <Logging>
    <Version>1.0</Version>
    <Read>true</Read>
    <Write>true</Write>
    <Delete>true</Delete>
    <RetentionPolicy><Enabled>false</Enabled></RetentionPolicy>
  </Logging>
  <HourMetrics>
    <Version>1.0</Version>
    <Enabled>false</Enabled>
  </HourMetrics>
  <MinuteMetrics>
    <Version>1.0</Version>
    <Enabled>true</Enabled>
    <IncludeAPIs>true</IncludeAPIs>
    <RetentionPolicy><Enabled>true</Enabled><Days>13</Days></RetentionPolicy>
  </MinuteMetrics>
</StorageServiceProperties>"#;

    fn ctx(server: &MockServer) -> StorageContext {
        StorageContext::with_endpoints("acct", KEY, &server.uri(), &server.uri())
    }

    #[test]
    fn parse_full_service_properties() {
        let props = parse_service_properties(PROPS).unwrap();
        let logging = props.logging.unwrap();
        assert!(logging.operations.contains(LoggingOperations::ALL));
        assert_eq!(logging.retention_days, None);
        let minute = props.minute_metrics.unwrap();
        assert_eq!(minute.level, MetricsLevel::ServiceAndApi);
        assert_eq!(minute.retention_days, Some(13));
    }

    #[test]
    fn parse_without_minute_metrics() {
        let props = parse_service_properties(
            "<StorageServiceProperties><Logging><Read>true</Read></Logging></StorageServiceProperties>",
        )
        .unwrap();
        assert_eq!(props.logging.unwrap().operations, LoggingOperations::READ);
        assert!(props.minute_metrics.is_none());
    }

    #[test]
    fn parse_rejects_other_documents() {
        assert!(parse_service_properties("<Error><Code>x</Code></Error>").is_err());
    }

    #[tokio::test]
    async fn list_tables_follows_continuation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Tables"))
            .and(query_param("NextTableName", "t3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "TableName": "t3" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Tables"))
            .and(header_exists("authorization"))
            .and(header_exists("x-ms-date"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-continuation-NextTableName", "t3")
                    .set_body_json(json!({
                        "value": [{ "TableName": "t1" }, { "TableName": "t2" }]
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let names = AzureStorageDataPlane::new().list_tables(&ctx(&server)).await.unwrap();
        assert_eq!(names, ["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn table_exists_maps_404_to_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Tables('present')"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "TableName": "present" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Tables('absent')"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dp = AzureStorageDataPlane::new();
        assert!(dp.table_exists(&ctx(&server), "present").await.unwrap());
        assert!(!dp.table_exists(&ctx(&server), "absent").await.unwrap());
    }

    #[tokio::test]
    async fn query_entities_sends_filter_and_top() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/WADPerformanceCountersTable()"))
            .and(query_param("$filter", "Host eq 'vm1'"))
            .and(query_param("$top", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "PartitionKey": "p", "RowKey": "r", "Host": "vm1" }]
            })))
            .mount(&server)
            .await;

        let rows = AzureStorageDataPlane::new()
            .query_entities(&ctx(&server), "WADPerformanceCountersTable", "Host eq 'vm1'", Some(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Host"], "vm1");
    }

    #[tokio::test]
    async fn query_follows_continuation_past_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/WADPerformanceCountersTable()"))
            .and(query_param("NextPartitionKey", "p2"))
            .and(query_param("NextRowKey", "r7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "PartitionKey": "p2", "RowKey": "r7", "Host": "vm1" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/WADPerformanceCountersTable()"))
            .and(query_param("$filter", "Host eq 'vm1'"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-continuation-NextPartitionKey", "p2")
                    .insert_header("x-ms-continuation-NextRowKey", "r7")
                    .set_body_json(json!({ "value": [] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let rows = AzureStorageDataPlane::new()
            .query_entities(&ctx(&server), "WADPerformanceCountersTable", "Host eq 'vm1'", Some(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["RowKey"], "r7");
    }

    #[tokio::test]
    async fn query_stops_once_top_rows_collected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/T()"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-ms-continuation-NextPartitionKey", "more")
                    .set_body_json(json!({ "value": [{ "RowKey": "a" }] })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let rows = AzureStorageDataPlane::new()
            .query_entities(&ctx(&server), "T", "Host eq 'x'", Some(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn query_missing_table_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).insert_header("x-ms-error-code", "TableNotFound"))
            .mount(&server)
            .await;

        let err = AzureStorageDataPlane::new()
            .query_entities(&ctx(&server), "Nope", "Host eq 'x'", None)
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "got: {}", err);
    }

    #[tokio::test]
    async fn query_forbidden_is_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(403).insert_header("x-ms-error-code", "AuthenticationFailed"),
            )
            .mount(&server)
            .await;

        let err = AzureStorageDataPlane::new()
            .query_entities(&ctx(&server), "T", "Host eq 'x'", None)
            .await
            .unwrap_err();
        match err {
            DriverError::Status { status, message, .. } => {
                assert_eq!(status, 403);
                assert!(message.contains("AuthenticationFailed"), "got: {}", message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn service_properties_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .and(query_param("restype", "service"))
            .and(query_param("comp", "properties"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PROPS))
            .mount(&server)
            .await;

        let props = AzureStorageDataPlane::new()
            .service_properties(&ctx(&server))
            .await
            .unwrap();
        assert_eq!(props.minute_metrics.unwrap().level, MetricsLevel::ServiceAndApi);
    }

    #[tokio::test]
    async fn blob_length_missing_blob_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = format!("{}/vhds/os.vhd?sv=x&sig=y", server.uri());
        let err = AzureStorageDataPlane::new().blob_length(&url).await.unwrap_err();
        assert!(err.is_not_found(), "got: {}", err);
    }
}
