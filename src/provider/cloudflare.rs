use async_trait::async_trait;
use rootcause::prelude::ResultExt;
use rootcause::{Report, report};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{DnsProvider, DnsRecordType, ManagedRecord, RecordId, RecordUpdate, ZoneId};
use crate::config::ApiToken;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

pub struct CloudflareProvider {
    api_token: ApiToken,
    api_base: String,
    client: reqwest::Client,
}

impl CloudflareProvider {
    pub fn new(client: reqwest::Client, api_token: ApiToken) -> Self {
        Self::with_api_base(client, api_token, CLOUDFLARE_API_BASE)
    }

    pub fn with_api_base(
        client: reqwest::Client,
        api_token: ApiToken,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            api_token,
            api_base: api_base.into(),
            client,
        }
    }

    fn records_url(&self, zone: &ZoneId) -> String {
        format!("{}/zones/{}/dns_records", self.api_base, zone)
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn find_record(
        &self,
        zone: &ZoneId,
        name: &str,
        typ: DnsRecordType,
    ) -> Result<Option<ManagedRecord>, Report> {
        let typ_name = typ.to_string();
        let response = self
            .client
            .get(self.records_url(zone))
            .bearer_auth(self.api_token.expose())
            .query(&[("name", name), ("type", typ_name.as_str())])
            .send()
            .await
            .context("Listing DNS records from Cloudflare")
            .attach(format!("zone: '{zone}'"))
            .attach(format!("record: {typ} '{name}'"))?;

        if !response.status().is_success() {
            return Err(report!("Failed to list DNS records from Cloudflare")
                .attach(format!("zone: '{zone}'"))
                .attach(format!("record: {typ} '{name}'"))
                .attach(format!("status: {}", response.status()))
                .attach(format!(
                    "response: {:?}",
                    response
                        .text()
                        .await
                        .unwrap_or("<Response reading failed>".to_string())
                )));
        }

        let body = response
            .text()
            .await
            .context("Reading Cloudflare DNS records response")
            .attach(format!("zone: '{zone}'"))?;

        let envelope = serde_json::from_str::<CloudflareEnvelope<Vec<CloudflareDnsRecord>>>(&body)
            .context("Parsing Cloudflare DNS records response")
            .attach(format!("zone: '{zone}'"))
            .attach(format!("response: {body:?}"))?;

        if !envelope.success {
            warn!(
                zone = %zone,
                errors = ?envelope.errors,
                response = %body,
                "Cloudflare reported failure while listing records"
            );
            return Ok(None);
        }

        let records = envelope.result.unwrap_or_default();
        if records.len() > 1 {
            debug!(
                zone = %zone,
                record = %name,
                count = records.len(),
                "Multiple matching records, using the first one"
            );
        }

        let Some(record) = records.into_iter().next() else {
            warn!(zone = %zone, record = %name, typ = %typ, response = %body, "Cloudflare returned no records");
            return Ok(None);
        };

        Ok(Some(record.into()))
    }

    async fn replace_record(
        &self,
        zone: &ZoneId,
        record_id: &RecordId,
        update: &RecordUpdate,
    ) -> Result<(), Report> {
        let response = self
            .client
            .put(format!("{}/{}", self.records_url(zone), record_id))
            .bearer_auth(self.api_token.expose())
            .json(update)
            .send()
            .await
            .context("Updating DNS record in Cloudflare")
            .attach(format!("zone: '{zone}'"))
            .attach(format!("record_id: '{record_id}'"))?;

        if !response.status().is_success() {
            return Err(report!("Failed to update DNS record in Cloudflare")
                .attach(format!("zone: '{zone}'"))
                .attach(format!("record_id: '{record_id}'"))
                .attach(format!("status: {}", response.status()))
                .attach(format!(
                    "response: {:?}",
                    response
                        .text()
                        .await
                        .unwrap_or("<Response reading failed>".to_string())
                )));
        }

        let body = response
            .text()
            .await
            .context("Reading Cloudflare update response")
            .attach(format!("record_id: '{record_id}'"))?;

        let envelope = serde_json::from_str::<CloudflareEnvelope<Value>>(&body)
            .context("Parsing Cloudflare update response")
            .attach(format!("record_id: '{record_id}'"))
            .attach(format!("response: {body:?}"))?;

        if envelope.success {
            Ok(())
        } else {
            Err(report!("Cloudflare rejected the DNS record update")
                .attach(format!("zone: '{zone}'"))
                .attach(format!("record_id: '{record_id}'"))
                .attach(format!("errors: {}", Value::Array(envelope.errors))))
        }
    }
}

#[derive(Deserialize)]
struct CloudflareEnvelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<Value>,
    result: Option<T>,
}

#[derive(Deserialize)]
struct CloudflareDnsRecord {
    id: String,
    content: String,
    ttl: u32,
    #[serde(default)]
    proxied: bool,
}

impl From<CloudflareDnsRecord> for ManagedRecord {
    fn from(record: CloudflareDnsRecord) -> Self {
        Self {
            id: RecordId(record.id),
            content: record.content,
            ttl: record.ttl,
            proxied: record.proxied,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode, header};
    use serde_json::json;

    use super::*;
    use crate::test_support::{StubRoute, StubServer, truncated_endpoint};

    const LIST_PATH: &str = "/zones/z1/dns_records";

    fn provider(server: &StubServer) -> CloudflareProvider {
        CloudflareProvider::with_api_base(
            reqwest::Client::new(),
            ApiToken::new("t"),
            server.base_url.clone(),
        )
    }

    fn zone() -> ZoneId {
        ZoneId("z1".to_string())
    }

    #[tokio::test]
    async fn find_record_returns_first_match() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::GET,
            LIST_PATH,
            StatusCode::OK,
            json!({
                "success": true,
                "errors": [],
                "result": [
                    { "id": "rec-1", "type": "A", "name": "home.example.com",
                      "content": "203.0.113.1", "ttl": 120, "proxied": false },
                    { "id": "rec-2", "type": "A", "name": "home.example.com",
                      "content": "203.0.113.9", "ttl": 1, "proxied": true }
                ]
            }),
        )])
        .await;

        let record = provider(&server)
            .find_record(&zone(), "home.example.com", DnsRecordType::A)
            .await
            .unwrap();

        assert_eq!(
            record,
            Some(ManagedRecord {
                id: RecordId("rec-1".to_string()),
                content: "203.0.113.1".to_string(),
                ttl: 120,
                proxied: false,
            })
        );

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].uri.query(),
            Some("name=home.example.com&type=A")
        );
        assert_eq!(
            requests[0].headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer t"
        );
    }

    #[tokio::test]
    async fn find_record_with_empty_result_is_not_found() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::GET,
            LIST_PATH,
            StatusCode::OK,
            json!({ "success": true, "errors": [], "result": [] }),
        )])
        .await;

        let record = provider(&server)
            .find_record(&zone(), "home.example.com", DnsRecordType::A)
            .await
            .unwrap();

        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn find_record_with_logical_failure_is_not_found() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::GET,
            LIST_PATH,
            StatusCode::OK,
            json!({
                "success": false,
                "errors": [{ "code": 7003, "message": "Could not route" }],
                "result": null
            }),
        )])
        .await;

        let record = provider(&server)
            .find_record(&zone(), "home.example.com", DnsRecordType::A)
            .await
            .unwrap();

        assert_eq!(record, None);
    }

    #[tokio::test]
    async fn find_record_http_failure_is_an_error() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::GET,
            LIST_PATH,
            StatusCode::FORBIDDEN,
            json!({ "success": false, "errors": [{ "code": 9109, "message": "Unauthorized" }] }),
        )])
        .await;

        let result = provider(&server)
            .find_record(&zone(), "home.example.com", DnsRecordType::A)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn replace_record_puts_full_record() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::PUT,
            "/zones/z1/dns_records/rec-1",
            StatusCode::OK,
            json!({ "success": true, "errors": [], "result": { "id": "rec-1" } }),
        )])
        .await;
        let update = RecordUpdate {
            typ: DnsRecordType::A,
            name: "home.example.com".to_string(),
            content: "203.0.113.5".to_string(),
            ttl: 120,
            proxied: false,
        };

        provider(&server)
            .replace_record(&zone(), &RecordId("rec-1".to_string()), &update)
            .await
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(
            requests[0].json_body(),
            json!({
                "type": "A",
                "name": "home.example.com",
                "content": "203.0.113.5",
                "ttl": 120,
                "proxied": false
            })
        );
    }

    #[tokio::test]
    async fn replace_record_logical_failure_is_an_error() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::PUT,
            "/zones/z1/dns_records/rec-1",
            StatusCode::OK,
            json!({
                "success": false,
                "errors": [{ "code": 81057, "message": "Record already exists." }],
                "result": null
            }),
        )])
        .await;
        let update = RecordUpdate {
            typ: DnsRecordType::A,
            name: "home.example.com".to_string(),
            content: "203.0.113.5".to_string(),
            ttl: 1,
            proxied: true,
        };

        let result = provider(&server)
            .replace_record(&zone(), &RecordId("rec-1".to_string()), &update)
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn replace_record_http_failure_is_an_error() {
        let server = StubServer::start(vec![StubRoute::json(
            Method::PUT,
            "/zones/z1/dns_records/rec-1",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "success": false, "errors": [{ "code": 10000, "message": "Internal error" }] }),
        )])
        .await;
        let update = RecordUpdate {
            typ: DnsRecordType::A,
            name: "home.example.com".to_string(),
            content: "203.0.113.5".to_string(),
            ttl: 120,
            proxied: false,
        };

        let result = provider(&server)
            .replace_record(&zone(), &RecordId("rec-1".to_string()), &update)
            .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to update DNS record in Cloudflare"));
        assert!(err.contains("500"));
    }

    #[tokio::test]
    async fn unreadable_success_body_keeps_the_read_error() {
        let base_url = truncated_endpoint().await;
        let provider =
            CloudflareProvider::with_api_base(reqwest::Client::new(), ApiToken::new("t"), base_url);

        let err = provider
            .find_record(&zone(), "home.example.com", DnsRecordType::A)
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("Reading Cloudflare DNS records response"));
        assert!(!err.contains("<Response reading failed>"));
    }
}
