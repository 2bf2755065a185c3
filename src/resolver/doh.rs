use async_trait::async_trait;
use rootcause::prelude::ResultExt;
use rootcause::{Report, report};
use serde::Deserialize;
use tracing::{debug, warn};

use super::AddressResolver;
use crate::provider::DnsRecordType;

const CLOUDFLARE_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// DNS-over-HTTPS lookups using the JSON API.
pub struct DohResolver {
    endpoint: String,
    client: reqwest::Client,
}

impl DohResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_endpoint(client, CLOUDFLARE_DOH_ENDPOINT)
    }

    pub fn with_endpoint(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    async fn query(&self, hostname: &str, typ: DnsRecordType) -> Result<DohResponse, Report> {
        let typ_name = typ.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .query(&[("name", hostname), ("type", typ_name.as_str())])
            .send()
            .await
            .context("Sending DoH query")
            .attach(format!("hostname: '{hostname}'"))?;

        if !response.status().is_success() {
            return Err(report!("DoH query failed")
                .attach(format!("hostname: '{hostname}'"))
                .attach(format!("status: {}", response.status()))
                .attach(format!(
                    "response: {:?}",
                    response
                        .text()
                        .await
                        .unwrap_or("<Response reading failed>".to_string())
                )));
        }

        let response = response
            .json::<DohResponse>()
            .await
            .context("Parsing DoH response")
            .attach(format!("hostname: '{hostname}'"))?;

        Ok(response)
    }
}

#[async_trait]
impl AddressResolver for DohResolver {
    async fn resolve(&self, hostname: &str, typ: DnsRecordType) -> Option<String> {
        let response = match self.query(hostname, typ).await {
            Ok(response) => response,
            Err(e) => {
                warn!(err = %e, hostname, "DoH lookup failed");
                return None;
            }
        };

        let address = response.first_address(typ);
        match &address {
            Some(address) => debug!(hostname, address = %address, "resolved"),
            None => warn!(
                hostname,
                typ = %typ,
                status = response.status,
                answers = response.answer.len(),
                "DoH response carried no usable answer"
            ),
        }
        address
    }
}

#[derive(Deserialize, Debug)]
struct DohResponse {
    /// DNS RCODE, 0 is NOERROR.
    #[serde(rename = "Status")]
    status: u16,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Deserialize, Debug)]
struct DohAnswer {
    #[serde(rename = "type")]
    typ: u16,
    data: String,
}

impl DohResponse {
    fn first_address(&self, typ: DnsRecordType) -> Option<String> {
        if self.status != 0 {
            return None;
        }
        // CNAME chains come back in the same list, so match on the type code.
        self.answer
            .iter()
            .find(|it| it.typ == typ.type_code())
            .map(|it| it.data.clone())
    }
}
