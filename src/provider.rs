use async_trait::async_trait;
use derive_more::Display;
use rootcause::Report;
use serde::Serialize;

pub mod cloudflare;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
pub enum DnsRecordType {
    A,
    #[allow(clippy::upper_case_acronyms)]
    AAAA,
}

impl DnsRecordType {
    /// Numeric resource-record type code as it appears in DNS answers.
    pub fn type_code(self) -> u16 {
        match self {
            Self::A => 1,
            Self::AAAA => 28,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct RecordId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct ZoneId(pub String);

/// The provider's current view of a record, fetched fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedRecord {
    pub id: RecordId,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

/// Full-record replacement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordUpdate {
    #[serde(rename = "type")]
    pub typ: DnsRecordType,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

impl RecordUpdate {
    /// Points `record` at `content`, keeping its ttl and proxied flag.
    pub fn replacing(
        record: &ManagedRecord,
        typ: DnsRecordType,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            typ,
            name: name.into(),
            content: content.into(),
            ttl: record.ttl,
            proxied: record.proxied,
        }
    }
}

#[async_trait]
pub trait DnsProvider {
    /// Looks up the first record named `name` of type `typ` in `zone`.
    ///
    /// `Ok(None)` means the provider answered but reported a logical failure
    /// or no matching record.
    async fn find_record(
        &self,
        zone: &ZoneId,
        name: &str,
        typ: DnsRecordType,
    ) -> Result<Option<ManagedRecord>, Report>;

    async fn replace_record(
        &self,
        zone: &ZoneId,
        record_id: &RecordId,
        update: &RecordUpdate,
    ) -> Result<(), Report>;
}
