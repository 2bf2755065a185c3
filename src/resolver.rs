use async_trait::async_trait;

use crate::provider::DnsRecordType;

pub mod doh;

#[async_trait]
pub trait AddressResolver {
    /// Resolves `hostname` to a single textual address of the given type.
    ///
    /// Every failure collapses into `None`; implementations log the reason.
    async fn resolve(&self, hostname: &str, typ: DnsRecordType) -> Option<String>;
}
