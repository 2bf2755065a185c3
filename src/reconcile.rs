use std::time::Duration;

use derive_more::Display;
use rootcause::prelude::ResultExt;
use rootcause::{Report, report};
use tracing::{error, info};

use crate::{
    config::ReconcileConfig,
    provider::{DnsProvider, RecordUpdate},
    resolver::AddressResolver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FailureKind {
    #[display("configuration missing")]
    ConfigurationMissing,
    #[display("resolution failed")]
    ResolutionFailed,
    #[display("listing provider records failed")]
    ProviderListFailed,
    #[display("record not found")]
    RecordNotFound,
    #[display("updating provider record failed")]
    ProviderUpdateFailed,
    #[display("run timed out")]
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Outcome {
    #[display("unchanged {address}")]
    Unchanged { address: String },
    #[display("updated {previous} -> {address}")]
    Updated { previous: String, address: String },
    #[display("failed: {_0}")]
    Failed(FailureKind),
}

struct Failure {
    kind: FailureKind,
    report: Report,
}

impl Failure {
    fn new(kind: FailureKind, report: Report) -> Self {
        Self { kind, report }
    }
}

/// Brings the managed record in line with the address `probe_hostname`
/// currently resolves to.
///
/// Never fails: every error is logged and folded into [`Outcome::Failed`].
/// At most one update request is sent and nothing is retried.
pub async fn reconcile<R, P>(config: &ReconcileConfig, resolver: &R, provider: &P) -> Outcome
where
    R: AddressResolver + Sync + ?Sized,
    P: DnsProvider + Sync + ?Sized,
{
    settle(config, try_reconcile(config, resolver, provider).await)
}

/// [`reconcile`], abandoned with [`FailureKind::TimedOut`] once `limit` has
/// passed. A dropped run may leave its update request unanswered.
pub async fn reconcile_within<R, P>(
    limit: Duration,
    config: &ReconcileConfig,
    resolver: &R,
    provider: &P,
) -> Outcome
where
    R: AddressResolver + Sync + ?Sized,
    P: DnsProvider + Sync + ?Sized,
{
    match tokio::time::timeout(limit, reconcile(config, resolver, provider)).await {
        Ok(outcome) => outcome,
        Err(_) => settle(
            config,
            Err(Failure::new(
                FailureKind::TimedOut,
                report!("No result after {:?}", limit),
            )),
        ),
    }
}

fn settle(config: &ReconcileConfig, result: Result<Outcome, Failure>) -> Outcome {
    let Failure { kind, report } = match result {
        Ok(outcome) => return outcome,
        Err(failure) => failure,
    };
    match kind {
        FailureKind::ConfigurationMissing => {
            error!(err = %report, "Missing configuration, skipping run")
        }
        FailureKind::ResolutionFailed => error!(
            err = %report,
            hostname = %config.probe_hostname,
            "Could not resolve current public address"
        ),
        FailureKind::ProviderListFailed => error!(
            err = %report,
            record = %config.record_name,
            "Could not fetch current DNS record from provider"
        ),
        FailureKind::RecordNotFound => error!(
            err = %report,
            record = %config.record_name,
            zone = %config.zone_id,
            "DNS record not found"
        ),
        FailureKind::ProviderUpdateFailed => error!(
            err = %report,
            record = %config.record_name,
            "Could not update DNS record"
        ),
        FailureKind::TimedOut => error!(
            err = %report,
            record = %config.record_name,
            "Run did not finish in time, abandoned"
        ),
    }
    Outcome::Failed(kind)
}

async fn try_reconcile<R, P>(
    config: &ReconcileConfig,
    resolver: &R,
    provider: &P,
) -> Result<Outcome, Failure>
where
    R: AddressResolver + Sync + ?Sized,
    P: DnsProvider + Sync + ?Sized,
{
    let missing = config.missing_fields();
    if !missing.is_empty() {
        let report = missing.iter().fold(
            report!("Missing required configuration value"),
            |report, name| report.attach(format!("'{name}' is not set")),
        );
        return Err(Failure::new(FailureKind::ConfigurationMissing, report));
    }

    let Some(address) = resolver
        .resolve(&config.probe_hostname, config.record_type)
        .await
    else {
        return Err(Failure::new(
            FailureKind::ResolutionFailed,
            report!("No {} answer for '{}'", config.record_type, config.probe_hostname),
        ));
    };
    info!(hostname = %config.probe_hostname, address = %address, "Resolved public address");

    let record = provider
        .find_record(&config.zone_id, &config.record_name, config.record_type)
        .await
        .map_err(|e| Failure::new(FailureKind::ProviderListFailed, e))?;

    let Some(record) = record else {
        return Err(Failure::new(
            FailureKind::RecordNotFound,
            report!(
                "No {} record named '{}' in zone '{}'",
                config.record_type,
                config.record_name,
                config.zone_id
            ),
        ));
    };
    info!(record = %config.record_name, address = %record.content, "Current provider address");

    if record.content == address {
        info!(address = %address, "Addresses match, no update required");
        return Ok(Outcome::Unchanged { address });
    }

    info!(
        record = %config.record_name,
        from = %record.content,
        to = %address,
        "Updating DNS record"
    );
    let update = RecordUpdate::replacing(
        &record,
        config.record_type,
        config.record_name.as_str(),
        address.as_str(),
    );
    provider
        .replace_record(&config.zone_id, &record.id, &update)
        .await
        .attach(format!("record: '{}'", config.record_name))
        .attach(format!("new address: '{address}'"))
        .map_err(|e| Failure::new(FailureKind::ProviderUpdateFailed, e))?;

    info!(record = %config.record_name, address = %address, "DNS record updated");
    Ok(Outcome::Updated {
        previous: record.content,
        address,
    })
}
