//! Unified fetch and probe surface over all configured vendors.
//!
//! [`SecurityFacade::fetch`] fans out one task per (vendor, category) pair.
//! Each task drains pagination up to the page limit, normalizes pages as
//! they arrive and sends them on a bounded channel, so results are merged
//! in arrival order. A task that fails reports a [`VendorFailure`] and
//! stops; the other tasks keep going.
//!
//! Dropping the [`FetchStream`] cancels every task still running.

use std::sync::Arc;

use secbridge_core::config::BridgeConfig;
use secbridge_core::error::BridgeError;
use secbridge_core::event::{NormalizedPage, SecurityEvent, SkippedRecord};
use secbridge_core::filter::EventFilter;
use secbridge_core::health::{ComponentHealth, HealthStatus, aggregate_status};
use secbridge_core::metrics as m;
use secbridge_core::types::{EventCategory, Vendor};
use secbridge_credentials::{CredentialBroker, SecretStore};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{AnyVendorClient, Pager, VendorClient, VendorRequest};
use crate::crowdstrike::EndpointDetectionClient;
use crate::http::VendorHttp;
use crate::microsoft::IdentitySuiteClient;
use crate::normalize::normalize;
use crate::proofpoint::MailGatewayClient;
use crate::rate_limit::RateLimiter;
use crate::token_cache::TokenCache;

/// Pages buffered between the fan-out tasks and the consumer.
const CHANNEL_CAPACITY: usize = 32;

/// A (vendor, category) stream that ended with an error.
#[derive(Debug, Clone)]
pub struct VendorFailure {
    pub vendor: Vendor,
    pub category: EventCategory,
    /// Pages delivered before the failure.
    pub pages_fetched: usize,
    pub error: BridgeError,
}

/// One item of a [`FetchStream`].
#[derive(Debug)]
pub enum FetchItem {
    /// A normalized page.
    Page {
        vendor: Vendor,
        category: EventCategory,
        /// Zero-based page number within its (vendor, category) stream.
        page_index: usize,
        response_id: Uuid,
        page: NormalizedPage,
    },
    /// A stream ended with an error.
    Failure(VendorFailure),
}

/// Everything a fetch produced.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub events: Vec<SecurityEvent>,
    pub skipped: Vec<SkippedRecord>,
    pub failures: Vec<VendorFailure>,
    pub pages: usize,
}

impl FetchOutcome {
    /// No event was produced and at least one stream failed.
    pub fn is_total_failure(&self) -> bool {
        self.events.is_empty() && !self.failures.is_empty()
    }
}

/// Results of one [`SecurityFacade::fetch`] call, in arrival order.
///
/// The stream ends once every (vendor, category) task has finished.
pub struct FetchStream {
    rx: mpsc::Receiver<FetchItem>,
    streams: usize,
    _cancel: DropGuard,
}

impl FetchStream {
    /// Number of (vendor, category) streams fanned out.
    pub fn stream_count(&self) -> usize {
        self.streams
    }

    /// Next page or failure, `None` once every stream is done.
    pub async fn next(&mut self) -> Option<FetchItem> {
        self.rx.recv().await
    }

    /// Drains the stream.
    pub async fn collect(mut self) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        while let Some(item) = self.next().await {
            match item {
                FetchItem::Page { page, .. } => {
                    outcome.pages += 1;
                    outcome.events.extend(page.events);
                    outcome.skipped.extend(page.skipped);
                }
                FetchItem::Failure(failure) => outcome.failures.push(failure),
            }
        }
        outcome
    }
}

/// Probe result for one vendor.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub vendor: Vendor,
    pub status: HealthStatus,
    /// One entry per probed category, named `vendor/category`.
    pub categories: Vec<ComponentHealth>,
}

/// Probe results for all vendors.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    /// Worst status across all vendors.
    pub status: HealthStatus,
    pub vendors: Vec<ProbeReport>,
}

/// Entry point for consumers: fetch and probe across vendors.
pub struct SecurityFacade<C: VendorClient = AnyVendorClient> {
    clients: Vec<Arc<C>>,
}

impl<S: SecretStore> SecurityFacade<AnyVendorClient<S>> {
    /// Builds a client for every enabled vendor, sharing one token cache
    /// and one rate limiter.
    ///
    /// # Errors
    ///
    /// `BridgeError::Config` when a vendor section is invalid.
    pub fn from_config(
        config: &BridgeConfig,
        broker: Arc<CredentialBroker<S>>,
        http: reqwest::Client,
    ) -> Result<Self, BridgeError> {
        let limiter = Arc::new(RateLimiter::from_config(config));
        let tokens = Arc::new(TokenCache::from_config(&config.http, broker, limiter));
        let request_timeout = config.http.request_timeout();
        let token_timeout = config.http.token_timeout();
        let vendor_http = |vendor: Vendor| {
            VendorHttp::new(vendor, http.clone(), Arc::clone(&tokens), request_timeout)
        };

        let mut clients = Vec::new();
        if config.crowdstrike.enabled {
            clients.push(AnyVendorClient::CrowdStrike(EndpointDetectionClient::new(
                &config.crowdstrike,
                vendor_http(Vendor::CrowdStrike),
                token_timeout,
            )));
        }
        if config.microsoft.enabled {
            clients.push(AnyVendorClient::Microsoft(IdentitySuiteClient::new(
                &config.microsoft,
                vendor_http(Vendor::Microsoft),
                token_timeout,
            )?));
        }
        if config.proofpoint.enabled {
            clients.push(AnyVendorClient::Proofpoint(MailGatewayClient::new(
                &config.proofpoint,
                vendor_http(Vendor::Proofpoint),
                token_timeout,
            )));
        }

        info!(
            vendors = ?clients.iter().map(|c| c.vendor().as_str()).collect::<Vec<_>>(),
            "security facade ready"
        );
        Ok(Self::new(clients))
    }
}

impl<C: VendorClient> SecurityFacade<C> {
    pub fn new(clients: impl IntoIterator<Item = C>) -> Self {
        let mut clients: Vec<Arc<C>> = clients.into_iter().map(Arc::new).collect();
        clients.sort_by_key(|c| c.vendor());
        Self { clients }
    }

    /// Configured vendors, in fixed order.
    pub fn vendors(&self) -> Vec<Vendor> {
        self.clients.iter().map(|c| c.vendor()).collect()
    }

    pub fn client(&self, vendor: Vendor) -> Option<&C> {
        self.clients
            .iter()
            .find(|c| c.vendor() == vendor)
            .map(Arc::as_ref)
    }

    /// (vendor, category) pairs served for `categories`; every served
    /// category when `categories` is empty.
    fn pairs(&self, categories: &[EventCategory]) -> Vec<(Arc<C>, EventCategory)> {
        let mut pairs = Vec::new();
        for client in &self.clients {
            for category in client.categories() {
                if categories.is_empty() || categories.contains(category) {
                    pairs.push((Arc::clone(client), *category));
                }
            }
        }
        for category in categories {
            if !pairs.iter().any(|(_, served)| served == category) {
                debug!(%category, "no configured vendor serves category");
            }
        }
        pairs
    }

    /// Starts fetching `categories` from every vendor that serves them.
    ///
    /// Each (vendor, category) stream stops after `per_vendor_page_limit`
    /// pages (at least one). Events below `filter.min_severity` are dropped
    /// after normalization, whether or not the vendor could filter them.
    ///
    /// Must be called within a tokio runtime.
    pub fn fetch(
        &self,
        categories: &[EventCategory],
        filter: &EventFilter,
        per_vendor_page_limit: usize,
    ) -> FetchStream {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let page_limit = per_vendor_page_limit.max(1);

        let pairs = self.pairs(categories);
        let streams = pairs.len();
        for (client, category) in pairs {
            tokio::spawn(drain(
                client,
                category,
                filter.clone(),
                page_limit,
                tx.clone(),
                cancel.child_token(),
            ));
        }
        debug!(streams, page_limit, "fetch fanned out");

        FetchStream {
            rx,
            streams,
            _cancel: cancel.drop_guard(),
        }
    }

    /// Probes every served category of every vendor, or only `categories`
    /// when given.
    ///
    /// `RateLimited` counts as degraded; any other error as unhealthy.
    pub async fn probe(&self, categories: &[EventCategory]) -> ProbeSummary {
        let mut vendors = Vec::new();
        for client in &self.clients {
            let vendor = client.vendor();
            let mut components = Vec::new();
            for category in client.categories() {
                if !categories.is_empty() && !categories.contains(category) {
                    continue;
                }
                let status = match client.probe(*category).await {
                    Ok(()) => HealthStatus::Healthy,
                    Err(e @ BridgeError::RateLimited { .. }) => HealthStatus::Degraded(e.to_string()),
                    Err(e) => HealthStatus::Unhealthy(e.to_string()),
                };
                debug!(%vendor, %category, %status, "probe finished");
                components.push(ComponentHealth {
                    name: format!("{vendor}/{category}"),
                    enabled: true,
                    status,
                });
            }
            if components.is_empty() {
                continue;
            }
            vendors.push(ProbeReport {
                vendor,
                status: aggregate_status(&components),
                categories: components,
            });
        }

        let all: Vec<ComponentHealth> = vendors
            .iter()
            .flat_map(|report| report.categories.iter().cloned())
            .collect();
        ProbeSummary {
            status: aggregate_status(&all),
            vendors,
        }
    }
}

/// Drains one (vendor, category) stream into `tx`.
async fn drain<C: VendorClient>(
    client: Arc<C>,
    category: EventCategory,
    filter: EventFilter,
    page_limit: usize,
    tx: mpsc::Sender<FetchItem>,
    cancel: CancellationToken,
) {
    let vendor = client.vendor();
    let mut pager = Pager::new();
    let mut request = VendorRequest::new(vendor, category, filter.clone());
    let started = tokio::time::Instant::now();

    for page_index in 0..page_limit {
        let result = tokio::select! {
            () = cancel.cancelled() => {
                debug!(%vendor, %category, page_index, "fetch cancelled");
                return;
            }
            result = client.list_events(&request) => result,
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                report_failure(&tx, vendor, category, page_index, error).await;
                return;
            }
        };

        let mut page = normalize(vendor, category, &response);
        page.events.retain(|event| event.meets(filter.min_severity));
        let next = pager.advance(vendor, response.next.clone());

        let item = FetchItem::Page {
            vendor,
            category,
            page_index,
            response_id: response.id,
            page,
        };
        if tx.send(item).await.is_err() {
            debug!(%vendor, %category, "fetch stream dropped");
            return;
        }

        match next {
            Ok(Some(cursor)) => request = request.with_cursor(Some(cursor)),
            Ok(None) => {
                debug!(
                    %vendor,
                    %category,
                    pages = page_index + 1,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "stream exhausted"
                );
                return;
            }
            Err(error) => {
                report_failure(&tx, vendor, category, page_index + 1, error).await;
                return;
            }
        }
    }
    debug!(%vendor, %category, page_limit, "page limit reached");
}

async fn report_failure(
    tx: &mpsc::Sender<FetchItem>,
    vendor: Vendor,
    category: EventCategory,
    pages_fetched: usize,
    error: BridgeError,
) {
    warn!(
        %vendor,
        %category,
        pages_fetched,
        error_kind = error.kind(),
        error = %error,
        "vendor stream failed"
    );
    metrics::counter!(
        m::STREAM_FAILURES_TOTAL,
        m::LABEL_VENDOR => vendor.as_str(),
        m::LABEL_CATEGORY => category.as_str(),
        m::LABEL_ERROR_KIND => error.kind()
    )
    .increment(1);
    let failure = FetchItem::Failure(VendorFailure {
        vendor,
        category,
        pages_fetched,
        error,
    });
    // 수신자가 없으면 보고할 곳도 없습니다
    let _ = tx.send(failure).await;
}
