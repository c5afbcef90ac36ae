//! Vendor client abstraction.
//!
//! [`VendorClient`] is the one capability every vendor offers: list a page
//! of events for a category. The three implementations differ in auth,
//! pagination and filter grammar; [`AnyVendorClient`] picks one by
//! configuration.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secbridge_core::error::BridgeError;
use secbridge_core::filter::EventFilter;
use secbridge_core::types::{EventCategory, Vendor};
use secbridge_credentials::{AnySecretStore, SecretStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::crowdstrike::EndpointDetectionClient;
use crate::microsoft::IdentitySuiteClient;
use crate::proofpoint::MailGatewayClient;
use crate::rate_limit::{Operation, RateLimitHeaders};

/// Vendor-specific position in a result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PageCursor {
    /// Offset into a CrowdStrike id query.
    Offset { offset: u32 },
    /// Absolute `@odata.nextLink`.
    Link { url: String },
    /// Remaining Proofpoint time range; the next query covers its first
    /// sub-window.
    Window {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// One page request.
#[derive(Debug, Clone)]
pub struct VendorRequest {
    pub vendor: Vendor,
    pub category: EventCategory,
    pub filter: EventFilter,
    pub cursor: Option<PageCursor>,
    /// Page-size hint; clamped to the vendor maximum.
    pub page_size: Option<usize>,
    /// Overrides `[http] request_timeout_secs` for this request.
    pub timeout: Option<Duration>,
}

impl VendorRequest {
    pub fn new(vendor: Vendor, category: EventCategory, filter: EventFilter) -> Self {
        Self {
            vendor,
            category,
            filter,
            cursor: None,
            page_size: None,
            timeout: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Option<PageCursor>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The logical operation name, e.g. `list-detection`.
    pub fn operation(&self) -> Operation {
        Operation::idempotent(list_operation(self.category))
    }

    /// `page_size` clamped to `1..=max`, `max` when absent.
    pub fn page_limit(&self, max: usize) -> usize {
        self.page_size.unwrap_or(max).clamp(1, max.max(1))
    }
}

fn list_operation(category: EventCategory) -> &'static str {
    match category {
        EventCategory::Detection => "list-detection",
        EventCategory::Incident => "list-incident",
        EventCategory::Alert => "list-alert",
        EventCategory::IdentityRisk => "list-identity-risk",
        EventCategory::EmailThreat => "list-email-threat",
    }
}

/// One raw page as returned by a vendor.
#[derive(Debug, Clone)]
pub struct VendorResponse {
    /// Referenced by every event normalized from this page.
    pub id: Uuid,
    pub vendor: Vendor,
    pub category: EventCategory,
    pub body: Value,
    /// `None` when the result set is exhausted.
    pub next: Option<PageCursor>,
    pub status: u16,
    pub rate_limit: RateLimitHeaders,
}

impl VendorResponse {
    pub fn new(vendor: Vendor, category: EventCategory, body: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            vendor,
            category,
            body,
            next: None,
            status: 200,
            rate_limit: RateLimitHeaders::default(),
        }
    }

    pub fn with_next(mut self, next: Option<PageCursor>) -> Self {
        self.next = next;
        self
    }
}

/// A security vendor API.
///
/// Implementations compose `CredentialBroker`, `TokenCache` and
/// `RateLimiter`; callers only see pages.
pub trait VendorClient: Send + Sync + 'static {
    fn vendor(&self) -> Vendor;

    /// Categories this client serves.
    fn categories(&self) -> &'static [EventCategory] {
        self.vendor().categories()
    }

    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// - `BridgeError::Config`: filter keys or values the vendor cannot express
    /// - `BridgeError::AuthenticationFailed`, `RateLimited`, `Exhausted`,
    ///   `Upstream`, `Timeout`, `Decode`
    fn list_events(
        &self,
        request: &VendorRequest,
    ) -> impl Future<Output = Result<VendorResponse, BridgeError>> + Send;

    /// Checks reachability and token validity for `category` with the
    /// smallest possible request.
    fn probe(&self, category: EventCategory)
    -> impl Future<Output = Result<(), BridgeError>> + Send;
}

/// Rejects requests for a category the vendor does not serve.
pub(crate) fn ensure_category(
    vendor: Vendor,
    category: EventCategory,
) -> Result<(), BridgeError> {
    if vendor.categories().contains(&category) {
        Ok(())
    } else {
        Err(BridgeError::Config(
            secbridge_core::error::ConfigError::InvalidFilter {
                field: "category".to_owned(),
                reason: format!("{vendor} does not serve {category}"),
            },
        ))
    }
}

/// Tracks cursors handed out for one stream so none is consumed twice.
#[derive(Debug, Default)]
pub struct Pager {
    previous: Option<PageCursor>,
    visited_links: HashSet<String>,
}

impl Pager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts the next cursor if it moves strictly forward.
    ///
    /// # Errors
    ///
    /// `BridgeError::Decode` when an offset does not increase, a link was
    /// already visited, or a window does not start after the previous one.
    pub fn advance(
        &mut self,
        vendor: Vendor,
        next: Option<PageCursor>,
    ) -> Result<Option<PageCursor>, BridgeError> {
        let Some(next) = next else {
            return Ok(None);
        };

        let regressed = match (&self.previous, &next) {
            (Some(PageCursor::Offset { offset: prev }), PageCursor::Offset { offset }) => {
                offset <= prev
            }
            (_, PageCursor::Link { url }) => self.visited_links.contains(url),
            (
                Some(PageCursor::Window { start: prev, .. }),
                PageCursor::Window { start, .. },
            ) => start <= prev,
            _ => false,
        };
        if regressed {
            return Err(BridgeError::Decode {
                vendor,
                reason: format!("pagination cursor did not advance: {next:?}"),
            });
        }

        if let PageCursor::Link { url } = &next {
            self.visited_links.insert(url.clone());
        }
        self.previous = Some(next.clone());
        Ok(Some(next))
    }
}

/// The client for one configured vendor.
pub enum AnyVendorClient<S: SecretStore = AnySecretStore> {
    CrowdStrike(EndpointDetectionClient<S>),
    Microsoft(IdentitySuiteClient<S>),
    Proofpoint(MailGatewayClient<S>),
}

impl<S: SecretStore> AnyVendorClient<S> {
    pub fn as_crowdstrike(&self) -> Option<&EndpointDetectionClient<S>> {
        match self {
            Self::CrowdStrike(client) => Some(client),
            _ => None,
        }
    }
}

impl<S: SecretStore> VendorClient for AnyVendorClient<S> {
    fn vendor(&self) -> Vendor {
        match self {
            Self::CrowdStrike(c) => c.vendor(),
            Self::Microsoft(c) => c.vendor(),
            Self::Proofpoint(c) => c.vendor(),
        }
    }

    async fn list_events(&self, request: &VendorRequest) -> Result<VendorResponse, BridgeError> {
        match self {
            Self::CrowdStrike(c) => c.list_events(request).await,
            Self::Microsoft(c) => c.list_events(request).await,
            Self::Proofpoint(c) => c.list_events(request).await,
        }
    }

    async fn probe(&self, category: EventCategory) -> Result<(), BridgeError> {
        match self {
            Self::CrowdStrike(c) => c.probe(category).await,
            Self::Microsoft(c) => c.probe(category).await,
            Self::Proofpoint(c) => c.probe(category).await,
        }
    }
}
