//! Site targets, homepage discovery and member listing
//!
//! A [`Site`] addresses one wiki of the farm: its unix name plus whether
//! it enforces TLS. Sites obtained through [`Client::get_site`] also
//! carry metadata discovered from the homepage (numeric id, custom
//! domain, privacy, title). Module calls addressed at a site go through
//! the client's request engine; the member listing drives the wave
//! scheduler over the paginated members module.
//!
//! [`Client::get_site`]: crate::Client::get_site

use crate::amc::{ModulePayload, ModuleResponse, RequestOptions};
use crate::batch;
use crate::client::Client;
use crate::error::{Error, Result, ScrapeError};
use crate::scrape;
use crate::user::SiteMember;
use std::collections::BTreeMap;

/// Metadata discovered from a site's homepage
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SiteInfo {
    /// Custom domain, when the site has one
    pub domain: Option<String>,
    /// Numeric site id
    pub id: Option<u64>,
    /// Whether the site is members-only
    pub private: bool,
    /// Site title from the header
    pub title: Option<String>,
}

/// One wiki of the farm, addressed by unix name
///
/// Immutable once constructed; cheap to clone.
#[derive(Clone, Debug)]
pub struct Site {
    client: Client,
    name: String,
    tls: bool,
    info: SiteInfo,
}

impl Site {
    pub(crate) fn new(client: Client, name: String, tls: bool, info: SiteInfo) -> Self {
        Self {
            client,
            name,
            tls,
            info,
        }
    }

    /// The site's unix name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the site enforces TLS
    pub fn tls(&self) -> bool {
        self.tls
    }

    /// Numeric site id, when discovery found one
    pub fn id(&self) -> Option<u64> {
        self.info.id
    }

    /// Custom domain, when the site has one
    pub fn domain(&self) -> Option<&str> {
        self.info.domain.as_deref()
    }

    /// Site title, when discovery found one
    pub fn title(&self) -> Option<&str> {
        self.info.title.as_deref()
    }

    /// Whether the site is members-only
    pub fn is_private(&self) -> bool {
        self.info.private
    }

    /// Issue a module call against this site with the client's defaults
    pub async fn module_call(&self, payload: &ModulePayload) -> Result<ModuleResponse> {
        self.client
            .connector_call(&self.name, self.tls, payload, None)
            .await
    }

    /// Issue a module call against this site with per-call options
    pub async fn module_call_with(
        &self,
        payload: &ModulePayload,
        options: RequestOptions,
    ) -> Result<ModuleResponse> {
        self.client
            .connector_call(&self.name, self.tls, payload, Some(options))
            .await
    }

    /// List every member of the site with their join dates
    ///
    /// Fetches page 1 of the members module to size the listing, then the
    /// remaining pages in waves under the batch throughput controls. Each
    /// page is scraped independently; the aggregate comes back in
    /// ascending page order regardless of completion order. A page that
    /// keeps failing transiently is retried under the batch retry policy;
    /// a page that cannot be scraped is dropped with a warning.
    pub async fn members(&self) -> Result<Vec<SiteMember>> {
        let first = self
            .module_call(&member_page_payload(1))
            .await?
            .body()
            .map(str::to_string)
            .ok_or(Error::Scrape(ScrapeError::MissingBody))?;
        let total = scrape::parse_pager_total(&first)?;

        let mut pages: BTreeMap<u32, Vec<SiteMember>> = BTreeMap::new();
        pages.insert(1, scrape::parse_member_rows(&first)?);

        if total > 1 {
            let config = &self.client.config().batch;
            let page_numbers: Vec<u32> = (2..=total).collect();
            tracing::debug!(site = %self.name, total, "fetching member listing pages");

            let fetched = batch::run_waves(page_numbers, config, |page| async move {
                (page, self.fetch_member_page(page).await)
            })
            .await;

            for (page, members) in fetched {
                if let Some(members) = members {
                    pages.insert(page, members);
                }
            }
        }

        Ok(pages.into_values().flatten().collect())
    }

    /// Fetch and scrape one member-list page under the batch retry policy
    async fn fetch_member_page(&self, page: u32) -> Option<Vec<SiteMember>> {
        let config = &self.client.config().batch;
        let payload = member_page_payload(page);
        let html = batch::persistent(config, || {
            let site = self.clone();
            let payload = payload.clone();
            async move {
                site.module_call(&payload)
                    .await?
                    .body()
                    .map(str::to_string)
                    .ok_or(Error::Scrape(ScrapeError::MissingBody))
            }
        })
        .await?;

        match scrape::parse_member_rows(&html) {
            Ok(members) => Some(members),
            Err(error) => {
                tracing::warn!(page, %error, "member page failed to scrape, dropping");
                None
            }
        }
    }
}

fn member_page_payload(page: u32) -> ModulePayload {
    ModulePayload::module("membership/MembersListModule")
        .field("page", page)
        .field("group", "")
        .field("order", "")
}
