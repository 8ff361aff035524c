//! Scrapers for the server-rendered fragments the service returns
//!
//! Everything here is a site-specific scraping rule, quarantined in this
//! module: profile pages (`user:info`), `printuser` account references,
//! `odate` timestamps, member-list rows and the list pager. The rules
//! mirror the markup the service actually emits; a [`ScrapeError`] from
//! any of them usually means the remote layout changed.

use crate::error::ScrapeError;
use crate::site::SiteInfo;
use crate::user::{Karma, RegisteredUser, SiteMember, User, to_unix_name};
use chrono::{DateTime, TimeZone, Utc};
use scraper::{ElementRef, Html, Selector};

// Selectors here are fixed strings; failing to parse one is a programming
// error, not a runtime condition.
#[allow(clippy::expect_used)]
fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// Scrape a `user:info` profile page
///
/// Returns `Ok(None)` when the page reports that the user does not exist;
/// absent users are an expected outcome of lookups, not an error.
pub fn parse_profile_page(html: &str) -> Result<Option<RegisteredUser>, ScrapeError> {
    let document = Html::parse_document(html);

    let Some(content) = document.select(&selector("#page-content")).next() else {
        return Ok(None);
    };
    if content.text().collect::<String>().trim() == "User does not exist." {
        return Ok(None);
    }

    // The write-private-message button href ends in the account id
    let id = content
        .select(&selector("a.btn.btn-default.btn-xs"))
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| href.split("messages#/new/").nth(1))
        .and_then(|tail| tail.trim().parse::<u64>().ok());

    let name = content
        .select(&selector(".profile-title"))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .ok_or(ScrapeError::Profile {
            field: "profile title",
        })?;
    let unix_name = to_unix_name(&name);

    let mut registered = None;
    let mut pro = false;
    let mut karma = None;

    // The detail box is a definition list of dt/dd pairs
    let dt_sel = selector("dl.dl-horizontal > dt");
    let dd_sel = selector("dl.dl-horizontal > dd");
    let dts = content.select(&dt_sel);
    let dds = content.select(&dd_sel);
    for (dt, dd) in dts.zip(dds) {
        let label: String = dt.text().collect();
        let value: String = dd.text().collect();

        if label.contains("Wikidot user since") {
            registered = dd
                .select(&selector("span.odate"))
                .next()
                .and_then(|el| parse_odate(el).ok());
        } else if label.contains("Account type") {
            pro = value.contains("Pro");
        } else if label.contains("Karma") {
            karma = Karma::from_profile_text(&value);
        }
    }

    Ok(Some(RegisteredUser {
        id,
        name,
        unix_name,
        registered,
        pro,
        karma,
    }))
}

/// Scrape a `printuser` span into the matching [`User`] variant
///
/// The service renders account references in several shapes; the checks
/// below probe them in order of distinctiveness.
pub fn parse_printuser(element: ElementRef<'_>) -> Result<User, ScrapeError> {
    let classes: Vec<&str> = element.value().classes().collect();

    if classes.contains(&"deleted") {
        let id = element
            .value()
            .attr("data-id")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or(ScrapeError::Printuser)?;
        return Ok(User::Deleted { id });
    }

    if classes.contains(&"anonymous") {
        let ip = element
            .select(&selector("span.ip"))
            .next()
            .map(|el| el.text().collect::<String>())
            .ok_or(ScrapeError::Printuser)?;
        let ip = ip.replace(['(', ')'], "").trim().to_string();
        return Ok(User::Anonymous { ip });
    }

    let text = element.text().collect::<String>().trim().to_string();
    if text == "Wikidot" {
        return Ok(User::System);
    }

    let anchors: Vec<ElementRef<'_>> = element
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "a")
        .collect();

    // [[user]]-style rendering: a single anchor, no avatar
    if anchors.len() == 1 {
        let id = anchors[0]
            .value()
            .attr("onclick")
            .and_then(parse_user_info_listener);
        return Ok(User::Registered(RegisteredUser {
            id,
            unix_name: to_unix_name(&text),
            name: text,
            registered: None,
            pro: false,
            karma: None,
        }));
    }

    if classes.contains(&"error-inline") {
        return Ok(User::Unknown);
    }

    // Normal rendering: avatar anchor followed by the name anchor
    let author = anchors.get(1).ok_or(ScrapeError::Printuser)?;
    let name = author.text().collect::<String>().trim().to_string();
    if name.is_empty() {
        return Err(ScrapeError::Printuser);
    }
    let unix_name = author
        .value()
        .attr("href")
        .and_then(|href| href.split("user:info/").nth(1))
        .map(str::to_string)
        .unwrap_or_else(|| to_unix_name(&name));
    let id = author
        .value()
        .attr("onclick")
        .and_then(parse_user_info_listener);

    Ok(User::Registered(RegisteredUser {
        id,
        name,
        unix_name,
        registered: None,
        pro: false,
        karma: None,
    }))
}

/// Extract the account id from a `userInfo` click listener attribute
///
/// The attribute looks like `WIKIDOT.page.listeners.userInfo(123456); return false;`.
fn parse_user_info_listener(onclick: &str) -> Option<u64> {
    if !onclick.contains("userInfo") {
        return None;
    }
    onclick
        .split('(')
        .nth(1)?
        .split(')')
        .next()?
        .trim()
        .parse()
        .ok()
}

/// Decode an `odate` element into a UTC timestamp
///
/// The epoch is carried in a `time_<epoch>` class on the element.
pub fn parse_odate(element: ElementRef<'_>) -> Result<DateTime<Utc>, ScrapeError> {
    for class in element.value().classes() {
        if let Some(epoch) = class.strip_prefix("time_") {
            let secs: i64 = epoch.parse().map_err(|_| ScrapeError::Odate)?;
            return Utc.timestamp_opt(secs, 0).single().ok_or(ScrapeError::Odate);
        }
    }
    Err(ScrapeError::Odate)
}

/// Read the total page count from a listing's pager
///
/// A listing that fits one page renders no pager at all, which counts as
/// one page. The second-to-last `span.target` holds the last page number
/// (the last one is the "next" link).
pub fn parse_pager_total(html: &str) -> Result<u32, ScrapeError> {
    let document = Html::parse_document(html);
    let Some(pager) = document.select(&selector("div.pager")).next() else {
        return Ok(1);
    };
    let targets: Vec<ElementRef<'_>> = pager.select(&selector("span.target")).collect();
    if targets.len() < 2 {
        return Err(ScrapeError::PagerTotal);
    }
    targets[targets.len() - 2]
        .text()
        .collect::<String>()
        .trim()
        .parse()
        .map_err(|_| ScrapeError::PagerTotal)
}

/// Scrape one member-list page into `(user, join date)` records
///
/// Rows without a `printuser` span (header rows) are skipped.
pub fn parse_member_rows(html: &str) -> Result<Vec<SiteMember>, ScrapeError> {
    let document = Html::parse_document(html);
    let mut members = Vec::new();
    for row in document.select(&selector("tr")) {
        let Some(printuser) = row.select(&selector("span.printuser")).next() else {
            continue;
        };
        let user = parse_printuser(printuser)?;
        let joined = row
            .select(&selector("span.odate"))
            .next()
            .and_then(|el| parse_odate(el).ok());
        members.push(SiteMember { user, joined });
    }
    Ok(members)
}

/// Scrape site metadata out of a homepage
///
/// The farm embeds request metadata as inline script assignments near the
/// top of every page; scanning stops at the first mobile-detection line,
/// after which no further assignments appear.
pub fn parse_homepage(html: &str) -> SiteInfo {
    let mut domain = None;
    let mut id = None;
    let mut private = false;

    for line in html.lines() {
        if line.contains("isUAMobile") {
            break;
        }
        if line.contains("WIKIREQUEST.info.domain") {
            domain = line.split('"').nth(1).map(str::to_string);
        } else if line.contains("WIKIREQUEST.info.siteId") {
            id = line
                .replace("WIKIREQUEST.info.siteId =", "")
                .replace(';', "")
                .trim()
                .parse::<u64>()
                .ok();
        } else if line.contains("WIKIREQUEST.info.requestPageName") && line.contains("system:join")
        {
            private = true;
        }
    }

    let title = Html::parse_document(html)
        .select(&selector("div#header > h1 > a > span"))
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string());

    SiteInfo {
        domain,
        id,
        private,
        title,
    }
}
