use log::debug;
use reqwest::Url;
use scraper::{Html, Selector};
use thiserror::Error;

const ANCHOR_SELECTOR: &str = "a[data-href]";

/// Authorization parameters lifted from an anchor's `data-href` query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScrapeResult {
    pub(crate) state: String,
    pub(crate) client_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ScrapeError {
    #[error("no anchor carries a data-href attribute")]
    NoAnchor,
    #[error("data-href {href:?} is not a valid url: {source}")]
    InvalidHref {
        href: String,
        source: url::ParseError,
    },
    #[error("data-href query has no {0} parameter")]
    MissingParam(&'static str),
    #[error("invalid anchor selector: {0}")]
    Selector(String),
}

/// Finds the first `<a data-href=...>` in document order and decodes its
/// `state` and `client_id` query parameters.
///
/// Relative hrefs are resolved against `page_url`. Anchors without a
/// `data-href` are ignored, and every anchor after the first match is too.
pub(crate) fn scan_page(html: &str, page_url: &Url) -> Result<ScrapeResult, ScrapeError> {
    let selector =
        Selector::parse(ANCHOR_SELECTOR).map_err(|e| ScrapeError::Selector(e.to_string()))?;
    let document = Html::parse_document(html);

    let anchor = document.select(&selector).next().ok_or(ScrapeError::NoAnchor)?;
    let element = anchor.value();
    let href = element.attr("data-href").unwrap_or_default();
    debug!("matched anchor id={:?} data-href={href:?}", element.id());

    parse_href(href, page_url)
}

fn parse_href(href: &str, page_url: &Url) -> Result<ScrapeResult, ScrapeError> {
    let url = page_url.join(href).map_err(|source| ScrapeError::InvalidHref {
        href: href.to_string(),
        source,
    })?;

    let mut state = None;
    let mut client_id = None;
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "state" => &mut state,
            "client_id" => &mut client_id,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    Ok(ScrapeResult {
        state: non_empty(state).ok_or(ScrapeError::MissingParam("state"))?,
        client_id: non_empty(client_id).ok_or(ScrapeError::MissingParam("client_id"))?,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
