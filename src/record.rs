use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::cookies::{Cookie, CookieJar};
use crate::scan::ScrapeResult;

/// Table every record is written to.
pub(crate) const TABLE_NAME: &str = "2kcookies";

/// The only cookie that ends up in a record.
pub(crate) const SESSION_COOKIE: &str = "2K";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no 2K cookie was set")]
pub(crate) struct NoSessionCookie;

/// One collected data point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Record {
    pub(crate) table: String,
    pub(crate) timestamp: i64,
    pub(crate) cookie_name: String,
    pub(crate) cookie_value: String,
    pub(crate) state: String,
    pub(crate) client_id: String,
}

/// A typed attribute, serialized as `{"N": "..."}` or `{"S": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) enum AttributeValue {
    N(String),
    S(String),
}

/// Body of a single put-record call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PutItem<'a> {
    pub(crate) table_name: &'a str,
    pub(crate) item: BTreeMap<&'static str, AttributeValue>,
}

impl Record {
    pub(crate) fn attributes(&self) -> BTreeMap<&'static str, AttributeValue> {
        BTreeMap::from([
            ("timestamp", AttributeValue::N(self.timestamp.to_string())),
            ("cookie_name", AttributeValue::S(self.cookie_name.clone())),
            ("cookie_value", AttributeValue::S(self.cookie_value.clone())),
            ("state", AttributeValue::S(self.state.clone())),
            ("client_id", AttributeValue::S(self.client_id.clone())),
        ])
    }

    pub(crate) fn put_item(&self) -> PutItem<'_> {
        PutItem {
            table_name: &self.table,
            item: self.attributes(),
        }
    }
}

/// Joins a filled jar with the scrape of the same response.
pub(crate) struct RecordBuilder<'a> {
    pub(crate) table: &'a str,
    /// Host whose session cookie takes precedence, normally the target's.
    pub(crate) primary_host: Option<&'a str>,
}

impl RecordBuilder<'_> {
    pub(crate) fn build(
        &self,
        jar: &CookieJar,
        scrape: ScrapeResult,
        timestamp: i64,
    ) -> Result<Record, NoSessionCookie> {
        let cookie = self.session_cookie(jar).ok_or(NoSessionCookie)?;

        Ok(Record {
            table: self.table.to_string(),
            timestamp,
            cookie_name: cookie.name,
            cookie_value: cookie.value,
            state: scrape.state,
            client_id: scrape.client_id,
        })
    }

    /// The primary host wins; otherwise the last match in ascending host order.
    fn session_cookie(&self, jar: &CookieJar) -> Option<Cookie> {
        let hosts = jar.hosts();
        let primary = self
            .primary_host
            .and_then(|host| hosts.get(host))
            .and_then(|cookies| last_session_cookie(cookies));

        primary.or_else(|| hosts.values().filter_map(|c| last_session_cookie(c)).last()).cloned()
    }
}

fn last_session_cookie(cookies: &[Cookie]) -> Option<&Cookie> {
    cookies.iter().rev().find(|cookie| cookie.name == SESSION_COOKIE)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scrape() -> ScrapeResult {
        ScrapeResult {
            state: "xyz".to_string(),
            client_id: "42".to_string(),
        }
    }

    fn builder(primary_host: Option<&str>) -> RecordBuilder<'_> {
        RecordBuilder {
            table: TABLE_NAME,
            primary_host,
        }
    }

    #[test]
    fn builds_the_record_from_jar_and_scrape() {
        let jar = CookieJar::new();
        jar.set_host_cookies("2k.com", vec![Cookie::new("lang", "en"), Cookie::new("2K", "abc123")]);

        let record = builder(Some("2k.com")).build(&jar, scrape(), 1_700_000_000).unwrap();

        assert_eq!(
            record,
            Record {
                table: "2kcookies".to_string(),
                timestamp: 1_700_000_000,
                cookie_name: "2K".to_string(),
                cookie_value: "abc123".to_string(),
                state: "xyz".to_string(),
                client_id: "42".to_string(),
            }
        );
        assert_eq!(
            serde_json::to_value(record.put_item()).unwrap(),
            json!({
                "TableName": "2kcookies",
                "Item": {
                    "timestamp": {"N": "1700000000"},
                    "cookie_name": {"S": "2K"},
                    "cookie_value": {"S": "abc123"},
                    "state": {"S": "xyz"},
                    "client_id": {"S": "42"},
                }
            })
        );
    }

    #[test]
    fn no_session_cookie_means_no_record() {
        let jar = CookieJar::new();
        jar.set_host_cookies("2k.com", vec![Cookie::new("2k", "wrong case"), Cookie::new("lang", "en")]);

        assert_eq!(builder(Some("2k.com")).build(&jar, scrape(), 1), Err(NoSessionCookie));
        assert_eq!(builder(None).build(&CookieJar::new(), scrape(), 1), Err(NoSessionCookie));
    }

    #[test]
    fn primary_host_takes_precedence() {
        let jar = CookieJar::new();
        jar.set_host_cookies("2k.com", vec![Cookie::new("2K", "primary")]);
        jar.set_host_cookies("zz.2k.com", vec![Cookie::new("2K", "other")]);

        let record = builder(Some("2k.com")).build(&jar, scrape(), 1).unwrap();
        assert_eq!(record.cookie_value, "primary");
    }

    #[test]
    fn without_primary_the_last_host_in_order_wins() {
        let jar = CookieJar::new();
        jar.set_host_cookies("www.2k.com", vec![Cookie::new("2K", "www")]);
        jar.set_host_cookies("accounts.2k.com", vec![Cookie::new("2K", "accounts")]);
        jar.set_host_cookies("2k.com", vec![Cookie::new("lang", "en")]);

        let record = builder(Some("2k.com")).build(&jar, scrape(), 1).unwrap();
        assert_eq!(record.cookie_value, "www");
    }

    #[test]
    fn last_session_cookie_within_a_host_wins() {
        let jar = CookieJar::new();
        jar.set_host_cookies("2k.com", vec![Cookie::new("2K", "old"), Cookie::new("2K", "new")]);

        let record = builder(None).build(&jar, scrape(), 1).unwrap();
        assert_eq!(record.cookie_value, "new");
    }
}
