use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::DATE;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::cookies::CookieJar;

/// What one GET hands back to the collector.
#[derive(Debug, Clone)]
pub(crate) struct Page {
    /// Final url after redirects.
    pub(crate) url: Url,
    pub(crate) date: Option<String>,
    pub(crate) body: String,
}

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum TimestampError {
    #[error("response has no Date header")]
    Missing,
    #[error("malformed Date header {value:?}: {source}")]
    Malformed {
        value: String,
        source: chrono::ParseError,
    },
}

impl Page {
    /// Unix seconds taken from the response's `Date` header.
    pub(crate) fn timestamp(&self) -> Result<i64, TimestampError> {
        let value = self.date.as_deref().ok_or(TimestampError::Missing)?;
        parse_http_date(value)
            .map(|date| date.timestamp())
            .map_err(|source| TimestampError::Malformed {
                value: value.to_string(),
                source,
            })
    }
}

/// Parses an HTTP date such as `Mon, 2 Jan 2006 15:04:05 GMT`.
pub(crate) fn parse_http_date(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc2822(value.trim()).map(|date| date.with_timezone(&Utc))
}

#[async_trait]
pub(crate) trait Fetcher: Send + Sync {
    /// The page every iteration asks for.
    fn target(&self) -> &Url;

    /// Performs one GET of [`Fetcher::target`], letting the transport fill `jar`.
    async fn fetch(&self, jar: Arc<CookieJar>) -> Result<Page, FetchError>;
}

pub(crate) struct HttpFetcher {
    url: Url,
    timeout: Duration,
}

impl HttpFetcher {
    pub(crate) fn new(url: Url, timeout: Duration) -> Self {
        Self { url, timeout }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn target(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self, jar: Arc<CookieJar>) -> Result<Page, FetchError> {
        // The jar is fixed at build time, so every iteration gets its own client.
        let client = Client::builder()
            .cookie_provider(jar)
            .timeout(self.timeout)
            .build()
            .map_err(FetchError::Client)?;

        let response = client.get(self.url.clone()).send().await?;
        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::Status(status));
        }

        let url = response.url().clone();
        let date = response
            .headers()
            .get(DATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;

        Ok(Page { url, date, body })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn page_with_date(date: Option<&str>) -> Page {
        Page {
            url: Url::parse("https://2k.com/").unwrap(),
            date: date.map(str::to_string),
            body: String::new(),
        }
    }

    #[test]
    fn parses_http_dates() {
        let page = page_with_date(Some("Tue, 14 Nov 2023 22:13:20 GMT"));
        assert_eq!(page.timestamp(), Ok(1_700_000_000));

        let single_digit_day = parse_http_date("Mon, 2 Jan 2006 15:04:05 GMT").unwrap();
        assert_eq!(single_digit_day.timestamp(), 1_136_214_245);
    }

    #[test]
    fn missing_date_is_an_error() {
        assert_eq!(page_with_date(None).timestamp(), Err(TimestampError::Missing));
    }

    #[test]
    fn malformed_date_is_an_error_not_zero() {
        let err = page_with_date(Some("yesterday-ish")).timestamp().unwrap_err();
        assert!(matches!(err, TimestampError::Malformed { ref value, .. } if value == "yesterday-ish"));
    }

    /// Serves exactly one request with the given status and headers.
    fn serve_once(
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    ) -> (Url, thread::JoinHandle<()>) {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let url = Url::parse(&format!("http://{}/", server.server_addr())).unwrap();

        let handle = thread::spawn(move || {
            let request = server.recv().expect("receive request");
            let mut response = tiny_http::Response::from_string(body).with_status_code(status);
            for (name, value) in headers {
                response.add_header(tiny_http::Header::from_bytes(name, value).unwrap());
            }
            request.respond(response).expect("respond");
        });

        (url, handle)
    }

    #[tokio::test]
    async fn http_fetch_fills_the_jar_and_returns_the_page() {
        let (url, server) = serve_once(
            200,
            vec![
                ("Set-Cookie", "2K=abc123; Path=/; HttpOnly"),
                ("Set-Cookie", "lang=en-US"),
                ("Date", "Tue, 14 Nov 2023 22:13:20 GMT"),
            ],
            "<a data-href=\"/authorize?state=s&client_id=c\">x</a>",
        );
        let fetcher = HttpFetcher::new(url, Duration::from_secs(5));
        let jar = Arc::new(CookieJar::new());

        let page = fetcher.fetch(Arc::clone(&jar)).await.unwrap();
        server.join().unwrap();

        assert_eq!(page.timestamp(), Ok(1_700_000_000));
        assert!(page.body.contains("client_id=c"));
        let cookies = jar.cookies_for("127.0.0.1");
        assert_eq!(cookies.len(), 2);
        assert_eq!((cookies[0].name.as_str(), cookies[0].value.as_str()), ("2K", "abc123"));
    }

    #[tokio::test]
    async fn server_errors_are_fetch_failures() {
        let (url, server) = serve_once(503, vec![], "busy");
        let fetcher = HttpFetcher::new(url, Duration::from_secs(5));

        let err = fetcher.fetch(Arc::new(CookieJar::new())).await.unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, FetchError::Status(StatusCode::SERVICE_UNAVAILABLE)));
    }
}
