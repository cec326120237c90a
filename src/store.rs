use std::io::Write;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use crate::record::Record;

#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("store rejected record: {status} {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("encoding record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("writing record: {0}")]
    Io(#[from] std::io::Error),
}

/// Somewhere records can be put. Nothing is ever read back.
#[async_trait]
pub(crate) trait RecordStore: Send + Sync {
    async fn put_record(&self, record: &Record) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for Box<T> {
    async fn put_record(&self, record: &Record) -> Result<(), StoreError> {
        (**self).put_record(record).await
    }
}

/// POSTs each record's put-item document to an HTTP endpoint.
pub(crate) struct HttpRecordStore {
    client: Client,
    endpoint: Url,
}

impl HttpRecordStore {
    pub(crate) fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn put_record(&self, record: &Record) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&record.put_item())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "No response body".to_string());
        Err(StoreError::Rejected { status, body })
    }
}

/// Writes one put-item JSON document per line.
pub(crate) struct JsonLinesStore<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonLinesStore<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    #[cfg(test)]
    pub(crate) fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> RecordStore for JsonLinesStore<W> {
    async fn put_record(&self, record: &Record) -> Result<(), StoreError> {
        let line = serde_json::to_string(&record.put_item())?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
