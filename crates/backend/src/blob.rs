//! Block-blob HTTP backend.
//!
//! Each chunk is staged with `PUT <blob>?comp=block&blockid=<id>` and the
//! finished object is assembled with `PUT <blob>?comp=blocklist` carrying
//! the ordered id list as XML. Block ids travel base64-encoded on the
//! wire. Both operations are idempotent on the remote side, which is what
//! makes re-running an interrupted upload safe.

use std::future::Future;
use std::pin::Pin;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{debug, info};

use blockhaul_engine::{BlockStore, RemoteError};

use crate::config::BlobConfig;

/// Characters kept literal in blob-name path segments. `/` is kept so
/// nested target names map to virtual directories.
const PATH_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Block-blob client for one account/container pair.
pub struct BlobStore {
    http: reqwest::Client,
    config: BlobConfig,
}

impl BlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn block_url(&self, target: &str, block_id: &str) -> String {
        let wire_id = BASE64.encode(block_id.as_bytes());
        let mut url = format!(
            "{}/{}/{}?comp=block&blockid={}",
            self.config.endpoint,
            self.config.container,
            utf8_percent_encode(target, PATH_KEEP),
            utf8_percent_encode(&wire_id, NON_ALPHANUMERIC),
        );
        if !self.config.sas_token.is_empty() {
            url.push('&');
            url.push_str(&self.config.sas_token);
        }
        url
    }

    fn blocklist_url(&self, target: &str) -> String {
        let mut url = format!(
            "{}/{}/{}?comp=blocklist",
            self.config.endpoint,
            self.config.container,
            utf8_percent_encode(target, PATH_KEEP),
        );
        if !self.config.sas_token.is_empty() {
            url.push('&');
            url.push_str(&self.config.sas_token);
        }
        url
    }
}

impl BlockStore for BlobStore {
    fn stage_block(
        &self,
        target: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>> {
        let url = self.block_url(target, block_id);
        let target = target.to_string();
        let block_id = block_id.to_string();

        Box::pin(async move {
            let response = self
                .http
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(data)
                .send()
                .await
                .map_err(classify_transport)?;

            let status = response.status();
            if status.is_success() {
                debug!(target_name = %target, block_id = %block_id, "block staged");
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        })
    }

    fn commit_block_list(
        &self,
        target: &str,
        block_ids: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>> {
        let url = self.blocklist_url(target);
        let body = block_list_body(block_ids);
        let target = target.to_string();
        let blocks = block_ids.len();

        Box::pin(async move {
            let response = self
                .http
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(body)
                .send()
                .await
                .map_err(classify_transport)?;

            let status = response.status();
            if status.is_success() {
                info!(target_name = %target, blocks, "block list committed");
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, &body))
        })
    }
}

/// Builds the XML commit body. Ids are base64-encoded exactly as
/// `stage_block` put them on the wire.
fn block_list_body(block_ids: &[String]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?><BlockList>");
    for id in block_ids {
        xml.push_str("<Latest>");
        xml.push_str(&BASE64.encode(id.as_bytes()));
        xml.push_str("</Latest>");
    }
    xml.push_str("</BlockList>");
    xml
}

/// Network-level failures. Anything that made it onto the wire may succeed
/// on a retry; only a request we could not even build is hopeless.
fn classify_transport(e: reqwest::Error) -> RemoteError {
    if e.is_builder() {
        RemoteError::Rejected(e.to_string())
    } else {
        RemoteError::Transient(e.to_string())
    }
}

/// Maps a non-success HTTP status onto the retry classification.
fn status_error(status: reqwest::StatusCode, body: &str) -> RemoteError {
    let hint: String = body.chars().take(200).collect();
    let desc = if hint.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {hint}")
    };
    if status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
    {
        RemoteError::Transient(desc)
    } else {
        RemoteError::Rejected(desc)
    }
}
