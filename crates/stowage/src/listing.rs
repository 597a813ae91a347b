//! Folder listing on the peer-to-peer file network.
//!
//! A remote reference names a folder-wrapped content address; the file to
//! store is the folder's first entry. [`IpfsLister`] resolves folders
//! through the IPFS HTTP API (`/api/v0/ls`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Connect timeout for the listing API, bounded by the request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Listing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Listing service answered with HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed listing response: {0}")]
    Malformed(String),

    #[error("Folder '{address}' has no entries")]
    Empty { address: String },

    #[error("Listing service unavailable: {0}")]
    Unavailable(String),
}

/// One entry of a listed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: String,
    pub address: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderListing {
    pub folder_address: String,
    pub entries: Vec<FolderEntry>,
}

impl FolderListing {
    /// The entry a remote reference resolves to.
    pub fn first_entry(&self) -> Result<&FolderEntry, ListingError> {
        self.entries.first().ok_or_else(|| ListingError::Empty {
            address: self.folder_address.clone(),
        })
    }
}

/// Lists the contents of a folder by content address.
///
/// Implementations own their timeout.
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    async fn list_folder(&self, folder_address: &str) -> Result<FolderListing, ListingError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsResult {
    #[serde(default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    hash: String,
    #[serde(default)]
    links: Vec<LsLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsLink {
    #[serde(default)]
    name: String,
    hash: String,
    #[serde(default)]
    size: u64,
}

fn parse_ls_response(folder_address: &str, body: &str) -> Result<FolderListing, ListingError> {
    let result: LsResult =
        serde_json::from_str(body).map_err(|e| ListingError::Malformed(e.to_string()))?;
    let object = result
        .objects
        .into_iter()
        .next()
        .ok_or_else(|| ListingError::Malformed("response contains no objects".to_string()))?;

    let folder_address = if object.hash.is_empty() {
        folder_address.to_string()
    } else {
        object.hash
    };

    Ok(FolderListing {
        folder_address,
        entries: object
            .links
            .into_iter()
            .map(|link| FolderEntry {
                name: link.name,
                address: link.hash,
                size_bytes: link.size,
            })
            .collect(),
    })
}

/// [`DirectoryLister`] backed by an IPFS node's HTTP API.
#[derive(Debug, Clone)]
pub struct IpfsLister {
    client: Client,
    api_uri: String,
}

impl IpfsLister {
    pub fn new(api_uri: &str, timeout: Duration) -> Result<Self, ListingError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            api_uri: api_uri.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DirectoryLister for IpfsLister {
    async fn list_folder(&self, folder_address: &str) -> Result<FolderListing, ListingError> {
        let url = format!("{}/api/v0/ls", self.api_uri);
        tracing::debug!(folder = %folder_address, "Listing folder");

        let response = self
            .client
            .post(&url)
            .query(&[("arg", folder_address)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        parse_ls_response(folder_address, &body)
    }
}
