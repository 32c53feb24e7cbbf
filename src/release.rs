//! GitHub Releases API client.

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::platform::{Platform, is_archive_name};
use crate::version::{AppVersion, CurrentVersion};
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const GITHUB_JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const USER_AGENT_PRODUCT: &str = "KiotaUiClient";

/// Raw `releases/latest` payload.
#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Absent or null when the release has no attachments.
    #[serde(default)]
    pub assets: Option<Vec<Asset>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
}

/// The latest release, narrowed to the one asset this platform should install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag: String,
    pub display_name: String,
    pub version: AppVersion,
    pub asset_name: String,
    pub asset_url: String,
}

impl ReleaseInfo {
    /// `None` when no asset is usable on `platform`.
    pub fn from_release(release: Release, platform: Platform) -> Option<Self> {
        let assets = release.assets.unwrap_or_default();
        let asset = select_asset(&assets, platform)?;

        let display_name = release
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| release.tag_name.clone());

        Some(Self {
            version: AppVersion::parse_or_zero(&release.tag_name),
            tag: release.tag_name,
            display_name,
            asset_name: asset.name.clone(),
            asset_url: asset.browser_download_url.clone(),
        })
    }
}

/// First asset built for `platform`; otherwise the first archive of any kind.
pub fn select_asset(assets: &[Asset], platform: Platform) -> Option<&Asset> {
    assets
        .iter()
        .find(|a| platform.matches_asset(&a.name))
        .or_else(|| assets.iter().find(|a| is_archive_name(&a.name)))
}

/// HTTP client shared by the resolver and the fetcher.
///
/// Carries the `KiotaUiClient/<version>` user-agent and the GitHub JSON
/// `Accept` header. Only the connect phase has a client-wide deadline so that
/// long downloads are not cut off.
pub fn build_http_client(config: &UpdateConfig, current: &CurrentVersion) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON_MEDIA_TYPE));

    Client::builder()
        .user_agent(format!("{}/{}", USER_AGENT_PRODUCT, current.raw.trim()))
        .default_headers(headers)
        .connect_timeout(config.request_timeout())
        .build()
        .map_err(|e| UpdateError::Network(format!("cannot build HTTP client: {e}")))
}

/// Looks up the latest published release of the configured repository.
#[derive(Debug, Clone)]
pub struct ReleaseResolver {
    client: Client,
    url: String,
    timeout: Duration,
    platform: Platform,
}

impl ReleaseResolver {
    pub fn new(client: Client, config: &UpdateConfig, platform: Platform) -> Self {
        Self {
            client,
            url: config.latest_release_url(),
            timeout: config.request_timeout(),
            platform,
        }
    }

    /// Fetch the latest release. `Ok(None)` means there is nothing this
    /// platform could install.
    pub async fn latest_release(&self, cancel: &CancellationToken) -> Result<Option<ReleaseInfo>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(UpdateError::Cancelled),
            result = self.fetch() => result,
        }
    }

    async fn fetch(&self) -> Result<Option<ReleaseInfo>> {
        log::info!("Checking latest release: {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpdateError::Network(format!("cannot reach {}: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpdateError::Network(format!(
                "release API returned {status} for {}: {}",
                self.url,
                body.trim()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpdateError::Network(format!("release response interrupted: {e}")))?;

        let release: Release = serde_json::from_slice(&body)
            .map_err(|e| UpdateError::Parse(format!("malformed release JSON: {e}")))?;

        log::info!("Latest release tag: {}", release.tag_name);

        let info = ReleaseInfo::from_release(release, self.platform);
        match &info {
            Some(i) => log::info!("Selected asset {} for {}", i.asset_name, self.platform),
            None => log::warn!("No usable release asset for {}", self.platform),
        }
        Ok(info)
    }
}
