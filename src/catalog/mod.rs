//! Remote version catalogs — Mojang version manifest and the PaperMC build
//! API. Read-only metadata; the rest of the tool only needs a resolved
//! download URL and a human-readable version id.
//!
//! List fetches degrade to an empty result on network or parse failure;
//! single-URL resolution returns `None`. Callers distinguish "empty" from
//! "not yet asked" with their own state.

use serde::{Deserialize, Serialize};

pub const MOJANG_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";
pub const PAPER_API_URL: &str = "https://api.papermc.io/v2/projects/paper";

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// One installable version from the Mojang manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub release_type: String,
    /// Per-version metadata document; resolves to the server jar URL.
    pub url: String,
}

impl VersionEntry {
    pub fn is_release(&self) -> bool {
        self.release_type == "release"
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    versions: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionDetail {
    downloads: VersionDownloads,
}

#[derive(Debug, Deserialize, Default)]
struct VersionDownloads {
    server: Option<DownloadTarget>,
}

#[derive(Debug, Deserialize)]
struct DownloadTarget {
    url: String,
}

#[derive(Debug, Deserialize)]
struct PaperProject {
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PaperVersion {
    builds: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct PaperBuild {
    downloads: PaperDownloads,
}

#[derive(Debug, Deserialize, Default)]
struct PaperDownloads {
    application: Option<PaperApplication>,
}

#[derive(Debug, Deserialize)]
struct PaperApplication {
    name: String,
}

pub struct CatalogClient {
    http: reqwest::Client,
    manifest_url: String,
    paper_base: String,
}

impl CatalogClient {
    pub fn new() -> Self {
        Self::with_base_urls(MOJANG_MANIFEST_URL, PAPER_API_URL)
    }

    /// Override endpoints for tests against a local mock server.
    pub fn with_base_urls(manifest_url: &str, paper_base: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mcwarden/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            manifest_url: manifest_url.to_string(),
            paper_base: paper_base.trim_end_matches('/').to_string(),
        }
    }

    /// Newest-first version list from the Mojang manifest, truncated to
    /// `limit`. Empty on failure.
    pub async fn fetch_versions(&self, limit: usize) -> Vec<VersionEntry> {
        match self.get_json::<Manifest>(&self.manifest_url).await {
            Ok(manifest) => manifest.versions.into_iter().take(limit).collect(),
            Err(e) => {
                tracing::warn!("Failed to fetch version manifest: {}", e);
                Vec::new()
            }
        }
    }

    /// Paper versions, oldest-first as the API returns them. Empty on failure.
    pub async fn fetch_paper_versions(&self) -> Vec<String> {
        match self.get_json::<PaperProject>(&self.paper_base).await {
            Ok(project) => project.versions,
            Err(e) => {
                tracing::warn!("Failed to fetch Paper versions: {}", e);
                Vec::new()
            }
        }
    }

    /// Highest build number published for a Paper version.
    pub async fn latest_paper_build(&self, version: &str) -> Option<u32> {
        let url = format!("{}/versions/{}", self.paper_base, version);
        match self.get_json::<PaperVersion>(&url).await {
            Ok(v) => v.builds.last().copied(),
            Err(e) => {
                tracing::warn!("Failed to fetch Paper builds for {}: {}", version, e);
                None
            }
        }
    }

    /// Download URL for a specific Paper build.
    pub async fn paper_download_url(&self, version: &str, build: u32) -> Option<String> {
        let url = format!("{}/versions/{}/builds/{}", self.paper_base, version, build);
        match self.get_json::<PaperBuild>(&url).await {
            Ok(b) => b.downloads.application.map(|app| {
                format!(
                    "{}/versions/{}/builds/{}/downloads/{}",
                    self.paper_base, version, build, app.name
                )
            }),
            Err(e) => {
                tracing::warn!("Failed to resolve Paper download for {} #{}: {}", version, build, e);
                None
            }
        }
    }

    /// Server jar URL from a version's metadata document.
    pub async fn server_jar_url(&self, detail_url: &str) -> Option<String> {
        match self.get_json::<VersionDetail>(detail_url).await {
            Ok(detail) => detail.downloads.server.map(|s| s.url),
            Err(e) => {
                tracing::warn!("Failed to resolve server jar URL: {}", e);
                None
            }
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> anyhow::Result<T> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_parses_needed_fields() {
        let json = r#"{
            "latest": {"release": "1.21.1", "snapshot": "24w33a"},
            "versions": [
                {"id": "24w33a", "type": "snapshot", "url": "https://x/24w33a.json",
                 "time": "2024-08-15T12:00:00+00:00", "releaseTime": "2024-08-15T12:00:00+00:00"},
                {"id": "1.21.1", "type": "release", "url": "https://x/1.21.1.json"}
            ]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.versions.len(), 2);
        assert!(!manifest.versions[0].is_release());
        assert!(manifest.versions[1].is_release());
        assert_eq!(manifest.versions[1].id, "1.21.1");
    }

    #[test]
    fn version_detail_parses_server_download() {
        let json = r#"{
            "downloads": {
                "client": {"url": "https://x/client.jar", "sha1": "a", "size": 1},
                "server": {"url": "https://x/server.jar", "sha1": "b", "size": 2}
            },
            "id": "1.21.1"
        }"#;
        let detail: VersionDetail = serde_json::from_str(json).unwrap();
        assert_eq!(detail.downloads.server.unwrap().url, "https://x/server.jar");
    }

    #[test]
    fn version_detail_without_server_jar() {
        let json = r#"{"downloads": {"client": {"url": "https://x/client.jar"}}}"#;
        let detail: VersionDetail = serde_json::from_str(json).unwrap();
        assert!(detail.downloads.server.is_none());
    }

    #[test]
    fn paper_build_lists_parse() {
        let project: PaperProject =
            serde_json::from_str(r#"{"project_id": "paper", "versions": ["1.20.4", "1.21.1"]}"#)
                .unwrap();
        assert_eq!(project.versions.last().unwrap(), "1.21.1");

        let version: PaperVersion =
            serde_json::from_str(r#"{"version": "1.21.1", "builds": [10, 11, 12]}"#).unwrap();
        assert_eq!(version.builds.last().copied(), Some(12));

        let build: PaperBuild = serde_json::from_str(
            r#"{"build": 12, "downloads": {"application": {"name": "paper-1.21.1-12.jar"}}}"#,
        )
        .unwrap();
        assert_eq!(build.downloads.application.unwrap().name, "paper-1.21.1-12.jar");
    }
}
