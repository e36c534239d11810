//! Google Drive storage gateway.
//!
//! Lists, downloads, exports, and uploads files through the Drive v3 REST
//! API. Implements pagination for large folders and multipart upload for
//! archiving renderings and ingested originals.
//!
//! # Credentials
//!
//! Authentication uses a stored OAuth credential JSON (the file produced by
//! a one-time browser consent flow, outside this tool):
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "token_uri": "https://oauth2.googleapis.com/token",
//!   "client_id": "....apps.googleusercontent.com",
//!   "client_secret": "...",
//!   "scopes": ["https://www.googleapis.com/auth/drive"]
//! }
//! ```
//!
//! The access token is refreshed on first use via the `refresh_token`
//! grant and cached for the session with its expiry. A missing or
//! unreadable credential file fails loudly when the gateway is built; it
//! blocks storage commands only, never chat or local ingestion.
//!
//! # Operations
//!
//! | Operation | Endpoint |
//! |-----------|----------|
//! | `list_children` | `GET /drive/v3/files?q='<id>' in parents` |
//! | `download` | `GET /drive/v3/files/<id>?alt=media` |
//! | `export` | `GET /drive/v3/files/<id>/export?mimeType=...` |
//! | `upload` | `POST /upload/drive/v3/files?uploadType=multipart` |
//!
//! Listing follows `nextPageToken` until the folder is exhausted
//! (`pageSize=1000` per page); trashed items are excluded.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::path::Path;

use crate::config::DriveConfig;
use crate::models::DriveEntry;

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const UPLOAD_BOUNDARY: &str = "askdrive-upload-boundary";

/// Seconds of remaining validity below which a cached token is refreshed.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

// ═══════════════════════════════════════════════════════════════════════
// Gateway trait
// ═══════════════════════════════════════════════════════════════════════

/// The storage operations the rest of the system consumes.
///
/// Each operation is independently fallible: a failure is always
/// distinguishable from an empty success (an empty folder lists as
/// `Ok(vec![])`, a broken listing as `Err`). Tests substitute an
/// in-memory implementation.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// List the direct children (files and folders) of a folder.
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>>;

    /// Download a file's raw bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>>;

    /// Export a native document's bytes in the target format.
    async fn export(&self, file_id: &str, target_mime: &str) -> Result<Vec<u8>>;

    /// Upload bytes as a named file under a folder, returning the new id.
    async fn upload(&self, bytes: Vec<u8>, name: &str, parent_folder_id: &str) -> Result<String>;
}

// ============ Stored credential ============

/// OAuth credential JSON written by the one-time consent flow.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredCredential {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl StoredCredential {
    /// Load and parse the credential file.
    ///
    /// This is the one deliberately fatal path in the storage stack: with
    /// no credential there is nothing any storage command can do.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read storage credential file: {}",
                path.display()
            )
        })?;
        let credential: StoredCredential = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse credential file: {}", path.display()))?;
        if credential.refresh_token.trim().is_empty() {
            bail!(
                "Credential file {} has no refresh_token",
                path.display()
            );
        }
        Ok(credential)
    }
}

/// A refreshed access token plus the instant it stops being usable.
#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// What `ask auth` reports after a successful refresh.
#[derive(Debug, Clone)]
pub struct CredentialStatus {
    pub scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

// ============ Drive gateway ============

/// [`StorageGateway`] implementation against the Drive v3 REST API.
pub struct DriveGateway {
    credential: StoredCredential,
    client: reqwest::Client,
    token: tokio::sync::Mutex<Option<CachedToken>>,
}

impl DriveGateway {
    /// Build a gateway from the configured credential file.
    pub fn new(config: &DriveConfig) -> Result<Self> {
        let credential = StoredCredential::load(&config.credentials_path)?;
        Ok(Self::from_credential(credential))
    }

    pub fn from_credential(credential: StoredCredential) -> Self {
        Self {
            credential,
            client: reqwest::Client::new(),
            token: tokio::sync::Mutex::new(None),
        }
    }

    /// Refresh immediately and report the credential's scopes and the new
    /// token's expiry. Used by `ask auth`.
    pub async fn verify(&self) -> Result<CredentialStatus> {
        let refreshed = refresh_access_token(&self.client, &self.credential).await?;
        let status = CredentialStatus {
            scopes: self.credential.scopes.clone(),
            expires_at: refreshed.expires_at,
        };
        *self.token.lock().await = Some(refreshed);
        Ok(status)
    }

    /// Return a usable access token, refreshing if the cached one is
    /// missing or about to expire.
    async fn access_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Utc::now() + Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) {
                return Ok(cached.value.clone());
            }
        }
        let refreshed = refresh_access_token(&self.client, &self.credential).await?;
        let value = refreshed.value.clone();
        *guard = Some(refreshed);
        Ok(value)
    }
}

#[async_trait]
impl StorageGateway for DriveGateway {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveEntry>> {
        let token = self.access_token().await?;
        let query = format!("'{}' in parents and trashed = false", folder_id);

        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("q".to_string(), query.clone()),
                (
                    "fields".to_string(),
                    "nextPageToken, files(id, name, mimeType)".to_string(),
                ),
                ("pageSize".to_string(), "1000".to_string()),
            ];
            if let Some(ref t) = page_token {
                params.push(("pageToken".to_string(), t.clone()));
            }

            let resp = self
                .client
                .get(DRIVE_FILES_URL)
                .header("Authorization", format!("Bearer {}", token))
                .query(&params)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to list folder {}: {}", folder_id, e))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                bail!(
                    "Drive listing failed (HTTP {}) for folder '{}': {}",
                    status,
                    folder_id,
                    truncate(&body)
                );
            }

            let json: serde_json::Value = resp.json().await?;
            if let Some(files) = json.get("files").and_then(|f| f.as_array()) {
                for file in files {
                    let id = file.get("id").and_then(|v| v.as_str()).unwrap_or("");
                    let name = file.get("name").and_then(|v| v.as_str()).unwrap_or("");
                    if id.is_empty() || name.is_empty() {
                        continue;
                    }
                    entries.push(DriveEntry {
                        id: id.to_string(),
                        name: name.to_string(),
                        mime_type: file
                            .get("mimeType")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                    });
                }
            }

            match json.get("nextPageToken").and_then(|t| t.as_str()) {
                Some(next) => page_token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(entries)
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", DRIVE_FILES_URL, file_id);

        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to download file {}: {}", file_id, e))?;

        if !resp.status().is_success() {
            bail!(
                "Drive download failed (HTTP {}) for file '{}'",
                resp.status(),
                file_id
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn export(&self, file_id: &str, target_mime: &str) -> Result<Vec<u8>> {
        let token = self.access_token().await?;
        let url = format!("{}/{}/export", DRIVE_FILES_URL, file_id);

        let resp = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", token))
            .query(&[("mimeType", target_mime)])
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to export file {}: {}", file_id, e))?;

        if !resp.status().is_success() {
            bail!(
                "Drive export failed (HTTP {}) for file '{}' as {}",
                resp.status(),
                file_id,
                target_mime
            );
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn upload(&self, bytes: Vec<u8>, name: &str, parent_folder_id: &str) -> Result<String> {
        let token = self.access_token().await?;
        let body = multipart_related_body(UPLOAD_BOUNDARY, name, parent_folder_id, &bytes);

        let resp = self
            .client
            .post(DRIVE_UPLOAD_URL)
            .header("Authorization", format!("Bearer {}", token))
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .body(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to upload '{}': {}", name, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Drive upload failed (HTTP {}) for '{}': {}",
                status,
                name,
                truncate(&body)
            );
        }

        let json: serde_json::Value = resp.json().await?;
        json.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Upload response missing file id"))
    }
}

// ============ Token refresh ============

/// Exchange the long-lived refresh token for a fresh access token.
async fn refresh_access_token(
    client: &reqwest::Client,
    credential: &StoredCredential,
) -> Result<CachedToken> {
    let params = [
        ("client_id", credential.client_id.as_str()),
        ("client_secret", credential.client_secret.as_str()),
        ("refresh_token", credential.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];

    let resp = client
        .post(&credential.token_uri)
        .form(&params)
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("Token refresh request failed: {}", e))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("Token refresh failed (HTTP {}): {}", status, truncate(&body));
    }

    let json: serde_json::Value = resp.json().await?;
    let access_token = json
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Token response missing access_token"))?;
    let expires_in = json
        .get("expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);

    Ok(CachedToken {
        value: access_token.to_string(),
        expires_at: Utc::now() + Duration::seconds(expires_in),
    })
}

// ============ Helpers ============

/// Assemble a `multipart/related` upload body: a JSON metadata part naming
/// the file and its parent folder, then the payload part.
fn multipart_related_body(boundary: &str, name: &str, parent: &str, bytes: &[u8]) -> Vec<u8> {
    let metadata = serde_json::json!({
        "name": name,
        "parents": [parent],
    });

    let mut out = Vec::new();
    out.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{}\r\n",
            boundary, metadata
        )
        .as_bytes(),
    );
    out.extend_from_slice(
        format!(
            "--{}\r\nContent-Type: application/octet-stream\r\n\r\n",
            boundary
        )
        .as_bytes(),
    );
    out.extend_from_slice(bytes);
    out.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    out
}

fn truncate(body: &str) -> String {
    body.chars().take(500).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_parses_consent_flow_json() {
        let raw = r#"{
            "token": "ya29.stale",
            "refresh_token": "1//0gRefresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "abc.apps.googleusercontent.com",
            "client_secret": "shhh",
            "scopes": ["https://www.googleapis.com/auth/drive"],
            "universe_domain": "googleapis.com",
            "account": "",
            "expiry": "2025-01-01T00:00:00.000000Z"
        }"#;
        let cred: StoredCredential = serde_json::from_str(raw).unwrap();
        assert_eq!(cred.refresh_token, "1//0gRefresh");
        assert_eq!(cred.client_id, "abc.apps.googleusercontent.com");
        assert_eq!(cred.scopes.len(), 1);
    }

    #[test]
    fn credential_defaults_token_uri() {
        let raw = r#"{
            "refresh_token": "r",
            "client_id": "c",
            "client_secret": "s"
        }"#;
        let cred: StoredCredential = serde_json::from_str(raw).unwrap();
        assert_eq!(cred.token_uri, "https://oauth2.googleapis.com/token");
        assert!(cred.scopes.is_empty());
    }

    #[test]
    fn multipart_body_carries_metadata_and_payload() {
        let body = multipart_related_body("B", "notes.docx", "folder123", b"PAYLOAD");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--B\r\n"));
        assert!(text.contains(r#""name":"notes.docx""#));
        assert!(text.contains(r#""parents":["folder123"]"#));
        assert!(text.contains("PAYLOAD"));
        assert!(text.trim_end().ends_with("--B--"));
    }

    #[test]
    fn multipart_body_keeps_binary_payload_intact() {
        let payload = [0u8, 159, 146, 150];
        let body = multipart_related_body("B", "x.pdf", "p", &payload);
        assert!(body
            .windows(payload.len())
            .any(|window| window == payload));
    }
}
