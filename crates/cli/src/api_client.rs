use anyhow::{Context, Result};
use reqwest::Url;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::Path;

/// Multipart part carrying the file on create.
const CREATE_FILE_FIELD: &str = "image";

/// Multipart part carrying the file on replace.
const REPLACE_FILE_FIELD: &str = "new_file";

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.map(str::to_string),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T> {
        let response = self.authorize(req).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("API error ({}): {}", status, error_message(&body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// POST /api/token with a urlencoded form.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let url = self.url("/api/token")?;
        let form = [("username", username), ("password", password)];
        self.send_json(self.http.post(url).form(&form)).await
    }

    pub async fn whoami(&self) -> Result<MeResponse> {
        let url = self.url("/api/me")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.url("/health")?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn list_certificates(&self, query: &ListQuery) -> Result<Vec<CertificateResponse>> {
        let mut url = self.url("/api/certificates")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(skip) = query.skip {
                pairs.append_pair("skip", &skip.to_string());
            }
            if let Some(limit) = query.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
            for (key, value) in [("issuer", &query.issuer), ("tag", &query.tag), ("q", &query.q)] {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        // An empty query_pairs_mut() still leaves a trailing '?'
        if url.query() == Some("") {
            url.set_query(None);
        }
        self.send_json(self.http.get(url)).await
    }

    pub async fn get_certificate(&self, id: i64) -> Result<CertificateResponse> {
        let url = self.url(&format!("/api/certificates/{id}"))?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn create_certificate(
        &self,
        req: CreateCertificateRequest,
        file: Attachment,
    ) -> Result<CertificateResponse> {
        let url = self.url("/api/certificates")?;

        let mut form = Form::new()
            .text("title", req.title)
            .text("issuer", req.issuer)
            .text("issue_date", req.issue_date);
        for (name, value) in [
            ("expiry_date", req.expiry_date),
            ("credential_id", req.credential_id),
            ("verify_url", req.verify_url),
            ("tags", req.tags),
        ] {
            if let Some(value) = value {
                form = form.text(name, value);
            }
        }
        let form = form.part(CREATE_FILE_FIELD, file.into_part()?);

        self.send_json(self.http.post(url).multipart(form)).await
    }

    pub async fn update_certificate(
        &self,
        id: i64,
        req: &UpdateCertificateRequest,
    ) -> Result<CertificateResponse> {
        let url = self.url(&format!("/api/certificates/{id}"))?;
        self.send_json(self.http.patch(url).json(req)).await
    }

    pub async fn replace_certificate_file(
        &self,
        id: i64,
        file: Attachment,
    ) -> Result<CertificateResponse> {
        let url = self.url(&format!("/api/certificates/{id}/file"))?;
        let form = Form::new().part(REPLACE_FILE_FIELD, file.into_part()?);
        self.send_json(self.http.put(url).multipart(form)).await
    }

    pub async fn delete_certificate(&self, id: i64) -> Result<DeleteResponse> {
        let url = self.url(&format!("/api/certificates/{id}"))?;
        self.send_json(self.http.delete(url)).await
    }
}

/// Prefer the server's `message` field over the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|e| format!("{} ({})", e.message, e.code))
        .unwrap_or_else(|_| body.to_string())
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    /// Read a file, deriving the content type from its extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid file name: {}", path.display()))?
            .to_string();
        let content_type = certfolio_core::media::content_type_for_key(&filename).to_string();

        Ok(Self {
            filename,
            content_type,
            data,
        })
    }

    fn into_part(self) -> Result<Part> {
        Part::bytes(self.data)
            .file_name(self.filename)
            .mime_str(&self.content_type)
            .context("invalid content type")
    }
}

// =============================================================================
// Request/response types (mirrored from server handlers)
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
pub struct MeResponse {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Default)]
pub struct ListQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub issuer: Option<String>,
    pub tag: Option<String>,
    pub q: Option<String>,
}

#[derive(Debug)]
pub struct CreateCertificateRequest {
    pub title: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
}

/// Partial update. `None` leaves a field untouched; `Some(None)` sends `null`.
#[derive(Debug, Default, Serialize)]
pub struct UpdateCertificateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verify_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Option<String>>,
}

impl UpdateCertificateRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.issuer.is_none()
            && self.issue_date.is_none()
            && self.expiry_date.is_none()
            && self.credential_id.is_none()
            && self.verify_url.is_none()
            && self.tags.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct CertificateResponse {
    pub id: i64,
    pub title: String,
    pub issuer: String,
    pub issue_date: String,
    pub expiry_date: Option<String>,
    pub credential_id: Option<String>,
    pub verify_url: Option<String>,
    pub tags: Option<String>,
    pub image_path: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteResponse {
    pub status: String,
}
