//! 通过 HTTP 调用外部对象存储服务上传附件

use std::time::Duration;

use application::{AttachmentUploader, UploadError, UploadRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct OrphanReport<'a> {
    url: &'a str,
}

pub struct HttpAttachmentUploader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAttachmentUploader {
    pub fn new(config: UploaderConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl AttachmentUploader for HttpAttachmentUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let mut query = vec![("kind", request.kind.as_str().to_string())];
        if let Some(file_name) = &request.file_name {
            query.push(("file_name", file_name.clone()));
        }
        let content_type = request
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let size = request.bytes.len();

        let response = self
            .client
            .post(format!("{}/uploads", self.base_url))
            .query(&query)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(request.bytes)
            .send()
            .await
            .map_err(|err| UploadError::Unavailable(err.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let reason = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, reason = %reason, "附件被上传服务拒绝");
            return Err(UploadError::Rejected(format!("{status}: {reason}")));
        }
        if !status.is_success() {
            return Err(UploadError::Unavailable(status.to_string()));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| UploadError::Unavailable(err.to_string()))?;
        tracing::debug!(url = %body.url, size, "附件上传完成");
        Ok(body.url)
    }

    async fn flag_orphan(&self, url: &str) {
        let result = self
            .client
            .post(format!("{}/orphans", self.base_url))
            .json(&OrphanReport { url })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);
        match result {
            Ok(_) => tracing::info!(url = %url, "已标记孤儿附件"),
            Err(err) => tracing::warn!(url = %url, error = %err, "孤儿附件标记失败"),
        }
    }
}
