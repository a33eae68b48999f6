//! 附件上传端口
//!
//! 二进制对象存储是外部服务；这里只定义上传与孤儿标记的契约。

use async_trait::async_trait;
use data_encoding::BASE64;
use domain::{Attachment, AttachmentKind, DomainError};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("upload service rejected the file: {0}")]
    Rejected(String),
    #[error("upload service unavailable: {0}")]
    Unavailable(String),
}

/// 待上传的文件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub kind: AttachmentKind,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    /// 上传成功返回可公开访问的 URL
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;

    /// 上传成功但消息未能持久化时，标记该文件等待清理
    async fn flag_orphan(&self, url: &str);
}

/// 未配置对象存储时使用：只接受客户端预先上传的 URL
pub struct UploadsDisabled;

#[async_trait]
impl AttachmentUploader for UploadsDisabled {
    async fn upload(&self, _request: UploadRequest) -> Result<String, UploadError> {
        Err(UploadError::Unavailable(
            "no upload service configured".to_string(),
        ))
    }

    async fn flag_orphan(&self, url: &str) {
        tracing::warn!(url = %url, "未配置上传服务，无法标记孤儿附件");
    }
}

/// 消息附带的附件来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// 客户端已自行上传，直接使用其 URL
    Uploaded {
        url: String,
        kind: AttachmentKind,
        file_name: Option<String>,
        file_size: Option<u64>,
    },
    /// base64 编码的内联数据，可带 `data:<type>;base64,` 前缀
    Inline {
        data: String,
        file_name: Option<String>,
        content_type: Option<String>,
    },
}

/// 校验后的附件：已经可用，或仍需上传
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedAttachment {
    Ready(Attachment),
    NeedsUpload(UploadRequest),
}

impl AttachmentSource {
    /// 校验附件来源并解码内联数据，不触发任何上传
    pub fn prepare(self) -> Result<PreparedAttachment, DomainError> {
        match self {
            AttachmentSource::Uploaded {
                url,
                kind,
                file_name,
                file_size,
            } => Ok(PreparedAttachment::Ready(
                Attachment::new(url, kind)?.with_file(file_name, file_size),
            )),
            AttachmentSource::Inline {
                data,
                file_name,
                content_type,
            } => {
                let (declared_type, payload) = split_data_url(&data);
                let content_type = content_type.or(declared_type);
                let bytes = BASE64
                    .decode(payload.trim().as_bytes())
                    .map_err(|_| DomainError::invalid_argument("attachment", "invalid base64 data"))?;
                if bytes.is_empty() {
                    return Err(DomainError::invalid_argument("attachment", "empty file"));
                }
                let kind = AttachmentKind::detect(content_type.as_deref(), file_name.as_deref());
                Ok(PreparedAttachment::NeedsUpload(UploadRequest {
                    bytes,
                    file_name,
                    content_type,
                    kind,
                }))
            }
        }
    }
}

fn split_data_url(data: &str) -> (Option<String>, &str) {
    match data
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(";base64,"))
    {
        Some((content_type, payload)) => (Some(content_type.to_owned()), payload),
        None => (None, data),
    }
}
