use actix_multipart::Multipart;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

use crate::error::AppError;
use crate::storage::{clean_file_name, Upload};

struct Part {
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// A fully buffered multipart body, addressable by part name.
pub struct MultipartForm {
    parts: HashMap<String, Part>,
}

impl MultipartForm {
    pub async fn read(mut payload: Multipart, max_bytes: usize) -> Result<Self, AppError> {
        let mut parts = HashMap::new();
        let mut total = 0usize;

        while let Some(item) = payload.next().await {
            let mut field = item.map_err(|e| AppError::param_error(format!("文件上传失败: {}", e)))?;
            let disposition = field.content_disposition();
            let name = disposition.get_name().unwrap_or_default().to_string();
            let file_name = disposition.get_filename().map(|s| s.to_string());
            let content_type = field.content_type().map(|m| m.essence_str().to_string());

            let mut data = Vec::new();
            while let Some(chunk) = field.next().await {
                let chunk = chunk.map_err(|e| AppError::param_error(format!("文件上传失败: {}", e)))?;
                total += chunk.len();
                if total > max_bytes {
                    return Err(AppError::param_error("文件大小超过限制"));
                }
                data.extend_from_slice(&chunk);
            }

            parts.insert(
                name,
                Part {
                    file_name,
                    content_type,
                    data,
                },
            );
        }

        Ok(Self { parts })
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.parts
            .get(name)
            .map(|p| String::from_utf8_lossy(&p.data).trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Deserializes the JSON carried by part `name`, which may be sent either as
    /// a plain field or as a `application/json` blob.
    pub fn json<T: DeserializeOwned>(&self, name: &str) -> Result<T, AppError> {
        let raw = self
            .text(name)
            .ok_or_else(|| AppError::param_error(format!("缺少 {} 部分", name)))?;
        serde_json::from_str(&raw).map_err(|e| AppError::param_error(format!("请求参数不合法: {}", e)))
    }

    /// A part that carried a file name and at least one byte.
    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        let part = self.parts.remove(name)?;
        let file_name = part.file_name?;
        if part.data.is_empty() {
            return None;
        }
        Some(Upload {
            file_name: clean_file_name(&file_name),
            content_type: part.content_type,
            data: part.data,
        })
    }

    /// Like [`take_file`](Self::take_file) but keeps empty files so callers can reject them.
    pub fn take_file_allow_empty(&mut self, name: &str) -> Option<Upload> {
        let part = self.parts.remove(name)?;
        Some(Upload {
            file_name: clean_file_name(part.file_name.as_deref().unwrap_or("file")),
            content_type: part.content_type,
            data: part.data,
        })
    }
}
