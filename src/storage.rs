use chrono::Utc;
use log::{debug, warn};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::AppError;

pub const AVATAR_DIR: &str = "avatars";

/// A file received from a client, before it is written to the store.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Flat directory of uploaded files. Every stored file gets a generated name;
/// the client's original name is kept by the caller next to it.
#[derive(Clone, Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn save(&self, upload: &Upload) -> Result<String, AppError> {
        let stored_name = generate_storage_name(&upload.file_name);
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&stored_name), &upload.data).await?;
        debug!("stored {} as {}", upload.file_name, stored_name);
        Ok(stored_name)
    }

    /// Returns the avatar path relative to the store root, e.g. `avatars/<name>`.
    pub async fn save_avatar(&self, upload: &Upload) -> Result<String, AppError> {
        let stored_name = format!("avatar_{}", generate_storage_name(&upload.file_name));
        let dir = self.root.join(AVATAR_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&stored_name), &upload.data).await?;
        Ok(format!("{}/{}", AVATAR_DIR, stored_name))
    }

    pub async fn read(&self, stored_name: &str) -> Result<Vec<u8>, AppError> {
        let path = resolve_within(&self.root, stored_name).ok_or_else(|| AppError::not_found("文件不存在"))?;
        read_file(&path).await
    }

    pub async fn read_avatar(&self, file_name: &str) -> Result<Vec<u8>, AppError> {
        // browsers append cache busters such as `?t=123`
        let clean = file_name.split('?').next().unwrap_or_default();
        let path = resolve_within(&self.root.join(AVATAR_DIR), clean)
            .ok_or_else(|| AppError::forbidden("非法的头像路径"))?;
        read_file(&path).await
    }

    /// Best effort; a missing file is not an error.
    pub async fn remove(&self, stored_name: &str) {
        let Some(path) = resolve_within(&self.root, stored_name) else {
            return;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("removed stored file {}", stored_name),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove stored file {}: {}", stored_name, e),
        }
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, AppError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(data),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::not_found("文件不存在")),
        Err(e) => Err(e.into()),
    }
}

/// Joins `relative` onto `base` if it stays inside `base` lexically.
pub fn resolve_within(base: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut has_part = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_part = true,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if !has_part {
        return None;
    }
    Some(base.join(relative))
}

/// Last path segment of a client-supplied file name.
pub fn clean_file_name(raw: &str) -> String {
    let name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        "file".to_string()
    } else {
        name.to_string()
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|s| s.to_ascii_lowercase())
}

pub fn generate_storage_name(original: &str) -> String {
    let prefix = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let rand: String = (0..20)
        .map(|_| {
            let idx = rand::random::<u8>() % 26;
            (b'a' + idx) as char
        })
        .collect();
    match extension_of(original) {
        Some(ext) => format!("{}{}.{}", prefix, rand, ext),
        None => format!("{}{}", prefix, rand),
    }
}

pub fn mime_from_name(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Declared part type first, then sniffed content, then the file extension.
pub fn detect_mime(upload: &Upload) -> String {
    if let Some(declared) = upload
        .content_type
        .as_deref()
        .filter(|t| !t.is_empty() && *t != "application/octet-stream")
    {
        return declared.to_string();
    }
    if let Some(kind) = infer::get(&upload.data) {
        return kind.mime_type().to_string();
    }
    mime_from_name(&upload.file_name)
}

pub fn is_image(upload: &Upload) -> bool {
    if let Some(kind) = infer::get(&upload.data) {
        return kind.matcher_type() == infer::MatcherType::Image;
    }
    upload
        .content_type
        .as_deref()
        .map(|t| t.starts_with("image/"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_names_keep_extension_and_never_repeat() {
        let a = generate_storage_name("notes.PDF");
        let b = generate_storage_name("notes.PDF");
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);
        assert!(!generate_storage_name("README").contains('.'));
    }

    #[test]
    fn resolve_within_rejects_escapes() {
        let base = Path::new("/srv/uploads/avatars");
        assert!(resolve_within(base, "../secret.txt").is_none());
        assert!(resolve_within(base, "/etc/passwd").is_none());
        assert!(resolve_within(base, "a/../../b").is_none());
        assert!(resolve_within(base, "").is_none());
        assert_eq!(
            resolve_within(base, "avatar_x.png"),
            Some(PathBuf::from("/srv/uploads/avatars/avatar_x.png"))
        );
    }

    #[test]
    fn clean_file_name_strips_directories() {
        assert_eq!(clean_file_name("C:\\Users\\me\\hw1.docx"), "hw1.docx");
        assert_eq!(clean_file_name("../../etc/passwd"), "passwd");
        assert_eq!(clean_file_name(".."), "file");
    }

    #[test]
    fn mime_detection_prefers_declared_type() {
        let upload = Upload {
            file_name: "slides.pdf".to_string(),
            content_type: Some("application/pdf".to_string()),
            data: b"hello".to_vec(),
        };
        assert_eq!(detect_mime(&upload), "application/pdf");

        let guessed = Upload {
            content_type: None,
            ..upload
        };
        assert_eq!(detect_mime(&guessed), "application/pdf");
        assert_eq!(mime_from_name("unknown.zzzq"), "application/octet-stream");
    }

    #[tokio::test]
    async fn avatar_reads_stay_inside_avatar_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        tokio::fs::write(dir.path().join("private.txt"), b"secret").await.unwrap();

        let err = store.read_avatar("../private.txt").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let png = Upload {
            file_name: "me.png".to_string(),
            content_type: Some("image/png".to_string()),
            data: vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A],
        };
        let path = store.save_avatar(&png).await.unwrap();
        let name = path.strip_prefix("avatars/").unwrap();
        let read = store.read_avatar(&format!("{}?t=1", name)).await.unwrap();
        assert_eq!(read, png.data);
    }
}
