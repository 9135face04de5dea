//! Shared fixtures: an in-memory database with the schema applied, a
//! temporary upload root and helpers to seed users and courses.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tempfile::TempDir;

use crate::auth::{self, AuthUser};
use crate::config::AppConfig;
use crate::db;
use crate::entity::course;
use crate::entity::user::{self, Role};
use crate::storage::{FileStore, Upload};

pub const PASSWORD: &str = "secret1";

/// Builds and initializes the full application service for `$env`.
macro_rules! test_app {
    ($env:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($env.config.clone()))
                .app_data(actix_web::web::Data::new($env.db.clone()))
                .app_data(actix_web::web::Data::new($env.store.clone()))
                .configure(crate::routes::configure),
        )
        .await
    };
}

mod lifecycle;

pub struct TestEnv {
    pub db: DatabaseConnection,
    pub config: AppConfig,
    pub store: FileStore,
    pub dir: TempDir,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::for_tests(dir.path());
        let db = db::connect_url("sqlite::memory:").await.unwrap();
        db::init_schema(&db).await.unwrap();
        let store = FileStore::new(dir.path());
        Self { db, config, store, dir }
    }

    pub async fn user(&self, username: &str, role: Role) -> AuthUser {
        let model = user::ActiveModel {
            username: Set(username.to_string()),
            password: Set(auth::hash_password(&self.config, PASSWORD).unwrap()),
            role: Set(role),
            created: Set(Some(Utc::now())),
            ..Default::default()
        };
        let inserted = model.insert(&self.db).await.unwrap();
        AuthUser::from(&inserted)
    }

    pub async fn course(&self, name: &str, owner: &AuthUser) -> course::Model {
        course::ActiveModel {
            name: Set(name.to_string()),
            teacher_id: Set(owner.user_id),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    /// Regular files currently in the upload root, avatars excluded.
    pub fn stored_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }
}

pub fn upload(file_name: &str, data: &[u8]) -> Upload {
    Upload {
        file_name: file_name.to_string(),
        content_type: Some("text/plain".to_string()),
        data: data.to_vec(),
    }
}

/// One part of a hand-built `multipart/form-data` body.
pub struct FormPart<'a> {
    pub name: &'a str,
    pub file_name: Option<&'a str>,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

impl<'a> FormPart<'a> {
    pub fn json(name: &'a str, data: &'a str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: "application/json",
            data: data.as_bytes(),
        }
    }

    pub fn file(name: &'a str, file_name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            file_name: Some(file_name),
            content_type: "application/octet-stream",
            data,
        }
    }
}

pub const BOUNDARY: &str = "----courseqa-test-boundary";

pub fn multipart_body(parts: &[FormPart<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                part.name, file_name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", part.content_type).as_bytes());
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
