use std::env;
use std::path::PathBuf;

/// How user passwords are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordStorage {
    Bcrypt,
    /// Raw string storage and comparison, kept for parity with legacy data.
    Plaintext,
}

impl PasswordStorage {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plaintext" | "plain" | "noop" => Self::Plaintext,
            _ => Self::Bcrypt,
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub sqlite_path: String,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_ttl_hours: i64,
    pub upload_storage_path: String,
    pub max_upload_bytes: usize,
    pub password_storage: PasswordStorage,
    pub bcrypt_cost: u32,
    pub cors_allow_origin: String,
    pub admin_username: String,
    pub admin_password: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        let sqlite_path = env::var("SQLITE_PATH").unwrap_or_else(|_| "./data/course_qa.sqlite".to_string());
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "c0urse-qa-dev-secret-change-me".to_string());
        let jwt_ttl_hours = env::var("JWT_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(10);

        let upload_storage_path = env::var("UPLOAD_STORAGE_PATH").unwrap_or_else(|_| "./uploads".to_string());
        let max_upload_bytes = env::var("MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(50 * 1024 * 1024);

        let password_storage = env::var("PASSWORD_STORAGE")
            .map(|v| PasswordStorage::parse(&v))
            .unwrap_or(PasswordStorage::Bcrypt);
        let bcrypt_cost = env::var("BCRYPT_COST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(10);

        let cors_allow_origin = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());
        let admin_username = env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password = env::var("ADMIN_PASSWORD").unwrap_or_else(|_| "admin123".to_string());

        Self {
            server_port,
            sqlite_path,
            database_url,
            jwt_secret,
            jwt_ttl_hours,
            upload_storage_path,
            max_upload_bytes,
            password_storage,
            bcrypt_cost,
            cors_allow_origin,
            admin_username,
            admin_password,
        }
    }

    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }

        let path = self.sqlite_path.trim();
        if path.starts_with("sqlite:") || path.starts_with("file:") {
            return path.to_string();
        }
        format!("sqlite://{}?mode=rwc", path)
    }

    pub fn upload_root(&self) -> PathBuf {
        PathBuf::from(&self.upload_storage_path)
    }
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests(upload_storage_path: &std::path::Path) -> Self {
        Self {
            server_port: 0,
            sqlite_path: ":memory:".to_string(),
            database_url: Some("sqlite::memory:".to_string()),
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_hours: 1,
            upload_storage_path: upload_storage_path.to_string_lossy().to_string(),
            max_upload_bytes: 1024 * 1024,
            password_storage: PasswordStorage::Bcrypt,
            bcrypt_cost: 4,
            cors_allow_origin: "*".to_string(),
            admin_username: "admin".to_string(),
            admin_password: "admin123".to_string(),
        }
    }
}
