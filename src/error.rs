use actix_web::{http::StatusCode, ResponseError};
use log::error;
use sea_orm::{DbErr, TransactionError};
use thiserror::Error;

use crate::response::response_from_error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Conflict(String),
    #[error("服务器错误: {0}")]
    Internal(String),
    #[error("服务器错误: {0}")]
    Db(#[from] DbErr),
    #[error("服务器错误: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn param_error(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn need_login() -> Self {
        Self::Unauthorized("please login first".to_string())
    }

    pub fn bad_credentials() -> Self {
        Self::Unauthorized("用户名或密码错误！".to_string())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn system_exception(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn msg(&self) -> String {
        self.to_string()
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Db(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        if self.status_code().is_server_error() {
            error!("request failed: {}", self);
        }
        response_from_error(self)
    }
}

pub fn map_tx_error(err: TransactionError<AppError>) -> AppError {
    match err {
        TransactionError::Connection(e) => AppError::Db(e),
        TransactionError::Transaction(app) => app,
    }
}
