use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

use crate::error::AppError;

#[derive(Serialize)]
pub struct ErrorDto {
    pub code: u16,
    pub msg: String,
}

/// One page of a filtered listing. `page` is zero-based.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub total_page: u64,
    pub page: u64,
    pub size: u64,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            list: self.list.into_iter().map(f).collect(),
            total: self.total,
            total_page: self.total_page,
            page: self.page,
            size: self.size,
        }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::param_error("请求参数不合法: content type must be application/json"),
        JsonPayloadError::Deserialize(e) => AppError::param_error(format!("请求参数不合法: {}", e)),
        e => AppError::param_error(format!("请求参数不合法: {}", e)),
    };
    app_err.into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::param_error(format!("查询参数不合法: {}", err)).into()
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    let status = err.status_code();
    HttpResponse::build(status).json(ErrorDto {
        code: status.as_u16(),
        msg: err.msg(),
    })
}
