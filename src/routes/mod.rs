pub mod admin;
pub mod cors;
pub mod course;
pub mod dto;
pub mod profile;
pub mod qa;
pub mod resource;
pub mod user;

use actix_web::http::header::{Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue};
use actix_web::{web, HttpResponse};
use serde::Serialize;

use crate::response::{json_error_handler, query_error_handler, Page};
use crate::service::PageRequest;

pub const DEFAULT_PAGE_SIZE: u64 = 10;
pub const ADMIN_PAGE_SIZE: u64 = 20;

/// Registers body/query error handling and every `/api` scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .service(
            web::scope("/api")
                .service(web::scope("/users").configure(user::config))
                .service(web::scope("/courses").configure(course::config))
                .service(web::scope("/qa").configure(qa::config))
                .service(web::scope("/resources").configure(resource::config))
                .service(web::scope("/admin").configure(admin::config))
                .service(web::scope("/profile").configure(profile::config)),
        );
}

pub(crate) fn page_request(page: Option<u64>, size: Option<u64>, default_size: u64) -> PageRequest {
    PageRequest::new(page, size, default_size)
}

pub(crate) fn page_json<M, D>(page: Page<M>) -> HttpResponse
where
    D: From<M> + Serialize,
{
    HttpResponse::Ok().json(page.map(D::from))
}

/// Streams stored bytes as an attachment. `filename` carries an ASCII fallback
/// and `filename*` the exact UTF-8 name.
pub(crate) fn file_response(data: Vec<u8>, file_name: &str, mime_type: &str) -> HttpResponse {
    let ascii: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();
    let disposition = ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters: vec![
            DispositionParam::Filename(ascii),
            DispositionParam::FilenameExt(ExtendedValue {
                charset: Charset::Ext("UTF-8".to_string()),
                language_tag: None,
                value: file_name.as_bytes().to_vec(),
            }),
        ],
    };
    HttpResponse::Ok()
        .content_type(mime_type)
        .insert_header(disposition)
        .body(data)
}
