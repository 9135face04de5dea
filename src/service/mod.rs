//! Lifecycle operations. Every function takes the caller explicitly and runs
//! the matching check from [`crate::policy`] before it writes anything.

pub mod answer;
pub mod course;
pub mod question;
pub mod resource;
pub mod user;

use log::debug;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, Select, Statement};

use crate::error::AppError;
use crate::response::Page;

pub const MAX_PAGE_SIZE: u64 = 1000;

#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub page: u64,
    pub size: u64,
}

impl PageRequest {
    pub fn new(page: Option<u64>, size: Option<u64>, default_size: u64) -> Self {
        Self {
            page: page.unwrap_or(0),
            size: size.unwrap_or(default_size).clamp(1, MAX_PAGE_SIZE),
        }
    }
}

pub async fn fetch_page<'db, C, E>(
    db: &'db C,
    select: Select<E>,
    req: PageRequest,
) -> Result<Page<E::Model>, AppError>
where
    C: ConnectionTrait,
    E: EntityTrait,
    E::Model: Sync + 'db,
{
    let paginator = select.paginate(db, req.size);
    let counts = paginator.num_items_and_pages().await?;
    let list = if req.page < counts.number_of_pages {
        paginator.fetch_page(req.page).await?
    } else {
        Vec::new()
    };
    Ok(Page {
        list,
        total: counts.number_of_items,
        total_page: counts.number_of_pages,
        page: req.page,
        size: req.size,
    })
}

/// Runs a raw statement and returns the number of rows it touched.
pub(crate) async fn exec_sql<C: ConnectionTrait>(
    db: &C,
    sql: &str,
    values: Vec<sea_orm::Value>,
) -> Result<u64, AppError> {
    let backend = db.get_database_backend();
    let stmt = Statement::from_sql_and_values(backend, sql, values);
    let result = db.execute(stmt).await.map_err(|e| {
        debug!("exec_sql failed: {} (sql={})", e, sql);
        AppError::Db(e)
    })?;
    Ok(result.rows_affected())
}
