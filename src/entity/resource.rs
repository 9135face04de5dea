use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(Some(10))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[sea_orm(string_value = "ALL")]
    All,
    #[sea_orm(string_value = "CLASS_ONLY")]
    ClassOnly,
}

impl Visibility {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ALL" => Some(Self::All),
            "CLASS_ONLY" => Some(Self::ClassOnly),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "t_resource")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub course_id: i32,
    pub uploader_id: i32,
    pub upload_time: DateTimeUtc,
    /// Generated storage name under the upload root.
    pub file_path: String,
    pub file_name: String,
    pub file_mime_type: Option<String>,
    pub download_count: i32,
    pub visibility: Visibility,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
