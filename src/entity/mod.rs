pub mod answer;
pub mod course;
pub mod question;
pub mod resource;
pub mod user;
