mod auth;
mod config;
mod db;
mod entity;
mod error;
mod multipart;
mod policy;
mod response;
mod routes;
mod service;
mod storage;
mod validate;

#[cfg(test)]
mod tests;

use actix_web::{middleware, web, App, HttpServer};
use config::AppConfig;
use db::connect_db;
use log::info;
use storage::FileStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    let config = AppConfig::from_env();
    let db = connect_db(&config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("database init failed: {}", e)))?;
    service::user::ensure_admin(&db, &config)
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("admin bootstrap failed: {}", e)))?;

    let store = FileStore::new(config.upload_root());
    tokio::fs::create_dir_all(store.root()).await?;
    info!("storing uploads under {}", store.root().display());

    let server_port = config.server_port;
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(db.clone()))
            .app_data(web::Data::new(store.clone()))
            .wrap(middleware::Logger::default())
            .wrap(middleware::from_fn(routes::cors::cors_handler))
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", server_port))?;
    info!("server started at http://0.0.0.0:{}", server_port);
    server.run().await
}
