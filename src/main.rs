// src/main.rs
use axum::{
    http::Method,
    routing::{delete, get, patch, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod assignment;
mod auth;
mod error;
mod grouping;
mod handlers;
mod models;
mod templates;
mod validation;

pub use error::AppError;

use handlers::*;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set in .env");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .expect("Failed to connect to Postgres");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("✅ 数据库连接成功!");

    let state = AppState { db: pool };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        // 认证
        .route("/api/register", post(register_handler))
        .route("/api/login", post(login_handler))
        .route("/api/refresh", post(refresh_handler))
        // 日模板
        .route("/api/templates", get(get_templates_handler))
        .route("/api/templates", post(create_template_handler))
        .route("/api/templates/:id", get(get_template_handler))
        .route("/api/templates/:id", patch(update_template_handler))
        .route("/api/templates/:id", delete(delete_template_handler))
        // 指派与物化
        .route(
            "/api/days/:date/templates/:template_id",
            post(assign_template_handler),
        )
        .route(
            "/api/days/:date/templates/:template_id",
            delete(unassign_template_handler),
        )
        // 日历聚合
        .route("/api/calendar", get(get_calendar_handler))
        // 每日任务
        .route("/api/days/:date/tasks", get(get_day_tasks_handler))
        .route("/api/days/:date/sections", get(get_day_sections_handler))
        .route("/api/tasks", post(create_task_handler))
        .route("/api/tasks/:id", patch(update_task_handler))
        .route("/api/tasks/:id/toggle", patch(toggle_task_handler))
        .route("/api/tasks/:id", delete(delete_task_handler))
        .with_state(state)
        .layer(cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    tracing::info!("🚀 服务器运行在: {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
