pub mod accounts;
pub mod achievements;
pub mod app;
pub mod challenges;
pub mod client;
pub mod comments;
pub mod config;
pub mod dashboard;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod personal;
pub mod session;
pub mod state;
pub mod stats;
pub mod storage;
pub mod verification;

pub use app::router;
pub use config::AppConfig;
pub use state::AppState;
pub use storage::{JsonStore, RecordStore};
