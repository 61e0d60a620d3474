pub mod auth;
pub mod error;
pub mod forms;
pub mod media;
pub mod middleware;
pub mod posts;
pub mod render;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, AppStateInner};
