mod error;
mod handlers;
mod router;
mod types;

pub use error::bad_json;
pub use handlers::setup::load_import_config;
pub use router::handle_request;
pub use types::{AppState, Request};
