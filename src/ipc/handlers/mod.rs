pub mod core;
pub mod entities;
pub mod import;
pub mod setup;
