pub mod app;
pub mod errors;
pub mod extractors;
pub mod request_id;
pub mod state;
