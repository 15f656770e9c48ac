pub mod algorithm;
pub mod config;
pub mod scoring;
pub mod stretch;

pub use algorithm::{align_session, SessionMeta};
pub use config::AlignmentConfig;
