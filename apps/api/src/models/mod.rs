pub mod export;
pub mod resume;
pub mod user;
