// shared/src/lib.rs

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
    #[error("storage capacity exceeded: {0}")]
    CapacityExceeded(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod config;
