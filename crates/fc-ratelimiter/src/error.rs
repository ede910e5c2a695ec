use thiserror::Error;

#[derive(Error, Debug)]
pub enum RateLimiterError {
    #[error("redis connection error: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, RateLimiterError>;
