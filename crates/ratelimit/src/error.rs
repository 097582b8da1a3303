#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
}

pub type Result<T> = std::result::Result<T, Error>;
