//! Core error types for the housing workspace

#[derive(thiserror::Error, Debug)]
pub enum HousingError {
    #[error("Script error: {0}")]
    Script(String),

    #[error("Effect error: {0}")]
    Effect(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HousingError>;
