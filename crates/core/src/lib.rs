//! Housing Core - Fundamental types shared by the scripting engine and its hosts

mod error;
mod types;
mod positions;

pub use error::*;
pub use types::*;
pub use positions::*;
