pub mod errors;
pub mod logger;
pub mod status;
pub mod types;

pub use errors::*;
pub use status::*;
pub use types::*;
