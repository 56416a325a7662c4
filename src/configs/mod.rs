pub mod base;
pub mod codec;
pub mod io;
pub mod logging;

pub use base::*;
pub use codec::*;
pub use io::*;
pub use logging::*;
