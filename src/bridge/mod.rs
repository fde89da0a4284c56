//! Bridge between a supervising task and a child process's standard streams.

mod channels;
mod error;
mod process;
mod stream;

pub use channels::*;
pub use error::*;
pub use process::*;
pub use stream::*;
