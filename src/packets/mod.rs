mod codec;
mod command;
mod response;

pub use codec::*;
pub use command::*;
pub use response::*;
