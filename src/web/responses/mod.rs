pub mod common;
pub mod room;

pub use common::*;
pub use room::*;
