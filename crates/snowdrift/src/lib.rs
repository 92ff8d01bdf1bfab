mod batch;
mod buffer;
mod clock;
mod error;
mod generator;
mod identity;
mod layout;
#[cfg(test)]
mod mock;
mod time;

pub use crate::batch::*;
pub use crate::buffer::*;
pub use crate::clock::*;
pub use crate::error::*;
pub use crate::generator::*;
pub use crate::identity::*;
pub use crate::layout::*;
pub use crate::time::*;
