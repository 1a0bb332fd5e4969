pub mod error;
pub mod kind;
pub mod locator;
pub mod position;
pub mod value;

pub use error::*;
pub use kind::*;
pub use locator::*;
pub use position::*;
pub use value::*;
