pub mod error;

pub use error::{MaVilleError, Result};
