pub mod health;
pub mod diagnostics;
pub mod sessions;

pub use health::*;
pub use diagnostics::*;
pub use sessions::*;
