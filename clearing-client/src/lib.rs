pub mod clearing;
pub mod verifier;

pub use clearing::*;
pub use verifier::*;
