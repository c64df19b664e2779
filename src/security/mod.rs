pub mod access_control;
pub mod auth;
pub mod policy;

pub use access_control::*;
pub use auth::*;
pub use policy::*;
