pub mod classify;
pub mod config;
pub mod error;
pub mod io;
pub mod normalize;
pub mod observer;
pub mod paths;
pub mod reconcile;
pub mod registry;
pub mod template;
pub mod trace;
pub mod types;

pub use error::{Result, TracemapError};
