//! Virtual filesystem service: metadata/blob engine, watch fan-out, and the
//! path security boundary in front of both.

pub mod blob;
pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod path;
pub mod rpc;
pub mod util;
pub mod watch;

pub use config::ServiceConfig;
pub use engine::FilesystemEngine;
pub use error::{FsError, FsResult};
