pub mod config;
pub use config::Config;

mod errors;
pub use errors::{DistributionErrorCode, Error, Result};

pub mod db;
pub use db::Db;

pub mod oci_digest;
pub use oci_digest::OciDigest;

pub mod store;
pub use store::Store;

pub mod validate;

pub mod http;
