//! frostbox-storage: OpenDAL operator factory and the archive transfer client

pub mod operator;
pub mod transfer;

pub use operator::{build_operator, StorageConfig};
pub use transfer::TransferClient;
