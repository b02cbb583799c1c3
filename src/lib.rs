pub mod core;
pub mod logging;

pub use core::pool::{
    PoolConfig, PoolError, ProxyFamilies, ProxyPool, ProxyRecord, ProxySource, ValidatorConfig,
};
