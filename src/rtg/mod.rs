//! Real-time get: reads that see every acknowledged operation, committed
//! or not.

mod resolver;

pub use resolver::RealTimeGetResolver;
