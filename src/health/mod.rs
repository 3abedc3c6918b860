//! Background health probing

pub mod prober;

pub use prober::HealthProber;
