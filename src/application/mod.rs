pub mod quality_system;

pub use quality_system::QualitySystem;
