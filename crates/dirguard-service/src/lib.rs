pub mod enforcement;
pub mod engine;
