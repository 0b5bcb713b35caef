pub mod analyzer;
pub mod quarantine;
