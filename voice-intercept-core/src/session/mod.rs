pub mod engine;
pub mod supervisor;
