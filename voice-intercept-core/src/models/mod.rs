pub mod config;
pub mod error;
pub mod instance;
pub mod recording_result;
pub mod samples;
pub mod state;
pub mod statistics;
pub mod symbol;
