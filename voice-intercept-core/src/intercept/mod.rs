pub mod dispatch;
pub mod registry;
