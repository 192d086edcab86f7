pub mod capture_delegate;
pub mod capture_strategy;
pub mod hardware_io;
pub mod method_table;
pub mod object_graph;
pub mod symbol_source;
