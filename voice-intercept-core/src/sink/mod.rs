pub mod capture_sink;
