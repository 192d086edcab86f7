pub mod symbol_resolver;
