/// Something that can map an exported symbol name to its address.
///
/// Backed by the dynamic loader in production; by a plain table in tests.
pub trait SymbolSource: Send + Sync {
    /// Address of `name`, or `None` when no loaded image exports it.
    ///
    /// Must not panic for unknown names.
    fn lookup(&self, name: &str) -> Option<usize>;
}
