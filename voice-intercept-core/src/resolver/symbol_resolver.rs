use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::error::InterceptError;
use crate::models::symbol::ResolvedSymbol;
use crate::traits::symbol_source::SymbolSource;

/// Caching front for a [`SymbolSource`].
///
/// Every name is looked up at most once. Both hits and misses are cached
/// for the life of the resolver; a miss never panics and only makes the
/// strategy that needed the name unavailable.
pub struct SymbolResolver {
    source: Arc<dyn SymbolSource>,
    cache: Mutex<HashMap<String, ResolvedSymbol>>,
}

impl SymbolResolver {
    pub fn new(source: Arc<dyn SymbolSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve one name, consulting the cache first.
    pub fn resolve(&self, name: &str) -> Result<ResolvedSymbol, InterceptError> {
        let symbol = self.lookup_cached(name);
        if symbol.resolved {
            Ok(symbol)
        } else {
            Err(InterceptError::symbol_not_found(name))
        }
    }

    /// Resolve every name or report all of the missing ones together.
    pub fn resolve_all(&self, names: &[&str]) -> Result<Vec<ResolvedSymbol>, InterceptError> {
        let symbols: Vec<ResolvedSymbol> = names.iter().map(|n| self.lookup_cached(n)).collect();
        let missing: Vec<String> = symbols
            .iter()
            .filter(|s| !s.resolved)
            .map(|s| s.name.clone())
            .collect();
        if !missing.is_empty() {
            log::debug!("unresolved symbols: {}", missing.join(", "));
            return Err(InterceptError::SymbolNotFound(missing));
        }
        Ok(symbols)
    }

    /// Like [`resolve`](Self::resolve) but maps a miss to `None`.
    pub fn resolve_optional(&self, name: &str) -> Option<ResolvedSymbol> {
        self.resolve(name).ok()
    }

    /// Every name looked up so far, sorted by name.
    pub fn cached(&self) -> Vec<ResolvedSymbol> {
        let mut symbols: Vec<_> = self.cache.lock().values().cloned().collect();
        symbols.sort_by(|a, b| a.name.cmp(&b.name));
        symbols
    }

    fn lookup_cached(&self, name: &str) -> ResolvedSymbol {
        if let Some(hit) = self.cache.lock().get(name) {
            return hit.clone();
        }

        // Lookup happens outside the lock; a racing thread may repeat it,
        // and the first insert wins.
        let symbol = match self.source.lookup(name) {
            Some(address) if address != 0 => ResolvedSymbol::found(name, address),
            _ => ResolvedSymbol::missing(name),
        };
        log::debug!(
            "resolved symbol {} -> {}",
            name,
            if symbol.resolved { format!("{:#x}", symbol.address) } else { "missing".into() }
        );

        self.cache
            .lock()
            .entry(name.to_string())
            .or_insert(symbol)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSymbols;

    #[test]
    fn second_resolution_hits_cache() {
        let symbols = Arc::new(MockSymbols::new().with("vendor_init", 0x4000));
        let resolver = SymbolResolver::new(symbols.clone());

        let first = resolver.resolve("vendor_init").unwrap();
        let second = resolver.resolve("vendor_init").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.address, 0x4000);
        assert_eq!(symbols.lookup_count("vendor_init"), 1);
    }

    #[test]
    fn missing_symbol_is_not_found_and_cached() {
        let symbols = Arc::new(MockSymbols::new());
        let resolver = SymbolResolver::new(symbols.clone());

        for _ in 0..3 {
            assert_eq!(
                resolver.resolve("does_not_exist"),
                Err(InterceptError::symbol_not_found("does_not_exist"))
            );
        }
        assert_eq!(symbols.lookup_count("does_not_exist"), 1);
        assert!(!resolver.cached()[0].resolved);
    }

    #[test]
    fn resolve_all_lists_every_missing_name() {
        let symbols = Arc::new(MockSymbols::new().with("present", 0x10));
        let resolver = SymbolResolver::new(symbols);

        let err = resolver.resolve_all(&["missing_a", "present", "missing_b"]).unwrap_err();

        assert_eq!(
            err,
            InterceptError::SymbolNotFound(vec!["missing_a".into(), "missing_b".into()])
        );
    }

    #[test]
    fn null_address_counts_as_missing() {
        let resolver = SymbolResolver::new(Arc::new(MockSymbols::new().with("null_export", 0)));
        assert!(resolver.resolve_optional("null_export").is_none());
    }
}
