use serde::Serialize;

/// Outcome of looking up one exported function by name.
///
/// Created on the first lookup and cached for the life of the process; the
/// library that exports it is assumed never to be unloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSymbol {
    pub name: String,
    pub address: usize,
    pub resolved: bool,
}

impl ResolvedSymbol {
    pub fn found(name: &str, address: usize) -> Self {
        Self {
            name: name.to_string(),
            address,
            resolved: true,
        }
    }

    pub fn missing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: 0,
            resolved: false,
        }
    }
}
