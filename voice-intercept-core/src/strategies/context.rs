use std::sync::Arc;

use crate::discovery::discoverer::InstanceDiscoverer;
use crate::intercept::registry::InterceptorRegistry;
use crate::models::config::EngineConfiguration;
use crate::models::instance::ConnectionHandle;
use crate::resolver::symbol_resolver::SymbolResolver;
use crate::sink::capture_sink::CaptureSink;

/// Everything a strategy needs to start, shared by all four.
#[derive(Clone)]
pub struct StrategyContext {
    pub config: Arc<EngineConfiguration>,
    pub resolver: Arc<SymbolResolver>,
    pub discoverer: Arc<InstanceDiscoverer>,
    pub interceptors: Arc<InterceptorRegistry>,
    pub sink: Arc<CaptureSink>,
    /// Supplied by the host once a session exists.
    pub connection: Option<ConnectionHandle>,
}
