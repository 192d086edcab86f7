//! # voice-intercept-native
//!
//! Process-backed implementations of the voice-intercept boundary traits.
//!
//! Provides:
//! - `DylibSymbolSource`: exported-symbol lookup through the dynamic loader
//! - `RawObjectHandle`: field access on SDK objects from a declared `ObjectLayout`
//! - `StaticSlotObjectGraph`: instance discovery through exported pointer slots
//!
//! Method tables are runtime specific and are not provided here; hosts that
//! route SDK entry points through their own tables can use
//! `voice_intercept_core::DispatchTable`.
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use voice_intercept_core::{EngineConfiguration, InterceptEngine, SdkBindings};
//! use voice_intercept_native::{DylibSymbolSource, GraphConfiguration, StaticSlotObjectGraph};
//!
//! let symbols = Arc::new(DylibSymbolSource::process()?.with_library("libvoicesdk.so")?);
//! let graph = GraphConfiguration::from_json_str(&layout_json)?;
//! let objects = Arc::new(StaticSlotObjectGraph::from_configuration(symbols.clone(), graph)?);
//! let engine = InterceptEngine::new(
//!     EngineConfiguration::default(),
//!     SdkBindings { symbols, objects, methods: None },
//! )?;
//! engine.start()?;
//! ```

pub mod dylib_symbols;
pub mod raw_object;
pub mod static_graph;

pub use dylib_symbols::DylibSymbolSource;
pub use raw_object::{FieldKind, FieldLayout, ObjectLayout, RawObjectHandle, Signature};
pub use static_graph::{GraphConfiguration, StaticSlotObjectGraph, TypeBinding};
