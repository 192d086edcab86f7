//! # voice-intercept-core
//!
//! Platform-agnostic engine that pulls decoded voice out of a closed
//! media SDK whose documented audio path does not work.
//!
//! The SDK is reached only through the boundary traits in [`traits`]:
//! exported symbols by name, live objects by type name, and a method
//! table for interception. Platform backends implement those traits and
//! hand them to an [`InterceptEngine`].
//!
//! ## Architecture
//!
//! ```text
//! voice-intercept-core (this crate)
//! ├── traits/       ← SymbolSource, ObjectGraph, CandidateHandle, HardwareIo, MethodTable, CaptureStrategy, CaptureDelegate
//! ├── models/       ← InterceptError, EngineConfiguration, states, statistics, discovered instances
//! ├── resolver/     ← caching SymbolResolver
//! ├── discovery/    ← InstanceDiscoverer with cached capabilities
//! ├── intercept/    ← InterceptorRegistry keyed by (type, operation), DispatchTable
//! ├── codec/        ← G.711 A-law decoder
//! ├── memory/       ← engine-allocated voice buffer and its handoff
//! ├── sink/         ← CaptureSink: counters, levels, bounded delivery queue
//! ├── strategies/   ← render-notify tap, voice-frame poll, vendor listener, channel buffer
//! ├── session/      ← FallbackSupervisor, InterceptEngine facade
//! ├── diagnostics/  ← DiagnosticsReport
//! ├── processing/   ← RingBuffer, level metering, WAV header generation
//! └── storage/      ← WavRecorder, metadata sidecar
//! ```

pub mod codec;
pub mod diagnostics;
pub mod discovery;
pub mod intercept;
pub mod memory;
pub mod models;
pub mod processing;
pub mod resolver;
pub mod session;
pub mod sink;
pub mod storage;
pub mod strategies;
pub mod traits;

mod worker;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use diagnostics::report::{DiagnosticsReport, StrategyReport};
pub use discovery::discoverer::{AudioUnitCandidate, InstanceDiscoverer};
pub use intercept::dispatch::DispatchTable;
pub use intercept::registry::{InterceptHook, InterceptKey, InterceptorRegistry};
pub use memory::voice_buffer::{HandedOffBuffer, VoiceFrameBuffer};
pub use models::config::{
    ChannelConfiguration, EngineConfiguration, InterceptMode, ListenerPayload, SdkLayout, SinkConfiguration,
    StrategyTimeouts, SymbolNames, VoiceBufferLayout,
};
pub use models::error::InterceptError;
pub use models::instance::{Capabilities, ConnectionHandle, DiscoveredInstance, InstanceKind, InstanceSummary};
pub use models::recording_result::{RecordingMetadata, RecordingResult, StrategyFrames};
pub use models::samples::SampleBatch;
pub use models::state::{InterceptionState, StrategyTag, SupervisorState};
pub use models::statistics::{CaptureStatistics, StrategyStatistics};
pub use models::symbol::ResolvedSymbol;
pub use resolver::symbol_resolver::SymbolResolver;
pub use session::engine::{InterceptEngine, SdkBindings};
pub use session::supervisor::FallbackSupervisor;
pub use sink::capture_sink::CaptureSink;
pub use storage::wav_recorder::WavRecorder;
pub use traits::capture_delegate::{CaptureDelegate, SampleCallback};
pub use traits::capture_strategy::CaptureStrategy;
pub use traits::hardware_io::{HardwareIo, IoState, RenderCycle, RenderNotify};
pub use traits::method_table::{CallFrame, MethodImp, MethodTable};
pub use traits::object_graph::{CandidateHandle, ObjectGraph};
pub use traits::symbol_source::SymbolSource;
