use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::config::InterceptMode;
use crate::models::error::InterceptError;
use crate::models::instance::InstanceSummary;
use crate::models::state::{InterceptionState, StrategyTag, SupervisorState};
use crate::models::statistics::{CaptureStatistics, StrategyStatistics};
use crate::models::symbol::ResolvedSymbol;

/// One strategy's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub id: u8,
    pub strategy: StrategyTag,
    pub state: InterceptionState,
    pub active: bool,
    /// Stage label of the first failing precondition, e.g. `symbol`.
    pub failed_stage: Option<&'static str>,
    pub failure: Option<String>,
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub anomalies: u64,
    pub level: f32,
    pub peak: f32,
}

impl StrategyReport {
    pub fn from_statistics(stats: &StrategyStatistics, active: bool) -> Self {
        Self {
            id: stats.strategy.id(),
            strategy: stats.strategy,
            state: stats.state,
            active,
            failed_stage: stats.last_error.as_ref().map(InterceptError::stage),
            failure: stats.last_error.as_ref().map(ToString::to_string),
            frames_captured: stats.frames_captured,
            bytes_captured: stats.bytes_captured,
            anomalies: stats.anomalies,
            level: stats.last_level,
            peak: stats.last_peak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolReport {
    pub name: String,
    pub resolved: bool,
    pub address: Option<String>,
}

impl From<&ResolvedSymbol> for SymbolReport {
    fn from(symbol: &ResolvedSymbol) -> Self {
        Self {
            name: symbol.name.clone(),
            resolved: symbol.resolved,
            address: symbol.resolved.then(|| format!("{:#x}", symbol.address)),
        }
    }
}

/// Point-in-time summary of what the engine found, installed and captured.
///
/// `Display` gives the human-readable form handed to operators; `to_json`
/// gives the same content for tooling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsReport {
    pub session_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub generated_at: DateTime<Utc>,
    pub running: bool,
    pub supervisor: SupervisorState,
    pub intercept_mode: InterceptMode,
    pub intercepts: Vec<String>,
    pub symbols: Vec<SymbolReport>,
    pub instances: Vec<InstanceSummary>,
    pub frames_captured: u64,
    pub bytes_captured: u64,
    pub dropped_batches: u64,
    pub strategies: Vec<StrategyReport>,
}

impl DiagnosticsReport {
    /// `active` lists the strategies currently running.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        started_at: Option<DateTime<Utc>>,
        running: bool,
        supervisor: SupervisorState,
        intercept_mode: InterceptMode,
        intercepts: Vec<String>,
        symbols: &[ResolvedSymbol],
        instances: Vec<InstanceSummary>,
        statistics: &CaptureStatistics,
        active: &[StrategyTag],
    ) -> Self {
        Self {
            session_id,
            started_at,
            generated_at: Utc::now(),
            running,
            supervisor,
            intercept_mode,
            intercepts,
            symbols: symbols.iter().map(SymbolReport::from).collect(),
            instances,
            frames_captured: statistics.frames_captured,
            bytes_captured: statistics.bytes_captured,
            dropped_batches: statistics.dropped_batches,
            strategies: statistics
                .per_strategy
                .iter()
                .map(|s| StrategyReport::from_statistics(s, active.contains(&s.strategy)))
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, InterceptError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InterceptError::Unknown(format!("failed to serialize diagnostics: {}", e)))
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "voice intercept session {}", self.session_id)?;
        match self.started_at {
            Some(at) => writeln!(f, "  started:    {}", at.to_rfc3339())?,
            None => writeln!(f, "  started:    never")?,
        }
        writeln!(f, "  running:    {}", self.running)?;
        writeln!(f, "  supervisor: {:?}", self.supervisor)?;
        writeln!(f, "  mode:       {:?}", self.intercept_mode)?;
        writeln!(
            f,
            "  captured:   {} frames, {} bytes, {} batches dropped",
            self.frames_captured, self.bytes_captured, self.dropped_batches
        )?;

        writeln!(f, "instances ({}):", self.instances.len())?;
        for instance in &self.instances {
            writeln!(
                f,
                "  {:?} {} [{}]",
                instance.kind,
                instance.address,
                instance.capabilities.join(", ")
            )?;
        }

        writeln!(f, "symbols:")?;
        for symbol in &self.symbols {
            match &symbol.address {
                Some(address) => writeln!(f, "  {} = {}", symbol.name, address)?,
                None => writeln!(f, "  {} missing", symbol.name)?,
            }
        }

        if !self.intercepts.is_empty() {
            writeln!(f, "intercepts: {}", self.intercepts.join(", "))?;
        }

        writeln!(f, "strategies:")?;
        for s in &self.strategies {
            write!(
                f,
                "  {} {:<16} {:<11} frames={} bytes={} anomalies={} level={:.3} peak={:.3}",
                s.id,
                s.strategy.name(),
                format!("{:?}", s.state),
                s.frames_captured,
                s.bytes_captured,
                s.anomalies,
                s.level,
                s.peak
            )?;
            if let (Some(stage), Some(failure)) = (s.failed_stage, &s.failure) {
                write!(f, " [{}] {}", stage, failure)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
