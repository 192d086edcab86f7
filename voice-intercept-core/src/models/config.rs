use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::InterceptError;
use super::state::StrategyTag;

/// Runtime names of the SDK's undeclared types, fields and selectors.
///
/// These follow the dependency's binary layout, not a stable contract, so
/// they live in configuration and can be updated without a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkLayout {
    pub player_type: String,
    pub audio_unit_field: String,
    pub voice_frame_field: String,
    pub output_buffer_field: String,
    pub client_field: String,
    /// Player operation intercepted to record receivers. `None` disables it.
    pub capture_selector: Option<String>,
}

impl Default for SdkLayout {
    fn default() -> Self {
        Self {
            player_type: "AppIOSPlayer".into(),
            audio_unit_field: "audioUnit".into(),
            voice_frame_field: "voice_frame".into(),
            output_buffer_field: "voice_out_buff".into(),
            client_field: "client".into(),
            capture_selector: Some("startVoice".into()),
        }
    }
}

/// Exported C entry points looked up by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolNames {
    pub vendor_init: String,
    pub vendor_set_listener: String,
    pub send_command: String,
    /// Optional; strategy 4 still runs when it does not resolve.
    pub channel_read: Option<String>,
}

impl Default for SymbolNames {
    fn default() -> Self {
        Self {
            vendor_init: "pcmp2_init".into(),
            vendor_set_listener: "pcmp2_setListener".into(),
            send_command: "client_write_cgi".into(),
            channel_read: Some("CSession_Data_Read".into()),
        }
    }
}

/// Whether an intercepted operation still reaches the SDK's own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptMode {
    /// Observe, then forward to the displaced implementation.
    #[default]
    Augment,
    /// Observe and drop the call. Only for experiments on the SDK's own path.
    Suppress,
}

/// Encoding of the bytes handed to the vendor listener callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerPayload {
    #[default]
    Pcm16Le,
    Alaw,
}

/// Timing knobs for strategies and the fallback supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyTimeouts {
    pub render_notify_ms: u64,
    pub voice_frame_poll_ms: u64,
    pub vendor_listener_ms: u64,
    pub channel_buffer_ms: u64,
    /// Sleep between reads in polling loops.
    pub poll_interval_ms: u64,
    /// Upper bound on waiting for a worker thread to exit on stop.
    pub stop_timeout_ms: u64,
}

impl Default for StrategyTimeouts {
    fn default() -> Self {
        Self {
            render_notify_ms: 3_000,
            voice_frame_poll_ms: 3_000,
            vendor_listener_ms: 5_000,
            channel_buffer_ms: 5_000,
            poll_interval_ms: 20,
            stop_timeout_ms: 500,
        }
    }
}

impl StrategyTimeouts {
    pub fn first_frame_timeout(&self, tag: StrategyTag) -> Duration {
        let ms = match tag {
            StrategyTag::RenderNotify => self.render_notify_ms,
            StrategyTag::VoiceFramePoll => self.voice_frame_poll_ms,
            StrategyTag::VendorListener => self.vendor_listener_ms,
            StrategyTag::ChannelBuffer => self.channel_buffer_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

/// Bounded delivery queue between capture threads and the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfiguration {
    /// Maximum queued batches; the oldest batch is dropped on overflow.
    pub queue_capacity: usize,
    pub delivery_interval_ms: u64,
}

impl Default for SinkConfiguration {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            delivery_interval_ms: 10,
        }
    }
}

/// Shape of the output buffer the engine allocates when the SDK never did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceBufferLayout {
    pub capacity: usize,
    pub alignment: usize,
    /// Field value meaning "never initialized".
    pub sentinel: usize,
    /// Byte the buffer is filled with while no data is pending.
    pub fill: u8,
}

impl Default for VoiceBufferLayout {
    fn default() -> Self {
        Self {
            capacity: 4096,
            alignment: 16,
            sentinel: 0,
            fill: 0,
        }
    }
}

impl VoiceBufferLayout {
    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("voice buffer capacity must be positive".into());
        }
        if !self.alignment.is_power_of_two() {
            return Err(format!("voice buffer alignment {} is not a power of two", self.alignment));
        }
        Ok(())
    }
}

/// Commands and channel parameters for the raw channel strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfiguration {
    /// Sent in order; at least one must be accepted.
    pub commands: Vec<String>,
    pub channel_index: i32,
    pub max_read_bytes: usize,
}

impl Default for ChannelConfiguration {
    fn default() -> Self {
        Self {
            commands: vec!["audiostream.cgi?streamid=0&".into()],
            channel_index: 2,
            max_read_bytes: 2048,
        }
    }
}

/// Configuration for an [`InterceptEngine`](crate::InterceptEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfiguration {
    pub layout: SdkLayout,
    pub symbols: SymbolNames,
    pub timeouts: StrategyTimeouts,
    pub intercept_mode: InterceptMode,
    pub sink: SinkConfiguration,
    pub buffer: VoiceBufferLayout,
    pub channel: ChannelConfiguration,
    pub listener_payload: ListenerPayload,
    /// Frames larger than this are reported as decode anomalies and skipped.
    pub max_frame_bytes: usize,
    /// Sample rate of decoded voice, used by the recorder.
    pub sample_rate: u32,
    /// Run the automatic fallback supervisor when the engine starts.
    pub supervise: bool,
    pub strategy_order: Vec<StrategyTag>,
}

impl Default for EngineConfiguration {
    fn default() -> Self {
        Self {
            layout: SdkLayout::default(),
            symbols: SymbolNames::default(),
            timeouts: StrategyTimeouts::default(),
            intercept_mode: InterceptMode::default(),
            sink: SinkConfiguration::default(),
            buffer: VoiceBufferLayout::default(),
            channel: ChannelConfiguration::default(),
            listener_payload: ListenerPayload::default(),
            max_frame_bytes: 4096,
            sample_rate: 8000,
            supervise: true,
            strategy_order: StrategyTag::ALL.to_vec(),
        }
    }
}

impl EngineConfiguration {
    pub fn from_json_str(json: &str) -> Result<Self, InterceptError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| InterceptError::ConfigurationFailed(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(InterceptError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.layout.player_type.is_empty() {
            return Err("player type name must not be empty".into());
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if self.sink.queue_capacity == 0 {
            return Err("sink queue capacity must be positive".into());
        }
        if self.max_frame_bytes == 0 {
            return Err("max frame size must be positive".into());
        }
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        self.buffer.validate()?;
        let mut seen = [false; 4];
        for tag in &self.strategy_order {
            if std::mem::replace(&mut seen[tag.index()], true) {
                return Err(format!("strategy {} listed twice in strategy order", tag.name()));
            }
        }
        Ok(())
    }
}
