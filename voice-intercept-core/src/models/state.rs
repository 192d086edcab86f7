use serde::{Deserialize, Serialize};

/// Identifies one of the four capture strategies.
///
/// The numeric id doubles as the priority: lower ids rely more on the SDK's
/// intended path and are less invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyTag {
    RenderNotify,
    VoiceFramePoll,
    VendorListener,
    ChannelBuffer,
}

impl StrategyTag {
    pub const ALL: [StrategyTag; 4] = [
        Self::RenderNotify,
        Self::VoiceFramePoll,
        Self::VendorListener,
        Self::ChannelBuffer,
    ];

    pub fn id(self) -> u8 {
        match self {
            Self::RenderNotify => 1,
            Self::VoiceFramePoll => 2,
            Self::VendorListener => 3,
            Self::ChannelBuffer => 4,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.id() == id)
    }

    pub(crate) fn index(self) -> usize {
        self.id() as usize - 1
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RenderNotify => "render-notify",
            Self::VoiceFramePoll => "voice-frame-poll",
            Self::VendorListener => "vendor-listener",
            Self::ChannelBuffer => "channel-buffer",
        }
    }
}

/// Installation state of a single capture strategy.
///
/// ```text
/// uninstalled → installed → active
///      ↑            ↓         ↓
///      └──────── failed ←─────┘
/// ```
///
/// A strategy whose symbols do not all resolve stays `Uninstalled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterceptionState {
    #[default]
    Uninstalled,
    Installed,
    Active,
    Failed,
}

impl InterceptionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// State of the supervisory fallback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "strategy", rename_all = "lowercase")]
pub enum SupervisorState {
    #[default]
    Idle,
    Trying(StrategyTag),
    Locked(StrategyTag),
    Exhausted,
    Stopped,
}

impl SupervisorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Locked(_) | Self::Exhausted | Self::Stopped)
    }
}
