use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(GenerationStatus {
    Idle => "idle",
    Planning => "planning",
    Generating => "generating",
    Completed => "completed",
    Failed => "failed",
});

str_enum!(ScoreLogType {
    Recharge => "recharge",
    Consume => "consume",
});

str_enum!(PresentationMode {
    Slides => "slides",
    Detailed => "detailed",
    Script => "script",
});

str_enum!(PlanStage {
    Idle => "idle",
    ParseParams => "parse_params",
    ExtractContent => "extract_content",
    HookTitles => "hook_titles",
    Structure => "structure",
    Style => "style",
    Integrate => "integrate",
    Done => "done",
    Failed => "failed",
});

impl PresentationMode {
    /// Lenient parse for request fields: anything unknown renders as slides.
    pub fn from_param(value: &str) -> Self {
        value.parse().unwrap_or(Self::Slides)
    }

    /// Short deck description used inside planning prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Slides => "presentation slides",
            Self::Detailed | Self::Script => "detailed deck",
        }
    }
}

impl PlanStage {
    /// Whether a plan-progress stream can stop following this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}
