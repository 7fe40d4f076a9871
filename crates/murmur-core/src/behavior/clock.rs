//! Wall clock used by the behavior engine.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Source of "now" for engagement hours, tweet timers and rate windows.
///
/// `Anchored` advances with the tokio clock from a fixed wall time, so a
/// paused test runtime drives it together with the loop's sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    System,
    Anchored {
        wall: DateTime<Utc>,
        instant: Instant,
    },
}

impl Clock {
    /// A clock reading `wall` right now.
    pub fn anchored(wall: DateTime<Utc>) -> Self {
        Clock::Anchored {
            wall,
            instant: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Anchored { wall, instant } => {
                let elapsed = chrono::Duration::from_std(instant.elapsed())
                    .unwrap_or_else(|_| chrono::Duration::zero());
                *wall + elapsed
            }
        }
    }
}
