//! Presence statuses and the emoji reaction table.

use serde::{Deserialize, Serialize};

/// Presence/activity value shown for a participant.
///
/// The first six are base statuses. The remaining twelve are ephemeral
/// reaction statuses: a receiver/sender pair for each [`Reaction`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Idle,
    Deciding,
    Confused,
    Sleeping,
    Ready,
    Disconnected,
    // Receiver side.
    Loved,
    Praised,
    Fire,
    Celebrated,
    Pooped,
    Booed,
    // Sender side.
    Loving,
    Praising,
    Hyping,
    Partying,
    Mischievous,
    Judging,
}

impl Status {
    /// True for the twelve reaction statuses that revert on their own.
    #[must_use]
    pub fn is_ephemeral(self) -> bool {
        matches!(
            self,
            Self::Loved
                | Self::Praised
                | Self::Fire
                | Self::Celebrated
                | Self::Pooped
                | Self::Booed
                | Self::Loving
                | Self::Praising
                | Self::Hyping
                | Self::Partying
                | Self::Mischievous
                | Self::Judging
        )
    }

    /// Statuses a client may set on itself with a `status` message.
    /// `disconnected` and reaction statuses are owned by the server.
    #[must_use]
    pub fn is_client_settable(self) -> bool {
        matches!(self, Self::Idle | Self::Deciding | Self::Confused | Self::Sleeping | Self::Ready)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Deciding => "deciding",
            Self::Confused => "confused",
            Self::Sleeping => "sleeping",
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Loved => "loved",
            Self::Praised => "praised",
            Self::Fire => "fire",
            Self::Celebrated => "celebrated",
            Self::Pooped => "pooped",
            Self::Booed => "booed",
            Self::Loving => "loving",
            Self::Praising => "praising",
            Self::Hyping => "hyping",
            Self::Partying => "partying",
            Self::Mischievous => "mischievous",
            Self::Judging => "judging",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six emoji a participant can throw at another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    #[serde(rename = "\u{2764}\u{fe0f}", alias = "\u{2764}")]
    Heart,
    #[serde(rename = "\u{1f44d}")]
    ThumbsUp,
    #[serde(rename = "\u{1f525}")]
    Fire,
    #[serde(rename = "\u{1f389}")]
    Party,
    #[serde(rename = "\u{1f4a9}")]
    Poop,
    #[serde(rename = "\u{1f44e}")]
    ThumbsDown,
}

impl Reaction {
    pub const ALL: [Self; 6] = [Self::Heart, Self::ThumbsUp, Self::Fire, Self::Party, Self::Poop, Self::ThumbsDown];

    /// Status shown on the participant who threw the emoji.
    #[must_use]
    pub fn sender_status(self) -> Status {
        match self {
            Self::Heart => Status::Loving,
            Self::ThumbsUp => Status::Praising,
            Self::Fire => Status::Hyping,
            Self::Party => Status::Partying,
            Self::Poop => Status::Mischievous,
            Self::ThumbsDown => Status::Judging,
        }
    }

    /// Status shown on the participant the emoji landed on.
    #[must_use]
    pub fn receiver_status(self) -> Status {
        match self {
            Self::Heart => Status::Loved,
            Self::ThumbsUp => Status::Praised,
            Self::Fire => Status::Fire,
            Self::Party => Status::Celebrated,
            Self::Poop => Status::Pooped,
            Self::ThumbsDown => Status::Booed,
        }
    }

    #[must_use]
    pub fn as_emoji(self) -> &'static str {
        match self {
            Self::Heart => "\u{2764}\u{fe0f}",
            Self::ThumbsUp => "\u{1f44d}",
            Self::Fire => "\u{1f525}",
            Self::Party => "\u{1f389}",
            Self::Poop => "\u{1f4a9}",
            Self::ThumbsDown => "\u{1f44e}",
        }
    }
}

impl std::str::FromStr for Reaction {
    type Err = String;

    /// Accepts either the emoji itself or a short ASCII name (`heart`, `up`,
    /// `fire`, `party`, `poop`, `down`) for terminals without emoji input.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Some(r) = Self::ALL.iter().find(|r| r.as_emoji() == trimmed) {
            return Ok(*r);
        }
        match trimmed {
            "\u{2764}" | "heart" => Ok(Self::Heart),
            "up" | "thumbsup" => Ok(Self::ThumbsUp),
            "fire" => Ok(Self::Fire),
            "party" => Ok(Self::Party),
            "poop" => Ok(Self::Poop),
            "down" | "thumbsdown" => Ok(Self::ThumbsDown),
            other => Err(format!("unknown reaction: {other}")),
        }
    }
}
