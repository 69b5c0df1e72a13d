//! Event code enumeration
//!
//! Agents tag every unsolicited message with an integer code. Known codes map
//! onto named variants; anything else is kept as [`EventKind::Unknown`] so a
//! newer agent never breaks dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! event_kinds {
    ($($(#[$doc:meta])* $name:ident = $code:literal,)+) => {
        /// Event type carried in the `type` field of an envelope
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "i64", into = "i64")]
        pub enum EventKind {
            $($(#[$doc])* $name,)+
            /// Code not in the known catalogue
            Unknown(i64),
        }

        impl EventKind {
            /// Every named variant, in catalogue order
            pub const KNOWN: &'static [EventKind] = &[$(EventKind::$name,)+];

            /// Numeric wire code
            pub fn code(self) -> i64 {
                match self {
                    $(Self::$name => $code,)+
                    Self::Unknown(code) => code,
                }
            }
        }

        impl From<i64> for EventKind {
            fn from(code: i64) -> Self {
                match code {
                    $($code => Self::$name,)+
                    other => Self::Unknown(other),
                }
            }
        }
    };
}

event_kinds! {
    /// Reserved "any event" code
    All = 0,
    /// Agent attached to its host process
    Connect = 11024,
    /// User logged in
    Login = 11025,
    /// User logged out
    Logout = 11026,
    /// Login QR code issued
    LoginQrCode = 11087,
    /// Window handle changed
    WindowHandleChange = 11088,
    /// Active chat changed
    ChatChange = 11091,
    /// Text message
    Text = 11046,
    /// Image message
    Image = 11047,
    /// Voice message
    Voice = 11048,
    /// Friend request
    FriendRequest = 11049,
    /// Contact card
    Card = 11050,
    /// Video message
    Video = 11051,
    /// Emoji message
    Emoji = 11052,
    /// Location message
    Location = 11053,
    /// Link card
    LinkCard = 11054,
    /// File message
    File = 11055,
    /// Mini program message
    MiniProgram = 11056,
    /// Transfer message
    Transfer = 11057,
    /// System message
    System = 11058,
    /// Message revoked
    Revoke = 11059,
    /// Other message
    Other = 11060,
    /// Other app message
    OtherApp = 11061,
    /// QR code payment notice
    QrCodePayment = 11095,
    /// Group members joined
    GroupMemberIncrease = 11098,
    /// Group members left
    GroupMemberDecrease = 11099,
    /// Joined a group
    GroupIncrease = 11100,
    /// Left a group
    GroupDecrease = 11101,
    /// Friend added
    FriendIncrease = 11102,
    /// Friend removed
    FriendDecrease = 11103,
}

impl From<EventKind> for i64 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown({})", code),
            known => write!(f, "{:?}({})", known, known.code()),
        }
    }
}
