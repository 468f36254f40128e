use core::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Dispatch kind of an invoke instruction, numbered as in the persisted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum InvokeKind {
    Static = 0,
    Direct = 1,
    Virtual = 2,
    Super = 3,
    Interface = 4,
    Polymorphic = 5,
    Custom = 6,
}

impl InvokeKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => InvokeKind::Static,
            1 => InvokeKind::Direct,
            2 => InvokeKind::Virtual,
            3 => InvokeKind::Super,
            4 => InvokeKind::Interface,
            5 => InvokeKind::Polymorphic,
            6 => InvokeKind::Custom,
            _ => return None,
        })
    }

    pub fn as_raw(self) -> u32 {
        u32::from(self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            InvokeKind::Static => "static",
            InvokeKind::Direct => "direct",
            InvokeKind::Virtual => "virtual",
            InvokeKind::Super => "super",
            InvokeKind::Interface => "interface",
            InvokeKind::Polymorphic => "polymorphic",
            InvokeKind::Custom => "custom",
        }
    }
}

impl Display for InvokeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
