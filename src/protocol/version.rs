//! # Protocol Version Model
//!
//! Ordered set of wire-protocol revisions. Each revision carries the numeric
//! protocol id exchanged during the handshake; several named revisions share
//! one id (all of 1.8.x is 47, 1.16.4 and 1.16.5 are both 754, and so on).
//!
//! Comparison is by protocol id first. When two revisions share an id, the
//! declaration order breaks the tie: `is_newer_than` scans the declared
//! revisions in reverse and wins if it hits `self` before `target`;
//! `is_older_than` scans forward with the analogous rule. Real packet layouts
//! changed between same-numbered revisions, so this tie-break is load-bearing
//! and covered by tests.

use crate::error::{ProtocolError, Result};

macro_rules! protocol_versions {
    ($($name:ident => $id:expr),+ $(,)?) => {
        /// A named wire-protocol revision, ordered oldest to newest.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[allow(non_camel_case_types)]
        pub enum ProtocolVersion {
            $($name,)+
            /// Sentinel for an unresolvable revision; never part of the order.
            Unknown,
        }

        impl ProtocolVersion {
            /// Every real revision in declaration (oldest-first) order.
            pub const VALUES: &'static [ProtocolVersion] = &[$(ProtocolVersion::$name),+];

            /// The numeric id exchanged in the handshake.
            pub fn protocol_id(self) -> i32 {
                match self {
                    $(ProtocolVersion::$name => $id,)+
                    ProtocolVersion::Unknown => -1,
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(ProtocolVersion::$name => stringify!($name),)+
                    ProtocolVersion::Unknown => "Unknown",
                }
            }

            /// Resolve a revision by its declared name (mapping-table keys).
            pub fn from_name(name: &str) -> Result<ProtocolVersion> {
                match name {
                    $(stringify!($name) => Ok(ProtocolVersion::$name),)+
                    _ => Err(ProtocolError::UnknownVersionName(name.to_string())),
                }
            }
        }
    };
}

protocol_versions! {
    V1_7_10 => 5,
    V1_8 => 47, V1_8_3 => 47, V1_8_8 => 47,
    V1_9 => 107, V1_9_1 => 108, V1_9_2 => 109, V1_9_4 => 110,
    V1_10 => 210, V1_10_1 => 210, V1_10_2 => 210,
    V1_11 => 315, V1_11_1 => 316, V1_11_2 => 316,
    V1_12 => 335, V1_12_1 => 338, V1_12_2 => 340,
    V1_13 => 393, V1_13_1 => 401, V1_13_2 => 404,
    V1_14 => 477, V1_14_1 => 480, V1_14_2 => 485, V1_14_3 => 490, V1_14_4 => 498,
    V1_15 => 573, V1_15_1 => 575, V1_15_2 => 578,
    V1_16 => 735, V1_16_1 => 736, V1_16_2 => 751, V1_16_3 => 753, V1_16_4 => 754, V1_16_5 => 754,
    V1_17 => 755, V1_17_1 => 756,
    V1_18 => 757, V1_18_1 => 757, V1_18_2 => 758,
    V1_19 => 759, V1_19_1 => 760, V1_19_2 => 760, V1_19_3 => 761, V1_19_4 => 762,
    V1_20 => 763, V1_20_1 => 763, V1_20_2 => 764, V1_20_3 => 765, V1_20_4 => 765,
    V1_20_5 => 766, V1_20_6 => 766,
    V1_21 => 767, V1_21_1 => 767, V1_21_2 => 768, V1_21_3 => 768, V1_21_4 => 769,
}

impl ProtocolVersion {
    /// Newest real revision.
    pub fn latest() -> ProtocolVersion {
        // VALUES excludes the Unknown sentinel and is never empty
        *Self::VALUES.last().unwrap_or(&ProtocolVersion::Unknown)
    }

    /// Oldest supported revision.
    pub fn oldest() -> ProtocolVersion {
        *Self::VALUES.first().unwrap_or(&ProtocolVersion::Unknown)
    }

    /// Newest revision carrying `id`, or `None` for an unknown wire id.
    pub fn from_protocol_id(id: i32) -> Option<ProtocolVersion> {
        Self::VALUES.iter().rev().find(|v| v.protocol_id() == id).copied()
    }

    pub fn is_newer_than(self, target: ProtocolVersion) -> bool {
        // Distinct protocol ids (or identical revisions) compare numerically.
        if target.protocol_id() != self.protocol_id() || self == target {
            return self.protocol_id() > target.protocol_id();
        }
        // Same wire id: whichever revision appears first in reverse
        // declaration order is the newer one.
        for version in Self::VALUES.iter().rev() {
            if *version == target {
                return false;
            }
            if *version == self {
                return true;
            }
        }
        false
    }

    pub fn is_older_than(self, target: ProtocolVersion) -> bool {
        if target.protocol_id() != self.protocol_id() || self == target {
            return self.protocol_id() < target.protocol_id();
        }
        // Same wire id: whichever revision appears first in declaration
        // order is the older one.
        for version in Self::VALUES.iter() {
            if *version == self {
                return true;
            }
            if *version == target {
                return false;
            }
        }
        false
    }

    pub fn is_newer_or_equal(self, target: ProtocolVersion) -> bool {
        self == target || self.is_newer_than(target)
    }

    pub fn is_older_or_equal(self, target: ProtocolVersion) -> bool {
        self == target || self.is_older_than(target)
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (protocol {})", self.name(), self.protocol_id())
    }
}

/// The client's negotiated wire id, as seen in the handshake. May belong to a
/// revision this library does not know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientVersion(pub i32);

impl ClientVersion {
    pub const UNKNOWN: ClientVersion = ClientVersion(-1);

    pub fn is_unknown(self) -> bool {
        self.0 < 0
    }

    /// Newest named revision matching this wire id.
    pub fn resolve(self) -> Option<ProtocolVersion> {
        ProtocolVersion::from_protocol_id(self.0)
    }
}

impl Default for ClientVersion {
    fn default() -> Self {
        ClientVersion::UNKNOWN
    }
}

impl From<ProtocolVersion> for ClientVersion {
    fn from(version: ProtocolVersion) -> Self {
        ClientVersion(version.protocol_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ordering() {
        assert!(ProtocolVersion::V1_12.is_newer_than(ProtocolVersion::V1_8));
        assert!(ProtocolVersion::V1_8.is_older_than(ProtocolVersion::V1_12));
        assert!(!ProtocolVersion::V1_8.is_newer_than(ProtocolVersion::V1_12));
        assert!(ProtocolVersion::V1_12.is_newer_or_equal(ProtocolVersion::V1_12));
        assert!(ProtocolVersion::V1_12.is_older_or_equal(ProtocolVersion::V1_12));
    }

    #[test]
    fn shared_id_tie_break_follows_declaration_order() {
        // the whole 1.8 line shares protocol 47
        assert_eq!(
            ProtocolVersion::V1_8.protocol_id(),
            ProtocolVersion::V1_8_8.protocol_id()
        );
        assert!(ProtocolVersion::V1_8_8.is_newer_than(ProtocolVersion::V1_8));
        assert!(ProtocolVersion::V1_8_8.is_newer_than(ProtocolVersion::V1_8_3));
        assert!(ProtocolVersion::V1_8.is_older_than(ProtocolVersion::V1_8_3));
        assert!(!ProtocolVersion::V1_8.is_newer_than(ProtocolVersion::V1_8_3));

        // 754 pair
        assert!(ProtocolVersion::V1_16_5.is_newer_than(ProtocolVersion::V1_16_4));
        assert!(ProtocolVersion::V1_16_4.is_older_than(ProtocolVersion::V1_16_5));
    }

    #[test]
    fn ordering_is_total() {
        for &a in ProtocolVersion::VALUES {
            for &b in ProtocolVersion::VALUES {
                let relations = [a.is_newer_than(b), a.is_older_than(b), a == b];
                assert_eq!(
                    relations.iter().filter(|&&r| r).count(),
                    1,
                    "exactly one relation must hold for {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn boundaries_exclude_sentinel() {
        assert_eq!(ProtocolVersion::latest(), ProtocolVersion::V1_21_4);
        assert_eq!(ProtocolVersion::oldest(), ProtocolVersion::V1_7_10);
    }

    #[test]
    fn protocol_id_resolution_prefers_newest() {
        assert_eq!(
            ProtocolVersion::from_protocol_id(47),
            Some(ProtocolVersion::V1_8_8)
        );
        assert_eq!(
            ProtocolVersion::from_protocol_id(754),
            Some(ProtocolVersion::V1_16_5)
        );
        assert_eq!(ProtocolVersion::from_protocol_id(9999), None);
    }

    #[test]
    fn client_version_resolution() {
        assert_eq!(
            ClientVersion(340).resolve(),
            Some(ProtocolVersion::V1_12_2)
        );
        assert!(ClientVersion::UNKNOWN.is_unknown());
        assert_eq!(ClientVersion::UNKNOWN.resolve(), None);
    }

    #[test]
    fn name_round_trip() {
        for &v in ProtocolVersion::VALUES {
            assert_eq!(ProtocolVersion::from_name(v.name()).unwrap(), v);
        }
        assert!(ProtocolVersion::from_name("V0_0").is_err());
    }
}
