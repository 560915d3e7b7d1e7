//! Link-layer framing classification

use std::fmt;

/// Data-link type reported by the capture library after activation.
///
/// The engine maps the numeric DLT code onto a small closed set of symbolic
/// names; anything else is carried through as `Unknown(code)`, which is a
/// recognized success value rather than an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    /// BSD loopback encapsulation
    Null,
    /// Ethernet (most wifi interfaces pretend to be ethernet too)
    Ethernet,
    /// 802.11 with radiotap header, as seen in monitor mode
    Ieee80211Radio,
    /// Raw IP, no link-layer header
    Raw,
    /// Linux cooked capture ("any" device)
    LinuxCooked,
    /// A DLT code outside the mapped set
    Unknown(i32),
}

impl LinkType {
    /// Classify a numeric DLT code as reported by the capture library.
    pub fn from_dlt(code: i32) -> Self {
        match code {
            0 => LinkType::Null,
            1 => LinkType::Ethernet,
            127 => LinkType::Ieee80211Radio,
            // DLT_RAW is 12 almost everywhere; 101 is the savefile LINKTYPE
            // value some libpcap builds report for it.
            12 | 101 => LinkType::Raw,
            113 => LinkType::LinuxCooked,
            other => LinkType::Unknown(other),
        }
    }

    /// The symbolic name for mapped types, `None` for unknown codes
    pub fn name(&self) -> Option<&'static str> {
        match self {
            LinkType::Null => Some("LINKTYPE_NULL"),
            LinkType::Ethernet => Some("LINKTYPE_ETHERNET"),
            LinkType::Ieee80211Radio => Some("LINKTYPE_IEEE802_11_RADIO"),
            LinkType::Raw => Some("LINKTYPE_RAW"),
            LinkType::LinuxCooked => Some("LINKTYPE_LINUX_SLL"),
            LinkType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => match self {
                LinkType::Unknown(code) => write!(f, "Unknown linktype {}", code),
                _ => unreachable!(),
            },
        }
    }
}
