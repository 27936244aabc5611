//! Static registry of MCCS VCP feature codes.
//!
//! One row per known feature code; the table is compiled in. Unknown codes
//! are not an error: vendor extensions live outside the standard table, and
//! generic get/set against them remains possible.

use bitflags::bitflags;

bitflags! {
    /// Access bits for a VCP feature.
    pub struct FeatureAccess: u8 {
        /// Readable via a get-VCP exchange.
        const READ = 1 << 0;
        /// Writable via a set-VCP exchange.
        const WRITE = 1 << 1;
    }
}

/// How a feature's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Any value in `0..=maximum`.
    Continuous,
    /// One of a discrete set of values.
    NonContinuous,
    /// An opaque byte string read/written via table exchanges.
    Table,
}

/// Static metadata for one VCP feature code.
#[derive(Debug, Clone, Copy)]
pub struct FeatureDescriptor {
    /// The 8-bit feature code.
    pub code: u8,
    /// Human-readable feature name.
    pub name: &'static str,
    /// Value interpretation.
    pub kind: ValueKind,
    /// Read/write access.
    pub access: FeatureAccess,
}

/// A VCP feature value returned by a get-VCP transaction.
///
/// An immutable snapshot; which variant is produced follows the registry's
/// [`ValueKind`] for the feature code (unknown codes decode as
/// [`Continuous`](VcpValue::Continuous) raw values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcpValue {
    /// A value within a continuous range.
    Continuous {
        /// Current value.
        current: u16,
        /// Maximum value.
        maximum: u16,
    },
    /// One of a discrete set of values.
    NonContinuous {
        /// Current value.
        current: u16,
        /// Maximum value reported by the display.
        maximum: u16,
    },
    /// Table feature bytes.
    Table(Vec<u8>),
}

impl VcpValue {
    /// Current value, for non-table features.
    pub fn current(&self) -> Option<u16> {
        match self {
            VcpValue::Continuous { current, .. } | VcpValue::NonContinuous { current, .. } => Some(*current),
            VcpValue::Table(..) => None,
        }
    }

    /// Maximum value, for non-table features.
    pub fn maximum(&self) -> Option<u16> {
        match self {
            VcpValue::Continuous { maximum, .. } | VcpValue::NonContinuous { maximum, .. } => Some(*maximum),
            VcpValue::Table(..) => None,
        }
    }

    /// Table bytes, for table features.
    pub fn table(&self) -> Option<&[u8]> {
        match self {
            VcpValue::Table(bytes) => Some(bytes),
            _ => None,
        }
    }
}

const RO: FeatureAccess = FeatureAccess::READ;
const WO: FeatureAccess = FeatureAccess::WRITE;
const RW: FeatureAccess =
    FeatureAccess::from_bits_truncate(FeatureAccess::READ.bits() | FeatureAccess::WRITE.bits());

use ValueKind::{Continuous as C, NonContinuous as NC, Table as T};

const fn feat(code: u8, name: &'static str, kind: ValueKind, access: FeatureAccess) -> FeatureDescriptor {
    FeatureDescriptor {
        code,
        name,
        kind,
        access,
    }
}

// Sorted by code; looked up by binary search.
static FEATURES: &[FeatureDescriptor] = &[
    feat(0x01, "Degauss", NC, WO),
    feat(0x02, "New control value", NC, RW),
    feat(0x03, "Soft controls", NC, RW),
    feat(0x04, "Restore factory defaults", NC, WO),
    feat(0x05, "Restore factory brightness/contrast", NC, WO),
    feat(0x06, "Restore factory geometry defaults", NC, WO),
    feat(0x08, "Restore color defaults", NC, WO),
    feat(0x0b, "Color temperature increment", NC, RO),
    feat(0x0c, "Color temperature request", C, RW),
    feat(0x0e, "Clock", C, RW),
    feat(0x10, "Brightness", C, RW),
    feat(0x12, "Contrast", C, RW),
    feat(0x14, "Select color preset", NC, RW),
    feat(0x16, "Video gain: Red", C, RW),
    feat(0x18, "Video gain: Green", C, RW),
    feat(0x1a, "Video gain: Blue", C, RW),
    feat(0x1e, "Auto setup", NC, RW),
    feat(0x20, "Horizontal position", C, RW),
    feat(0x30, "Vertical position", C, RW),
    feat(0x3e, "Clock phase", C, RW),
    feat(0x52, "Active control", NC, RO),
    feat(0x60, "Input source", NC, RW),
    feat(0x62, "Audio speaker volume", C, RW),
    feat(0x66, "Ambient light sensor", NC, RW),
    feat(0x6c, "Video black level: Red", C, RW),
    feat(0x6e, "Video black level: Green", C, RW),
    feat(0x70, "Video black level: Blue", C, RW),
    feat(0x72, "Gamma", NC, RW),
    feat(0x73, "LUT size", T, RO),
    feat(0x74, "Single point LUT operation", T, RW),
    feat(0x75, "Block LUT operation", T, RW),
    feat(0x7c, "Adjust zoom", C, RW),
    feat(0x87, "Sharpness", C, RW),
    feat(0x8a, "Color saturation", C, RW),
    feat(0x8d, "Audio mute", NC, RW),
    feat(0x90, "Hue", C, RW),
    feat(0xaa, "Screen orientation", NC, RO),
    feat(0xac, "Horizontal frequency", C, RO),
    feat(0xae, "Vertical frequency", C, RO),
    feat(0xb0, "Settings", NC, WO),
    feat(0xb2, "Flat panel sub-pixel layout", NC, RO),
    feat(0xb6, "Display technology type", NC, RO),
    feat(0xc0, "Display usage time", C, RO),
    feat(0xc6, "Application enable key", NC, RO),
    feat(0xc8, "Display controller type", NC, RO),
    feat(0xc9, "Display firmware level", C, RO),
    feat(0xca, "OSD", NC, RW),
    feat(0xcc, "OSD language", NC, RW),
    feat(0xd6, "Power mode", NC, RW),
    feat(0xda, "Scan mode", NC, RW),
    feat(0xdc, "Display preset", NC, RW),
    feat(0xdf, "VCP version", NC, RO),
];

/// Look up the descriptor for a feature code.
///
/// Unknown codes yield `None`, not an error.
pub fn describe(code: u8) -> Option<&'static FeatureDescriptor> {
    FEATURES
        .binary_search_by_key(&code, |f| f.code)
        .ok()
        .map(|ndx| &FEATURES[ndx])
}
