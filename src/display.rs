//! Display discovery and identification.
//!
//! Displays are specified three ways at different stages:
//!
//! 1. [`DisplayIdentifier`] is what a caller supplies: a bus number, an
//!    ordinal display number, a manufacturer/model/serial triple, or an
//!    EDID hash.
//! 2. [`DisplayRef`] is the resolved, bus-attached descriptor. It does not
//!    imply an open connection.
//! 3. [`DisplayHandle`](crate::DisplayHandle) is the open session created
//!    from a `DisplayRef`.

use {
    crate::edid::Edid,
    std::fmt,
    thiserror::Error,
};
#[cfg(target_os = "linux")]
use {
    crate::{
        error::SessionError,
        packet,
        transport::{self, I2cDev, Transport, DDC_SLAVE_ADDR, EDID_SLAVE_ADDR},
    },
    log::debug,
    std::path::Path,
};

/// How a caller names a display before a session exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayIdentifier {
    /// An I2C bus number, as in `/dev/i2c-5`.
    Bus(u32),
    /// An ordinal display number, 1-based, in enumeration order.
    Index(usize),
    /// Manufacturer/model/serial as reported in the EDID.
    MonitorId {
        /// Three-letter PNP manufacturer id.
        manufacturer: String,
        /// Model name.
        model: String,
        /// Serial number string.
        serial: String,
    },
    /// FNV-1a hash of the 128-byte EDID block.
    EdidHash(u64),
}

impl fmt::Display for DisplayIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DisplayIdentifier::Bus(bus) => write!(f, "bus:{bus}"),
            DisplayIdentifier::Index(n) => write!(f, "{n}"),
            DisplayIdentifier::MonitorId {
                manufacturer,
                model,
                serial,
            } => write!(f, "id:{manufacturer}/{model}/{serial}"),
            DisplayIdentifier::EdidHash(hash) => write!(f, "edid:{hash:016x}"),
        }
    }
}

/// Failure to parse a display selector string.
#[derive(Debug, Error)]
#[error("unrecognized display selector `{0}`")]
pub struct SelectorParseError(String);

impl std::str::FromStr for DisplayIdentifier {
    type Err = SelectorParseError;

    /// Parses the CLI selector syntax: a plain integer (ordinal display
    /// number), `bus:N`, `edid:HEX`, or `id:MANUFACTURER/MODEL/SERIAL`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || SelectorParseError(s.into());
        if let Some(bus) = s.strip_prefix("bus:") {
            return bus.parse().map(DisplayIdentifier::Bus).map_err(|_| err());
        }
        if let Some(hash) = s.strip_prefix("edid:") {
            return u64::from_str_radix(hash, 16)
                .map(DisplayIdentifier::EdidHash)
                .map_err(|_| err());
        }
        if let Some(id) = s.strip_prefix("id:") {
            let mut parts = id.splitn(3, '/');
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(manufacturer), Some(model), Some(serial)) => Ok(DisplayIdentifier::MonitorId {
                    manufacturer: manufacturer.into(),
                    model: model.into(),
                    serial: serial.into(),
                }),
                _ => Err(err()),
            };
        }
        s.parse().map(DisplayIdentifier::Index).map_err(|_| err())
    }
}

/// A resolved, bus-attached display descriptor.
///
/// Cheap and re-derivable; holding one does not open anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayRef {
    bus: u32,
}

impl DisplayRef {
    /// Address the display on I2C bus `bus`.
    pub fn new(bus: u32) -> Self {
        DisplayRef { bus }
    }

    /// The bus number.
    pub fn bus(&self) -> u32 {
        self.bus
    }
}

impl fmt::Display for DisplayRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "/dev/i2c-{}", self.bus)
    }
}

/// One enumerated display.
#[derive(Debug, Clone)]
pub struct DisplayInfo {
    /// Ordinal display number, 1-based, in enumeration order.
    pub dispno: usize,
    /// Bus the display answered on.
    pub bus: u32,
    /// Decoded EDID identity.
    pub edid: Edid,
}

impl DisplayInfo {
    /// The bus-attached descriptor for this display.
    pub fn display_ref(&self) -> DisplayRef {
        DisplayRef::new(self.bus)
    }
}

impl fmt::Display for DisplayInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Display {}: bus {} ({}) edid:{:016x}",
            self.dispno, self.bus, self.edid, self.edid.hash
        )
    }
}

/// Match an identifier against a candidate slice.
///
/// The pure core of [`resolve`]: deterministic, no I/O.
pub fn match_displays(candidates: &[DisplayInfo], id: &DisplayIdentifier) -> Result<DisplayRef, crate::Error> {
    use crate::error::SessionError;

    let matches: Vec<&DisplayInfo> = match id {
        DisplayIdentifier::Bus(bus) => candidates.iter().filter(|c| c.bus == *bus).collect(),
        DisplayIdentifier::Index(n) => candidates.iter().filter(|c| c.dispno == *n).collect(),
        DisplayIdentifier::MonitorId {
            manufacturer,
            model,
            serial,
        } => candidates
            .iter()
            .filter(|c| {
                c.edid.manufacturer.eq_ignore_ascii_case(manufacturer)
                    && c.edid.model_name().eq_ignore_ascii_case(model)
                    && c.edid.serial_string().eq_ignore_ascii_case(serial)
            })
            .collect(),
        DisplayIdentifier::EdidHash(hash) => candidates.iter().filter(|c| c.edid.hash == *hash).collect(),
    };

    match matches.len() {
        0 => Err(SessionError::NotFound.into()),
        1 => Ok(matches[0].display_ref()),
        n => Err(SessionError::AmbiguousMatch(n).into()),
    }
}

/// Lazily probes candidate buses for DDC/CI-capable displays.
///
/// Created by [`enumerate`]. Probing is I/O-bound and slow (each candidate
/// costs an EDID read plus a DDC/CI handshake with its mandated delays);
/// callers may `take(n)` to cap the work.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct Enumerator {
    buses: std::vec::IntoIter<u32>,
    next_dispno: usize,
}

#[cfg(target_os = "linux")]
impl Iterator for Enumerator {
    type Item = DisplayInfo;

    fn next(&mut self) -> Option<DisplayInfo> {
        for bus in self.buses.by_ref() {
            match probe_bus(bus) {
                Some(edid) => {
                    let dispno = self.next_dispno;
                    self.next_dispno += 1;
                    return Some(DisplayInfo { dispno, bus, edid });
                },
                None => continue,
            }
        }
        None
    }
}

/// Enumerate DDC/CI-capable displays.
///
/// Scans `/dev/i2c-*`, reads the EDID at 0x50 of each bus that opens, and
/// keeps only buses whose DDC/CI slave produces a decodable reply (a null
/// reply counts: the device ACKed).
#[cfg(target_os = "linux")]
pub fn enumerate() -> Enumerator {
    let mut buses: Vec<u32> = match std::fs::read_dir("/dev") {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                e.file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("i2c-"))
                    .and_then(|n| n.parse().ok())
            })
            .collect(),
        Err(..) => Vec::new(),
    };
    buses.sort_unstable();
    Enumerator {
        buses: buses.into_iter(),
        next_dispno: 1,
    }
}

/// Resolve an identifier to a bus-attached descriptor.
///
/// Fails with [`SessionError::NotFound`] when nothing matches and
/// [`SessionError::AmbiguousMatch`] when a non-unique identifier (for
/// example a duplicated model/serial pair) matches more than one bus.
#[cfg(target_os = "linux")]
pub fn resolve(id: &DisplayIdentifier) -> Result<DisplayRef, crate::Error> {
    match id {
        DisplayIdentifier::Bus(bus) => {
            if Path::new(&format!("/dev/i2c-{bus}")).exists() {
                Ok(DisplayRef::new(*bus))
            } else {
                Err(SessionError::NotFound.into())
            }
        },
        DisplayIdentifier::Index(n) => enumerate()
            .find(|c| c.dispno == *n)
            .map(|c| c.display_ref())
            .ok_or_else(|| SessionError::NotFound.into()),
        _ => {
            let candidates: Vec<DisplayInfo> = enumerate().collect();
            match_displays(&candidates, id)
        },
    }
}

// One probe: EDID identity at 0x50, then a get-VCP handshake at 0x37.
#[cfg(target_os = "linux")]
fn probe_bus(bus: u32) -> Option<Edid> {
    use crate::error::ProtocolError;

    let mut dev = match I2cDev::open(bus) {
        Ok(dev) => dev,
        Err(e) => {
            debug!("skipping bus {bus}: {e}");
            return None;
        },
    };

    dev.write(EDID_SLAVE_ADDR, &[0x00]).ok()?;
    let mut block = [0u8; crate::edid::EDID_LEN];
    dev.read(EDID_SLAVE_ADDR, &mut block, transport::DEFAULT_READ_TIMEOUT)
        .ok()?;
    let edid = Edid::parse(&block)?;

    dev.write(DDC_SLAVE_ADDR, &packet::encode_get_vcp(0x10)).ok()?;
    std::thread::sleep(transport::WRITE_READ_DELAY);
    let mut reply = [0u8; packet::reply_len(8)];
    dev.read(DDC_SLAVE_ADDR, &mut reply, transport::DEFAULT_READ_TIMEOUT)
        .ok()?;
    match packet::decode_reply(&reply) {
        Ok(..) | Err(ProtocolError::NotReady) | Err(ProtocolError::Checksum { .. }) => {
            debug!("bus {bus}: DDC/CI display {edid}");
            Some(edid)
        },
        Err(e) => {
            debug!("bus {bus}: EDID present but no DDC/CI ({e})");
            None
        },
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::error::{Error, SessionError},
    };

    fn candidate(dispno: usize, bus: u32, serial_tweak: u8) -> DisplayInfo {
        let mut block = crate::edid::sample_edid();
        block[12] = serial_tweak;
        DisplayInfo {
            dispno,
            bus,
            edid: Edid::parse(&block).unwrap(),
        }
    }

    #[test]
    fn selector_parsing() {
        assert_eq!("bus:5".parse::<DisplayIdentifier>().unwrap(), DisplayIdentifier::Bus(5));
        assert_eq!("2".parse::<DisplayIdentifier>().unwrap(), DisplayIdentifier::Index(2));
        assert_eq!(
            "edid:00000000deadbeef".parse::<DisplayIdentifier>().unwrap(),
            DisplayIdentifier::EdidHash(0xdead_beef)
        );
        match "id:SAM/S24E650/H4ZN500855".parse::<DisplayIdentifier>().unwrap() {
            DisplayIdentifier::MonitorId { manufacturer, .. } => assert_eq!(manufacturer, "SAM"),
            other => panic!("unexpected {other:?}"),
        }
        assert!("bus:none".parse::<DisplayIdentifier>().is_err());
        assert!("id:short".parse::<DisplayIdentifier>().is_err());
    }

    #[test]
    fn matches_by_bus_and_index() {
        let candidates = [candidate(1, 4, 1), candidate(2, 7, 2)];
        let dref = match_displays(&candidates, &DisplayIdentifier::Bus(7)).unwrap();
        assert_eq!(dref.bus(), 7);
        let dref = match_displays(&candidates, &DisplayIdentifier::Index(1)).unwrap();
        assert_eq!(dref.bus(), 4);
    }

    #[test]
    fn missing_display_is_not_found() {
        let candidates = [candidate(1, 4, 1)];
        assert!(matches!(
            match_displays(&candidates, &DisplayIdentifier::Bus(9)),
            Err(Error::Session(SessionError::NotFound))
        ));
    }

    #[test]
    fn duplicate_identity_is_ambiguous() {
        // Same EDID on two buses, as with a mirrored pair of identical
        // monitors.
        let candidates = [candidate(1, 4, 1), candidate(2, 7, 1)];
        let id = DisplayIdentifier::MonitorId {
            manufacturer: "SAM".into(),
            model: "S24E650".into(),
            serial: "H4ZN500855".into(),
        };
        assert!(matches!(
            match_displays(&candidates, &id),
            Err(Error::Session(SessionError::AmbiguousMatch(2)))
        ));
        assert!(matches!(
            match_displays(&candidates, &DisplayIdentifier::EdidHash(candidates[0].edid.hash)),
            Err(Error::Session(SessionError::AmbiguousMatch(2)))
        ));
    }

    #[test]
    fn unique_identity_resolves() {
        let candidates = [candidate(1, 4, 1), candidate(2, 7, 2)];
        let dref = match_displays(&candidates, &DisplayIdentifier::EdidHash(candidates[1].edid.hash)).unwrap();
        assert_eq!(dref.bus(), 7);
    }
}
