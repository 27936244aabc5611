//! Raw byte transport to a display's DDC/CI slave.
//!
//! DDC/CI rides on an I2C-style bus: the host writes a request to slave
//! address 0x37, waits out the protocol turnaround, and reads the reply from
//! the same address. The EDID EEPROM answers at 0x50 on the same bus. The
//! bus cannot be hurried; commands issued back-to-back without the mandated
//! gaps lock up monitor firmware.

use {
    crate::error::TransportError,
    std::time::{Duration, Instant},
};

/// DDC/CI command slave address.
pub const DDC_SLAVE_ADDR: u16 = 0x37;
/// EDID EEPROM slave address.
pub const EDID_SLAVE_ADDR: u16 = 0x50;

/// Minimum gap between two transactions addressed to the same display.
pub const INTER_COMMAND_DELAY: Duration = Duration::from_millis(40);
/// Turnaround between writing a request and reading its reply.
pub const WRITE_READ_DELAY: Duration = Duration::from_millis(50);
/// Settle time after a set-VCP write.
pub const POST_SET_DELAY: Duration = Duration::from_millis(50);
/// Base delay between retries of a failed exchange.
pub const RETRY_DELAY: Duration = Duration::from_millis(200);
/// Default deadline for a reply read.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Byte-level access to one display bus.
///
/// An implementation carries an open channel to a single physical bus;
/// `addr` selects the slave (0x37 for DDC/CI commands, 0x50 for EDID).
pub trait Transport {
    /// Write `bytes` to the slave at `addr`.
    fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), TransportError>;

    /// Read exactly `buf.len()` bytes from the slave at `addr`.
    ///
    /// Fails with [`TransportError::Timeout`] if no data arrives within
    /// `timeout`, and [`TransportError::ShortRead`] if the bus produced
    /// fewer bytes than requested.
    fn read(&mut self, addr: u16, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError>;
}

/// Enforces the mandated quiet time between bus transactions.
#[derive(Debug, Default)]
pub struct Pacer {
    last: Option<Instant>,
}

impl Pacer {
    /// A pacer with no transaction on record.
    pub fn new() -> Self {
        Pacer::default()
    }

    /// Sleep out whatever remains of `gap` since the last recorded
    /// transaction.
    pub fn pause(&mut self, gap: Duration) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < gap {
                std::thread::sleep(gap - elapsed);
            }
        }
    }

    /// Record that a transaction just completed.
    pub fn stamp(&mut self) {
        self.last = Some(Instant::now());
    }
}

#[cfg(target_os = "linux")]
mod dev {
    use {
        super::Transport,
        crate::error::TransportError,
        log::{debug, trace},
        std::{
            fs::{File, OpenOptions},
            io::{self, Read, Write},
            os::unix::io::AsRawFd,
            path::Path,
            time::Duration,
        },
    };

    const I2C_SLAVE: libc::c_ulong = 0x0703;

    /// An open `/dev/i2c-N` display bus.
    #[derive(Debug)]
    pub struct I2cDev {
        file: File,
        bus: u32,
        slave: Option<u16>,
    }

    impl I2cDev {
        /// Open the I2C device for bus `bus`.
        pub fn open(bus: u32) -> Result<Self, TransportError> {
            Self::open_path(format!("/dev/i2c-{bus}"), bus)
        }

        fn open_path<P: AsRef<Path>>(path: P, bus: u32) -> Result<Self, TransportError> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path.as_ref())
                .map_err(TransportError::BusUnavailable)?;
            debug!("opened {}", path.as_ref().display());
            Ok(I2cDev {
                file,
                bus,
                slave: None,
            })
        }

        /// Bus number this device was opened for.
        pub fn bus(&self) -> u32 {
            self.bus
        }

        fn set_slave(&mut self, addr: u16) -> Result<(), TransportError> {
            if self.slave == Some(addr) {
                return Ok(());
            }
            let rc = unsafe { libc::ioctl(self.file.as_raw_fd(), I2C_SLAVE, addr as libc::c_ulong) };
            if rc < 0 {
                return Err(TransportError::BusUnavailable(io::Error::last_os_error()));
            }
            self.slave = Some(addr);
            Ok(())
        }

        fn wait_readable(&self, timeout: Duration) -> Result<(), TransportError> {
            let mut pfd = libc::pollfd {
                fd: self.file.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
            let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
            match rc {
                0 => Err(TransportError::Timeout(timeout)),
                r if r < 0 => Err(io::Error::last_os_error().into()),
                _ => Ok(()),
            }
        }
    }

    impl Transport for I2cDev {
        fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), TransportError> {
            self.set_slave(addr)?;
            trace!("i2c-{} @{addr:#04x} write {bytes:02x?}", self.bus);
            let n = self.file.write(bytes)?;
            if n != bytes.len() {
                return Err(io::Error::new(io::ErrorKind::WriteZero, "incomplete bus write").into());
            }
            Ok(())
        }

        fn read(&mut self, addr: u16, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
            self.set_slave(addr)?;
            self.wait_readable(timeout)?;
            let n = self.file.read(buf)?;
            if n != buf.len() {
                return Err(TransportError::ShortRead {
                    expected: buf.len(),
                    got: n,
                });
            }
            trace!("i2c-{} @{addr:#04x} read {buf:02x?}", self.bus);
            Ok(())
        }
    }
}

#[cfg(target_os = "linux")]
pub use dev::I2cDev;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacer_enforces_gap() {
        let mut pacer = Pacer::new();
        // No transaction on record: pause returns immediately.
        let start = Instant::now();
        pacer.pause(Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(40));

        pacer.stamp();
        let start = Instant::now();
        pacer.pause(Duration::from_millis(20));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }
}
