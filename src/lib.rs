#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/ddc-client/0.1.0/")]

//! DDC/CI display control over an I2C-style transport.
//!
//! Discovers displays, opens a serialized session against one, and performs
//! reliable VCP feature reads and writes over the chatty, error-prone,
//! low-bandwidth DDC/CI protocol.
//!
//! # Example
//!
//! ```rust,no_run
//! # #[cfg(target_os = "linux")]
//! # fn main() -> Result<(), ddc_client::Error> {
//! use ddc_client::{DisplayHandle, SessionConfig};
//!
//! for display in ddc_client::enumerate() {
//!     let mut handle = DisplayHandle::open(display.display_ref(), SessionConfig::default())?;
//!     let brightness = handle.get_vcp(0x10)?;
//!     println!("{display}: brightness {:?}", brightness.current());
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(target_os = "linux"))]
//! # fn main() {}
//! ```

pub use self::{
    caps::CapabilitiesProfile,
    display::{DisplayIdentifier, DisplayInfo, DisplayRef},
    edid::Edid,
    error::{Error, ProtocolError, Result, SessionError, TransportError, ValidationError},
    feature::{FeatureAccess, FeatureDescriptor, ValueKind, VcpValue},
    session::{DisplayHandle, RetryStats, SessionConfig},
    transport::Transport,
};
#[cfg(target_os = "linux")]
pub use self::{
    display::{enumerate, resolve, Enumerator},
    transport::I2cDev,
};
#[doc(no_inline)]
pub use self::feature::describe;

pub mod caps;
pub mod display;
pub mod edid;
pub mod error;
pub mod feature;
pub mod packet;
pub mod session;
pub mod transport;
