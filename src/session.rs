//! Display sessions: open handles and reliable VCP transactions.
//!
//! A [`DisplayHandle`] owns exclusive access to one display for its
//! lifetime. All transactions against the handle are serialized (methods
//! take `&mut self`), paced with the protocol's mandated delays, and
//! retried within configured bounds when the display answers with noise,
//! a null message, or nothing at all.

use {
    crate::{
        caps::{self, CapabilitiesProfile},
        display::DisplayRef,
        error::{Error, ProtocolError, Result, SessionError, ValidationError},
        feature::{self, FeatureAccess, ValueKind, VcpValue},
        packet,
        transport::{Pacer, Transport, DDC_SLAVE_ADDR},
    },
    log::{debug, trace, warn},
    std::{
        collections::{BTreeSet, HashMap},
        sync::{Mutex, OnceLock},
        thread,
        time::Duration,
    },
};

/// Hard ceiling on any configured retry bound.
pub const MAX_TRIES: u32 = 15;

/// Feature used for the open-time handshake; chosen because virtually every
/// DDC/CI display implements it, and an "unsupported" reply still proves
/// the display is talking.
const PROBE_FEATURE: u8 = 0x10;

/// Tunable session behavior, passed explicitly to [`DisplayHandle::open_with`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Attempts for the open-time handshake.
    pub open_tries: u32,
    /// Attempts for a write-read exchange.
    pub write_read_tries: u32,
    /// Attempts for a write-only exchange.
    pub write_only_tries: u32,
    /// Attempts for a whole multi-part read.
    pub multi_part_tries: u32,
    /// Deadline for a single reply read.
    pub read_timeout: Duration,
    /// Confirm every set-VCP write with a follow-up read.
    pub verify_writes: bool,
    /// Minimum gap between two transactions to the display.
    pub inter_command_delay: Duration,
    /// Turnaround between request write and reply read.
    pub write_read_delay: Duration,
    /// Settle time after a set-VCP write.
    pub post_set_delay: Duration,
    /// Delay between retries of a failed exchange.
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            open_tries: 3,
            write_read_tries: 10,
            write_only_tries: 4,
            multi_part_tries: 8,
            read_timeout: crate::transport::DEFAULT_READ_TIMEOUT,
            verify_writes: false,
            inter_command_delay: crate::transport::INTER_COMMAND_DELAY,
            write_read_delay: crate::transport::WRITE_READ_DELAY,
            post_set_delay: crate::transport::POST_SET_DELAY,
            retry_delay: crate::transport::RETRY_DELAY,
        }
    }
}

impl SessionConfig {
    fn clamped(mut self) -> Self {
        self.open_tries = self.open_tries.clamp(1, MAX_TRIES);
        self.write_read_tries = self.write_read_tries.clamp(1, MAX_TRIES);
        self.write_only_tries = self.write_only_tries.clamp(1, MAX_TRIES);
        self.multi_part_tries = self.multi_part_tries.clamp(1, MAX_TRIES);
        self
    }
}

/// Counters for one class of exchange.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeStats {
    /// Exchanges attempted.
    pub exchanges: u64,
    /// Retries consumed across all exchanges.
    pub retries: u64,
    /// Exchanges that exhausted their retry budget.
    pub failures: u64,
}

/// Per-handle retry statistics, by exchange class.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryStats {
    /// Write-read exchanges (get-VCP and friends).
    pub write_read: ExchangeStats,
    /// Write-only exchanges (set-VCP, save settings).
    pub write_only: ExchangeStats,
    /// Multi-part reads (capabilities, table features).
    pub multi_part: ExchangeStats,
}

// Multi-part reads track their own stats; they are a loop of write-read
// exchanges with an outer retry budget of their own.
#[derive(Debug, Clone, Copy)]
enum ExchangeClass {
    WriteRead,
    WriteOnly,
}

// Process-wide set of bus numbers with a live handle. Guards the
// one-open-handle-per-display invariant.
fn open_registry() -> &'static Mutex<BTreeSet<u32>> {
    static REGISTRY: OnceLock<Mutex<BTreeSet<u32>>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
}

#[derive(Debug)]
struct OpenToken {
    bus: u32,
}

impl OpenToken {
    fn acquire(bus: u32) -> Result<Self, SessionError> {
        let mut open = open_registry().lock().expect("open registry poisoned");
        if !open.insert(bus) {
            return Err(SessionError::AlreadyOpen(bus));
        }
        Ok(OpenToken { bus })
    }
}

impl Drop for OpenToken {
    fn drop(&mut self) {
        let mut open = open_registry().lock().expect("open registry poisoned");
        open.remove(&self.bus);
    }
}

enum MultiPart {
    Capabilities,
    Table(u8),
}

impl MultiPart {
    fn request(&self, offset: u16) -> Vec<u8> {
        match *self {
            MultiPart::Capabilities => packet::encode_capabilities_request(offset),
            MultiPart::Table(code) => packet::encode_table_read(code, offset),
        }
    }

    fn reply_op(&self) -> u8 {
        match self {
            MultiPart::Capabilities => packet::op::CAPABILITIES_REPLY,
            MultiPart::Table(..) => packet::op::TABLE_READ_REPLY,
        }
    }
}

/// An open session with one display.
///
/// Created by [`open_with`](Self::open_with) (or [`open`](Self::open) on
/// Linux); released by [`close`](Self::close) or `Drop`. While the handle
/// lives, no other handle can be opened for the same display within this
/// process.
#[derive(Debug)]
pub struct DisplayHandle<T: Transport> {
    transport: T,
    dref: DisplayRef,
    config: SessionConfig,
    pacer: Pacer,
    caps: Option<CapabilitiesProfile>,
    max_cache: HashMap<u8, u16>,
    stats: RetryStats,
    token: Option<OpenToken>,
}

impl<T: Transport> DisplayHandle<T> {
    /// Open a session over an already-constructed transport.
    ///
    /// Registers the display as open (failing with
    /// [`SessionError::AlreadyOpen`] if another live handle exists for the
    /// same display), then performs a handshake exchange under exponential
    /// backoff. Exhausting the open retry budget yields
    /// [`SessionError::NoResponse`] and releases the registration.
    pub fn open_with(transport: T, dref: DisplayRef, config: SessionConfig) -> Result<Self> {
        let config = config.clamped();
        let token = OpenToken::acquire(dref.bus())?;
        let mut handle = DisplayHandle {
            transport,
            dref,
            config,
            pacer: Pacer::new(),
            caps: None,
            max_cache: HashMap::new(),
            stats: RetryStats::default(),
            token: Some(token),
        };

        let tries = handle.config.open_tries;
        let mut backoff = handle.config.inter_command_delay;
        for attempt in 1..=tries {
            if attempt > 1 {
                thread::sleep(backoff);
                backoff *= 2;
            }
            match handle.exchange_once(&packet::encode_get_vcp(PROBE_FEATURE), packet::reply_len(8)) {
                Ok(..) => {
                    debug!("opened display on {dref}");
                    return Ok(handle);
                },
                Err(e) if e.is_retryable() => {
                    debug!("open handshake attempt {attempt}/{tries} on {dref}: {e}");
                },
                Err(e) => return Err(e),
            }
        }
        warn!("display on {dref} did not respond to the open handshake");
        Err(SessionError::NoResponse { tries }.into())
    }

    /// The descriptor this handle was opened from.
    pub fn display_ref(&self) -> DisplayRef {
        self.dref
    }

    /// Retry statistics accumulated by this handle.
    pub fn stats(&self) -> RetryStats {
        self.stats
    }

    /// The capabilities profile cached by
    /// [`read_capabilities`](Self::read_capabilities), if any.
    pub fn capabilities_profile(&self) -> Option<&CapabilitiesProfile> {
        self.caps.as_ref()
    }

    /// Whether the handle is still open.
    pub fn is_open(&self) -> bool {
        self.token.is_some()
    }

    /// Release exclusive access. Idempotent; `Drop` does the same.
    pub fn close(&mut self) {
        if self.token.take().is_some() {
            debug!("closed display on {}", self.dref);
        }
    }

    /// Read the value of a VCP feature.
    ///
    /// Fails with [`ValidationError::UnsupportedFeature`] before any bus
    /// traffic if the registry marks the code unreadable. Table-kind
    /// features are read via the multi-part path.
    pub fn get_vcp(&mut self, code: u8) -> Result<VcpValue> {
        self.ensure_open()?;
        let descriptor = feature::describe(code);
        if let Some(d) = descriptor {
            if !d.access.contains(FeatureAccess::READ) {
                return Err(ValidationError::UnsupportedFeature(code).into());
            }
            if d.kind == ValueKind::Table {
                return self.get_table(code);
            }
        }
        let result = self.get_vcp_inner(code, descriptor.map(|d| d.kind));
        self.surface(result)
    }

    /// Write a VCP feature value, verifying per the session default.
    pub fn set_vcp(&mut self, code: u8, value: u16) -> Result<()> {
        let verify = self.config.verify_writes;
        self.set_vcp_with(code, value, verify)
    }

    /// Write a VCP feature value, with an explicit verify choice.
    ///
    /// Validation happens locally before anything is sent: an unwritable
    /// code is rejected with [`ValidationError::UnsupportedFeature`], and a
    /// value outside the capabilities profile's discrete set (or above a
    /// maximum cached from an earlier read) with
    /// [`ValidationError::OutOfRange`]. With `verify`, a follow-up read
    /// confirms the display accepted the write.
    pub fn set_vcp_with(&mut self, code: u8, value: u16, verify: bool) -> Result<()> {
        self.ensure_open()?;
        let descriptor = feature::describe(code);
        if let Some(d) = descriptor {
            if !d.access.contains(FeatureAccess::WRITE) || d.kind == ValueKind::Table {
                return Err(ValidationError::UnsupportedFeature(code).into());
            }
        }
        match self.caps.as_ref().and_then(|c| c.permitted(code)).filter(|s| !s.is_empty()) {
            Some(permitted) => {
                if !permitted.contains(&value) {
                    return Err(ValidationError::OutOfRange { feature: code, value }.into());
                }
            },
            None => {
                if let Some(&max) = self.max_cache.get(&code) {
                    if value > max {
                        return Err(ValidationError::OutOfRange { feature: code, value }.into());
                    }
                }
            },
        }
        let result = self.set_vcp_inner(code, value, verify, descriptor.map(|d| d.kind));
        self.surface(result)
    }

    /// Execute the DDC/CI Save Current Settings command.
    pub fn save_current_settings(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.run_retries(ExchangeClass::WriteOnly, |h| {
            let settle = h.config.post_set_delay;
            h.write_only_once(&packet::encode_save_settings(), settle)
        });
        self.surface(result)
    }

    /// Fetch and reassemble the display's capabilities string.
    ///
    /// The string may span many fragments; each is requested at the running
    /// offset, checked against the offset the display echoes, and appended.
    /// A fragment shorter than the 32-byte maximum ends the reassembly.
    pub fn get_capabilities_string(&mut self) -> Result<String> {
        self.ensure_open()?;
        let result = self.multi_part_read(MultiPart::Capabilities);
        let bytes = self.surface(result)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Fetch, parse and cache the display's capabilities.
    ///
    /// The cached profile feeds [`set_vcp`](Self::set_vcp) validation.
    pub fn read_capabilities(&mut self) -> Result<CapabilitiesProfile> {
        let raw = self.get_capabilities_string()?;
        let profile = caps::parse(&raw)?;
        self.caps = Some(profile.clone());
        Ok(profile)
    }

    /// Read a table-kind feature via the multi-part path.
    pub fn get_table(&mut self, code: u8) -> Result<VcpValue> {
        self.ensure_open()?;
        if let Some(d) = feature::describe(code) {
            if !d.access.contains(FeatureAccess::READ) {
                return Err(ValidationError::UnsupportedFeature(code).into());
            }
        }
        let result = self.multi_part_read(MultiPart::Table(code));
        self.surface(result).map(VcpValue::Table)
    }

    fn ensure_open(&self) -> Result<()> {
        match self.token {
            Some(..) => Ok(()),
            None => Err(SessionError::Closed.into()),
        }
    }

    // Retry-budget exhaustion must never leave the handle half-open: the
    // registration is released and later calls fail with `Closed`.
    fn surface<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(Error::Session(SessionError::NoResponse { .. })) = &result {
            warn!("display on {} stopped responding, closing handle", self.dref);
            self.close();
        }
        result
    }

    fn get_vcp_inner(&mut self, code: u8, kind: Option<ValueKind>) -> Result<VcpValue> {
        let reply = self.run_retries(ExchangeClass::WriteRead, |h| {
            let payload = h.exchange_once(&packet::encode_get_vcp(code), packet::reply_len(8))?;
            Ok(packet::parse_vcp_reply(&payload)?)
        })?;
        if reply.unsupported {
            return Err(ValidationError::UnsupportedFeature(code).into());
        }
        if reply.feature != code {
            return Err(ValidationError::InvalidReply("reply for a different feature").into());
        }
        self.max_cache.insert(code, reply.maximum);
        trace!(
            "get {:#04x} on {}: current={} maximum={}",
            code,
            self.dref,
            reply.current,
            reply.maximum
        );
        Ok(match kind {
            Some(ValueKind::NonContinuous) => VcpValue::NonContinuous {
                current: reply.current,
                maximum: reply.maximum,
            },
            // Unknown codes read as raw continuous values.
            _ => VcpValue::Continuous {
                current: reply.current,
                maximum: reply.maximum,
            },
        })
    }

    fn set_vcp_inner(&mut self, code: u8, value: u16, verify: bool, kind: Option<ValueKind>) -> Result<()> {
        self.run_retries(ExchangeClass::WriteOnly, |h| {
            let settle = h.config.post_set_delay;
            h.write_only_once(&packet::encode_set_vcp(code, value), settle)
        })?;
        trace!("set {:#04x} on {} to {}", code, self.dref, value);
        if verify {
            let read_back = self.get_vcp_inner(code, kind)?;
            let actual = read_back.current().unwrap_or_default();
            if actual != value {
                return Err(ValidationError::VerifyFailed {
                    feature: code,
                    expected: value,
                    actual,
                }
                .into());
            }
        }
        Ok(())
    }

    fn multi_part_read(&mut self, kind: MultiPart) -> Result<Vec<u8>> {
        let tries = self.config.multi_part_tries;
        self.stats.multi_part.exchanges += 1;
        let mut last: Option<Error> = None;
        for attempt in 1..=tries {
            if attempt > 1 {
                self.stats.multi_part.retries += 1;
                thread::sleep(self.config.retry_delay);
            }
            match self.try_multi_part_read(&kind) {
                Ok(bytes) => return Ok(bytes),
                Err(e) if multi_part_retryable(&e) => {
                    debug!("multi-part attempt {attempt}/{tries} on {}: {e}", self.dref);
                    last = Some(e);
                },
                Err(e) => return Err(e),
            }
        }
        self.stats.multi_part.failures += 1;
        Err(last.unwrap_or_else(|| SessionError::NoResponse { tries }.into()))
    }

    // One whole reassembly pass; any failure restarts from offset zero.
    fn try_multi_part_read(&mut self, kind: &MultiPart) -> Result<Vec<u8>> {
        let reply_size = packet::reply_len(3 + packet::MAX_FRAGMENT_SIZE);
        let mut acc = Vec::new();
        let mut offset: u16 = 0;
        loop {
            let request = kind.request(offset);
            let payload = self.run_retries(ExchangeClass::WriteRead, |h| h.exchange_once(&request, reply_size))?;
            let fragment = packet::parse_fragment(&payload, kind.reply_op())?;
            if fragment.offset != offset {
                return Err(ProtocolError::FragmentOffset {
                    requested: offset as usize,
                    answered: fragment.offset as usize,
                }
                .into());
            }
            acc.extend_from_slice(fragment.bytes);
            if fragment.bytes.len() < packet::MAX_FRAGMENT_SIZE {
                return Ok(acc);
            }
            offset = match offset.checked_add(fragment.bytes.len() as u16) {
                Some(next) => next,
                None => return Err(ProtocolError::BadFrame("multi-part reply never ended").into()),
            };
        }
    }

    fn run_retries<R>(&mut self, class: ExchangeClass, mut op: impl FnMut(&mut Self) -> Result<R>) -> Result<R> {
        let tries = self.tries_for(class);
        self.stats_for(class).exchanges += 1;
        for attempt in 1..=tries {
            if attempt > 1 {
                self.stats_for(class).retries += 1;
                thread::sleep(self.config.retry_delay);
            }
            match op(self) {
                Ok(r) => return Ok(r),
                Err(e) if e.is_retryable() => {
                    debug!("exchange attempt {attempt}/{tries} on {}: {e}", self.dref);
                },
                Err(e) => return Err(e),
            }
        }
        self.stats_for(class).failures += 1;
        Err(SessionError::NoResponse { tries }.into())
    }

    fn tries_for(&self, class: ExchangeClass) -> u32 {
        match class {
            ExchangeClass::WriteRead => self.config.write_read_tries,
            ExchangeClass::WriteOnly => self.config.write_only_tries,
        }
    }

    fn stats_for(&mut self, class: ExchangeClass) -> &mut ExchangeStats {
        match class {
            ExchangeClass::WriteRead => &mut self.stats.write_read,
            ExchangeClass::WriteOnly => &mut self.stats.write_only,
        }
    }

    // One write-read exchange: request out, turnaround, reply in, decode.
    fn exchange_once(&mut self, request: &[u8], reply_size: usize) -> Result<Vec<u8>> {
        self.pacer.pause(self.config.inter_command_delay);
        let result = self.exchange_io(request, reply_size);
        self.pacer.stamp();
        result
    }

    fn exchange_io(&mut self, request: &[u8], reply_size: usize) -> Result<Vec<u8>> {
        self.transport.write(DDC_SLAVE_ADDR, request)?;
        thread::sleep(self.config.write_read_delay);
        let mut buf = vec![0u8; reply_size];
        self.transport.read(DDC_SLAVE_ADDR, &mut buf, self.config.read_timeout)?;
        Ok(packet::decode_reply(&buf)?.to_vec())
    }

    fn write_only_once(&mut self, request: &[u8], settle: Duration) -> Result<()> {
        self.pacer.pause(self.config.inter_command_delay);
        let result = self.transport.write(DDC_SLAVE_ADDR, request);
        thread::sleep(settle);
        self.pacer.stamp();
        Ok(result?)
    }
}

#[cfg(target_os = "linux")]
impl DisplayHandle<crate::transport::I2cDev> {
    /// Open a session on the display's I2C bus.
    pub fn open(dref: DisplayRef, config: SessionConfig) -> Result<Self> {
        let dev = crate::transport::I2cDev::open(dref.bus())?;
        Self::open_with(dev, dref, config)
    }
}

fn multi_part_retryable(e: &Error) -> bool {
    e.is_retryable() || matches!(e, Error::Protocol(ProtocolError::FragmentOffset { .. }))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::error::TransportError,
        std::{cell::RefCell, collections::VecDeque, rc::Rc},
    };

    #[derive(Debug, Clone, Copy)]
    enum Glitch {
        NotReady,
        BadChecksum,
        Timeout,
    }

    // A scripted monitor: answers DDC/CI requests out of its VCP store,
    // with optional per-read glitches injected first.
    #[derive(Debug, Default)]
    struct MockMonitor {
        vcp: HashMap<u8, (u16, u16)>,
        tables: HashMap<u8, Vec<u8>>,
        caps: Vec<u8>,
        glitches: VecDeque<Glitch>,
        ignore_writes: bool,
        pending: Option<Vec<u8>>,
        writes: usize,
        reads: usize,
    }

    impl MockMonitor {
        fn handle_request(&mut self, payload: &[u8]) {
            use packet::op;
            match payload[0] {
                op::GET_VCP_REQUEST => {
                    let code = payload[1];
                    let reply = match self.vcp.get(&code) {
                        Some(&(current, maximum)) => [
                            op::GET_VCP_REPLY,
                            0x00,
                            code,
                            0x01,
                            (maximum >> 8) as u8,
                            maximum as u8,
                            (current >> 8) as u8,
                            current as u8,
                        ],
                        None => [op::GET_VCP_REPLY, 0x01, code, 0, 0, 0, 0, 0],
                    };
                    self.pending = Some(packet::encode_reply(&reply));
                },
                op::SET_VCP => {
                    if !self.ignore_writes {
                        let code = payload[1];
                        let value = u16::from_be_bytes([payload[2], payload[3]]);
                        let maximum = self.vcp.get(&code).map(|&(_, m)| m).unwrap_or(u16::MAX);
                        self.vcp.insert(code, (value, maximum));
                    }
                },
                op::CAPABILITIES_REQUEST => {
                    let offset = u16::from_be_bytes([payload[1], payload[2]]) as usize;
                    self.pending = Some(self.fragment_reply(op::CAPABILITIES_REPLY, offset, &self.caps.clone()));
                },
                op::TABLE_READ_REQUEST => {
                    let code = payload[1];
                    let offset = u16::from_be_bytes([payload[2], payload[3]]) as usize;
                    let table = self.tables.get(&code).cloned().unwrap_or_default();
                    self.pending = Some(self.fragment_reply(op::TABLE_READ_REPLY, offset, &table));
                },
                op::SAVE_SETTINGS => {},
                other => panic!("mock monitor got unexpected opcode {other:#04x}"),
            }
        }

        fn fragment_reply(&self, reply_op: u8, offset: usize, data: &[u8]) -> Vec<u8> {
            let end = data.len().min(offset + packet::MAX_FRAGMENT_SIZE);
            let fragment = data.get(offset..end).unwrap_or_default();
            let mut payload = vec![reply_op, (offset >> 8) as u8, offset as u8];
            payload.extend_from_slice(fragment);
            packet::encode_reply(&payload)
        }
    }

    // Shared ownership so tests can inspect counters while the handle owns
    // the transport.
    #[derive(Debug, Clone, Default)]
    struct SharedMock(Rc<RefCell<MockMonitor>>);

    impl Transport for SharedMock {
        fn write(&mut self, addr: u16, bytes: &[u8]) -> Result<(), TransportError> {
            assert_eq!(addr, DDC_SLAVE_ADDR);
            let mut mock = self.0.borrow_mut();
            mock.writes += 1;
            let payload = packet::decode_request(bytes).expect("host sent a malformed request").to_vec();
            mock.handle_request(&payload);
            Ok(())
        }

        fn read(&mut self, addr: u16, buf: &mut [u8], timeout: Duration) -> Result<(), TransportError> {
            assert_eq!(addr, DDC_SLAVE_ADDR);
            let mut mock = self.0.borrow_mut();
            mock.reads += 1;
            buf.fill(0);
            match mock.glitches.pop_front() {
                Some(Glitch::NotReady) => {
                    mock.pending = None;
                    buf[..3].copy_from_slice(&[0x6e, 0x80, 0xbe]);
                },
                Some(Glitch::BadChecksum) => {
                    let reply = mock.pending.take().expect("no reply scripted");
                    buf[..reply.len()].copy_from_slice(&reply);
                    buf[reply.len() - 1] ^= 0xff;
                },
                Some(Glitch::Timeout) => {
                    mock.pending = None;
                    return Err(TransportError::Timeout(timeout));
                },
                None => {
                    let reply = mock.pending.take().unwrap_or_else(|| vec![0x6e, 0x80, 0xbe]);
                    buf[..reply.len()].copy_from_slice(&reply);
                },
            }
            Ok(())
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            inter_command_delay: Duration::ZERO,
            write_read_delay: Duration::ZERO,
            post_set_delay: Duration::ZERO,
            retry_delay: Duration::ZERO,
            ..SessionConfig::default()
        }
    }

    fn monitor_with_brightness() -> SharedMock {
        let mock = SharedMock::default();
        mock.0.borrow_mut().vcp.insert(0x10, (40, 100));
        mock
    }

    // Each test opens a distinct bus number: the open registry is process
    // wide and tests run in parallel.

    #[test]
    fn set_then_get_roundtrip() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(101), fast_config()).unwrap();

        handle.set_vcp(0x10, 55).unwrap();
        let value = handle.get_vcp(0x10).unwrap();
        assert_eq!(
            value,
            VcpValue::Continuous {
                current: 55,
                maximum: 100
            }
        );
    }

    #[test]
    fn unreadable_feature_is_rejected_without_traffic() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(102), fast_config()).unwrap();

        let writes_before = mock.0.borrow().writes;
        // 0x01 (degauss) is write-only in the registry.
        match handle.get_vcp(0x01) {
            Err(Error::Validation(ValidationError::UnsupportedFeature(0x01))) => {},
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(mock.0.borrow().writes, writes_before);
    }

    #[test]
    fn display_flagged_unsupported_code() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(103), fast_config()).unwrap();

        // 0x60 is readable per the registry, but this monitor lacks it.
        assert!(matches!(
            handle.get_vcp(0x60),
            Err(Error::Validation(ValidationError::UnsupportedFeature(0x60)))
        ));
        // A hard reply is not a reason to close the handle.
        assert!(handle.is_open());
    }

    #[test]
    fn not_ready_exhaustion_surfaces_no_response_and_closes() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(104), fast_config()).unwrap();

        mock.0.borrow_mut().glitches.extend([Glitch::NotReady; 3]);
        let mut config = fast_config();
        config.write_read_tries = 3;
        handle.config = config;

        match handle.get_vcp(0x10) {
            Err(Error::Session(SessionError::NoResponse { tries: 3 })) => {},
            other => panic!("unexpected {other:?}"),
        }
        assert!(!handle.is_open());
        assert!(matches!(
            handle.get_vcp(0x10),
            Err(Error::Session(SessionError::Closed))
        ));
    }

    #[test]
    fn not_ready_recovery_within_budget() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(105), fast_config()).unwrap();

        mock.0.borrow_mut().glitches.extend([Glitch::NotReady; 3]);
        let mut config = fast_config();
        config.write_read_tries = 5;
        handle.config = config;

        // Succeeds on the fourth attempt.
        let value = handle.get_vcp(0x10).unwrap();
        assert_eq!(value.current(), Some(40));
        assert_eq!(handle.stats().write_read.retries, 3);
        assert_eq!(handle.stats().write_read.failures, 0);
    }

    #[test]
    fn checksum_noise_and_timeouts_are_retried() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(106), fast_config()).unwrap();

        mock.0
            .borrow_mut()
            .glitches
            .extend([Glitch::BadChecksum, Glitch::Timeout]);
        let value = handle.get_vcp(0x10).unwrap();
        assert_eq!(value.current(), Some(40));
    }

    #[test]
    fn second_open_is_rejected_until_close() {
        let mock = monitor_with_brightness();
        let dref = DisplayRef::new(107);
        let mut first = DisplayHandle::open_with(mock.clone(), dref, fast_config()).unwrap();

        match DisplayHandle::open_with(mock.clone(), dref, fast_config()) {
            Err(Error::Session(SessionError::AlreadyOpen(107))) => {},
            other => panic!("unexpected {other:?}"),
        }

        first.close();
        first.close(); // idempotent
        let _reopened = DisplayHandle::open_with(mock.clone(), dref, fast_config()).unwrap();
    }

    #[test]
    fn capabilities_reassembles_fragments() {
        let mock = monitor_with_brightness();
        // 74 bytes: fragments of 32, 32 and 10.
        let caps_string: String = std::iter::repeat("(vcp(10))")
            .take(9)
            .collect::<String>()
            .chars()
            .take(74)
            .collect();
        assert_eq!(caps_string.len(), 74);
        mock.0.borrow_mut().caps = caps_string.clone().into_bytes();

        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(108), fast_config()).unwrap();
        let fetched = handle.get_capabilities_string().unwrap();
        assert_eq!(fetched, caps_string);
    }

    #[test]
    fn capabilities_profile_gates_set_values() {
        let mock = monitor_with_brightness();
        mock.0.borrow_mut().vcp.insert(0x60, (0x0f, 0x11));
        mock.0.borrow_mut().caps = b"(vcp(10 60(0F 10 11)))".to_vec();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(109), fast_config()).unwrap();

        handle.read_capabilities().unwrap();
        let writes_before = mock.0.borrow().writes;
        assert!(matches!(
            handle.set_vcp(0x60, 0x99),
            Err(Error::Validation(ValidationError::OutOfRange {
                feature: 0x60,
                value: 0x99
            }))
        ));
        assert_eq!(mock.0.borrow().writes, writes_before);

        handle.set_vcp(0x60, 0x11).unwrap();
    }

    #[test]
    fn cached_maximum_gates_continuous_set() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(110), fast_config()).unwrap();

        handle.get_vcp(0x10).unwrap();
        assert!(matches!(
            handle.set_vcp(0x10, 150),
            Err(Error::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn verified_set_catches_a_stuck_display() {
        let mock = monitor_with_brightness();
        mock.0.borrow_mut().ignore_writes = true;
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(111), fast_config()).unwrap();

        match handle.set_vcp_with(0x10, 55, true) {
            Err(Error::Validation(ValidationError::VerifyFailed {
                feature: 0x10,
                expected: 55,
                actual: 40,
            })) => {},
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn table_feature_reads_via_multi_part() {
        let mock = monitor_with_brightness();
        let table: Vec<u8> = (0..80).collect();
        mock.0.borrow_mut().tables.insert(0x73, table.clone());
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(112), fast_config()).unwrap();

        // 0x73 (LUT size) is table-kind, so get_vcp takes the fragment path.
        let value = handle.get_vcp(0x73).unwrap();
        assert_eq!(value, VcpValue::Table(table));
    }

    #[test]
    fn save_settings_is_write_only() {
        let mock = monitor_with_brightness();
        let mut handle = DisplayHandle::open_with(mock.clone(), DisplayRef::new(113), fast_config()).unwrap();

        let reads_before = mock.0.borrow().reads;
        handle.save_current_settings().unwrap();
        assert_eq!(mock.0.borrow().reads, reads_before);
    }
}
