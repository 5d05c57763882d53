//! STK500 command interpreter
//!
//! The interpreter owns the target (bus and reset line) and all per-session
//! protocol state: device parameters, memory cursor, page buffer and error
//! counter. Each call to [`Interpreter::serve`] reads at most one framed
//! request, executes it and writes the framed reply.
//!
//! Page data is parsed into a staging buffer and only becomes the page
//! buffer once the request is known to be well framed.

use embedded_io::{ErrorKind, Read, ReadExactError, ReadReady, Write};

use crate::error::{Error, Result};
use crate::isp::{self, Fuse};
use crate::memory::{IspTarget, PageBuffer, Timing, WriteReport};
use crate::programmer::{IspBus, ResetLine};
use crate::stk500::frame::{MAX_BODY, SEQ_HEADER_LEN};
use crate::stk500::protocol::*;
use crate::stk500::{
    ByteSource, Command, DeviceCaps, DeviceParameters, ExtendedParameters, Framing, Memory,
    ProgrammerParameters, Reply, SliceSource, Status,
};

/// Construction-time interpreter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterpreterConfig {
    /// Request framing spoken by clients
    pub framing: Framing,
    /// Programming delays and polling bounds
    pub timing: Timing,
    /// Reply FAILED instead of OK when a write poll times out
    pub strict_polling: bool,
    /// Keep the target in reset while no programming session is active
    pub hold_reset_when_idle: bool,
}

/// STK500 interpreter over an owned bus and reset line
pub struct Interpreter<B, R> {
    target: IspTarget<B>,
    reset: R,
    config: InterpreterConfig,
    device: Option<DeviceParameters>,
    extended: Option<ExtendedParameters>,
    params: ProgrammerParameters,
    cursor: Option<u32>,
    buffer: PageBuffer,
    staging: PageBuffer,
    errors: u32,
    pmode: bool,
}

impl<B: IspBus, R: ResetLine> Interpreter<B, R> {
    /// Create an interpreter and drive the reset line to its idle level
    pub fn new(bus: B, mut reset: R, config: InterpreterConfig) -> Result<Self> {
        reset.set_level(config.hold_reset_when_idle)?;
        Ok(Self {
            target: IspTarget::new(bus, config.timing),
            reset,
            config,
            device: None,
            extended: None,
            params: ProgrammerParameters::default(),
            cursor: None,
            buffer: PageBuffer::new(),
            staging: PageBuffer::new(),
            errors: 0,
            pmode: false,
        })
    }

    /// Get a reference to the bus
    pub fn bus(&self) -> &B {
        self.target.bus()
    }

    /// Get a mutable reference to the bus
    pub fn bus_mut(&mut self) -> &mut B {
        self.target.bus_mut()
    }

    /// Get a reference to the reset line
    pub fn reset(&self) -> &R {
        &self.reset
    }

    /// Interpreter settings
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Protocol and verification errors in the current session
    pub fn error_count(&self) -> u32 {
        self.errors
    }

    /// Whether programming mode is entered (bus claimed)
    pub fn in_progmode(&self) -> bool {
        self.pmode
    }

    /// Device parameters from the last successful set device
    pub fn device(&self) -> Option<&DeviceParameters> {
        self.device.as_ref()
    }

    /// Extended parameters from the last set device ext
    pub fn extended(&self) -> Option<&ExtendedParameters> {
        self.extended.as_ref()
    }

    /// Current memory cursor (word address)
    pub fn cursor(&self) -> Option<u32> {
        self.cursor
    }

    /// Contents of the page buffer
    pub fn page_buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    /// Start a new session with fresh protocol state
    pub fn begin_session(&mut self) {
        self.device = None;
        self.extended = None;
        self.params = ProgrammerParameters::default();
        self.cursor = None;
        self.buffer.clear();
        self.staging.clear();
        self.errors = 0;
    }

    /// Tear down the session: leave programming mode and forget state
    pub fn end_session(&mut self) {
        if self.pmode {
            log::info!("stk500: session ended in programming mode, releasing target");
        }
        self.release_target();
        self.device = None;
        self.extended = None;
        self.cursor = None;
        self.buffer.clear();
        self.staging.clear();
    }

    /// Serve at most one request from `session`
    ///
    /// Returns `Ok(false)` without blocking when no data is waiting. Framing
    /// errors and client timeouts inside a frame are answered and counted;
    /// only transport failures are returned as errors.
    pub fn serve<S>(&mut self, session: &mut S) -> Result<bool>
    where
        S: Read + Write + ReadReady,
    {
        if !session.read_ready().map_err(io_error)? {
            return Ok(false);
        }
        match self.config.framing {
            Framing::Classic => self.serve_classic(session)?,
            Framing::Sequenced => self.serve_sequenced(session)?,
        }
        Ok(true)
    }

    fn serve_classic<S>(&mut self, session: &mut S) -> Result<()>
    where
        S: Read + Write + ReadReady,
    {
        let cmd = read_byte(session)?;
        if cmd == CRC_EOP {
            // Client is resynchronizing
            self.errors += 1;
            return self.send(session, Reply::status(Status::NoSync), None);
        }

        let parsed = {
            let mut src = StreamSource {
                session: &mut *session,
            };
            Command::parse(cmd, &mut src, &mut self.staging)
                .and_then(|command| Ok((command, src.next_byte()?)))
        };
        match parsed {
            Ok((command, CRC_EOP)) => {
                let reply = self.accept(command);
                self.send(session, reply, None)
            }
            Ok((command, eop)) => {
                log::debug!("stk500: {:?} terminated by 0x{:02X}", command, eop);
                self.framing_error(session, None)
            }
            Err(Error::Timeout) => {
                log::debug!("stk500: timed out inside command 0x{:02X}", cmd);
                self.framing_error(session, None)
            }
            Err(e) => Err(e),
        }
    }

    fn serve_sequenced<S>(&mut self, session: &mut S) -> Result<()>
    where
        S: Read + Write + ReadReady,
    {
        if read_byte(session)? != MESSAGE_START {
            return self.framing_error(session, None);
        }
        let mut header = [0u8; SEQ_HEADER_LEN];
        match read_exact(session, &mut header) {
            Ok(()) => {}
            Err(Error::Timeout) => return self.framing_error(session, None),
            Err(e) => return Err(e),
        }
        let seq = header[0];
        let len = u16::from_be_bytes([header[1], header[2]]) as usize;

        if len > MAX_BODY {
            log::warn!("stk500: body of {} bytes exceeds {}", len, MAX_BODY);
            let mut src = StreamSource {
                session: &mut *session,
            };
            match src.skip(len + 1) {
                Ok(()) | Err(Error::Timeout) => {}
                Err(e) => return Err(e),
            }
            self.errors += 1;
            return self.send(session, Reply::status(Status::Failed), Some(seq));
        }

        let mut body = [0u8; MAX_BODY];
        let mut eop = [0u8; 1];
        match read_exact(session, &mut body[..len]).and_then(|()| read_exact(session, &mut eop)) {
            Ok(()) => {}
            Err(Error::Timeout) => return self.framing_error(session, Some(seq)),
            Err(e) => return Err(e),
        }
        if eop[0] != CRC_EOP || len == 0 {
            return self.framing_error(session, Some(seq));
        }

        let mut src = SliceSource::new(&body[1..len]);
        match Command::parse(body[0], &mut src, &mut self.staging) {
            Ok(command) if src.remaining() == Some(0) => {
                let reply = self.accept(command);
                self.send(session, reply, Some(seq))
            }
            Ok(_) | Err(Error::Truncated) => {
                self.errors += 1;
                self.send(session, Reply::status(Status::NoSync), Some(seq))
            }
            Err(e) => Err(e),
        }
    }

    /// Count the error, discard pending input and reply NOSYNC
    fn framing_error<S>(&mut self, session: &mut S, seq: Option<u8>) -> Result<()>
    where
        S: Read + Write + ReadReady,
    {
        self.errors += 1;
        let dropped = drain(session)?;
        if dropped > 0 {
            log::debug!("stk500: discarded {} bytes to resync", dropped);
        }
        self.send(session, Reply::status(Status::NoSync), seq)
    }

    fn send<S: Write>(&mut self, session: &mut S, reply: Reply, seq: Option<u8>) -> Result<()> {
        let frame = reply.encode(self.config.framing, seq);
        session.write_all(&frame).map_err(io_error)?;
        session.flush().map_err(io_error)
    }

    /// Execute a well-framed request, taking over its staged page data
    fn accept(&mut self, command: Command) -> Reply {
        if matches!(command, Command::ProgPage { .. }) {
            core::mem::swap(&mut self.buffer, &mut self.staging);
        }
        self.execute(command)
    }

    /// Execute a parsed command and produce its reply
    pub fn execute(&mut self, command: Command) -> Reply {
        log::debug!("stk500: {:?}", command);
        let result = if command.needs_target() && !self.pmode {
            Err(Error::NotInProgMode)
        } else {
            self.dispatch(command)
        };
        match result {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("stk500: {:?} failed: {}", command, e);
                self.errors += 1;
                Reply::status(match e {
                    Error::NoDevice | Error::NotInProgMode => Status::NoDevice,
                    _ => Status::Failed,
                })
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::GetSync => Reply::empty(),
            Command::GetSignOn => Reply::from_slice(SIGN_ON),
            Command::SetParameter { id, value } => {
                if !self.params.set(id, value) {
                    return Err(Error::InvalidParameter);
                }
                Reply::empty()
            }
            Command::GetParameter(id) => Reply::byte(self.parameter(id)),
            Command::SetDevice(raw) => {
                let device = DeviceParameters::parse(&raw)?;
                log::info!(
                    "stk500: device 0x{:02X}: flash {} bytes, page {} bytes, eeprom {} bytes",
                    device.device_code,
                    device.flash_size,
                    device.page_size,
                    device.eeprom_size
                );
                self.device = Some(device);
                Reply::empty()
            }
            Command::SetDeviceExt(ext) => {
                log::debug!("stk500: extended parameters {:?}", ext);
                self.extended = Some(ext);
                Reply::empty()
            }
            Command::EnterProgmode => {
                self.enter_progmode()?;
                Reply::empty()
            }
            Command::LeaveProgmode => {
                self.release_target();
                log::info!("stk500: left programming mode");
                Reply::empty()
            }
            Command::ChipErase => {
                self.target.chip_erase()?;
                Reply::empty()
            }
            Command::LoadAddress(addr) => {
                self.cursor = Some(addr);
                Reply::empty()
            }
            Command::Universal(bytes) => Reply::byte(isp::command(self.target.bus_mut(), bytes)?),
            Command::ProgFlash { low, high } => {
                let (device, here) = (self.require_device()?, self.require_cursor()?);
                let next = advance(here, 1)?;
                let report = self.target.write_flash(&device, here, &[low, high])?;
                self.cursor = Some(next);
                self.finish_write(report)
            }
            Command::ProgData(value) => {
                let (device, here) = (self.require_device()?, self.require_cursor()?);
                let report = self.target.write_eeprom(&device, eeprom_address(here)?, &[value])?;
                self.finish_write(report)
            }
            Command::ProgFuse { low, high } => {
                self.write_fuses(&[(Fuse::Low, low), (Fuse::High, high)])?;
                Reply::empty()
            }
            Command::ProgLock(value) => {
                isp::write_lock(self.target.bus_mut(), value)?;
                self.fuse_delay();
                Reply::empty()
            }
            Command::ProgPage { memory, len } => self.program_page(memory, len)?,
            Command::ProgFuseExt { low, high, ext } => {
                self.write_fuses(&[(Fuse::Low, low), (Fuse::High, high), (Fuse::Extended, ext)])?;
                Reply::empty()
            }
            Command::ReadFlash => {
                let here = self.require_cursor()?;
                let next = advance(here, 1)?;
                let mut word = [0u8; 2];
                self.target.read_flash(self.device.as_ref(), here, &mut word)?;
                self.cursor = Some(next);
                Reply::from_slice(&word)
            }
            Command::ReadData => {
                let here = self.require_cursor()?;
                let mut byte = [0u8; 1];
                self.target
                    .read_eeprom(self.device.as_ref(), eeprom_address(here)?, &mut byte)?;
                Reply::from_slice(&byte)
            }
            Command::ReadFuse => {
                let bus = self.target.bus_mut();
                Reply::from_slice(&[isp::read_fuse(bus, Fuse::Low)?, isp::read_fuse(bus, Fuse::High)?])
            }
            Command::ReadLock => Reply::byte(isp::read_lock(self.target.bus_mut())?),
            Command::ReadPage { memory, len } => self.read_page(memory, len)?,
            Command::ReadSign => Reply::from_slice(&isp::read_signature(self.target.bus_mut())?),
            Command::ReadOscCal => Reply::byte(isp::read_calibration(self.target.bus_mut())?),
            Command::ReadFuseExt => {
                let bus = self.target.bus_mut();
                Reply::from_slice(&[
                    isp::read_fuse(bus, Fuse::Low)?,
                    isp::read_fuse(bus, Fuse::High)?,
                    isp::read_fuse(bus, Fuse::Extended)?,
                ])
            }
            Command::Oversized(len) => {
                log::warn!("stk500: page length {} exceeds buffer", len);
                return Err(Error::Oversized);
            }
            Command::Unknown(cmd) => {
                log::warn!("stk500: unknown command 0x{:02X}", cmd);
                self.errors += 1;
                Reply::status(Status::Unknown)
            }
        };
        Ok(reply)
    }

    fn parameter(&self, id: u8) -> u8 {
        let cap = |flag: DeviceCaps| {
            self.device
                .map(|d| d.caps.contains(flag) as u8)
                .unwrap_or(0)
        };
        match id {
            PARM_HW_VER => HW_VERSION,
            PARM_SW_MAJOR => SW_MAJOR,
            PARM_SW_MINOR => SW_MINOR,
            PARM_PROGMODE => PROGMODE_SERIAL,
            PARM_DEVICE => self.device.map(|d| d.device_code).unwrap_or(0),
            PARM_PARAMODE => cap(DeviceCaps::PARALLEL),
            PARM_POLLING => cap(DeviceCaps::POLLING),
            PARM_SELFTIMED => cap(DeviceCaps::SELF_TIMED),
            PARM_ERROR_COUNT => self.errors.min(u8::MAX as u32) as u8,
            other => self.params.get(other).unwrap_or(0),
        }
    }

    fn require_device(&self) -> Result<DeviceParameters> {
        self.device.ok_or(Error::NoDeviceParameters)
    }

    fn require_cursor(&self) -> Result<u32> {
        self.cursor.ok_or(Error::NoAddress)
    }

    fn program_page(&mut self, memory: Option<Memory>, len: usize) -> Result<Reply> {
        let memory = memory.ok_or(Error::InvalidMemoryType)?;
        let (device, here) = (self.require_device()?, self.require_cursor()?);
        let data = self.buffer.as_slice().get(..len).ok_or(Error::Truncated)?;
        let report = match memory {
            Memory::Flash => {
                let next = advance(here, len.div_ceil(2))?;
                let report = self.target.write_flash(&device, here, data)?;
                self.cursor = Some(next);
                report
            }
            Memory::Eeprom => self.target.write_eeprom(&device, eeprom_address(here)?, data)?,
        };
        Ok(self.finish_write(report))
    }

    fn read_page(&mut self, memory: Option<Memory>, len: usize) -> Result<Reply> {
        let memory = memory.ok_or(Error::InvalidMemoryType)?;
        let here = self.require_cursor()?;
        let out = self.buffer.stage(len)?;
        match memory {
            Memory::Flash => {
                let next = advance(here, len.div_ceil(2))?;
                self.target.read_flash(self.device.as_ref(), here, out)?;
                self.cursor = Some(next);
            }
            Memory::Eeprom => {
                let start = eeprom_address(here)?;
                self.target.read_eeprom(self.device.as_ref(), start, out)?;
            }
        }
        Ok(Reply::from_slice(self.buffer.as_slice()))
    }

    /// Count poll timeouts and pick the reply for a completed write
    fn finish_write(&mut self, report: WriteReport) -> Reply {
        if !report.timed_out() {
            return Reply::empty();
        }
        self.errors += report.timeouts;
        log::warn!("stk500: {} write poll(s) timed out", report.timeouts);
        if self.config.strict_polling {
            Reply::status(Status::Failed)
        } else {
            Reply::empty()
        }
    }

    fn write_fuses(&mut self, fuses: &[(Fuse, u8)]) -> Result<()> {
        for &(fuse, value) in fuses {
            isp::write_fuse(self.target.bus_mut(), fuse, value)?;
            self.fuse_delay();
        }
        Ok(())
    }

    fn fuse_delay(&mut self) {
        let us = self.target.timing().flash_write_delay_us;
        self.target.delay_us(us);
    }

    /// Claim the bus, reset the target and issue Programming Enable
    fn enter_progmode(&mut self) -> Result<()> {
        let result = self.try_enable();
        if result.is_err() {
            self.release_target();
        }
        result
    }

    fn try_enable(&mut self) -> Result<()> {
        let timing = *self.target.timing();
        self.target.bus_mut().claim()?;
        self.target.reset_segment();

        // Clock one byte so SCK starts low and the target sees a clean edge
        self.target.bus_mut().transfer(0x00)?;
        self.pulse_reset(timing.reset_pulse_us)?;
        self.target.delay_us(timing.reset_settle_us);

        for attempt in 1..=timing.enable_attempts {
            let echo = isp::program_enable(self.target.bus_mut())?;
            if echo == isp::opcodes::PROG_ENABLE {
                log::info!("stk500: entered programming mode (attempt {})", attempt);
                self.pmode = true;
                return Ok(());
            }
            log::debug!("stk500: enable attempt {} echoed 0x{:02X}", attempt, echo);
            self.pulse_reset(timing.reset_pulse_us)?;
            self.target.delay_us(timing.enable_retry_settle_us);
        }
        log::warn!(
            "stk500: target did not answer Programming Enable after {} attempts",
            timing.enable_attempts
        );
        Err(Error::NoDevice)
    }

    /// Deassert reset for `us`, then assert it again
    fn pulse_reset(&mut self, us: u32) -> Result<()> {
        self.reset.set_level(false)?;
        self.target.delay_us(us);
        self.reset.set_level(true)
    }

    /// Release the bus and return reset to its idle level
    fn release_target(&mut self) {
        self.target.bus_mut().release();
        if let Err(e) = self.reset.set_level(self.config.hold_reset_when_idle) {
            log::error!("stk500: failed to restore reset line: {}", e);
        }
        self.pmode = false;
    }
}

/// EEPROM byte address of the word cursor
fn eeprom_address(here: u32) -> Result<u32> {
    here.checked_mul(2).ok_or(Error::AddressOutOfBounds)
}

/// Cursor after `words` flash words
fn advance(here: u32, words: usize) -> Result<u32> {
    u32::try_from(words)
        .ok()
        .and_then(|w| here.checked_add(w))
        .ok_or(Error::AddressOutOfBounds)
}

/// Client stream as a byte source for classic framing
struct StreamSource<'a, S> {
    session: &'a mut S,
}

impl<S: Read> ByteSource for StreamSource<'_, S> {
    fn next_byte(&mut self) -> Result<u8> {
        read_byte(self.session)
    }

    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        read_exact(self.session, buf)
    }
}

fn read_byte<S: Read>(session: &mut S) -> Result<u8> {
    let mut b = [0u8; 1];
    read_exact(session, &mut b)?;
    Ok(b[0])
}

fn read_exact<S: Read>(session: &mut S, buf: &mut [u8]) -> Result<()> {
    session.read_exact(buf).map_err(|e| match e {
        ReadExactError::UnexpectedEof => Error::Disconnected,
        ReadExactError::Other(e) => io_error(e),
    })
}

/// Discard whatever the client has already sent
fn drain<S: Read + ReadReady>(session: &mut S) -> Result<usize> {
    let mut scratch = [0u8; 64];
    let mut total = 0;
    while session.read_ready().map_err(io_error)? {
        let n = session.read(&mut scratch).map_err(io_error)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

fn io_error<E: embedded_io::Error>(e: E) -> Error {
    match e.kind() {
        ErrorKind::TimedOut => Error::Timeout,
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe => Error::Disconnected,
        _ => Error::Network,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::vec::Vec;

    /// Bus that answers Programming Enable and returns 0 otherwise
    #[derive(Default)]
    struct AckBus {
        sync_pending: bool,
        pending: Vec<u8>,
        instructions: Vec<[u8; 4]>,
    }

    impl IspBus for AckBus {
        fn transfer(&mut self, byte: u8) -> Result<u8> {
            if self.sync_pending {
                self.sync_pending = false;
                return Ok(0);
            }
            self.pending.push(byte);
            let answer = match self.pending.as_slice() {
                [0xAC, 0x53, _] => 0x53,
                _ => 0,
            };
            if let [a, b, c, d] = self.pending[..] {
                self.instructions.push([a, b, c, d]);
                self.pending.clear();
            }
            Ok(answer)
        }

        fn delay_us(&mut self, _us: u32) {}

        fn claim(&mut self) -> Result<()> {
            self.sync_pending = true;
            self.pending.clear();
            Ok(())
        }
    }

    #[derive(Default)]
    struct Levels(Vec<bool>);

    impl ResetLine for Levels {
        fn set_level(&mut self, active: bool) -> Result<()> {
            self.0.push(active);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemSession {
        input: VecDeque<u8>,
        output: Vec<u8>,
    }

    impl embedded_io::ErrorType for MemSession {
        type Error = ErrorKind;
    }

    impl Read for MemSession {
        fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, ErrorKind> {
            if self.input.is_empty() {
                return Err(ErrorKind::TimedOut);
            }
            let mut n = 0;
            while n < buf.len() {
                match self.input.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    impl ReadReady for MemSession {
        fn read_ready(&mut self) -> core::result::Result<bool, ErrorKind> {
            Ok(!self.input.is_empty())
        }
    }

    impl Write for MemSession {
        fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, ErrorKind> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> core::result::Result<(), ErrorKind> {
            Ok(())
        }
    }

    fn interpreter(framing: Framing) -> Interpreter<AckBus, Levels> {
        let config = InterpreterConfig {
            framing,
            ..Default::default()
        };
        Interpreter::new(AckBus::default(), Levels::default(), config).unwrap()
    }

    fn exchange(interp: &mut Interpreter<AckBus, Levels>, request: &[u8]) -> Vec<u8> {
        let mut session = MemSession::default();
        session.input.extend(request.iter().copied());
        while interp.serve(&mut session).unwrap() {}
        session.output
    }

    #[test]
    fn test_classic_sync_and_sign_on() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(exchange(&mut interp, &[0x30, 0x20]), [0x14, 0x10]);
        assert_eq!(exchange(&mut interp, &[0x31, 0x20]), b"\x14AVR ISP\x10");
        assert_eq!(exchange(&mut interp, &[0x41, 0x81, 0x20]), [0x14, 0x01, 0x10]);
        assert_eq!(exchange(&mut interp, &[0x41, 0x93, 0x20]), [0x14, b'S', 0x10]);
        assert_eq!(interp.error_count(), 0);
    }

    #[test]
    fn test_classic_bad_terminator_has_no_effect() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(exchange(&mut interp, &[0x55, 0x10, 0x00, 0x21, 0x99]), [0x15]);
        assert_eq!(interp.cursor(), None);
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_classic_space_as_command() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(exchange(&mut interp, &[0x20]), [0x15]);
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_classic_unknown_command() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(exchange(&mut interp, &[0xEE, 0x20]), [0x12]);
        assert_eq!(exchange(&mut interp, &[0xEE, 0x00]), [0x15]);
        assert_eq!(interp.error_count(), 2);
    }

    #[test]
    fn test_bus_commands_need_progmode() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(exchange(&mut interp, &[0x75, 0x20]), [0x14, 0x13]);
        assert!(interp.bus().instructions.is_empty());
        assert_eq!(exchange(&mut interp, &[0x50, 0x20]), [0x14, 0x10]);
        assert!(interp.in_progmode());
        assert_eq!(exchange(&mut interp, &[0x51, 0x20]), [0x14, 0x10]);
        assert!(!interp.in_progmode());
        // idle, then pulse deassert/assert, then idle again
        assert_eq!(interp.reset().0, [false, false, true, false]);
    }

    #[test]
    fn test_sequenced_echoes_sequence_number() {
        let mut interp = interpreter(Framing::Sequenced);
        assert_eq!(
            exchange(&mut interp, &[0x1B, 0x42, 0x00, 0x01, 0x30, 0x20]),
            [0x42, 0x14, 0x10]
        );
        assert_eq!(
            exchange(&mut interp, &[0x1B, 0x07, 0x00, 0x02, 0x41, 0x80, 0x20]),
            [0x07, 0x14, 0x02, 0x10]
        );
    }

    #[test]
    fn test_sequenced_bad_terminator() {
        let mut interp = interpreter(Framing::Sequenced);
        let reply = exchange(&mut interp, &[0x1B, 0x05, 0x00, 0x03, 0x55, 0x00, 0x01, 0x00]);
        assert_eq!(reply, [0x05, 0x15]);
        assert_eq!(interp.cursor(), None);
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_sequenced_bad_start_byte() {
        let mut interp = interpreter(Framing::Sequenced);
        assert_eq!(exchange(&mut interp, &[0x30, 0x20]), [0x15]);
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_sequenced_oversized_body() {
        let mut interp = interpreter(Framing::Sequenced);
        let mut request = std::vec![0x1B, 0x09, 0x01, 0x2C];
        request.extend(core::iter::repeat(0xAA).take(300));
        request.push(0x20);
        request.extend([0x1B, 0x0A, 0x00, 0x01, 0x30, 0x20]);
        assert_eq!(exchange(&mut interp, &request), [0x09, 0x11, 0x0A, 0x14, 0x10]);
        assert_eq!(interp.error_count(), 1);
    }

    #[test]
    fn test_classic_bad_terminator_keeps_page_buffer() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(
            exchange(&mut interp, &[0x64, 0x00, 0x02, b'F', 0x01, 0x02, 0x20]),
            [0x14, 0x13]
        );
        assert_eq!(interp.page_buffer().as_slice(), [0x01, 0x02]);
        assert_eq!(
            exchange(&mut interp, &[0x64, 0x00, 0x02, b'F', 0x0A, 0x0B, 0x21]),
            [0x15]
        );
        assert_eq!(interp.page_buffer().as_slice(), [0x01, 0x02]);
    }

    #[test]
    fn test_cursor_at_top_of_address_space() {
        let mut interp = interpreter(Framing::Sequenced);
        assert_eq!(exchange(&mut interp, &[0x1B, 0x01, 0x00, 0x01, 0x50, 0x20]), [0x01, 0x14, 0x10]);
        assert_eq!(
            exchange(&mut interp, &[0x1B, 0x02, 0x00, 0x05, 0x55, 0x7F, 0xFF, 0xFF, 0xFF, 0x20]),
            [0x02, 0x14, 0x10]
        );
        assert_eq!(interp.cursor(), Some(0x7FFF_FFFF));
        let before = interp.bus().instructions.len();
        assert_eq!(exchange(&mut interp, &[0x1B, 0x03, 0x00, 0x01, 0x70, 0x20]), [0x03, 0x11]);
        assert_eq!(exchange(&mut interp, &[0x1B, 0x04, 0x00, 0x01, 0x71, 0x20]), [0x04, 0x11]);
        assert_eq!(interp.bus().instructions.len(), before);
        assert_eq!(interp.cursor(), Some(0x7FFF_FFFF));
        assert_eq!(interp.error_count(), 2);
    }

    #[test]
    fn test_cursor_arithmetic_does_not_wrap() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(interp.execute(Command::EnterProgmode), Reply::empty());
        interp.execute(Command::LoadAddress(u32::MAX));
        let failed = Reply::status(Status::Failed);
        assert_eq!(interp.execute(Command::ReadData), failed);
        assert_eq!(interp.execute(Command::ReadFlash), failed);
        assert_eq!(
            interp.execute(Command::ReadPage {
                memory: Some(Memory::Eeprom),
                len: 4
            }),
            failed
        );
        assert_eq!(interp.cursor(), Some(u32::MAX));
        assert_eq!(interp.error_count(), 3);
    }

    #[test]
    fn test_outside_progmode_counts_error() {
        let mut interp = interpreter(Framing::Classic);
        assert_eq!(interp.execute(Command::ReadSign), Reply::status(Status::NoDevice));
        assert_eq!(interp.execute(Command::ChipErase), Reply::status(Status::NoDevice));
        assert_eq!(interp.error_count(), 2);
        assert!(interp.bus().instructions.is_empty());
    }

    #[test]
    fn test_error_count_parameter() {
        let mut interp = interpreter(Framing::Classic);
        exchange(&mut interp, &[0x20]);
        exchange(&mut interp, &[0x20]);
        assert_eq!(exchange(&mut interp, &[0x41, 0xA0, 0x20]), [0x14, 0x02, 0x10]);
    }
}
