//! Forces a running board into its UF2 bootloader over the serial control
//! port.
//!
//! Boards with a UF2 bootloader watch their CDC port: opening it at 1200 baud
//! and toggling DTR makes them reboot into the bootloader, which then exposes
//! the bootloader volume.
use crate::error::{FlashError, Result};
use std::io;
use std::time::Duration;

/// Baud rate that signals a bootloader request.
pub const RESET_BAUD: u32 = 1200;
/// How long DTR stays asserted.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// A control line on an open port.
pub trait ControlLine {
    fn set_dtr(&mut self, level: bool) -> io::Result<()>;
    fn close(&mut self);
}

/// Opens control ports. Injected so resets can be exercised without hardware.
pub trait PortOpener {
    fn open(&self, path: &str, baud: u32) -> io::Result<Box<dyn ControlLine>>;
}

/// [`PortOpener`] backed by the `serialport` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct SerialPortOpener;

struct SerialLine {
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl ControlLine for SerialLine {
    fn set_dtr(&mut self, level: bool) -> io::Result<()> {
        match self.port.as_mut() {
            Some(port) => Ok(port.write_data_terminal_ready(level)?),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "port closed")),
        }
    }

    fn close(&mut self) {
        // Dropping the handle closes the file descriptor.
        self.port = None;
    }
}

impl PortOpener for SerialPortOpener {
    fn open(&self, path: &str, baud: u32) -> io::Result<Box<dyn ControlLine>> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_secs(1))
            .open()?;
        log::info!("Opened control port {} at {} baud", path, baud);
        Ok(Box::new(SerialLine { port: Some(port) }))
    }
}

/// An open control port, closed when dropped.
pub struct SerialResetSession {
    line: Box<dyn ControlLine>,
}

impl SerialResetSession {
    pub fn open(opener: &dyn PortOpener, path: &str, baud: u32) -> io::Result<Self> {
        Ok(Self {
            line: opener.open(path, baud)?,
        })
    }

    /// Asserts DTR, waits `settle`, then deasserts it.
    pub fn pulse_dtr(&mut self, settle: Duration) -> io::Result<()> {
        self.line.set_dtr(true)?;
        std::thread::sleep(settle);
        self.line.set_dtr(false)
    }
}

impl Drop for SerialResetSession {
    fn drop(&mut self) {
        self.line.close();
    }
}

/// Where the resetter is in its (one-shot) life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    BootloaderRequested,
}

/// Drives the Idle → BootloaderRequested transition.
pub struct BoardResetter<'a> {
    opener: &'a dyn PortOpener,
    port: String,
    settle: Duration,
    state: ResetState,
}

impl<'a> BoardResetter<'a> {
    pub fn new(opener: &'a dyn PortOpener, port: impl Into<String>) -> Self {
        Self {
            opener,
            port: port.into(),
            settle: SETTLE_DELAY,
            state: ResetState::Idle,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    /// Requests the bootloader. The port is closed again before returning,
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`FlashError::ResetUnavailable`] if the port cannot be opened
    /// or the control line cannot be driven.
    pub fn request_bootloader(&mut self) -> Result<()> {
        let unavailable = |e: io::Error| FlashError::ResetUnavailable {
            port: self.port.clone(),
            reason: e.to_string(),
        };

        let mut session =
            SerialResetSession::open(self.opener, &self.port, RESET_BAUD).map_err(unavailable)?;
        session.pulse_dtr(self.settle).map_err(unavailable)?;
        drop(session);

        self.state = ResetState::BootloaderRequested;
        log::info!("Requested bootloader on {}", self.port);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum PortEvent {
        Open(String, u32),
        Dtr(bool),
        Close,
    }

    /// Records port traffic; optionally refuses to open or to drive DTR.
    #[derive(Default)]
    pub(crate) struct FakePorts {
        pub events: Rc<RefCell<Vec<PortEvent>>>,
        pub absent: bool,
        pub broken_line: bool,
    }

    impl FakePorts {
        pub fn absent() -> Self {
            Self {
                absent: true,
                ..Default::default()
            }
        }

        pub fn opens(&self) -> usize {
            self.events
                .borrow()
                .iter()
                .filter(|e| matches!(e, PortEvent::Open(..)))
                .count()
        }
    }

    struct FakeLine {
        events: Rc<RefCell<Vec<PortEvent>>>,
        broken: bool,
    }

    impl ControlLine for FakeLine {
        fn set_dtr(&mut self, level: bool) -> io::Result<()> {
            if self.broken {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "line dropped"));
            }
            self.events.borrow_mut().push(PortEvent::Dtr(level));
            Ok(())
        }

        fn close(&mut self) {
            self.events.borrow_mut().push(PortEvent::Close);
        }
    }

    impl PortOpener for FakePorts {
        fn open(&self, path: &str, baud: u32) -> io::Result<Box<dyn ControlLine>> {
            if self.absent {
                return Err(io::Error::new(io::ErrorKind::NotFound, "no such device"));
            }
            self.events
                .borrow_mut()
                .push(PortEvent::Open(path.to_string(), baud));
            Ok(Box::new(FakeLine {
                events: self.events.clone(),
                broken: self.broken_line,
            }))
        }
    }

    #[test]
    fn reset_toggles_dtr_then_closes() {
        let ports = FakePorts::default();
        let mut resetter =
            BoardResetter::new(&ports, "/dev/ttyACM0").with_settle(Duration::from_millis(1));
        assert_eq!(resetter.state(), ResetState::Idle);

        resetter.request_bootloader().unwrap();

        assert_eq!(resetter.state(), ResetState::BootloaderRequested);
        assert_eq!(
            *ports.events.borrow(),
            [
                PortEvent::Open("/dev/ttyACM0".into(), 1200),
                PortEvent::Dtr(true),
                PortEvent::Dtr(false),
                PortEvent::Close,
            ]
        );
    }

    #[test]
    fn absent_board_is_reported_not_found() {
        let ports = FakePorts::absent();
        let mut resetter = BoardResetter::new(&ports, "/dev/ttyACM0");

        let err = resetter.request_bootloader().unwrap_err();
        assert!(err.to_string().starts_with("board not found on /dev/ttyACM0"));
        assert_eq!(resetter.state(), ResetState::Idle);
    }

    #[test]
    fn port_is_closed_when_the_line_fails() {
        let ports = FakePorts {
            broken_line: true,
            ..Default::default()
        };
        let mut resetter = BoardResetter::new(&ports, "/dev/ttyACM0");

        assert!(matches!(
            resetter.request_bootloader(),
            Err(FlashError::ResetUnavailable { .. })
        ));
        assert_eq!(ports.events.borrow().last(), Some(&PortEvent::Close));
        assert_eq!(resetter.state(), ResetState::Idle);
    }
}
