use std::thread;
use std::time::Duration;

use chrono::Local;
use log::Level;

use super::models::{
    parse_position_report, Command, DriverTiming, ExchangeState, Position, Response,
};
use super::sink::{LogEntry, LogSink};
use super::{MoveError, QueryError};
use crate::config::ConnectionSettings;
use crate::serial::{ConnectError, SerialError, SerialInterface, SerialPortIO};

/// Filter wheel protocol driver.
///
/// Every exchange is clear-input, write one frame, wait for one line. The
/// protocol carries no request ids, so taking `&mut self` for each exchange is
/// what keeps two commands from ever being in flight on the same port.
pub struct FilterWheel {
    settings: ConnectionSettings,
    interface: SerialInterface,
    timing: DriverTiming,
    last_exchange: ExchangeState,
    sink: Option<Box<dyn LogSink>>,
}

impl FilterWheel {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_timing(settings, DriverTiming::default())
    }

    pub fn with_timing(settings: ConnectionSettings, timing: DriverTiming) -> Self {
        Self {
            settings,
            interface: SerialInterface::new().with_poll_interval(timing.poll_interval),
            timing,
            last_exchange: ExchangeState::Idle,
            sink: None,
        }
    }

    /// Mirror operator-facing messages into `sink` as well as the `log` facade.
    pub fn set_log_sink(&mut self, sink: Box<dyn LogSink>) {
        self.sink = Some(sink);
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn timing(&self) -> &DriverTiming {
        &self.timing
    }

    /// Open the configured port.
    pub fn connect(&mut self) -> Result<(), ConnectError> {
        let result = self
            .interface
            .connect(&self.settings.port, self.settings.baud_rate);
        match &result {
            Ok(()) => self.note(Level::Info, format!("Connected to {}", self.settings.port)),
            Err(e) => self.note(Level::Error, format!("Could not connect: {}", e)),
        }
        result
    }

    /// Run the protocol over an already-open channel instead of the configured port.
    pub fn connect_with(&mut self, io: Box<dyn SerialPortIO>) -> Result<(), ConnectError> {
        let port = self.settings.port.clone();
        self.interface.attach(port, io)?;
        self.note(Level::Info, format!("Connected to {}", self.settings.port));
        Ok(())
    }

    /// Idempotent; closing an already-closed wheel is not an error.
    pub fn disconnect(&mut self) {
        if self.interface.disconnect() {
            self.note(Level::Info, "Disconnected".to_string());
        }
        self.last_exchange = ExchangeState::Idle;
    }

    pub fn is_connected(&self) -> bool {
        self.interface.is_connected()
    }

    pub fn last_exchange(&self) -> ExchangeState {
        self.last_exchange
    }

    /// Rotate the wheel to `position` and wait for the controller to confirm.
    ///
    /// Out-of-range slots are rejected before anything is written. After the
    /// acknowledgement the call blocks for the settling delay.
    pub fn move_to(&mut self, position: i32) -> Result<(), MoveError> {
        if !self.interface.is_connected() {
            return Err(MoveError::NotConnected);
        }
        let target = Position::new(position).ok_or_else(|| {
            self.note(Level::Error, format!("Rejected move to slot {}", position));
            MoveError::OutOfRange(position)
        })?;

        let timeout = self.timing.move_timeout;
        let reply = self.exchange(Command::Move(target), timeout)?;
        let Some(line) = reply else {
            self.last_exchange = ExchangeState::TimedOut;
            self.note(
                Level::Warn,
                format!("No acknowledgement for slot {} within {:?}", target, timeout),
            );
            return Err(MoveError::Timeout(timeout));
        };

        match Response::classify(&line) {
            Response::Acknowledgement => {
                self.last_exchange = ExchangeState::Parsed;
                if !self.timing.settle_delay.is_zero() {
                    log::trace!("Settling for {:?}", self.timing.settle_delay);
                    thread::sleep(self.timing.settle_delay);
                }
                self.note(Level::Info, format!("Moved to slot {}", target));
                Ok(())
            }
            _ => {
                self.last_exchange = ExchangeState::Unrecognized;
                self.note(Level::Warn, format!("Unexpected reply to move: {:?}", line));
                Err(MoveError::UnexpectedResponse(line))
            }
        }
    }

    /// Ask the controller which slot is currently seated.
    pub fn current_position(&mut self) -> Result<i32, QueryError> {
        if !self.interface.is_connected() {
            return Err(QueryError::NotConnected);
        }

        let timeout = self.timing.query_timeout;
        let Some(line) = self.exchange(Command::QueryPosition, timeout)? else {
            self.last_exchange = ExchangeState::TimedOut;
            self.note(Level::Warn, format!("No position report within {:?}", timeout));
            return Err(QueryError::Timeout(timeout));
        };

        match parse_position_report(&line) {
            Some(position) => {
                self.last_exchange = ExchangeState::Parsed;
                log::debug!("Current position is {}", position);
                Ok(position)
            }
            None => {
                self.last_exchange = ExchangeState::Unrecognized;
                self.note(Level::Warn, format!("Could not read a slot from {:?}", line));
                Err(QueryError::MalformedResponse(line))
            }
        }
    }

    /// Clear, send, await. Leaves interpretation of the line to the caller.
    ///
    /// A channel error ends the exchange in [`ExchangeState::Failed`].
    fn exchange(
        &mut self,
        command: Command,
        timeout: Duration,
    ) -> Result<Option<String>, SerialError> {
        self.last_exchange = ExchangeState::Sending;
        log::trace!("{:?} -> {:?}", ExchangeState::Idle, self.last_exchange);

        let result = self.send_and_await(command, timeout);
        if let Err(e) = &result {
            log::trace!("{:?} -> {:?}: {}", self.last_exchange, ExchangeState::Failed, e);
            self.last_exchange = ExchangeState::Failed;
        }
        result
    }

    fn send_and_await(
        &mut self,
        command: Command,
        timeout: Duration,
    ) -> Result<Option<String>, SerialError> {
        self.interface.clear_input()?;
        log::debug!("Sending: {}", command);
        self.interface.write_line(command.encode().as_bytes())?;

        self.last_exchange = ExchangeState::AwaitingResponse;
        log::trace!("{:?} -> {:?}", ExchangeState::Sending, self.last_exchange);
        self.interface.read_line_with_timeout(timeout)
    }

    fn note(&mut self, level: Level, message: String) {
        log::log!(level, "{}", message);
        if let Some(sink) = self.sink.as_mut() {
            sink.append(LogEntry { timestamp: Local::now(), level, message });
        }
    }
}
