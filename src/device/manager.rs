use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::{ConnectionState, DeviceError, FilterWheel, MoveError, Position, Result, WheelStatus};
use crate::serial::SerialPortIO;

/// Async front for a single [`FilterWheel`].
///
/// Driver calls block, so each one runs on the blocking pool with the wheel
/// lock held for the whole exchange. Concurrent callers queue on the lock;
/// there is never more than one command on the wire.
pub struct DeviceManager {
    wheel: Arc<Mutex<FilterWheel>>,
    status: Arc<RwLock<WheelStatus>>,
}

impl DeviceManager {
    pub fn new(wheel: FilterWheel) -> Self {
        let status = WheelStatus::new(wheel.settings().port.clone());
        Self {
            wheel: Arc::new(Mutex::new(wheel)),
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// Snapshot of the last known state; does not touch the hardware.
    pub async fn status(&self) -> WheelStatus {
        self.status.read().await.clone()
    }

    pub async fn connect(&self) -> Result<()> {
        let result = self.run(|wheel| wheel.connect().map_err(DeviceError::from)).await;
        self.record_connection(&result).await;
        result
    }

    /// Connect over an already-open channel (simulators, bridges).
    pub async fn connect_with(&self, io: Box<dyn SerialPortIO>) -> Result<()> {
        let result = self
            .run(move |wheel| wheel.connect_with(io).map_err(DeviceError::from))
            .await;
        self.record_connection(&result).await;
        result
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.run(|wheel| {
            wheel.disconnect();
            Ok(())
        })
        .await?;

        let mut status = self.status.write().await;
        status.update_connection_state(ConnectionState::Disconnected);
        status.last_position = None;
        Ok(())
    }

    pub async fn move_to(&self, position: i32) -> Result<()> {
        let result = self
            .run(move |wheel| wheel.move_to(position).map_err(DeviceError::from))
            .await;

        let mut status = self.status.write().await;
        match &result {
            Ok(()) => status.record_position(Position::new(position)),
            Err(e) => {
                log::error!("Move to slot {} failed: {}", position, e);
                // Once a frame went out the wheel may be anywhere.
                if !matches!(
                    e,
                    DeviceError::Move(MoveError::NotConnected | MoveError::OutOfRange(_))
                ) {
                    status.last_position = None;
                }
                status.record_error(e.to_string());
            }
        }
        result
    }

    pub async fn current_position(&self) -> Result<i32> {
        let result = self.run(|wheel| wheel.current_position().map_err(DeviceError::from)).await;

        let mut status = self.status.write().await;
        match &result {
            Ok(position) => status.record_position(Position::new(*position)),
            Err(e) => {
                log::error!("Position query failed: {}", e);
                status.record_error(e.to_string());
            }
        }
        result
    }

    async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut FilterWheel) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let wheel = Arc::clone(&self.wheel);
        tokio::task::spawn_blocking(move || {
            let mut guard = wheel.blocking_lock();
            f(&mut *guard)
        })
        .await
        .map_err(|e| DeviceError::Worker(e.to_string()))?
    }

    async fn record_connection(&self, result: &Result<()>) {
        let mut status = self.status.write().await;
        match result {
            Ok(()) => {
                status.update_connection_state(ConnectionState::Connected);
                status.last_error = None;
            }
            Err(e) => {
                log::error!("Connection failed: {}", e);
                status.update_connection_state(ConnectionState::Error(e.to_string()));
                status.record_error(e.to_string());
            }
        }
    }
}
