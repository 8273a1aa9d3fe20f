//! Point coordinator
//!
//! Turns one [`PollingSession`] plus the configured point table into a
//! name-keyed view that is refreshed on a fixed tick. The latest
//! [`CoordinatorData`] is published on a `watch` channel for any number of
//! readers.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use blocklink::{
    Address, BlockRegistry, BlockTransport, BlockValue, ConnectionState, PollingSession, RunState,
};
use chrono::{DateTime, Utc};
use errors::{ServiceError, ServiceResult};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{PlcsrvConfig, PointConfig};

/// Value of one named point after a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointReading {
    Value(BlockValue),
    Unavailable(String),
}

impl PointReading {
    pub fn value(&self) -> Option<&BlockValue> {
        match self {
            PointReading::Value(v) => Some(v),
            PointReading::Unavailable(_) => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, PointReading::Value(_))
    }
}

impl std::fmt::Display for PointReading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointReading::Value(v) => write!(f, "{}", v),
            PointReading::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

/// Result of one refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CoordinatorData {
    /// Poll and run-state query both succeeded
    pub comms_ok: bool,
    /// `None` when the CPU state is unknown or could not be read
    pub cpu_running: Option<bool>,
    pub readings: BTreeMap<String, PointReading>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CoordinatorData {
    pub fn reading(&self, name: &str) -> Option<&PointReading> {
        self.readings.get(name)
    }
}

/// Owns the session and the point table
pub struct PlcCoordinator {
    config: PlcsrvConfig,
    registry: Arc<BlockRegistry>,
    session: PollingSession,
    tx: watch::Sender<CoordinatorData>,
}

impl std::fmt::Debug for PlcCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlcCoordinator")
            .field("session", &self.session)
            .field("points", &self.config.points.len())
            .finish()
    }
}

impl PlcCoordinator {
    pub fn new(config: PlcsrvConfig, transport: Box<dyn BlockTransport>) -> Self {
        let registry = Arc::new(BlockRegistry::new());
        let session = PollingSession::new(config.plc.host.clone(), Arc::clone(&registry), transport);
        let (tx, _rx) = watch::channel(CoordinatorData::default());

        let coordinator = Self {
            config,
            registry,
            session,
            tx,
        };
        coordinator.register_blocks();
        coordinator
    }

    /// Register every configured block; safe to call repeatedly
    pub fn register_blocks(&self) {
        for block in &self.config.blocks {
            self.registry
                .register(block.block_id, block.start, block.length);
        }
        debug!("Registered {} block(s)", self.registry.len());
    }

    /// Registry shared with the session, for extra feature modules
    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn session(&self) -> &PollingSession {
        &self.session
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn config(&self) -> &PlcsrvConfig {
        &self.config
    }

    /// Receiver for the data published after every refresh
    pub fn subscribe(&self) -> watch::Receiver<CoordinatorData> {
        self.tx.subscribe()
    }

    /// Last published data
    pub fn latest(&self) -> CoordinatorData {
        self.tx.borrow().clone()
    }

    /// One tick: poll, query the CPU state, decode every point
    pub async fn refresh(&mut self) -> CoordinatorData {
        let data = match self.session.poll().await {
            Ok(snapshot) => {
                let mut readings = BTreeMap::new();
                for point in &self.config.points {
                    readings.insert(point.name.clone(), self.read_point(point));
                }

                let cpu_running = match self.session.run_state().await {
                    Ok(RunState::Unknown) => None,
                    Ok(state) => Some(state.is_running()),
                    Err(e) => {
                        warn!("CPU state unavailable: {}", e);
                        None
                    },
                };

                CoordinatorData {
                    comms_ok: self.session.is_connected(),
                    cpu_running,
                    readings,
                    updated_at: snapshot.updated_at(),
                }
            },
            Err(e) => {
                let reason = e.to_string();
                let readings = self
                    .config
                    .points
                    .iter()
                    .map(|p| (p.name.clone(), PointReading::Unavailable(reason.clone())))
                    .collect();
                CoordinatorData {
                    comms_ok: false,
                    cpu_running: None,
                    readings,
                    updated_at: self.session.snapshot().updated_at(),
                }
            },
        };

        self.tx.send_replace(data.clone());
        data
    }

    fn read_point(&self, point: &PointConfig) -> PointReading {
        match self.session.read_rounded(&point.address, point.round_to) {
            Ok(BlockValue::Bool(b)) if point.invert => PointReading::Value(BlockValue::Bool(!b)),
            Ok(value) => PointReading::Value(value),
            Err(e) => {
                debug!("Point '{}' ({}): {}", point.name, point.address, e);
                PointReading::Unavailable(e.to_string())
            },
        }
    }

    /// Poll once and decode an arbitrary address
    ///
    /// Blocks that are not configured are registered just wide enough for
    /// the address.
    pub async fn read_address(
        &mut self,
        address: &Address,
        round_to: Option<u32>,
    ) -> ServiceResult<BlockValue> {
        if self.registry.get(address.block_id()).is_none() {
            self.registry.register(
                address.block_id(),
                address.byte_offset(),
                address.byte_len() as u32,
            );
        }
        self.session.poll().await?;
        Ok(self.session.read_rounded(address, round_to)?)
    }

    /// Write a single value
    pub async fn write(&mut self, address: &Address, value: &BlockValue) -> ServiceResult<()> {
        self.session.write(address, value).await?;
        Ok(())
    }

    /// Write a configured command word
    pub async fn send_command(&mut self, name: &str) -> ServiceResult<()> {
        let command = self
            .config
            .command(name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("command '{}'", name)))?;

        info!("Command '{}': {} = {}", command.name, command.address, command.value);
        self.session.write(&command.address, &command.value).await?;
        Ok(())
    }

    /// Write a configured setpoint after checking its range
    ///
    /// The value must be a whole number within `min..=max`; nothing is sent
    /// to the PLC otherwise.
    pub async fn set_setpoint(&mut self, name: &str, value: &BlockValue) -> ServiceResult<()> {
        let setpoint = self
            .config
            .setpoint(name)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("setpoint '{}'", name)))?;
        let param = format!("setpoint '{}'", setpoint.name);

        let whole = match value {
            BlockValue::Bool(_) => None,
            other => other.as_i64(),
        }
        .ok_or_else(|| {
            ServiceError::invalid_parameter(
                param.clone(),
                format!("{} is not a whole number", value),
            )
        })?;
        if !setpoint.contains(whole) {
            return Err(ServiceError::invalid_parameter(
                param,
                format!("{} outside {}..={}", whole, setpoint.min, setpoint.max),
            ));
        }

        info!("Setpoint '{}': {} = {}", setpoint.name, setpoint.address, whole);
        self.session
            .write(&setpoint.address, &BlockValue::Integer(whole))
            .await?;
        Ok(())
    }

    /// CPU operating mode
    pub async fn run_state(&mut self) -> ServiceResult<RunState> {
        Ok(self.session.run_state().await?)
    }

    /// Refresh on every tick until `shutdown` resolves
    ///
    /// Ticks that fall due while a refresh is still running are skipped.
    pub async fn run<F>(&mut self, shutdown: F)
    where
        F: Future,
    {
        let period = self.config.poll_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            "Polling {} every {:?} ({} block(s), {} point(s))",
            self.session.host(),
            period,
            self.registry.len(),
            self.config.points.len()
        );

        let mut was_ok: Option<bool> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let data = self.refresh().await;
                    if was_ok != Some(data.comms_ok) {
                        if data.comms_ok {
                            info!("PLC communication OK, CPU running: {:?}", data.cpu_running);
                        } else {
                            warn!("PLC communication lost");
                        }
                        was_ok = Some(data.comms_ok);
                    }
                },
            }
        }

        if let Err(e) = self.session.disconnect().await {
            debug!("Disconnect on shutdown failed: {}", e);
        }
        info!("Polling stopped");
    }
}
