//! Service configuration
//!
//! Loaded from a YAML/TOML/JSON file with `PLCSRV_` environment overrides
//! (see [`common::config_loader`]).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use blocklink::{codec, Address, BlockValue, PrimitiveType};
use errors::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

use crate::s7::S7Options;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PLCSRV_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlcsrvConfig {
    pub plc: PlcConfig,

    /// Poll tick interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Blocks fetched on every tick
    #[serde(default)]
    pub blocks: Vec<BlockConfig>,

    /// Named values decoded from the fetched blocks
    #[serde(default)]
    pub points: Vec<PointConfig>,

    /// Named command words
    #[serde(default)]
    pub commands: Vec<CommandConfig>,

    /// Operator-adjustable integer words with an allowed range
    #[serde(default)]
    pub setpoints: Vec<SetpointConfig>,
}

/// PLC connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlcConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub rack: u16,
    #[serde(default = "default_slot")]
    pub slot: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout")]
    pub io_timeout_ms: u64,
}

impl PlcConfig {
    pub fn s7_options(&self) -> S7Options {
        S7Options {
            port: self.port,
            rack: self.rack,
            slot: self.slot,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            json: false,
        }
    }
}

/// One block registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub block_id: u16,
    #[serde(default)]
    pub start: u32,
    pub length: u32,
    #[serde(default)]
    pub name: Option<String>,
}

impl BlockConfig {
    /// Whether `address` lies entirely inside the fetched region
    pub fn contains(&self, address: &Address) -> bool {
        address.block_id() == self.block_id
            && address.byte_offset() >= self.start
            && address.end_offset() <= u64::from(self.start) + u64::from(self.length)
    }
}

/// Named point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointConfig {
    pub name: String,
    pub address: Address,
    /// Decimal places for REAL points
    #[serde(default)]
    pub round_to: Option<u32>,
    /// Report the negated bit (BOOL points)
    #[serde(default)]
    pub invert: bool,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Named command word
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub address: Address,
    pub value: BlockValue,
}

/// Bounded integer setpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetpointConfig {
    pub name: String,
    pub address: Address,
    pub min: i64,
    pub max: i64,
    #[serde(default)]
    pub unit: Option<String>,
}

impl SetpointConfig {
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_port() -> u16 {
    crate::s7::frame::ISO_TCP_PORT
}

fn default_slot() -> u16 {
    1
}

fn default_connect_timeout() -> u64 {
    3000
}

fn default_io_timeout() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlcsrvConfig {
    /// Load from `path` and validate
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let config: Self = common::load_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn point(&self, name: &str) -> Option<&PointConfig> {
        self.points.iter().find(|p| p.name == name)
    }

    pub fn command(&self, name: &str) -> Option<&CommandConfig> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn setpoint(&self, name: &str) -> Option<&SetpointConfig> {
        self.setpoints.iter().find(|s| s.name == name)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> ServiceResult<()> {
        if self.plc.host.trim().is_empty() {
            return Err(ServiceError::invalid_config("plc.host", "must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ServiceError::invalid_config(
                "poll_interval_ms",
                "must be greater than zero",
            ));
        }

        let mut block_ids = HashSet::new();
        for block in &self.blocks {
            if block.length == 0 {
                return Err(ServiceError::invalid_config(
                    format!("blocks[DB{}].length", block.block_id),
                    "must be greater than zero",
                ));
            }
            if !block_ids.insert(block.block_id) {
                return Err(ServiceError::invalid_config(
                    "blocks",
                    format!("DB{} listed twice", block.block_id),
                ));
            }
        }

        let mut names = HashSet::new();
        for point in &self.points {
            if !names.insert(point.name.as_str()) {
                return Err(ServiceError::invalid_config(
                    "points",
                    format!("duplicate name '{}'", point.name),
                ));
            }
            if !self.blocks.iter().any(|b| b.contains(&point.address)) {
                return Err(ServiceError::invalid_config(
                    format!("points[{}].address", point.name),
                    format!("{} is outside every configured block", point.address),
                ));
            }
            let primitive = point.address.primitive_type();
            if point.invert && primitive != PrimitiveType::Bool {
                return Err(ServiceError::invalid_config(
                    format!("points[{}].invert", point.name),
                    "only valid for BOOL points",
                ));
            }
            if point.round_to.is_some() && primitive != PrimitiveType::Real {
                return Err(ServiceError::invalid_config(
                    format!("points[{}].round_to", point.name),
                    "only valid for REAL points",
                ));
            }
        }

        let mut names = HashSet::new();
        for command in &self.commands {
            if !names.insert(command.name.as_str()) {
                return Err(ServiceError::invalid_config(
                    "commands",
                    format!("duplicate name '{}'", command.name),
                ));
            }
            if command.address.primitive_type() == PrimitiveType::Bool {
                return Err(ServiceError::invalid_config(
                    format!("commands[{}].address", command.name),
                    "BOOL addresses cannot be written",
                ));
            }
            codec::encode(&command.address, &command.value).map_err(|e| {
                ServiceError::invalid_config(
                    format!("commands[{}].value", command.name),
                    e.to_string(),
                )
            })?;
        }

        let mut names = HashSet::new();
        for setpoint in &self.setpoints {
            if !names.insert(setpoint.name.as_str()) {
                return Err(ServiceError::invalid_config(
                    "setpoints",
                    format!("duplicate name '{}'", setpoint.name),
                ));
            }
            if setpoint.address.primitive_type() == PrimitiveType::Bool {
                return Err(ServiceError::invalid_config(
                    format!("setpoints[{}].address", setpoint.name),
                    "BOOL addresses cannot be written",
                ));
            }
            if !self.blocks.iter().any(|b| b.contains(&setpoint.address)) {
                return Err(ServiceError::invalid_config(
                    format!("setpoints[{}].address", setpoint.name),
                    format!("{} is outside every configured block", setpoint.address),
                ));
            }
            if setpoint.min > setpoint.max {
                return Err(ServiceError::invalid_config(
                    format!("setpoints[{}]", setpoint.name),
                    format!("min {} is greater than max {}", setpoint.min, setpoint.max),
                ));
            }
            for bound in [setpoint.min, setpoint.max] {
                codec::encode(&setpoint.address, &BlockValue::Integer(bound)).map_err(|e| {
                    ServiceError::invalid_config(
                        format!("setpoints[{}]", setpoint.name),
                        e.to_string(),
                    )
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
plc:
  host: 192.168.1.20
blocks:
  - block_id: 40
    length: 54
points:
  - name: rain
    address: DB40.REAL30
    round_to: 1
    unit: mm
"#;

    fn parse(yaml: &str) -> PlcsrvConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(MINIMAL);
        assert_eq!(config.plc.port, 102);
        assert_eq!(config.plc.rack, 0);
        assert_eq!(config.plc.slot, 1);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.blocks[0].start, 0);
        assert_eq!(config.points[0].address, Address::real(40, 30));
        assert!(config.commands.is_empty());
        assert!(config.setpoints.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_s7_options() {
        let options = parse(MINIMAL).plc.s7_options();
        assert_eq!(options.port, 102);
        assert_eq!(options.connect_timeout, Duration::from_millis(3000));
        assert_eq!(options.io_timeout, Duration::from_millis(1000));
    }

    #[test]
    fn test_invalid_address_rejected_at_parse() {
        let yaml = MINIMAL.replace("DB40.REAL30", "DB40.FOO30");
        assert!(serde_yaml::from_str::<PlcsrvConfig>(&yaml).is_err());
    }

    #[test]
    fn test_point_outside_block() {
        let config = parse(&MINIMAL.replace("DB40.REAL30", "DB40.REAL52"));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("outside"));
    }

    #[test]
    fn test_round_to_requires_real() {
        let config = parse(&MINIMAL.replace("DB40.REAL30", "DB40.DBW30"));
        assert!(matches!(
            config.validate(),
            Err(ServiceError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_invert_requires_bool() {
        let mut config = parse(MINIMAL);
        config.points[0].round_to = None;
        config.points[0].invert = true;
        assert!(config.validate().is_err());

        config.points[0].address = Address::bool(40, 14, 0).unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_duplicate_names_and_blocks() {
        let mut config = parse(MINIMAL);
        config.points.push(config.points[0].clone());
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.blocks.push(config.blocks[0].clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bool_command_rejected() {
        let mut config = parse(MINIMAL);
        config.commands.push(CommandConfig {
            name: "pump".to_string(),
            address: Address::bool(40, 0, 1).unwrap(),
            value: BlockValue::Bool(true),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_value_must_fit_address() {
        for value in [BlockValue::Integer(-1), BlockValue::Float(1.5)] {
            let mut config = parse(MINIMAL);
            config.commands.push(CommandConfig {
                name: "mode".to_string(),
                address: Address::word(40, 10),
                value,
            });
            match config.validate() {
                Err(ServiceError::InvalidConfig { field, .. }) => {
                    assert_eq!(field, "commands[mode].value")
                },
                other => panic!("expected InvalidConfig, got {:?}", other),
            }
        }

        let mut config = parse(MINIMAL);
        config.commands.push(CommandConfig {
            name: "mode".to_string(),
            address: Address::word(40, 10),
            value: BlockValue::Integer(4),
        });
        config.validate().unwrap();
    }

    fn start_hour() -> SetpointConfig {
        SetpointConfig {
            name: "start_hour".to_string(),
            address: Address::word(40, 12),
            min: 0,
            max: 23,
            unit: Some("h".to_string()),
        }
    }

    #[test]
    fn test_setpoints_parse_and_validate() {
        let yaml = format!(
            "{}setpoints:\n  - {{ name: start_hour, address: DB40.DBW12, min: 0, max: 23, unit: h }}\n",
            MINIMAL
        );
        let config = parse(&yaml);
        assert_eq!(config.setpoint("start_hour"), Some(&start_hour()));
        assert!(config.setpoint("missing").is_none());
        config.validate().unwrap();

        let setpoint = start_hour();
        assert!(setpoint.contains(0));
        assert!(setpoint.contains(23));
        assert!(!setpoint.contains(24));
        assert!(!setpoint.contains(-1));
    }

    #[test]
    fn test_invalid_setpoints_rejected() {
        let cases: [fn(&mut SetpointConfig); 4] = [
            |s| s.address = Address::bool(40, 12, 0).unwrap(),
            |s| s.address = Address::word(40, 54),
            |s| {
                s.min = 30;
                s.max = 20;
            },
            // WORD cannot hold a negative lower bound
            |s| s.min = -1,
        ];
        for mutate in cases {
            let mut config = parse(MINIMAL);
            let mut setpoint = start_hour();
            mutate(&mut setpoint);
            config.setpoints.push(setpoint);
            assert!(
                matches!(config.validate(), Err(ServiceError::InvalidConfig { .. })),
                "{:?}",
                config.setpoints[0]
            );
        }

        let mut config = parse(MINIMAL);
        config.setpoints.push(start_hour());
        config.setpoints.push(start_hour());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_host_and_zero_interval() {
        let mut config = parse(MINIMAL);
        config.plc.host = " ".to_string();
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }
}
