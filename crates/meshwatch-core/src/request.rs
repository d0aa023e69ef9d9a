//! Request kinds issued to a node through the command executor.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named sensor probe understood by the node firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SensorProbe {
    /// Temperature, humidity, pressure.
    Bme280,
    /// Temperature, humidity, pressure, gas (IAQ).
    Bme680,
    /// Temperature, pressure.
    Bmp280,
    /// Temperature, humidity.
    Sht31,
    /// Voltage, current.
    Ina219,
    /// Voltage, current, power.
    Ina260,
    /// Battery fuel gauge.
    Max17048,
}

impl SensorProbe {
    pub const ALL: [SensorProbe; 7] = [
        Self::Bme280,
        Self::Bme680,
        Self::Bmp280,
        Self::Sht31,
        Self::Ina219,
        Self::Ina260,
        Self::Max17048,
    ];

    /// Name as passed to the node's telemetry request.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bme280 => "BME280",
            Self::Bme680 => "BME680",
            Self::Bmp280 => "BMP280",
            Self::Sht31 => "SHT31",
            Self::Ina219 => "INA219",
            Self::Ina260 => "INA260",
            Self::Max17048 => "MAX17048",
        }
    }
}

impl fmt::Display for SensorProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorProbe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown sensor probe '{wanted}'"))
    }
}

/// What a single executor call asks a node for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    /// Base device metrics (battery, voltage, utilisation, uptime).
    DeviceMetrics,
    /// One named sensor probe.
    Sensor(SensorProbe),
    /// Forward/backward route discovery.
    Traceroute,
}

impl RequestKind {
    /// Whether a transport-successful reply with nothing parsable should be
    /// retried. Sensor probes are skipped instead, since most nodes carry
    /// only a few of them and an absent sensor never starts answering.
    pub fn retry_on_empty(self) -> bool {
        !matches!(self, Self::Sensor(_))
    }

    pub fn is_telemetry(self) -> bool {
        !matches!(self, Self::Traceroute)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeviceMetrics => write!(f, "device"),
            Self::Sensor(p) => write!(f, "sensor:{p}"),
            Self::Traceroute => write!(f, "traceroute"),
        }
    }
}
