use anyhow::{Context, Result};
use ddsfw_core::{LineFlags, LineSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest value the 12-bit baud rate register holds.
pub const UBRR_MAX: u16 = 0x0FFF;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LineConfig {
    pub echo: bool,
    pub canonical: bool,
    pub cr_to_nl: bool,
    pub nl_to_cr_nl: bool,
    pub nonblocking: bool,
    pub erase: u8,
    pub kill: u8,
}

impl Default for LineConfig {
    fn default() -> Self {
        let settings = LineSettings::DEFAULT;
        Self {
            echo: settings.flags.contains(LineFlags::ECHO),
            canonical: settings.flags.contains(LineFlags::CANONICAL),
            cr_to_nl: settings.flags.contains(LineFlags::CR_TO_NL),
            nl_to_cr_nl: settings.flags.contains(LineFlags::NL_TO_CR_NL),
            nonblocking: settings.flags.contains(LineFlags::NONBLOCKING_READ),
            erase: settings.erase,
            kill: settings.kill,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UsartConfig {
    pub baud: u32,
    pub f_cpu: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// Largest accepted deviation of the real baud rate, in percent.
    pub max_baud_error: f64,
}

impl Default for UsartConfig {
    fn default() -> Self {
        Self {
            baud: 250_000,
            f_cpu: 16_000_000,
            data_bits: 8,
            stop_bits: 2,
            max_baud_error: 2.0,
        }
    }
}

impl UsartConfig {
    /// Baud rate register value, rounded to the nearest divisor.
    pub fn divisor(&self) -> Result<u16> {
        if self.baud == 0 {
            anyhow::bail!("USART 'baud' must be greater than zero");
        }
        let clock = self.f_cpu as u64 + (self.baud as u64) / 2;
        let scaled = clock / (self.baud as u64 * 16);
        if scaled == 0 {
            anyhow::bail!(
                "Baud rate {} is too high for a {} Hz clock",
                self.baud,
                self.f_cpu
            );
        }
        let ubrr = scaled - 1;
        if ubrr > UBRR_MAX as u64 {
            anyhow::bail!(
                "Baud rate {} is too low for a {} Hz clock (divisor {} exceeds {})",
                self.baud,
                self.f_cpu,
                ubrr,
                UBRR_MAX
            );
        }
        Ok(ubrr as u16)
    }

    /// The rate the divisor actually produces.
    pub fn actual_baud(&self) -> Result<f64> {
        let ubrr = self.divisor()?;
        Ok(self.f_cpu as f64 / (16.0 * (ubrr as f64 + 1.0)))
    }

    /// Deviation from the requested rate, in percent.
    pub fn baud_error(&self) -> Result<f64> {
        let actual = self.actual_baud()?;
        Ok((actual - self.baud as f64).abs() * 100.0 / self.baud as f64)
    }

    /// Bit times per frame, start bit included.
    pub fn frame_bits(&self) -> u32 {
        1 + self.data_bits as u32 + self.stop_bits as u32
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub line: LineConfig,
    pub usart: UsartConfig,
}

impl ConsoleConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open console config at {:?}", path.as_ref()))?;
        let config: Self =
            serde_yaml::from_reader(f).context("Failed to parse console config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse console config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let line = &self.line;
        if line.erase == line.kill {
            anyhow::bail!(
                "Line 'erase' and 'kill' must differ (both {:#04x})",
                line.erase
            );
        }
        for (name, byte) in [("erase", line.erase), ("kill", line.kill)] {
            if byte == b'\r' || byte == b'\n' {
                anyhow::bail!("Line '{}' cannot be CR or NL", name);
            }
        }

        let usart = &self.usart;
        if usart.f_cpu == 0 {
            anyhow::bail!("USART 'f_cpu' must be greater than zero");
        }
        if !(5..=8).contains(&usart.data_bits) {
            anyhow::bail!(
                "USART 'data_bits' must be between 5 and 8, got {}",
                usart.data_bits
            );
        }
        if usart.stop_bits != 1 && usart.stop_bits != 2 {
            anyhow::bail!("USART 'stop_bits' must be 1 or 2, got {}", usart.stop_bits);
        }

        let error = usart.baud_error()?;
        if error > usart.max_baud_error {
            anyhow::bail!(
                "Baud rate {} is off by {:.2}% at {} Hz (limit {:.2}%)",
                usart.baud,
                error,
                usart.f_cpu,
                usart.max_baud_error
            );
        }

        Ok(())
    }

    pub fn to_settings(&self) -> LineSettings {
        let line = &self.line;
        let mut flags = LineFlags::empty();
        flags.set(LineFlags::ECHO, line.echo);
        flags.set(LineFlags::CANONICAL, line.canonical);
        flags.set(LineFlags::CR_TO_NL, line.cr_to_nl);
        flags.set(LineFlags::NL_TO_CR_NL, line.nl_to_cr_nl);
        flags.set(LineFlags::NONBLOCKING_READ, line.nonblocking);
        LineSettings {
            flags,
            erase: line.erase,
            kill: line.kill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_console_defaults() {
        let config = ConsoleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.to_settings(), LineSettings::DEFAULT);
        assert_eq!(config.usart.divisor().unwrap(), 3);
        assert_eq!(config.usart.frame_bits(), 11);
        assert_eq!(config.usart.baud_error().unwrap(), 0.0);
    }

    #[test]
    fn test_partial_config() {
        let yaml = r#"
line:
  echo: false
  kill: 24
usart:
  baud: 9600
"#;
        let config = ConsoleConfig::from_yaml(yaml).unwrap();
        let settings = config.to_settings();
        assert!(!settings.is_echo());
        assert!(settings.is_canonical());
        assert_eq!(settings.kill, 0x18);
        assert_eq!(settings.erase, 0x7f);
        assert_eq!(config.usart.divisor().unwrap(), 103);
        assert!(config.usart.baud_error().unwrap() < 0.2);
    }

    #[test]
    fn test_empty_document_is_default() {
        let config: ConsoleConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, ConsoleConfig::default());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = r#"
line:
  icanon: true
"#;
        assert!(ConsoleConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_erase_equals_kill() {
        let yaml = r#"
line:
  erase: 8
  kill: 8
"#;
        let err = ConsoleConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_kill_cannot_be_newline() {
        let mut config = ConsoleConfig::default();
        config.line.kill = b'\n';
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("kill"));
    }

    #[test]
    fn test_baud_error_too_large() {
        let mut config = ConsoleConfig::default();
        config.usart.baud = 115_200;
        assert_eq!(config.usart.divisor().unwrap(), 7);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("off by"));

        config.usart.max_baud_error = 10.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_baud_out_of_range() {
        let mut usart = UsartConfig {
            baud: 2_000_000,
            ..UsartConfig::default()
        };
        assert!(usart.divisor().unwrap_err().to_string().contains("too high"));

        usart.baud = 100;
        assert!(usart.divisor().unwrap_err().to_string().contains("too low"));

        usart.baud = 0;
        assert!(usart.divisor().is_err());
    }

    #[test]
    fn test_invalid_frame() {
        let mut config = ConsoleConfig::default();
        config.usart.data_bits = 9;
        assert!(config.validate().unwrap_err().to_string().contains("data_bits"));

        config.usart.data_bits = 7;
        config.usart.stop_bits = 3;
        assert!(config.validate().unwrap_err().to_string().contains("stop_bits"));
    }
}
