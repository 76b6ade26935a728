//! Session timing and link settings.

use fugit::MillisDurationU32;

use crate::register::BaudRate;

/// Shortest accepted polling interval, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u32 = 10;

/// Settings for a [`DpsPsu`](crate::psu::DpsPsu) session.
///
/// Use [`SessionConfigBuilder`] to change any of the defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Baud rate the device is told to use during initialisation.
    pub baud_rate: BaudRate,
    /// Pause after every frame written, before the next may be sent.
    pub settle_delay: MillisDurationU32,
    /// How often the whole device state is requested once connected.
    pub poll_interval: MillisDurationU32,
    /// How long initialisation waits for the first full state report.
    pub init_timeout: MillisDurationU32,
    /// How many extra times each missing identity string is requested.
    pub identity_retries: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::_115200,
            settle_delay: MillisDurationU32::millis(50),
            poll_interval: MillisDurationU32::millis(1000),
            init_timeout: MillisDurationU32::millis(3000),
            identity_retries: 2,
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Converts a fugit duration into a std one for sleeping and waiting.
pub(crate) fn to_std(duration: MillisDurationU32) -> std::time::Duration {
    std::time::Duration::from_millis(duration.to_millis() as u64)
}

/// Use this type to create a [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the baud rate to select on the device.
    pub fn with_baud_rate(mut self, baud_rate: BaudRate) -> Self {
        self.config.baud_rate = baud_rate;
        self
    }

    /// Set the pause after each written frame.
    pub fn with_settle_delay(mut self, delay: MillisDurationU32) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Set the full state polling interval, no shorter than [`MIN_POLL_INTERVAL_MS`].
    pub fn with_poll_interval(mut self, interval: MillisDurationU32) -> Self {
        self.config.poll_interval = if interval.to_millis() < MIN_POLL_INTERVAL_MS {
            MillisDurationU32::millis(MIN_POLL_INTERVAL_MS)
        } else {
            interval
        };
        self
    }

    /// Set how long to wait for the first full state report.
    pub fn with_init_timeout(mut self, timeout: MillisDurationU32) -> Self {
        self.config.init_timeout = timeout;
        self
    }

    /// Set how many times a missing identity string is requested again.
    pub fn with_identity_retries(mut self, retries: u8) -> Self {
        self.config.identity_retries = retries;
        self
    }

    /// Let's build it!
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SessionConfig::builder()
            .with_baud_rate(BaudRate::_9600)
            .with_settle_delay(MillisDurationU32::millis(5))
            .with_poll_interval(MillisDurationU32::millis(250))
            .build();

        assert_eq!(config.baud_rate, BaudRate::_9600);
        assert_eq!(config.settle_delay.to_millis(), 5);
        assert_eq!(config.poll_interval.to_millis(), 250);
        assert_eq!(config.init_timeout, SessionConfig::default().init_timeout);
        assert_eq!(to_std(config.poll_interval), std::time::Duration::from_millis(250));
    }

    #[test]
    fn poll_interval_is_clamped() {
        let config = SessionConfig::builder()
            .with_poll_interval(MillisDurationU32::millis(0))
            .build();
        assert_eq!(config.poll_interval.to_millis(), MIN_POLL_INTERVAL_MS);

        let config = SessionConfig::builder()
            .with_poll_interval(MillisDurationU32::millis(MIN_POLL_INTERVAL_MS))
            .build();
        assert_eq!(config.poll_interval.to_millis(), MIN_POLL_INTERVAL_MS);
    }
}
