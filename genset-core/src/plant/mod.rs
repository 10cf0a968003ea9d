//! Simplified thermal and electrical model of the generator set.
//!
//! The model owns no control decisions. It turns the true temperature and the
//! injected sensor bias into the value the sequencer acts on, and it evolves the
//! starter battery voltage under alternator charge, parasitic drain, and
//! starter-motor sag. All randomness flows through [`EntropySource`] so tests
//! can pin it down.

use heapless::HistoryBuf;
use rand::{Rng, RngCore};

/// Voltage the alternator charges the battery towards.
pub const ALTERNATOR_TARGET_VOLTAGE: f64 = 13.8;
/// Lowest physically reachable battery voltage.
pub const BATTERY_FLOOR_VOLTAGE: f64 = 10.8;
/// Highest battery voltage an operator may dial in.
pub const BATTERY_CEILING_VOLTAGE: f64 = 14.0;
/// Per-tick alternator charge while running.
pub const CHARGE_STEP: f64 = 0.02;
/// Per-tick self-discharge while stopped.
pub const DRAIN_STEP: f64 = 0.001;
pub const CRANK_SAG_BASE: f64 = 0.6;
pub const CRANK_SAG_SPREAD: f64 = 0.2;
/// Half-width of the symmetric jitter added to readings when noise is enabled.
pub const NOISE_AMPLITUDE: f64 = 0.2;
/// Number of displayed-temperature samples retained for plotting.
pub const HISTORY_CAPACITY: usize = 600;

pub const INITIAL_TEMPERATURE: f64 = 22.0;
pub const INITIAL_BATTERY_VOLTAGE: f64 = 12.8;

/// Bounded history of displayed temperatures, oldest evicted first.
pub type TemperatureHistory = HistoryBuf<f64, HISTORY_CAPACITY>;

/// Source of uniformly distributed samples.
pub trait EntropySource {
    /// Returns a sample in `[0, 1)`.
    fn next_unit(&mut self) -> f64;
}

/// Adapts any `rand` generator into an [`EntropySource`].
#[derive(Clone, Debug)]
pub struct RngEntropy<R> {
    rng: R,
}

impl<R: RngCore> RngEntropy<R> {
    #[must_use]
    pub const fn new(rng: R) -> Self {
        Self { rng }
    }

    #[must_use]
    pub fn into_inner(self) -> R {
        self.rng
    }
}

impl<R: RngCore> EntropySource for RngEntropy<R> {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen_range(0.0..1.0)
    }
}

/// Entropy source that always yields the same sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedEntropy(f64);

impl FixedEntropy {
    /// Creates a source returning `value`, clamped into `[0, 1)`.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let value = if value.is_finite() { value } else { 0.0 };
        Self(value.clamp(0.0, 1.0 - f64::EPSILON))
    }

    /// Yields the midpoint of every range: no noise, mid-range crank sag.
    #[must_use]
    pub fn midpoint() -> Self {
        Self::new(0.5)
    }
}

impl EntropySource for FixedEntropy {
    fn next_unit(&mut self) -> f64 {
        self.0
    }
}

/// Starter battery state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Battery {
    voltage: f64,
}

impl Battery {
    /// Creates a battery at `voltage`, clamped to the physical range.
    #[must_use]
    pub fn new(voltage: f64) -> Self {
        let mut battery = Self {
            voltage: INITIAL_BATTERY_VOLTAGE,
        };
        battery.set_voltage(voltage);
        battery
    }

    #[must_use]
    pub const fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Overrides the voltage, clamped to the operator range. Non-finite input is ignored.
    pub fn set_voltage(&mut self, voltage: f64) {
        if voltage.is_finite() {
            self.voltage = voltage.clamp(BATTERY_FLOOR_VOLTAGE, BATTERY_CEILING_VOLTAGE);
        }
    }

    /// Alternator charge for one tick.
    pub fn charge(&mut self) {
        if self.voltage < ALTERNATOR_TARGET_VOLTAGE {
            self.voltage = (self.voltage + CHARGE_STEP).min(ALTERNATOR_TARGET_VOLTAGE);
        }
    }

    /// Self-discharge for one tick.
    pub fn drain(&mut self) {
        self.voltage = (self.voltage - DRAIN_STEP).max(BATTERY_FLOOR_VOLTAGE);
    }

    /// Applies the starter-motor sag and returns the drop that was requested.
    pub fn crank_sag<E: EntropySource + ?Sized>(&mut self, entropy: &mut E) -> f64 {
        let sag = CRANK_SAG_BASE + entropy.next_unit() * CRANK_SAG_SPREAD;
        self.voltage = (self.voltage - sag).max(BATTERY_FLOOR_VOLTAGE);
        sag
    }
}

impl Default for Battery {
    fn default() -> Self {
        Self::new(INITIAL_BATTERY_VOLTAGE)
    }
}

/// Temperature sensor with an injectable bias.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemperatureSensor {
    temperature: f64,
    bias: f64,
}

impl TemperatureSensor {
    #[must_use]
    pub const fn new(temperature: f64) -> Self {
        Self {
            temperature,
            bias: 0.0,
        }
    }

    /// True temperature, before bias and noise.
    #[must_use]
    pub const fn temperature(&self) -> f64 {
        self.temperature
    }

    #[must_use]
    pub const fn bias(&self) -> f64 {
        self.bias
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        if temperature.is_finite() {
            self.temperature = temperature;
        }
    }

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = if bias.is_finite() { bias } else { 0.0 };
    }

    /// Biased reading without noise. Control and crank checks both use this.
    #[must_use]
    pub fn sensed(&self) -> f64 {
        self.temperature + self.bias
    }

    /// Reading shown to the operator, with jitter when `noise` is set.
    pub fn read<E: EntropySource + ?Sized>(&self, noise: bool, entropy: &mut E) -> f64 {
        let sensed = self.sensed();
        if noise {
            sensed + entropy.next_unit() * 2.0 * NOISE_AMPLITUDE - NOISE_AMPLITUDE
        } else {
            sensed
        }
    }
}

impl Default for TemperatureSensor {
    fn default() -> Self {
        Self::new(INITIAL_TEMPERATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn close(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < 1e-9
    }

    #[test]
    fn charge_stops_at_alternator_target() {
        let mut battery = Battery::new(13.79);
        battery.charge();
        assert!(close(battery.voltage(), ALTERNATOR_TARGET_VOLTAGE));
        battery.charge();
        assert!(close(battery.voltage(), ALTERNATOR_TARGET_VOLTAGE));
    }

    #[test]
    fn charge_leaves_overcharged_battery_alone() {
        let mut battery = Battery::new(14.0);
        battery.charge();
        assert!(close(battery.voltage(), 14.0));
    }

    #[test]
    fn drain_is_floored() {
        let mut battery = Battery::new(BATTERY_FLOOR_VOLTAGE + 0.0005);
        battery.drain();
        assert!(close(battery.voltage(), BATTERY_FLOOR_VOLTAGE));
    }

    #[test]
    fn crank_sag_spans_configured_range() {
        let mut battery = Battery::new(12.8);
        let sag = battery.crank_sag(&mut FixedEntropy::new(0.0));
        assert!(close(sag, 0.6));
        assert!(close(battery.voltage(), 12.2));

        let mut battery = Battery::new(11.0);
        let sag = battery.crank_sag(&mut FixedEntropy::new(0.99));
        assert!(sag > 0.79 && sag < 0.8);
        assert!(close(battery.voltage(), BATTERY_FLOOR_VOLTAGE));
    }

    #[test]
    fn operator_voltage_is_clamped() {
        let mut battery = Battery::default();
        battery.set_voltage(20.0);
        assert!(close(battery.voltage(), BATTERY_CEILING_VOLTAGE));
        battery.set_voltage(3.0);
        assert!(close(battery.voltage(), BATTERY_FLOOR_VOLTAGE));
        battery.set_voltage(f64::NAN);
        assert!(close(battery.voltage(), BATTERY_FLOOR_VOLTAGE));
    }

    #[test]
    fn sensor_applies_bias_and_bounded_noise() {
        let mut sensor = TemperatureSensor::new(17.0);
        sensor.set_bias(0.8);
        assert!(close(sensor.sensed(), 17.8));
        assert!(close(sensor.read(false, &mut FixedEntropy::new(0.9)), 17.8));
        assert!(close(sensor.read(true, &mut FixedEntropy::midpoint()), 17.8));
        assert!(close(sensor.read(true, &mut FixedEntropy::new(0.0)), 17.6));

        let mut entropy = RngEntropy::new(ChaCha8Rng::seed_from_u64(7));
        for _ in 0..256 {
            let reading = sensor.read(true, &mut entropy);
            assert!((reading - 17.8).abs() <= NOISE_AMPLITUDE);
        }
    }
}
