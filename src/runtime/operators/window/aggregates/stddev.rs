use tracing::trace;

use crate::common::Value;

use super::Accumulator;

/// Population or sample standard deviation via Welford's update.
///
/// Not retractable; windows using it are rebuilt for every document.
/// Any non-finite input in the window makes the result NaN.
#[derive(Debug, Clone)]
pub struct StdDevAccumulator {
    sample: bool,
    count: i64,
    mean: f64,
    m2: f64,
    non_finite_count: i64,
}

impl StdDevAccumulator {
    pub fn population() -> Self {
        Self::new(false)
    }

    pub fn sample() -> Self {
        Self::new(true)
    }

    fn new(sample: bool) -> Self {
        Self {
            sample,
            count: 0,
            mean: 0.0,
            m2: 0.0,
            non_finite_count: 0,
        }
    }
}

impl Accumulator for StdDevAccumulator {
    fn name(&self) -> &'static str {
        if self.sample {
            "$stdDevSamp"
        } else {
            "$stdDevPop"
        }
    }

    fn update(&mut self, value: &Value) {
        let Some(x) = value.coerce_to_f64() else {
            trace!(value_type = value.type_name(), "skipping non-numeric input");
            return;
        };
        if !x.is_finite() {
            self.non_finite_count += 1;
            return;
        }
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn evaluate(&self) -> Value {
        if self.non_finite_count > 0 {
            return Value::Double(f64::NAN);
        }
        let adjusted = self.count - i64::from(self.sample);
        if adjusted <= 0 {
            return Value::Null;
        }
        Value::Double((self.m2.max(0.0) / adjusted as f64).sqrt())
    }

    fn reset(&mut self) {
        *self = Self::new(self.sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WindowError;

    fn as_f64(v: Value) -> f64 {
        match v {
            Value::Double(d) => d,
            other => panic!("expected double, got {other:?}"),
        }
    }

    #[test]
    fn test_population_and_sample() {
        let values = [2, 4, 4, 4, 5, 5, 7, 9];
        let mut pop = StdDevAccumulator::population();
        let mut samp = StdDevAccumulator::sample();
        for v in values {
            pop.update(&Value::Int(v));
            samp.update(&Value::Int(v));
        }
        assert!((as_f64(pop.evaluate()) - 2.0).abs() < 1e-12);
        assert!((as_f64(samp.evaluate()) - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_retract_is_rejected() {
        let mut pop = StdDevAccumulator::population();
        pop.update(&Value::Int(1));
        assert!(!pop.supports_retract());
        assert_eq!(
            pop.retract(&Value::Int(1)).unwrap_err(),
            WindowError::RetractNotSupported("$stdDevPop")
        );
    }

    #[test]
    fn test_sample_of_single_value_is_null() {
        let mut samp = StdDevAccumulator::sample();
        samp.update(&Value::Double(3.0));
        assert!(matches!(samp.evaluate(), Value::Null));
        let mut pop = StdDevAccumulator::population();
        pop.update(&Value::Double(3.0));
        assert!(matches!(pop.evaluate(), Value::Double(d) if d == 0.0));
    }

    #[test]
    fn test_non_finite_and_non_numeric() {
        let mut pop = StdDevAccumulator::population();
        pop.update(&Value::Int(1));
        pop.update(&Value::from("skip"));
        pop.update(&Value::Double(f64::INFINITY));
        assert!(matches!(pop.evaluate(), Value::Double(d) if d.is_nan()));
        pop.reset();
        pop.update(&Value::Int(1));
        assert!(matches!(pop.evaluate(), Value::Double(d) if d == 0.0));
    }
}
