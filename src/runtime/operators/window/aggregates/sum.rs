use std::mem;

use tracing::trace;

use crate::common::{Value, WindowError};

use super::Accumulator;

/// Exact sum of finite doubles, kept as non-overlapping partials of increasing magnitude.
///
/// Adding `-x` cancels a previous `x` exactly, so the rounded result depends only
/// on which values are currently held, never on the order they came and went.
#[derive(Debug, Clone, Default)]
struct ExactDoubleSum {
    partials: Vec<f64>,
}

impl ExactDoubleSum {
    fn add(&mut self, mut x: f64) {
        let mut kept = 0;
        for j in 0..self.partials.len() {
            let mut y = self.partials[j];
            if x.abs() < y.abs() {
                mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                self.partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        self.partials.truncate(kept);
        self.partials.push(x);
    }

    /// Correctly rounded value of the held sum.
    fn rounded(&self) -> f64 {
        let partials = &self.partials;
        let Some((&last, _)) = partials.split_last() else {
            return 0.0;
        };
        let mut hi = last;
        let mut lo = 0.0;
        let mut n = partials.len() - 1;
        while n > 0 {
            n -= 1;
            let x = hi;
            let y = partials[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // half-way case: the remaining partials decide the rounding direction
        if n > 0 && ((lo < 0.0 && partials[n - 1] < 0.0) || (lo > 0.0 && partials[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}

/// Sum that supports exact removal of previously added values.
///
/// Integral inputs are summed exactly in 128 bits and finite doubles in an
/// [`ExactDoubleSum`], so full recompute and add/remove sliding agree bit for bit.
/// Non-finite doubles are only counted, so removing them restores a finite sum.
#[derive(Debug, Clone, Default)]
pub struct RemovableSum {
    int_sum: i128,
    doubles: ExactDoubleSum,
    double_count: i64,
    pos_inf_count: i64,
    neg_inf_count: i64,
    nan_count: i64,
}

impl RemovableSum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: &Value) -> bool {
        self.apply(value, 1)
    }

    pub fn remove(&mut self, value: &Value) -> bool {
        self.apply(value, -1)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // Returns false when the value is not a number and was skipped.
    fn apply(&mut self, value: &Value, sign: i64) -> bool {
        match value {
            Value::Int(i) => self.int_sum += sign as i128 * *i as i128,
            Value::Long(l) => self.int_sum += sign as i128 * *l as i128,
            Value::Double(d) => {
                self.double_count += sign;
                if d.is_nan() {
                    self.nan_count += sign;
                } else if *d == f64::INFINITY {
                    self.pos_inf_count += sign;
                } else if *d == f64::NEG_INFINITY {
                    self.neg_inf_count += sign;
                } else {
                    self.doubles.add(*d * sign as f64);
                }
                if self.double_count == 0 {
                    self.doubles = ExactDoubleSum::default();
                }
            }
            other => {
                trace!(value_type = other.type_name(), "skipping non-numeric input");
                return false;
            }
        }
        true
    }

    pub fn value(&self) -> Value {
        if self.nan_count > 0 || (self.pos_inf_count > 0 && self.neg_inf_count > 0) {
            return Value::Double(f64::NAN);
        }
        if self.pos_inf_count > 0 {
            return Value::Double(f64::INFINITY);
        }
        if self.neg_inf_count > 0 {
            return Value::Double(f64::NEG_INFINITY);
        }
        if self.double_count == 0 {
            return match i64::try_from(self.int_sum) {
                Ok(v) => Value::int_or_long(v),
                Err(_) => Value::Double(self.int_sum as f64),
            };
        }
        let mut total = self.doubles.clone();
        total.add(self.int_sum as f64);
        Value::Double(total.rounded())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SumAccumulator {
    sum: RemovableSum,
}

impl SumAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for SumAccumulator {
    fn name(&self) -> &'static str {
        "$sum"
    }

    fn update(&mut self, value: &Value) {
        self.sum.add(value);
    }

    fn retract(&mut self, value: &Value) -> Result<(), WindowError> {
        self.sum.remove(value);
        Ok(())
    }

    fn supports_retract(&self) -> bool {
        true
    }

    fn evaluate(&self) -> Value {
        self.sum.value()
    }

    fn reset(&mut self) {
        self.sum.reset();
    }
}

/// Mean of the numeric inputs; `null` for an empty window.
#[derive(Debug, Clone, Default)]
pub struct AvgAccumulator {
    sum: RemovableSum,
    count: i64,
}

impl AvgAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for AvgAccumulator {
    fn name(&self) -> &'static str {
        "$avg"
    }

    fn update(&mut self, value: &Value) {
        if self.sum.add(value) {
            self.count += 1;
        }
    }

    fn retract(&mut self, value: &Value) -> Result<(), WindowError> {
        if self.sum.remove(value) {
            self.count -= 1;
        }
        Ok(())
    }

    fn supports_retract(&self) -> bool {
        true
    }

    fn evaluate(&self) -> Value {
        if self.count == 0 {
            return Value::Null;
        }
        let count = self.count as f64;
        match self.sum.value() {
            Value::Int(i) => Value::Double(i as f64 / count),
            Value::Long(l) => Value::Double(l as f64 / count),
            Value::Double(d) if !d.is_finite() => Value::Double(d),
            Value::Double(d) => Value::Double(d / count),
            _ => Value::Null,
        }
    }

    fn reset(&mut self) {
        self.sum.reset();
        self.count = 0;
    }
}

/// Number of documents in the window.
#[derive(Debug, Clone, Default)]
pub struct CountAccumulator {
    count: i64,
}

impl CountAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Accumulator for CountAccumulator {
    fn name(&self) -> &'static str {
        "$count"
    }

    fn update(&mut self, _value: &Value) {
        self.count += 1;
    }

    fn retract(&mut self, _value: &Value) -> Result<(), WindowError> {
        self.count -= 1;
        Ok(())
    }

    fn supports_retract(&self) -> bool {
        true
    }

    fn evaluate(&self) -> Value {
        Value::int_or_long(self.count)
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_of(values: &[Value]) -> Value {
        let mut acc = SumAccumulator::new();
        values.iter().for_each(|v| acc.update(v));
        acc.evaluate()
    }

    #[test]
    fn test_empty_sum_is_zero() {
        assert!(matches!(SumAccumulator::new().evaluate(), Value::Int(0)));
    }

    #[test]
    fn test_integral_sums_widen() {
        assert!(matches!(sum_of(&[Value::Int(1), Value::Int(2)]), Value::Int(3)));
        assert!(matches!(
            sum_of(&[Value::Int(i32::MAX), Value::Int(1)]),
            Value::Long(v) if v == i32::MAX as i64 + 1
        ));
        assert!(matches!(
            sum_of(&[Value::Long(i64::MAX), Value::Int(1)]),
            Value::Double(_)
        ));
    }

    #[test]
    fn test_double_makes_double() {
        assert!(matches!(
            sum_of(&[Value::Int(1), Value::Double(0.5)]),
            Value::Double(d) if d == 1.5
        ));
    }

    #[test]
    fn test_non_numeric_ignored() {
        let values = [Value::Int(4), Value::from("x"), Value::Null, Value::Missing, Value::Bool(true)];
        assert!(matches!(sum_of(&values), Value::Int(4)));
    }

    #[test]
    fn test_retract_restores_integral_result() {
        let mut acc = SumAccumulator::new();
        acc.update(&Value::Int(2));
        acc.update(&Value::Double(0.25));
        acc.retract(&Value::Double(0.25)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Int(2)));

        acc.update(&Value::Long(i64::MAX));
        acc.retract(&Value::Long(i64::MAX)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Int(2)));
    }

    #[test]
    fn test_non_finite_counted_and_removable() {
        let mut acc = SumAccumulator::new();
        acc.update(&Value::Int(1));
        acc.update(&Value::Double(f64::INFINITY));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == f64::INFINITY));
        acc.update(&Value::Double(f64::NEG_INFINITY));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d.is_nan()));
        acc.retract(&Value::Double(f64::INFINITY)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == f64::NEG_INFINITY));
        acc.retract(&Value::Double(f64::NEG_INFINITY)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Int(1)));

        acc.update(&Value::Double(f64::NAN));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d.is_nan()));
        acc.retract(&Value::Double(f64::NAN)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Int(1)));
    }

    #[test]
    fn test_cancelling_double_sum() {
        let mut acc = SumAccumulator::new();
        acc.update(&Value::Double(1e16));
        acc.update(&Value::Double(1.0));
        acc.update(&Value::Double(-1e16));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == 1.0));
    }

    #[test]
    fn test_order_of_adds_and_removes_does_not_change_result() {
        let values = [0.1, 1e9 + 0.3, -7.77, 2.5e-8, 1e9 + 0.001, 3.3];
        let mut fresh = RemovableSum::new();
        for v in &values[2..] {
            fresh.add(&Value::Double(*v));
        }
        let mut slid = RemovableSum::new();
        for v in values.iter().rev() {
            slid.add(&Value::Double(*v));
        }
        slid.remove(&Value::Double(values[0]));
        slid.remove(&Value::Double(values[1]));
        assert!(matches!(
            (fresh.value(), slid.value()),
            (Value::Double(a), Value::Double(b)) if a.to_bits() == b.to_bits()
        ));
    }

    #[test]
    fn test_exact_sum_rounds_correctly() {
        let mut sum = ExactDoubleSum::default();
        for v in [1.0, 1e100, 1.0, -1e100] {
            sum.add(v);
        }
        assert_eq!(sum.rounded(), 2.0);
        let mut sum = ExactDoubleSum::default();
        for _ in 0..10 {
            sum.add(0.1);
        }
        assert_eq!(sum.rounded(), 1.0);
    }

    #[test]
    fn test_avg() {
        let mut acc = AvgAccumulator::new();
        assert_eq!(acc.evaluate(), Value::Null);
        assert!(acc.evaluate().is_nullish());
        acc.update(&Value::Int(1));
        acc.update(&Value::Int(2));
        acc.update(&Value::from("ignored"));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == 1.5));
        acc.retract(&Value::from("ignored")).unwrap();
        acc.retract(&Value::Int(1)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == 2.0));
        acc.retract(&Value::Int(2)).unwrap();
        assert!(matches!(acc.evaluate(), Value::Null));
    }

    #[test]
    fn test_avg_non_finite() {
        let mut acc = AvgAccumulator::new();
        acc.update(&Value::Double(f64::NEG_INFINITY));
        acc.update(&Value::Int(3));
        assert!(matches!(acc.evaluate(), Value::Double(d) if d == f64::NEG_INFINITY));
    }

    #[test]
    fn test_count() {
        let mut acc = CountAccumulator::new();
        assert!(matches!(acc.evaluate(), Value::Int(0)));
        acc.update(&Value::Missing);
        acc.update(&Value::from("x"));
        assert!(matches!(acc.evaluate(), Value::Int(2)));
        acc.retract(&Value::Missing).unwrap();
        assert!(matches!(acc.evaluate(), Value::Int(1)));
    }
}
