use std::ops::Range;

use crate::common::{Value, WindowError};
use crate::runtime::operators::window::index::WindowRange;

use super::Accumulator;

/// Incremental evaluation: one accumulator slides across the partition.
///
/// Between consecutive documents only the difference of the two windows is
/// applied: rows entering are added, rows leaving are retracted. Disjoint or
/// empty transitions reset the accumulator. The output matches
/// [`run_plain_accumulator`](super::run_plain_accumulator) for the same inputs.
pub fn run_retractable_accumulator(
    accumulator: &mut dyn Accumulator,
    inputs: &[Value],
    windows: &[Option<WindowRange>],
) -> Result<Vec<Value>, WindowError> {
    if !accumulator.supports_retract() {
        return Err(WindowError::RetractNotSupported(accumulator.name()));
    }

    accumulator.reset();
    // half-open range of rows currently held by the accumulator
    let mut held: Option<Range<usize>> = None;
    let mut results = Vec::with_capacity(windows.len());

    for window in windows {
        let Some(window) = window else {
            if held.take().is_some() {
                accumulator.reset();
            }
            results.push(accumulator.evaluate());
            continue;
        };
        let next = *window.start()..*window.end() + 1;

        match held.take() {
            Some(prev) if next.start < prev.end && prev.start < next.end => {
                if next.start < prev.start {
                    update_all(accumulator, inputs, next.start..prev.start);
                }
                if next.end > prev.end {
                    update_all(accumulator, inputs, prev.end..next.end);
                }
                if next.start > prev.start {
                    retract_all(accumulator, inputs, prev.start..next.start)?;
                }
                if next.end < prev.end {
                    retract_all(accumulator, inputs, next.end..prev.end)?;
                }
            }
            Some(_) => {
                accumulator.reset();
                update_all(accumulator, inputs, next.clone());
            }
            None => update_all(accumulator, inputs, next.clone()),
        }

        results.push(accumulator.evaluate());
        held = Some(next);
    }

    Ok(results)
}

fn update_all(accumulator: &mut dyn Accumulator, inputs: &[Value], rows: Range<usize>) {
    for value in inputs[rows].iter() {
        accumulator.update(value);
    }
}

fn retract_all(
    accumulator: &mut dyn Accumulator,
    inputs: &[Value],
    rows: Range<usize>,
) -> Result<(), WindowError> {
    for value in inputs[rows].iter() {
        accumulator.retract(value)?;
    }
    Ok(())
}
