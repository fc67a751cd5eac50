use crate::common::Value;
use crate::runtime::operators::window::index::WindowRange;

use super::Accumulator;

/// Full recompute: the accumulator is reset and fed the whole window for every document.
///
/// `inputs` holds the evaluated input of each document of the partition and
/// `windows[i]` the resolved window of document `i` (`None` when empty).
pub fn run_plain_accumulator(
    accumulator: &mut dyn Accumulator,
    inputs: &[Value],
    windows: &[Option<WindowRange>],
) -> Vec<Value> {
    windows
        .iter()
        .map(|window| {
            accumulator.reset();
            if let Some(window) = window {
                for value in &inputs[window.clone()] {
                    accumulator.update(value);
                }
            }
            accumulator.evaluate()
        })
        .collect()
}
