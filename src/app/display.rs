use crate::core::RunState;

pub fn colorize(value: &str, code: &str, enabled: bool) -> String {
    if enabled {
        format!("\u{1b}[{code}m{value}\u{1b}[0m")
    } else {
        value.to_string()
    }
}

/// ANSI color code for a run state.
pub fn state_color(state: RunState) -> &'static str {
    match state {
        RunState::Running => "32",
        RunState::Stopped => "90",
        RunState::Unknown => "33",
    }
}

/// Left-align `value` to `width` columns, then color it.
///
/// Padding is applied before coloring so escape codes do not skew column widths.
pub fn padded(value: &str, width: usize, code: &str, enabled: bool) -> String {
    colorize(&format!("{value:<width$}"), code, enabled)
}

/// Widest of `header` and every value, for table layout.
pub fn column_width<'a>(header: &str, values: impl IntoIterator<Item = &'a str>) -> usize {
    values
        .into_iter()
        .map(str::len)
        .max()
        .unwrap_or(0)
        .max(header.len())
}
