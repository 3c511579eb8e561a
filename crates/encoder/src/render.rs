use std::io::Write;
use log::debug;

/// Bar width used when the terminal width is unknown
pub const FALLBACK_BAR_WIDTH: usize = 40;

const FILLED: char = '█';
const UNFILLED: char = '.';

/// Pick the bar width for a terminal `columns` wide: half of it, or `fallback`.
pub fn bar_width_for(columns: Option<u16>, fallback: usize) -> usize {
    match columns.map(|c| usize::from(c) / 2) {
        Some(width) if width > 0 => width,
        _ => fallback,
    }
}

/// Number of filled cells for `progress` in a bar `bar_width` wide
pub fn filled_cells(progress: f64, bar_width: usize) -> usize {
    let p = if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 0.0 };
    ((p * bar_width as f64).floor() as usize).min(bar_width)
}

/// Format one status line: bar, percentage and ETA.
///
/// `[████......] 40.0% ETA: 01:05.3`
pub fn render(progress: f64, eta_minutes: u64, eta_seconds: f64, bar_width: usize) -> String {
    let filled = filled_cells(progress, bar_width);
    let p = if progress.is_finite() { progress.clamp(0.0, 1.0) } else { 0.0 };

    // Round first so 59.96s prints as the next minute, not "60.0"
    let mut minutes = eta_minutes;
    let mut seconds = (eta_seconds.max(0.0) * 10.0).round() / 10.0;
    if seconds >= 60.0 {
        minutes += (seconds / 60.0).floor() as u64;
        seconds %= 60.0;
    }

    let mut line = String::with_capacity(bar_width * 3 + 32);
    line.push('[');
    line.extend(std::iter::repeat(FILLED).take(filled));
    line.extend(std::iter::repeat(UNFILLED).take(bar_width - filled));
    line.push_str(&format!("] {:.1}% ETA: {:02}:{:04.1}", p * 100.0, minutes, seconds));
    line
}

/// Destination for the status line and outcome messages.
pub trait ProgressSink {
    /// Replace the current status line
    fn redraw(&mut self, line: &str);

    /// Leave the status line in place and move to a fresh line
    fn finish_line(&mut self);

    /// Print a standalone message
    fn message(&mut self, text: &str);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn redraw(&mut self, line: &str) {
        (**self).redraw(line)
    }

    fn finish_line(&mut self) {
        (**self).finish_line()
    }

    fn message(&mut self, text: &str) {
        (**self).message(text)
    }
}

/// Writes to a terminal using carriage-return redraw
pub struct TerminalSink<W: Write> {
    out: W,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, bytes: &str) {
        let written = self.out.write_all(bytes.as_bytes()).and_then(|_| self.out.flush());
        if let Err(e) = written {
            debug!("Failed to write progress output: {}", e);
        }
    }
}

impl TerminalSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> ProgressSink for TerminalSink<W> {
    fn redraw(&mut self, line: &str) {
        // clear the line, then return to column 0
        self.emit(&format!("\r\x1b[2K{}", line));
    }

    fn finish_line(&mut self) {
        self.emit("\n");
    }

    fn message(&mut self, text: &str) {
        self.emit(&format!("{}\n", text));
    }
}

/// Everything a sink was asked to show, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Redraw(String),
    FinishLine,
    Message(String),
}

/// Sink that keeps what it is given. Handy for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<SinkEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redraws(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Redraw(line) => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Message(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for MemorySink {
    fn redraw(&mut self, line: &str) {
        self.events.push(SinkEvent::Redraw(line.to_string()));
    }

    fn finish_line(&mut self) {
        self.events.push(SinkEvent::FinishLine);
    }

    fn message(&mut self, text: &str) {
        self.events.push(SinkEvent::Message(text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn count_in_bar(line: &str, c: char) -> usize {
        let end = line.find(']').unwrap_or(line.len());
        line[..end].chars().filter(|&x| x == c).count()
    }

    #[test]
    fn test_empty_and_full_bars() {
        assert_eq!(filled_cells(0.0, 40), 0);
        assert_eq!(filled_cells(1.0, 40), 40);
    }

    #[test]
    fn test_render_layout() {
        let line = render(0.25, 1, 5.2, 8);
        assert_eq!(line, "[██......] 25.0% ETA: 01:05.2");
    }

    #[test]
    fn test_render_pads_seconds_and_grows_minutes() {
        assert!(render(0.5, 0, 3.0, 4).ends_with("ETA: 00:03.0"));
        assert!(render(0.01, 125, 0.0, 4).ends_with("ETA: 125:00.0"));
    }

    #[test]
    fn test_render_carries_rounded_seconds_into_minutes() {
        assert!(render(0.5, 2, 59.97, 4).ends_with("ETA: 03:00.0"));
    }

    #[test]
    fn test_bar_width_falls_back_to_forty() {
        assert_eq!(bar_width_for(None, FALLBACK_BAR_WIDTH), 40);
        assert_eq!(bar_width_for(Some(1), FALLBACK_BAR_WIDTH), 40);
        assert_eq!(bar_width_for(Some(120), FALLBACK_BAR_WIDTH), 60);
    }

    #[test]
    fn test_terminal_sink_redraws_in_place() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.redraw("one");
        sink.redraw("two");
        sink.finish_line();
        sink.message("done");
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "\r\x1b[2Kone\r\x1b[2Ktwo\ndone\n");
        assert_eq!(out.matches('\n').count(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_filled_cells_stay_in_bounds(progress in 0.0f64..=1.0, width in 0usize..400) {
            let filled = filled_cells(progress, width);
            prop_assert!(filled <= width);
        }

        #[test]
        fn test_bar_is_always_bar_width(progress in -1.0f64..2.0, width in 1usize..200) {
            let line = render(progress, 0, 0.0, width);
            prop_assert_eq!(count_in_bar(&line, FILLED) + count_in_bar(&line, UNFILLED), width);
            prop_assert_eq!(count_in_bar(&line, FILLED), filled_cells(progress, width));
        }
    }
}
