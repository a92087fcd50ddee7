#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Text status display for the sorter: position, transport queue and drift
//! counters, one line each.

use std::io::Write;

use sorter_traits::StatusDisplay;

/// Render queue slots as fixed-width cells.
///
/// Empty slots print as `.`, single readings as the diameter, and readings
/// seen with more than one crossing are suffixed with `*`.
pub fn render_queue(slots: &[Option<(u16, u8)>]) -> String {
    let cells: Vec<String> = slots
        .iter()
        .map(|slot| match slot {
            None => format!("{:>4}", "."),
            Some((mm, crossings)) if *crossings > 1 => format!("{mm:>3}*"),
            Some((mm, _)) => format!("{mm:>4}"),
        })
        .collect();
    format!("[{} ]", cells.concat())
}

/// `StatusDisplay` over any writer (stdout, a serial console, a buffer).
///
/// Write failures never reach the sorting loop; they are counted and logged once.
pub struct TerminalDisplay<W: Write> {
    out: W,
    write_errors: u64,
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            write_errors: 0,
        }
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{text}").and_then(|()| self.out.flush()) {
            if self.write_errors == 0 {
                tracing::warn!(error = %e, "status display write failed");
            }
            self.write_errors += 1;
        }
    }
}

impl<W: Write> StatusDisplay for TerminalDisplay<W> {
    fn show_position(&mut self, raw_count: i32, phase: u16) {
        self.line(format_args!("pos   raw={raw_count:>8} phase={phase:>4}"));
    }

    fn show_queue(&mut self, slots: &[Option<(u16, u8)>]) {
        let rendered = render_queue(slots);
        self.line(format_args!("queue {rendered}"));
    }

    fn show_drift(&mut self, zero_crossings: u32, drift_events: u32, last_drift_raw: i32) {
        self.line(format_args!(
            "drift zero={zero_crossings} events={drift_events} last_raw={last_drift_raw}"
        ));
    }
}
