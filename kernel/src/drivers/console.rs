//! Kernel console with swappable output sink.
//!
//! All shell-facing output funnels through [`write_byte`]. The active sink
//! is either the screen or a fixed-size capture buffer; the shell pipeline
//! swaps the capture sink in for the duration of a piped or redirected
//! command and takes the buffer afterwards. On hosted builds the "screen"
//! is an in-memory log drained by the REPL and by tests.

use alloc::string::String;

use crate::sync::spinlock::Spinlock;

/// VGA attribute colors.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGrey = 7,
    DarkGrey = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    LightMagenta = 13,
    Yellow = 14,
    White = 15,
}

/// Capture buffer size. Matches the pipe scratch size used by the shell.
pub const CAPTURE_SIZE: usize = 4096;

struct ConsoleState {
    capturing: bool,
    captured: [u8; CAPTURE_SIZE],
    captured_len: usize,
    #[cfg(not(target_os = "none"))]
    screen: alloc::vec::Vec<u8>,
}

static CONSOLE: Spinlock<ConsoleState> = Spinlock::new(ConsoleState {
    capturing: false,
    captured: [0; CAPTURE_SIZE],
    captured_len: 0,
    #[cfg(not(target_os = "none"))]
    screen: alloc::vec::Vec::new(),
});

/// Write one byte through the active sink.
pub fn write_byte(byte: u8) {
    let mut con = CONSOLE.lock();
    if con.capturing {
        if con.captured_len < CAPTURE_SIZE - 1 {
            let at = con.captured_len;
            con.captured[at] = byte;
            con.captured_len += 1;
        }
        return;
    }
    #[cfg(target_os = "none")]
    {
        drop(con);
        crate::drivers::vga_text::putchar(byte);
    }
    #[cfg(not(target_os = "none"))]
    con.screen.push(byte);
}

pub fn write_str(s: &str) {
    for byte in s.bytes() {
        write_byte(byte);
    }
}

/// Begin capturing console output into the scratch buffer.
pub fn capture_start() {
    let mut con = CONSOLE.lock();
    con.capturing = true;
    con.captured_len = 0;
}

/// Stop capturing and return the captured bytes.
pub fn capture_end() -> String {
    let mut con = CONSOLE.lock();
    con.capturing = false;
    let len = con.captured_len;
    con.captured_len = 0;
    String::from_utf8_lossy(&con.captured[..len]).into_owned()
}

/// Set the output color. No effect while capturing (captured bytes carry
/// no attributes), no effect on hosted builds.
pub fn set_color(_color: Color) {
    #[cfg(target_os = "none")]
    {
        let con = CONSOLE.lock();
        if !con.capturing {
            crate::drivers::vga_text::set_color(_color as u8);
        }
    }
}

#[cfg(target_os = "none")]
pub fn reset_color() {
    crate::drivers::vga_text::set_color(Color::LightGrey as u8);
}

#[cfg(not(target_os = "none"))]
pub fn reset_color() {}

/// Clear the screen.
pub fn clear() {
    #[cfg(target_os = "none")]
    crate::drivers::vga_text::clear();
    #[cfg(not(target_os = "none"))]
    CONSOLE.lock().screen.clear();
}

/// Drain the hosted screen log (REPL + tests).
#[cfg(not(target_os = "none"))]
pub fn take_screen() -> String {
    let mut con = CONSOLE.lock();
    let bytes = core::mem::take(&mut con.screen);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[doc(hidden)]
pub fn _print(args: core::fmt::Arguments) {
    use core::fmt::Write;
    struct ConsoleWriter;
    impl core::fmt::Write for ConsoleWriter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            write_str(s);
            Ok(())
        }
    }
    let _ = ConsoleWriter.write_fmt(args);
}

/// Boot banner shown on the console.
pub fn banner() {
    set_color(Color::Cyan);
    crate::kprintln!();
    crate::kprintln!("  ____            _   _");
    crate::kprintln!(" | __ )  __ _ ___| |_(_) ___  _ __");
    crate::kprintln!(" |  _ \\ / _` / __| __| |/ _ \\| '_ \\");
    crate::kprintln!(" | |_) | (_| \\__ \\ |_| | (_) | | | |");
    crate::kprintln!(" |____/ \\__,_|___/\\__|_|\\___/|_| |_|");
    crate::kprintln!();
    set_color(Color::White);
    crate::kprintln!("  Bastion OS v0.1");
    crate::kprintln!();
    reset_color();
}

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::drivers::console::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {
        $crate::kprint!("{}\n", format_args!($($arg)*))
    };
}

/// Print a line in the given color, restoring the default afterwards.
#[macro_export]
macro_rules! kprintln_color {
    ($color:expr, $($arg:tt)*) => {{
        $crate::drivers::console::set_color($color);
        $crate::kprintln!($($arg)*);
        $crate::drivers::console::reset_color();
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_diverts_output() {
        let _guard = crate::test_sync::lock();
        let _ = take_screen();

        write_str("on screen ");
        capture_start();
        write_str("captured");
        let captured = capture_end();
        write_str("on screen again");

        assert_eq!(captured, "captured");
        let screen = take_screen();
        assert!(screen.contains("on screen "));
        assert!(screen.contains("on screen again"));
        assert!(!screen.contains("captured"));
    }

    #[test]
    fn capture_is_bounded() {
        let _guard = crate::test_sync::lock();
        capture_start();
        for _ in 0..2 * CAPTURE_SIZE {
            write_byte(b'x');
        }
        let captured = capture_end();
        assert_eq!(captured.len(), CAPTURE_SIZE - 1);
    }
}
