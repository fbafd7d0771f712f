//! VGA text mode driver (80x25, 0xB8000).
//!
//! Thin output collaborator: character cell writes, scrolling, color
//! attributes, and the hardware cursor. All higher-level behavior
//! (capture, sinks) lives in `drivers::console`.

#![cfg(target_os = "none")]

use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::arch::x86::port::outb;

const VGA_BUFFER: usize = 0xB8000;
const WIDTH: usize = 80;
const HEIGHT: usize = 25;

static COL: AtomicUsize = AtomicUsize::new(0);
static ROW: AtomicUsize = AtomicUsize::new(0);
static COLOR: AtomicU8 = AtomicU8::new(0x07); // light grey on black

fn cell(row: usize, col: usize) -> *mut u16 {
    (VGA_BUFFER + (row * WIDTH + col) * 2) as *mut u16
}

fn put_at(row: usize, col: usize, byte: u8, color: u8) {
    let value = (color as u16) << 8 | byte as u16;
    unsafe { cell(row, col).write_volatile(value) }
}

pub fn init() {
    clear();
}

/// Clear the screen and home the cursor.
pub fn clear() {
    let color = COLOR.load(Ordering::Relaxed);
    for row in 0..HEIGHT {
        for col in 0..WIDTH {
            put_at(row, col, b' ', color);
        }
    }
    COL.store(0, Ordering::Relaxed);
    ROW.store(0, Ordering::Relaxed);
    move_cursor(0, 0);
}

/// Set the attribute byte used for subsequent characters.
pub fn set_color(color: u8) {
    COLOR.store(color, Ordering::Relaxed);
}

pub fn get_color() -> u8 {
    COLOR.load(Ordering::Relaxed)
}

fn scroll() {
    unsafe {
        for row in 1..HEIGHT {
            for col in 0..WIDTH {
                let v = cell(row, col).read_volatile();
                cell(row - 1, col).write_volatile(v);
            }
        }
    }
    let color = COLOR.load(Ordering::Relaxed);
    for col in 0..WIDTH {
        put_at(HEIGHT - 1, col, b' ', color);
    }
}

/// Write one byte at the cursor, handling newline, carriage return,
/// backspace, and scrolling.
pub fn putchar(byte: u8) {
    let mut row = ROW.load(Ordering::Relaxed);
    let mut col = COL.load(Ordering::Relaxed);

    match byte {
        b'\n' => {
            col = 0;
            row += 1;
        }
        b'\r' => col = 0,
        0x08 => {
            if col > 0 {
                col -= 1;
                put_at(row, col, b' ', COLOR.load(Ordering::Relaxed));
            }
        }
        _ => {
            put_at(row, col, byte, COLOR.load(Ordering::Relaxed));
            col += 1;
            if col >= WIDTH {
                col = 0;
                row += 1;
            }
        }
    }

    if row >= HEIGHT {
        scroll();
        row = HEIGHT - 1;
    }

    ROW.store(row, Ordering::Relaxed);
    COL.store(col, Ordering::Relaxed);
    move_cursor(row, col);
}

fn move_cursor(row: usize, col: usize) {
    let pos = (row * WIDTH + col) as u16;
    unsafe {
        outb(0x3D4, 0x0F);
        outb(0x3D5, (pos & 0xFF) as u8);
        outb(0x3D4, 0x0E);
        outb(0x3D5, (pos >> 8) as u8);
    }
}
