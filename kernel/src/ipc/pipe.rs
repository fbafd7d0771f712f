//! Anonymous pipes: fixed-capacity ring buffers with blocking I/O.
//!
//! A pipe handle encodes the end in its low bit: even = read end,
//! odd = write end, `fd / 2` is the pipe slot. Writers block (yielding)
//! while the ring is full and a reader exists; readers block until at
//! least one byte arrives, and see EOF once the ring drains after the
//! write end closes. A slot is reclaimed when both ends are closed.

use crate::sync::spinlock::Spinlock;
use crate::task;

/// Ring capacity per pipe.
pub const PIPE_BUFFER_SIZE: usize = 4096;
/// Number of pipe slots.
pub const MAX_PIPES: usize = 32;

struct Pipe {
    buffer: [u8; PIPE_BUFFER_SIZE],
    read_pos: usize,
    write_pos: usize,
    count: usize,
    read_open: bool,
    write_open: bool,
    in_use: bool,
}

const EMPTY_PIPE: Pipe = Pipe {
    buffer: [0; PIPE_BUFFER_SIZE],
    read_pos: 0,
    write_pos: 0,
    count: 0,
    read_open: false,
    write_open: false,
    in_use: false,
};

static PIPES: Spinlock<[Pipe; MAX_PIPES]> = Spinlock::new([EMPTY_PIPE; MAX_PIPES]);

/// Reset every pipe slot.
pub fn init() {
    let mut pipes = PIPES.lock();
    for p in pipes.iter_mut() {
        p.in_use = false;
    }
}

/// Allocate a pipe. Returns `(read_fd, write_fd)`, or `None` when every
/// slot is taken.
pub fn pipe_create() -> Option<(i32, i32)> {
    let mut pipes = PIPES.lock();
    for (id, p) in pipes.iter_mut().enumerate() {
        if !p.in_use {
            p.in_use = true;
            p.read_pos = 0;
            p.write_pos = 0;
            p.count = 0;
            p.read_open = true;
            p.write_open = true;
            return Some(((id * 2) as i32, (id * 2 + 1) as i32));
        }
    }
    None
}

fn slot_of(fd: i32) -> Option<usize> {
    if fd < 0 {
        return None;
    }
    let id = (fd / 2) as usize;
    if id < MAX_PIPES {
        Some(id)
    } else {
        None
    }
}

fn is_write_end(fd: i32) -> bool {
    fd & 1 == 1
}

/// Write `data` into the pipe. Blocks while the ring is full and the read
/// end stays open. Returns the byte count written, or -1 when the handle
/// is invalid or the reader closed before anything was written.
pub fn pipe_write(fd: i32, data: &[u8]) -> i32 {
    let id = match slot_of(fd) {
        Some(id) if is_write_end(fd) => id,
        _ => return -1,
    };

    let mut written = 0usize;
    loop {
        {
            let mut pipes = PIPES.lock();
            let p = &mut pipes[id];
            if !p.in_use {
                return -1;
            }
            if !p.read_open {
                // Broken pipe: report what made it in, if anything.
                return if written > 0 { written as i32 } else { -1 };
            }
            while written < data.len() && p.count < PIPE_BUFFER_SIZE {
                let at = p.write_pos;
                p.buffer[at] = data[written];
                p.write_pos = (p.write_pos + 1) % PIPE_BUFFER_SIZE;
                p.count += 1;
                written += 1;
            }
            if written == data.len() {
                return written as i32;
            }
        }
        // Ring full: wait for the reader to drain some of it.
        task::proc_yield();
    }
}

/// Read up to `buf.len()` bytes. Blocks until at least one byte is
/// available; returns 0 (EOF) when the ring is empty and the write end is
/// closed, -1 on a bad handle.
pub fn pipe_read(fd: i32, buf: &mut [u8]) -> i32 {
    let id = match slot_of(fd) {
        Some(id) if !is_write_end(fd) => id,
        _ => return -1,
    };

    loop {
        {
            let mut pipes = PIPES.lock();
            let p = &mut pipes[id];
            if !p.in_use {
                return -1;
            }
            if p.count > 0 {
                let mut n = 0usize;
                while n < buf.len() && p.count > 0 {
                    buf[n] = p.buffer[p.read_pos];
                    p.read_pos = (p.read_pos + 1) % PIPE_BUFFER_SIZE;
                    p.count -= 1;
                    n += 1;
                }
                return n as i32;
            }
            if !p.write_open {
                return 0; // EOF
            }
        }
        task::proc_yield();
    }
}

/// Close one end of a pipe. The slot is reclaimed once both ends are
/// closed. Returns -1 on a bad handle.
pub fn pipe_close(fd: i32) -> i32 {
    let id = match slot_of(fd) {
        Some(id) => id,
        None => return -1,
    };
    let mut pipes = PIPES.lock();
    let p = &mut pipes[id];
    if !p.in_use {
        return -1;
    }
    if is_write_end(fd) {
        p.write_open = false;
    } else {
        p.read_open = false;
    }
    if !p.read_open && !p.write_open {
        p.in_use = false;
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_ordering_across_interleaved_ops() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();
        assert_eq!(r % 2, 0);
        assert_eq!(w, r + 1);

        assert_eq!(pipe_write(w, b"abc"), 3);
        let mut buf = [0u8; 2];
        assert_eq!(pipe_read(r, &mut buf), 2);
        assert_eq!(&buf, b"ab");

        assert_eq!(pipe_write(w, b"de"), 2);
        let mut buf = [0u8; 8];
        let n = pipe_read(r, &mut buf) as usize;
        assert_eq!(&buf[..n], b"cde");

        pipe_close(r);
        pipe_close(w);
    }

    #[test]
    fn eof_after_writer_closes() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();

        assert_eq!(pipe_write(w, b"tail"), 4);
        pipe_close(w);

        let mut buf = [0u8; 16];
        let n = pipe_read(r, &mut buf) as usize;
        assert_eq!(&buf[..n], b"tail");
        // Drained + writer closed: EOF forever, never blocks.
        assert_eq!(pipe_read(r, &mut buf), 0);
        assert_eq!(pipe_read(r, &mut buf), 0);
        pipe_close(r);
    }

    #[test]
    fn write_to_closed_reader_fails() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();
        pipe_close(r);
        assert_eq!(pipe_write(w, b"x"), -1);
        pipe_close(w);
    }

    #[test]
    fn slot_reclaimed_after_both_ends_close() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();
        pipe_close(r);
        pipe_close(w);
        // The freed slot is allocatable again.
        let (r2, w2) = pipe_create().unwrap();
        assert_eq!((r2, w2), (r, w));
        pipe_close(r2);
        pipe_close(w2);
    }

    #[test]
    fn wrong_end_operations_fail() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(pipe_read(w, &mut buf), -1);
        assert_eq!(pipe_write(r, b"x"), -1);
        assert_eq!(pipe_write(999, b"x"), -1);
        pipe_close(r);
        pipe_close(w);
    }

    #[test]
    fn capacity_bounded_write_fills_ring() {
        let _guard = crate::test_sync::lock();
        init();
        let (r, w) = pipe_create().unwrap();
        let chunk = [7u8; PIPE_BUFFER_SIZE];
        assert_eq!(pipe_write(w, &chunk), PIPE_BUFFER_SIZE as i32);

        let mut out = [0u8; PIPE_BUFFER_SIZE];
        assert_eq!(pipe_read(r, &mut out), PIPE_BUFFER_SIZE as i32);
        assert!(out.iter().all(|&b| b == 7));
        pipe_close(r);
        pipe_close(w);
    }
}
