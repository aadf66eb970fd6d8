//! Show how `mmap()` and `mprotect()` reshape the process's memory map.
//!
//! Maps two adjacent anonymous pages at a fixed address, flips the second
//! one to executable and back, and prints `/proc/self/maps` after every
//! step.  Adjacent mappings with equal protection are merged by the
//! kernel into one line; differing protection splits them.

use std::io::{self, Write};
use vmafault::maps::show_maps;
use vmafault::region::MappedRegion;
use vmafault::system::page_size;

const FIXED_BASE: usize = 0x7fff_0000_0000;

fn dump(out: &mut impl Write, title: &str) {
    writeln!(out, "\n** {title} **").expect("write stdout");
    show_maps(out).expect("read /proc/self/maps");
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let page = page_size().expect("page size") as usize;
    let rw = libc::PROT_READ | libc::PROT_WRITE;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    dump(&mut out, "Initial");

    // SAFETY: nothing else in this process lives at FIXED_BASE
    let first = unsafe { MappedRegion::fixed(FIXED_BASE, page, rw) }.expect("first mmap");
    dump(&mut out, "After first mmap()");

    // SAFETY: the page right after `first` is unused
    let mut second =
        unsafe { MappedRegion::fixed(first.addr() + page, page, rw) }.expect("second mmap");
    dump(&mut out, "After second mmap()");

    second.protect(rw | libc::PROT_EXEC).expect("first mprotect");
    dump(&mut out, "After first mprotect()");

    second.protect(rw).expect("second mprotect");
    dump(&mut out, "After second mprotect()");

    drop(second);
    drop(first);
}
