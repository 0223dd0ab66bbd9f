use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Acquire, Release};
use std::sync::Arc;

// The write path lives in a trait nobody outside of the crate can name.
// The only way to reach it is `FlagWriter::raise`, which consumes the writer.
mod private {
    pub trait Sealed {
        fn set(&self);
    }
}

/// A boolean cell that starts out `false` and is written `true` exactly once.
pub trait Flag: private::Sealed + Default + Send + Sync + 'static {
    fn is_set(&self) -> bool;
}

/// The correct variant.
///
/// A Release store paired with an Acquire load. Once the store happened
/// (and the loop keeps loading) the load is guaranteed to see `true`
/// after a bounded amount of time, and everything the writer did before
/// the store is visible too.
#[derive(Default)]
pub struct AtomicFlag {
    value: AtomicBool,
}

impl private::Sealed for AtomicFlag {
    fn set(&self) {
        // Swap instead of store so that debug builds catch a second write.
        let was_set = self.value.swap(true, Release);
        debug_assert!(!was_set, "shared flag written twice");
    }
}

impl Flag for AtomicFlag {
    fn is_set(&self) -> bool {
        self.value.load(Acquire)
    }
}

/// The buggy variant.
///
/// Plain, non-atomic reads and writes of a `bool` shared between threads.
/// This is a data race, which is undefined behaviour. The optimizer sees a
/// loop that never writes the value and is free to load it once, hoist the
/// check out of the loop and spin forever.
///
/// Only here to show the bug. Never use this for anything real.
#[derive(Default)]
pub struct PlainFlag {
    value: UnsafeCell<bool>,
}

// This is the lie. UnsafeCell<bool> is !Sync for a reason.
unsafe impl Sync for PlainFlag {}

impl private::Sealed for PlainFlag {
    fn set(&self) {
        unsafe { *self.value.get() = true };
    }
}

impl Flag for PlainFlag {
    fn is_set(&self) -> bool {
        unsafe { *self.value.get() }
    }
}

/// Which flag implementation the controller and worker share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Atomic,
    Plain,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Variant::Atomic => write!(f, "atomic"),
            Variant::Plain => write!(f, "plain"),
        }
    }
}

/// The one and only write handle of a shared flag.
///
/// `raise` takes `self`, so the flag can't be written twice:
///
/// ```compile_fail
/// use spin_visibility::{shared_flag, AtomicFlag};
///
/// let (writer, _reader) = shared_flag::<AtomicFlag>();
/// writer.raise();
/// writer.raise();
/// ```
///
/// And there is no other way to write it:
///
/// ```compile_fail
/// use spin_visibility::AtomicFlag;
///
/// AtomicFlag::default().set();
/// ```
pub struct FlagWriter<F: Flag> {
    flag: Arc<F>,
}

pub struct FlagReader<F: Flag> {
    flag: Arc<F>,
}

pub fn shared_flag<F: Flag>() -> (FlagWriter<F>, FlagReader<F>) {
    let a = Arc::new(F::default());
    (FlagWriter { flag: a.clone() }, FlagReader { flag: a })
}

impl<F: Flag> FlagWriter<F> {
    pub fn raise(self) {
        private::Sealed::set(&*self.flag);
    }
}

impl<F: Flag> FlagReader<F> {
    #[inline(always)]
    pub fn is_set(&self) -> bool {
        self.flag.is_set()
    }
}

impl<F: Flag> Clone for FlagReader<F> {
    fn clone(&self) -> Self {
        Self {
            flag: self.flag.clone(),
        }
    }
}
