//! Thread-local execution modes for graph construction
//!
//! Two scoped switches affect every op built on the current thread:
//! gradient recording and half-precision autocast.

use std::cell::Cell;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
    static AUTOCAST: Cell<bool> = const { Cell::new(false) };
}

/// Restores a mode flag when dropped, so nested and panicking scopes unwind cleanly
struct ModeGuard {
    key: &'static std::thread::LocalKey<Cell<bool>>,
    previous: bool,
}

impl ModeGuard {
    fn set(key: &'static std::thread::LocalKey<Cell<bool>>, value: bool) -> Self {
        let previous = key.with(|flag| flag.replace(value));
        Self { key, previous }
    }
}

impl Drop for ModeGuard {
    fn drop(&mut self) {
        self.key.with(|flag| flag.set(self.previous));
    }
}

/// Whether ops record backward operations
pub fn grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// Whether op outputs are rounded through half precision
pub fn autocast_enabled() -> bool {
    AUTOCAST.with(Cell::get)
}

/// Run `f` without recording a backward graph
///
/// # Example
///
/// ```
/// use bucle::autograd::{no_grad, scale};
/// use bucle::Tensor;
///
/// let x = Tensor::from_vec(vec![1.0, 2.0], true);
/// let y = no_grad(|| scale(&x, 2.0));
/// assert!(y.backward_op().is_none());
/// ```
pub fn no_grad<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ModeGuard::set(&GRAD_ENABLED, false);
    f()
}

/// Run `f` with op outputs rounded to `f16` precision
pub fn autocast<R>(f: impl FnOnce() -> R) -> R {
    let _guard = ModeGuard::set(&AUTOCAST, true);
    f()
}
