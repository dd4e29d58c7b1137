use core::fmt;

/// Wraps a sensitive value so it never shows up in logs.
///
/// `Debug` and `Display` always print `[REDACTED]`. The inner value is only
/// reachable through [`Secret::expose_secret`]. The type is deliberately not
/// `Clone`; share it behind an `Arc` instead.
pub struct Secret<T> {
    inner: T,
}

impl<T> Secret<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: value }
    }

    pub fn expose_secret(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}
