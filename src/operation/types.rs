//! Operation kind and resource release policy.

/// Kind of transfer a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationKind {
    /// Read from the descriptor into the request buffer
    Read = 0,
    /// Write the request buffer to the descriptor
    Write = 1,
}

impl OperationKind {
    /// Returns true if the kernel fills the buffer.
    #[inline]
    pub const fn is_read(self) -> bool {
        matches!(self, Self::Read)
    }

    /// Returns true if the callback is mandatory for this kind.
    ///
    /// A read with nobody to hand the data to is a contract violation; a write
    /// may be fire-and-forget.
    #[inline]
    pub const fn requires_callback(self) -> bool {
        matches!(self, Self::Read)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// What happens to a request's descriptor once its completion is dispatched.
///
/// The buffer is always engine-owned and always freed after dispatch; the
/// policy only decides whether the descriptor is closed with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleasePolicy {
    /// The engine opened the descriptor and closes it after the callback.
    OneShot,
    /// The caller owns the descriptor and keeps it open.
    Retain,
}

impl std::fmt::Display for ReleasePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneShot => write!(f, "one-shot"),
            Self::Retain => write!(f, "retain"),
        }
    }
}
