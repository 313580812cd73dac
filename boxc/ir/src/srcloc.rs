//! Source locations.
//!
//! A `SrcLoc` is an opaque byte offset into the source of the compilation
//! unit. The IR does not interpret it; the compiler stamps the current
//! location while emitting, and diagnostics-side code maps offsets back to
//! line/column when needed.

use core::fmt;

/// A source location attached to emitted instructions.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct SrcLoc(u32);

impl SrcLoc {
    /// An unknown location.
    pub fn default_loc() -> Self {
        Self(u32::MAX)
    }

    /// A location at the given byte offset.
    pub fn new(offset: u32) -> Self {
        Self(offset)
    }

    /// The byte offset, if known.
    pub fn offset(self) -> Option<u32> {
        if self.is_default() {
            None
        } else {
            Some(self.0)
        }
    }

    /// Whether this is the unknown location.
    pub fn is_default(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for SrcLoc {
    fn default() -> Self {
        Self::default_loc()
    }
}

impl fmt::Display for SrcLoc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_default() {
            write!(f, "@?")
        } else {
            write!(f, "@{}", self.0)
        }
    }
}
