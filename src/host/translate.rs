/*!
 * Native Error Translation
 *
 * Folds native platform codes into POSIX classifications at the boundary
 * where they occur.
 */

use crate::core::errors::CompatError;
use ahash::AHashMap;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};

/// Untranslated platform error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeError(pub i32);

impl NativeError {
    #[inline]
    pub fn code(&self) -> i32 {
        self.0
    }
}

impl From<Errno> for NativeError {
    fn from(errno: Errno) -> Self {
        Self(errno as i32)
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native error {}", self.0)
    }
}

/// Native code → POSIX errno mapping
pub trait ErrorTranslator: Send + Sync {
    /// POSIX errno for a native code; 0 stays 0
    fn translate_code(&self, native: NativeError) -> i32;

    /// Classified error for a native code
    fn translate(&self, native: NativeError) -> CompatError {
        CompatError::from_translated(self.translate_code(native), native.code())
    }
}

/// Identity translation for hosts whose native codes already are errnos
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrnoTranslator;

impl ErrorTranslator for ErrnoTranslator {
    #[inline]
    fn translate_code(&self, native: NativeError) -> i32 {
        native.code()
    }
}

/// Table-driven translation for hosts with their own code space
///
/// Codes at or above the passthrough base are kept verbatim rather than being
/// collapsed to EINVAL, so newer host codes stay distinguishable.
#[derive(Debug, Clone, Default)]
pub struct TableTranslator {
    entries: AHashMap<i32, i32>,
    passthrough_base: Option<i32>,
}

impl TableTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = (i32, Errno)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(native, errno)| (native, errno as i32))
                .collect(),
            passthrough_base: None,
        }
    }

    pub fn with_passthrough_base(mut self, base: i32) -> Self {
        self.passthrough_base = Some(base);
        self
    }

    pub fn insert(&mut self, native: i32, errno: Errno) {
        self.entries.insert(native, errno as i32);
    }
}

impl ErrorTranslator for TableTranslator {
    fn translate_code(&self, native: NativeError) -> i32 {
        let code = native.code();
        if code == 0 {
            return 0;
        }
        if let Some(&errno) = self.entries.get(&code) {
            return errno;
        }
        match self.passthrough_base {
            Some(base) if code >= base => code,
            _ => Errno::EINVAL as i32,
        }
    }
}
