/*!
 * Interest Sets
 *
 * Fixed-capacity descriptor sets shaped like the host's `fd_set`: an
 * ordered array of at most `FD_SETSIZE` distinct handles.
 */

use crate::core::errors::CompatResult;
use crate::core::limits::FD_SETSIZE;
use crate::core::types::RawHandle;

/// One interest set
///
/// Inserting a handle that is already present is a no-op and inserting into
/// a full set is silently dropped, as the host's `FD_SET` does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FdSet {
    handles: Vec<RawHandle>,
}

impl FdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty set with its full capacity reserved up front
    pub fn try_with_capacity() -> CompatResult<Self> {
        let mut handles = Vec::new();
        handles.try_reserve_exact(FD_SETSIZE)?;
        Ok(Self { handles })
    }

    pub fn from_handles(handles: impl IntoIterator<Item = RawHandle>) -> Self {
        let mut set = Self::new();
        for handle in handles {
            set.insert(handle);
        }
        set
    }

    /// Add a handle; returns `true` if the set changed
    pub fn insert(&mut self, handle: RawHandle) -> bool {
        if self.contains(handle) || self.is_full() {
            return false;
        }
        self.handles.push(handle);
        true
    }

    /// Remove a handle, keeping the order of the rest
    pub fn remove(&mut self, handle: RawHandle) -> bool {
        match self.handles.iter().position(|&h| h == handle) {
            Some(index) => {
                self.handles.remove(index);
                true
            }
            None => false,
        }
    }

    #[inline]
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.handles.contains(&handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.handles.len() >= FD_SETSIZE
    }

    pub fn clear(&mut self) {
        self.handles.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = RawHandle> + '_ {
        self.handles.iter().copied()
    }

    pub fn as_slice(&self) -> &[RawHandle] {
        &self.handles
    }

    pub fn retain(&mut self, keep: impl FnMut(&RawHandle) -> bool) {
        self.handles.retain(keep);
    }

    /// Move every handle matching `predicate` into `dst`
    ///
    /// Moved handles leave `self` even when `dst` is full or already holds
    /// them. Returns the size of `dst` afterwards.
    pub fn extract_into(
        &mut self,
        dst: &mut FdSet,
        mut predicate: impl FnMut(RawHandle) -> bool,
    ) -> usize {
        let mut index = 0;
        while index < self.handles.len() {
            let handle = self.handles[index];
            if predicate(handle) {
                dst.insert(handle);
                self.handles.remove(index);
            } else {
                index += 1;
            }
        }
        dst.len()
    }

    /// Move every handle into `dst`
    pub fn drain_into(&mut self, dst: &mut FdSet) -> usize {
        self.extract_into(dst, |_| true)
    }
}

impl FromIterator<RawHandle> for FdSet {
    fn from_iter<I: IntoIterator<Item = RawHandle>>(iter: I) -> Self {
        Self::from_handles(iter)
    }
}

/// The (read, write, except) triple handed to one multiplexing call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectSets {
    pub read: FdSet,
    pub write: FdSet,
    pub except: FdSet,
}

impl SelectSets {
    pub fn new(read: FdSet, write: FdSet, except: FdSet) -> Self {
        Self { read, write, except }
    }

    /// Total membership across the three sets
    pub fn len(&self) -> usize {
        self.read.len() + self.write.len() + self.except.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest single set, the effective descriptor count for a native poll
    pub fn max_len(&self) -> usize {
        self.read.len().max(self.write.len()).max(self.except.len())
    }

    pub fn clear(&mut self) {
        self.read.clear();
        self.write.clear();
        self.except.clear();
    }
}
