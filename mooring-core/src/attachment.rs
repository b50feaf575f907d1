//! Typed attachment bag shared by the processors of a deployment unit.
use std::{
    any::{type_name, Any, TypeId},
    collections::{BTreeSet, HashMap},
    fmt,
    hash::{Hash, Hasher},
    marker::PhantomData,
};

use derive_more::{Deref, DerefMut, From, IntoIterator};

/// A typed token naming one attachment slot.
///
/// Keys are usually declared as constants:
///
/// ```
/// use mooring_core::attachment::AttachmentKey;
///
/// pub const MAIN_CLASS: AttachmentKey<String> = AttachmentKey::new("main-class");
/// ```
pub struct AttachmentKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttachmentKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: 'static> AttachmentKey<T> {
    pub fn id(&self) -> AttachmentId {
        AttachmentId {
            name: self.name,
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

impl<T> Clone for AttachmentKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttachmentKey<T> {}

impl<T> fmt::Debug for AttachmentKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AttachmentKey({}: {})", self.name, type_name::<T>())
    }
}

/// Untyped identity of an [`AttachmentKey`]: its name and value type.
#[derive(Debug, Clone, Copy, Eq)]
pub struct AttachmentId {
    name: &'static str,
    type_id: TypeId,
    type_name: &'static str,
}

impl AttachmentId {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for AttachmentId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.type_id == other.type_id
    }
}

impl Hash for AttachmentId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.type_id.hash(state);
    }
}

impl PartialOrd for AttachmentId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AttachmentId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.name, self.type_name, self.type_id).cmp(&(other.name, other.type_name, other.type_id))
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.type_name)
    }
}

/// Value type for multi-valued attachments.
#[derive(Debug, Clone, PartialEq, Eq, Deref, DerefMut, From, IntoIterator)]
pub struct AttachmentList<T>(Vec<T>);

impl<T> Default for AttachmentList<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

/// Heterogeneous map from [`AttachmentKey`] to values of the key's type.
#[derive(Default)]
pub struct Attachments {
    map: HashMap<AttachmentId, Box<dyn Any + Send + Sync>>,
    guard: Option<WriteGuard>,
}

struct WriteGuard {
    allowed: BTreeSet<AttachmentId>,
    violations: BTreeSet<AttachmentId>,
}

impl Attachments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value`, returning the previous value of the slot.
    pub fn put<T: Send + Sync + 'static>(&mut self, key: &AttachmentKey<T>, value: T) -> Option<T> {
        let id = key.id();
        if !self.may_write(id) {
            return None;
        }
        self.map
            .insert(id, Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn get<T: 'static>(&self, key: &AttachmentKey<T>) -> Option<&T> {
        self.map.get(&key.id())?.downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self, key: &AttachmentKey<T>) -> Option<&mut T> {
        let id = key.id();
        if !self.may_write(id) {
            return None;
        }
        self.map.get_mut(&id)?.downcast_mut::<T>()
    }

    pub fn remove<T: 'static>(&mut self, key: &AttachmentKey<T>) -> Option<T> {
        let id = key.id();
        if !self.may_write(id) {
            return None;
        }
        self.map
            .remove(&id)
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn contains<T: 'static>(&self, key: &AttachmentKey<T>) -> bool {
        self.map.contains_key(&key.id())
    }

    /// Append to a list attachment, creating it if needed.
    pub fn add_to_list<T: Send + Sync + 'static>(
        &mut self,
        key: &AttachmentKey<AttachmentList<T>>,
        value: T,
    ) {
        let id = key.id();
        if !self.may_write(id) {
            return;
        }
        let slot = self
            .map
            .entry(id)
            .or_insert_with(|| Box::new(AttachmentList::<T>::default()));
        if let Some(list) = slot.downcast_mut::<AttachmentList<T>>() {
            list.push(value);
        }
    }

    /// The elements of a list attachment, empty if absent.
    pub fn list<T: 'static>(&self, key: &AttachmentKey<AttachmentList<T>>) -> &[T] {
        self.get(key).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Names of the attachments present, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.map.keys().map(|id| id.name).collect();
        names.sort_unstable();
        names
    }

    /// Restrict writes to `allowed` until [`end_guard`](Self::end_guard).
    /// Writes to other keys are dropped and recorded.
    pub(crate) fn begin_guard(&mut self, allowed: impl IntoIterator<Item = AttachmentId>) {
        self.guard = Some(WriteGuard {
            allowed: allowed.into_iter().collect(),
            violations: BTreeSet::new(),
        });
    }

    /// Lift the write restriction, returning the keys written without permission.
    pub(crate) fn end_guard(&mut self) -> Vec<AttachmentId> {
        self.guard
            .take()
            .map(|g| g.violations.into_iter().collect())
            .unwrap_or_default()
    }

    fn may_write(&mut self, id: AttachmentId) -> bool {
        match self.guard.as_mut() {
            None => true,
            Some(guard) if guard.allowed.contains(&id) => true,
            Some(guard) => {
                guard.violations.insert(id);
                false
            }
        }
    }
}

impl fmt::Debug for Attachments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}
