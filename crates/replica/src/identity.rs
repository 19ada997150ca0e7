//! Reference-identity equality and hashing.
//!
//! [`IdentityComparer`] treats two references as equal exactly when they denote
//! the same instance, and hashes a reference from that identity alone. A type's
//! own `PartialEq`/`Hash` (or a registered equality hook) is never consulted, so
//! a type whose hash is the constant `42` or whose equality always answers `true`
//! still gets distinct identities per instance. The copy engine keys its
//! visited map this way.

use std::{
    hash::{BuildHasher, Hash, Hasher},
    ptr,
    rc::Rc,
    sync::{Arc, LazyLock},
};

use ahash::RandomState;

use crate::heap::HeapId;

/// Fixed seeds so identity hashes agree between comparer instances and runs.
static IDENTITY_STATE: LazyLock<RandomState> = LazyLock::new(|| {
    RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
});

/// A reference with an existence-based identity.
///
/// `identity` returns `None` for the absent reference and otherwise a token
/// that is equal for two references exactly when they denote the same instance.
pub trait Identity {
    fn identity(&self) -> Option<usize>;
}

impl Identity for HeapId {
    #[inline]
    fn identity(&self) -> Option<usize> {
        Some(self.index())
    }
}

impl<T: ?Sized> Identity for Rc<T> {
    #[inline]
    fn identity(&self) -> Option<usize> {
        Some(Rc::as_ptr(self).cast::<()>().addr())
    }
}

impl<T: ?Sized> Identity for Arc<T> {
    #[inline]
    fn identity(&self) -> Option<usize> {
        Some(Arc::as_ptr(self).cast::<()>().addr())
    }
}

/// Identity of the referenced place.
impl<T: ?Sized> Identity for &T {
    #[inline]
    fn identity(&self) -> Option<usize> {
        Some(ptr::from_ref::<T>(*self).cast::<()>().addr())
    }
}

impl<T: Identity> Identity for Option<T> {
    #[inline]
    fn identity(&self) -> Option<usize> {
        self.as_ref().and_then(Identity::identity)
    }
}

/// Equality and hashing by reference identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityComparer;

impl IdentityComparer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// True iff both references denote the same instance. Two absent
    /// references are equal; absent never equals a present reference.
    #[inline]
    pub fn equals<I: Identity + ?Sized>(&self, a: &I, b: &I) -> bool {
        a.identity() == b.identity()
    }

    /// Hash derived only from the reference's identity, stable for the
    /// lifetime of the instance.
    #[inline]
    pub fn hash<I: Identity + ?Sized>(&self, value: &I) -> u64 {
        fixed_hash(value.identity())
    }
}

/// Hashes with the fixed-seed state shared by every comparer.
pub(crate) fn fixed_hash<H: Hash>(value: H) -> u64 {
    BuildHasher::hash_one(&*IDENTITY_STATE, value)
}

/// Shorthand for [`IdentityComparer::equals`].
#[inline]
pub fn identity_equals<I: Identity + ?Sized>(a: &I, b: &I) -> bool {
    IdentityComparer.equals(a, b)
}

/// Shorthand for [`IdentityComparer::hash`].
#[inline]
pub fn identity_hash<I: Identity + ?Sized>(value: &I) -> u64 {
    IdentityComparer.hash(value)
}

/// Map key whose `Hash` and `Eq` are those of [`IdentityComparer`].
#[derive(Debug, Clone, Copy)]
pub struct IdentityKey<K>(pub K);

impl<K> IdentityKey<K> {
    pub fn new(key: K) -> Self {
        Self(key)
    }

    pub fn into_inner(self) -> K {
        self.0
    }
}

impl<K: Identity> PartialEq for IdentityKey<K> {
    fn eq(&self, other: &Self) -> bool {
        identity_equals(&self.0, &other.0)
    }
}

impl<K: Identity> Eq for IdentityKey<K> {}

impl<K: Identity> Hash for IdentityKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(identity_hash(&self.0));
    }
}

/// Hash map keyed by reference identity.
pub type IdentityMap<K, V> = hashbrown::HashMap<IdentityKey<K>, V>;

/// Hash set of references, compared by identity.
pub type IdentitySet<K> = hashbrown::HashSet<IdentityKey<K>>;
