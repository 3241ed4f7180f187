//! Densely numbered entity references.
//!
//! MIR functions need to reference other entities — virtual
//! registers, basic blocks, other functions — from instruction
//! operands. Rather than using Rust references (which fight the
//! ownership model once a function's instruction vector grows and
//! shrinks under optimization) every such reference is a newtype
//! wrapping a `u32` index into a table owned by the function. This
//! module provides the `EntityRef` trait, the `entity_impl!` macro
//! that implements it (plus `Display`, `Debug`, ordering, and
//! `index()`/`new()`) for a given newtype, and the `PrimaryMap` /
//! `SecondaryMap` containers built on top of it.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A type that can be used as a dense index into an entity map.
pub trait EntityRef: Copy + Eq {
    fn new(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Implements [`EntityRef`] (and the common derived traits) for a
/// tuple newtype wrapping `u32`.
///
/// ```ignore
/// pub struct Reg(u32);
/// entity_impl!(Reg, "r");
/// ```
#[macro_export]
macro_rules! entity_impl {
    ($entity:ident, $display_prefix:expr) => {
        impl $crate::EntityRef for $entity {
            fn new(index: usize) -> Self {
                debug_assert!(index < (u32::MAX as usize));
                $entity(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl ::std::fmt::Display for $entity {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(f, concat!($display_prefix, "{}"), self.0)
            }
        }

        impl ::std::fmt::Debug for $entity {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                (self as &dyn ::std::fmt::Display).fmt(f)
            }
        }
    };
    ($entity:ident) => {
        entity_impl!($entity, "");
    };
}

/// A mapping `K -> V` for densely indexed entity references, which
/// also serves as the allocator for `K` values: `push` returns the
/// key that was just allocated.
#[derive(Debug, Clone)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    pub fn new() -> Self {
        PrimaryMap { elems: Vec::new(), unused: PhantomData }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PrimaryMap { elems: Vec::with_capacity(capacity), unused: PhantomData }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// Allocate a new entity and return its key.
    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len());
        self.elems.push(value);
        key
    }

    pub fn get(&self, k: K) -> Option<&V> {
        self.elems.get(k.index())
    }

    pub fn get_mut(&mut self, k: K) -> Option<&mut V> {
        self.elems.get_mut(k.index())
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        (0..self.elems.len()).map(K::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (K, &mut V)> {
        self.elems.iter_mut().enumerate().map(|(i, v)| (K::new(i), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.elems.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.elems.iter_mut()
    }

    pub fn last_key(&self) -> Option<K> {
        if self.elems.is_empty() {
            None
        } else {
            Some(K::new(self.elems.len() - 1))
        }
    }
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, k: K) -> &V {
        &self.elems[k.index()]
    }
}

impl<K: EntityRef, V> IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, k: K) -> &mut V {
        &mut self.elems[k.index()]
    }
}

/// A mapping `K -> V` over the dense index space that does not
/// allocate keys itself; unlike `PrimaryMap` every key is considered
/// present from the start, backed by a `default` value.
///
/// Used for analyses that annotate an existing entity space — e.g.
/// per-virtual-register liveness or per-block visited flags — without
/// owning the space itself.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K: EntityRef, V: Clone> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone> SecondaryMap<K, V> {
    pub fn with_default(default: V) -> Self {
        SecondaryMap { elems: Vec::new(), default, unused: PhantomData }
    }

    pub fn get(&self, k: K) -> &V {
        self.elems.get(k.index()).unwrap_or(&self.default)
    }

    pub fn set(&mut self, k: K, value: V) {
        let idx = k.index();
        if idx >= self.elems.len() {
            self.elems.resize(idx + 1, self.default.clone());
        }
        self.elems[idx] = value;
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn clear(&mut self) {
        self.elems.clear();
    }
}

impl<K: EntityRef, V: Clone> Index<K> for SecondaryMap<K, V> {
    type Output = V;
    fn index(&self, k: K) -> &V {
        self.get(k)
    }
}
