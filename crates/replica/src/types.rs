//! Runtime type descriptors: the member-enumeration capability of the heap.
//!
//! Rust has no runtime reflection, so every object type a heap can hold is
//! described up front by a [`TypeDescriptor`] and registered in the heap's
//! [`TypeRegistry`]. Registration flattens the inheritance chain into an ordered
//! list of [`Accessor`]s: base-type fields first (private ones included), then the
//! type's own fields. Computed members have no storage of their own and only act
//! as aliases for a backing field, so they never appear in the accessor list.

use std::fmt;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{error::TypeError, heap::Object, value::Value};

/// Identifier of a registered type, local to one [`TypeRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ClassId(usize);

impl ClassId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

/// A member as declared on a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    /// Instance state with its own storage slot.
    Field { name: String, visibility: Visibility },
    /// Derived member without storage; reads and writes go to `backing`.
    Computed { name: String, backing: String },
}

impl MemberDescriptor {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field { name, .. } | Self::Computed { name, .. } => name,
        }
    }
}

/// Custom equality a type may define in place of identity equality.
pub type EqualityHook = fn(&Object, &Object) -> bool;

/// Custom hash a type may define in place of the identity hash.
pub type HashHook = fn(&Object) -> u64;

/// Declaration of an object type.
///
/// Built with a small builder API and handed to [`TypeRegistry::register`]:
///
/// ```
/// use replica::{TypeDescriptor, TypeRegistry};
///
/// let mut types = TypeRegistry::new();
/// let point = types
///     .register(TypeDescriptor::new("Point").field("x").field("y"))
///     .unwrap();
/// assert_eq!(types.accessors(point).len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    base: Option<ClassId>,
    members: Vec<MemberDescriptor>,
    immutable: bool,
    constructor_only: bool,
    equality: Option<EqualityHook>,
    hash: Option<HashHook>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            members: Vec::new(),
            immutable: false,
            constructor_only: false,
            equality: None,
            hash: None,
        }
    }

    /// Declares `base` as the parent type; its members are inherited.
    #[must_use]
    pub fn extends(mut self, base: ClassId) -> Self {
        self.base = Some(base);
        self
    }

    /// Adds a public stored field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberDescriptor::Field {
            name: name.into(),
            visibility: Visibility::Public,
        });
        self
    }

    /// Adds a private stored field.
    #[must_use]
    pub fn private_field(mut self, name: impl Into<String>) -> Self {
        self.members.push(MemberDescriptor::Field {
            name: name.into(),
            visibility: Visibility::Private,
        });
        self
    }

    /// Adds a computed member that reads and writes the field `backing`.
    #[must_use]
    pub fn computed(mut self, name: impl Into<String>, backing: impl Into<String>) -> Self {
        self.members.push(MemberDescriptor::Computed {
            name: name.into(),
            backing: backing.into(),
        });
        self
    }

    /// Marks instances as immutable, hence safe to share instead of copying.
    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Refuses raw (constructor-less) allocation of instances.
    #[must_use]
    pub fn constructor_only(mut self) -> Self {
        self.constructor_only = true;
        self
    }

    #[must_use]
    pub fn with_equality(mut self, hook: EqualityHook) -> Self {
        self.equality = Some(hook);
        self
    }

    #[must_use]
    pub fn with_hash(mut self, hook: HashHook) -> Self {
        self.hash = Some(hook);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn base(&self) -> Option<ClassId> {
        self.base
    }

    /// Members declared on this type, not including inherited ones.
    #[must_use]
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    #[must_use]
    pub fn is_immutable(&self) -> bool {
        self.immutable
    }

    #[must_use]
    pub fn is_constructor_only(&self) -> bool {
        self.constructor_only
    }

    #[must_use]
    pub fn equality(&self) -> Option<EqualityHook> {
        self.equality
    }

    #[must_use]
    pub fn hash(&self) -> Option<HashHook> {
        self.hash
    }
}

/// Getter/setter pair for one stored field of a registered type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accessor {
    name: String,
    visibility: Visibility,
    declared_in: ClassId,
    slot: usize,
}

impl Accessor {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The type that declared the field (a base type for inherited fields).
    #[must_use]
    pub fn declared_in(&self) -> ClassId {
        self.declared_in
    }

    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Reads the field from an instance of the declaring type or one of its subtypes.
    #[must_use]
    pub fn get<'o>(&self, object: &'o Object) -> Option<&'o Value> {
        object.slots().get(self.slot)
    }

    /// Writes the field, returning the previous value.
    pub fn set(&self, object: &mut Object, value: Value) -> Option<Value> {
        object
            .slots_mut()
            .get_mut(self.slot)
            .map(|slot| std::mem::replace(slot, value))
    }
}

#[derive(Debug, Clone)]
struct RegisteredType {
    descriptor: TypeDescriptor,
    accessors: Vec<Accessor>,
    /// Member name to slot, most-derived declaration winning; computed members
    /// map to their backing slot.
    slots_by_name: AHashMap<String, usize>,
}

/// All types known to one heap.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<RegisteredType>,
    by_name: IndexMap<String, ClassId>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type, flattening its base chain into the accessor list.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> Result<ClassId, TypeError> {
        if self.by_name.contains_key(descriptor.name()) {
            return Err(TypeError::DuplicateType(descriptor.name().to_owned()));
        }

        let (mut accessors, mut slots_by_name) = match descriptor.base() {
            Some(base) => {
                let Some(parent) = self.types.get(base.index()) else {
                    return Err(TypeError::UnknownBase {
                        type_name: descriptor.name().to_owned(),
                        base,
                    });
                };
                (parent.accessors.clone(), parent.slots_by_name.clone())
            }
            None => (Vec::new(), AHashMap::new()),
        };

        let id = ClassId(self.types.len());
        let mut declared: Vec<&str> = Vec::with_capacity(descriptor.members().len());
        for member in descriptor.members() {
            if declared.contains(&member.name()) {
                return Err(TypeError::DuplicateMember {
                    type_name: descriptor.name().to_owned(),
                    member: member.name().to_owned(),
                });
            }
            declared.push(member.name());

            if let MemberDescriptor::Field { name, visibility } = member {
                let slot = accessors.len();
                accessors.push(Accessor {
                    name: name.clone(),
                    visibility: *visibility,
                    declared_in: id,
                    slot,
                });
                slots_by_name.insert(name.clone(), slot);
            }
        }

        // computed members resolve after all fields so they may alias any of them
        for member in descriptor.members() {
            if let MemberDescriptor::Computed { name, backing } = member {
                let Some(&slot) = slots_by_name.get(backing) else {
                    return Err(TypeError::UnknownBacking {
                        type_name: descriptor.name().to_owned(),
                        member: name.clone(),
                        backing: backing.clone(),
                    });
                };
                slots_by_name.insert(name.clone(), slot);
            }
        }

        self.by_name.insert(descriptor.name().to_owned(), id);
        self.types.push(RegisteredType {
            descriptor,
            accessors,
            slots_by_name,
        });
        Ok(id)
    }

    /// Returns the descriptor of a registered type.
    ///
    /// # Panics
    /// Panics if `class` was issued by a different registry.
    #[must_use]
    pub fn get(&self, class: ClassId) -> &TypeDescriptor {
        &self.registered(class).descriptor
    }

    #[must_use]
    pub fn try_get(&self, class: ClassId) -> Option<&TypeDescriptor> {
        self.types.get(class.index()).map(|registered| &registered.descriptor)
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    #[must_use]
    pub fn name(&self, class: ClassId) -> &str {
        self.get(class).name()
    }

    /// Every stored field of `class`, inherited ones first, in slot order.
    #[must_use]
    pub fn accessors(&self, class: ClassId) -> &[Accessor] {
        &self.registered(class).accessors
    }

    /// Number of storage slots an instance of `class` holds.
    #[must_use]
    pub fn slot_count(&self, class: ClassId) -> usize {
        self.accessors(class).len()
    }

    /// Resolves a field or computed member name to its storage slot.
    #[must_use]
    pub fn resolve_member(&self, class: ClassId, name: &str) -> Option<usize> {
        self.registered(class).slots_by_name.get(name).copied()
    }

    /// Returns true if `class` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subtype(&self, class: ClassId, ancestor: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.try_get(candidate).and_then(TypeDescriptor::base);
        }
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &TypeDescriptor)> {
        self.by_name.values().map(|&id| (id, self.get(id)))
    }

    fn registered(&self, class: ClassId) -> &RegisteredType {
        self.types
            .get(class.index())
            .expect("TypeRegistry: class not registered in this registry")
    }
}
