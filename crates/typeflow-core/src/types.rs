//! Abstract type/value descriptors and the immutable-merge set over them.
//!
//! A [`TypeSet`] holds every runtime abstraction observed for one binding
//! site. Union is idempotent, commutative and associative; container-like
//! descriptors do not accumulate side by side but merge element-wise, so two
//! partial observations of a dict's keys and values combine instead of
//! replacing each other. The set keeps at most one descriptor per container
//! kind (per arity, for tuples), which is what makes the merge order
//! independent.

use std::collections::BTreeSet;

use crate::analyzer::values::{ClassId, FunctionId};

/// Recognized builtin descriptor values used by decorator classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DescriptorKind {
    Property,
    StaticMethod,
    ClassMethod,
    AbstractMethod,
    AbstractStaticMethod,
    AbstractClassMethod,
    AbstractProperty,
}

/// Builtin modules the engine recognizes by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BuiltinModule {
    Abc,
}

/// One abstract value descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeDesc {
    None,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    /// The class object itself.
    Class(ClassId),
    /// An instance of a class.
    Instance(ClassId),
    /// A function value (canonical identity, not a call context).
    Function(FunctionId),
    Descriptor(DescriptorKind),
    Module(BuiltinModule),
    List(TypeSet),
    SetOf(TypeSet),
    Tuple(Vec<TypeSet>),
    Dict {
        keys: TypeSet,
        values: TypeSet,
    },
    /// Generator-protocol annotation value, e.g. `Generator[int, str, None]`.
    Generator {
        yields: TypeSet,
        sends: TypeSet,
        returns: TypeSet,
    },
}

/// Set of abstract value descriptors with element-wise container merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeSet(BTreeSet<TypeDesc>);

impl TypeSet {
    pub fn new() -> Self {
        TypeSet(BTreeSet::new())
    }

    pub fn of(desc: TypeDesc) -> Self {
        let mut set = TypeSet::new();
        set.insert(desc);
        set
    }

    pub fn from_descs(descs: impl IntoIterator<Item = TypeDesc>) -> Self {
        let mut set = TypeSet::new();
        for desc in descs {
            set.insert(desc);
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDesc> {
        self.0.iter()
    }

    pub fn contains(&self, desc: &TypeDesc) -> bool {
        self.0.contains(desc)
    }

    /// Function identities contained in the set, in canonical order.
    pub fn functions(&self) -> impl Iterator<Item = FunctionId> + '_ {
        self.0.iter().filter_map(|d| match d {
            TypeDesc::Function(f) => Some(*f),
            _ => None,
        })
    }

    /// Insert one descriptor, merging container kinds element-wise.
    /// Returns whether the set actually changed.
    pub fn insert(&mut self, desc: TypeDesc) -> bool {
        match desc {
            TypeDesc::List(elems) => self.merge_in(
                |d| matches!(d, TypeDesc::List(_)),
                TypeDesc::List(elems),
                |existing, incoming| match (existing, incoming) {
                    (TypeDesc::List(a), TypeDesc::List(b)) => TypeDesc::List(a.union(&b)),
                    _ => unreachable!(),
                },
            ),
            TypeDesc::SetOf(elems) => self.merge_in(
                |d| matches!(d, TypeDesc::SetOf(_)),
                TypeDesc::SetOf(elems),
                |existing, incoming| match (existing, incoming) {
                    (TypeDesc::SetOf(a), TypeDesc::SetOf(b)) => TypeDesc::SetOf(a.union(&b)),
                    _ => unreachable!(),
                },
            ),
            TypeDesc::Tuple(slots) => {
                let arity = slots.len();
                self.merge_in(
                    move |d| matches!(d, TypeDesc::Tuple(s) if s.len() == arity),
                    TypeDesc::Tuple(slots),
                    |existing, incoming| match (existing, incoming) {
                        (TypeDesc::Tuple(a), TypeDesc::Tuple(b)) => TypeDesc::Tuple(
                            a.iter().zip(b).map(|(x, y)| x.union(&y)).collect(),
                        ),
                        _ => unreachable!(),
                    },
                )
            }
            TypeDesc::Dict { keys, values } => self.merge_in(
                |d| matches!(d, TypeDesc::Dict { .. }),
                TypeDesc::Dict { keys, values },
                |existing, incoming| match (existing, incoming) {
                    (
                        TypeDesc::Dict { keys: ka, values: va },
                        TypeDesc::Dict { keys: kb, values: vb },
                    ) => TypeDesc::Dict {
                        keys: ka.union(&kb),
                        values: va.union(&vb),
                    },
                    _ => unreachable!(),
                },
            ),
            TypeDesc::Generator {
                yields,
                sends,
                returns,
            } => self.merge_in(
                |d| matches!(d, TypeDesc::Generator { .. }),
                TypeDesc::Generator {
                    yields,
                    sends,
                    returns,
                },
                |existing, incoming| match (existing, incoming) {
                    (
                        TypeDesc::Generator {
                            yields: ya,
                            sends: sa,
                            returns: ra,
                        },
                        TypeDesc::Generator {
                            yields: yb,
                            sends: sb,
                            returns: rb,
                        },
                    ) => TypeDesc::Generator {
                        yields: ya.union(&yb),
                        sends: sa.union(&sb),
                        returns: ra.union(&rb),
                    },
                    _ => unreachable!(),
                },
            ),
            other => self.0.insert(other),
        }
    }

    fn merge_in<F, M>(&mut self, matches: F, incoming: TypeDesc, merge: M) -> bool
    where
        F: Fn(&TypeDesc) -> bool,
        M: FnOnce(TypeDesc, TypeDesc) -> TypeDesc,
    {
        if let Some(existing) = self.0.iter().find(|d| matches(d)).cloned() {
            let merged = merge(existing.clone(), incoming);
            if merged == existing {
                return false;
            }
            self.0.remove(&existing);
            self.0.insert(merged);
            true
        } else {
            self.0.insert(incoming)
        }
    }

    /// Union `other` into `self`; returns whether `self` grew.
    pub fn union_in_place(&mut self, other: &TypeSet) -> bool {
        let mut grew = false;
        for desc in other.iter() {
            grew |= self.insert(desc.clone());
        }
        grew
    }

    /// Immutable merge of two sets.
    pub fn union(&self, other: &TypeSet) -> TypeSet {
        let mut result = self.clone();
        result.union_in_place(other);
        result
    }

    /// Split the generator-protocol component from the residual descriptors.
    ///
    /// The canonical form keeps at most one generator descriptor, so the
    /// protocol side is the channel triple of that descriptor if present.
    pub fn split_generator(&self) -> (Option<(TypeSet, TypeSet, TypeSet)>, TypeSet) {
        let mut protocol = None;
        let mut residual = TypeSet::new();
        for desc in self.iter() {
            match desc {
                TypeDesc::Generator {
                    yields,
                    sends,
                    returns,
                } => {
                    protocol = Some((yields.clone(), sends.clone(), returns.clone()));
                }
                other => {
                    residual.insert(other.clone());
                }
            }
        }
        (protocol, residual)
    }
}

impl FromIterator<TypeDesc> for TypeSet {
    fn from_iter<I: IntoIterator<Item = TypeDesc>>(iter: I) -> Self {
        TypeSet::from_descs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_dict() -> TypeDesc {
        TypeDesc::Dict {
            keys: TypeSet::of(TypeDesc::Int),
            values: TypeSet::new(),
        }
    }

    fn untyped_dict() -> TypeDesc {
        TypeDesc::Dict {
            keys: TypeSet::new(),
            values: TypeSet::new(),
        }
    }

    #[test]
    fn test_union_is_idempotent() {
        let mut set = TypeSet::of(TypeDesc::Int);
        assert!(!set.insert(TypeDesc::Int));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_dict_merge_is_symmetric() {
        let mut untyped_then_typed = TypeSet::new();
        untyped_then_typed.insert(untyped_dict());
        untyped_then_typed.insert(int_dict());

        let mut typed_then_untyped = TypeSet::new();
        typed_then_untyped.insert(int_dict());
        typed_then_untyped.insert(untyped_dict());

        assert_eq!(untyped_then_typed, typed_then_untyped);
        assert_eq!(untyped_then_typed.len(), 1);
        assert!(untyped_then_typed.contains(&int_dict()));
    }

    #[test]
    fn test_dict_merge_combines_slots() {
        let mut set = TypeSet::of(TypeDesc::Dict {
            keys: TypeSet::of(TypeDesc::Int),
            values: TypeSet::of(TypeDesc::Str),
        });
        set.insert(TypeDesc::Dict {
            keys: TypeSet::of(TypeDesc::Str),
            values: TypeSet::new(),
        });
        assert_eq!(set.len(), 1);
        assert!(set.contains(&TypeDesc::Dict {
            keys: TypeSet::from_descs([TypeDesc::Int, TypeDesc::Str]),
            values: TypeSet::of(TypeDesc::Str),
        }));
    }

    #[test]
    fn test_tuples_merge_per_arity() {
        let mut set = TypeSet::of(TypeDesc::Tuple(vec![TypeSet::of(TypeDesc::Int)]));
        set.insert(TypeDesc::Tuple(vec![
            TypeSet::of(TypeDesc::Int),
            TypeSet::of(TypeDesc::Str),
        ]));
        set.insert(TypeDesc::Tuple(vec![TypeSet::of(TypeDesc::Str)]));

        // One two-slot tuple, one merged one-slot tuple.
        assert_eq!(set.len(), 2);
        assert!(set.contains(&TypeDesc::Tuple(vec![TypeSet::from_descs([
            TypeDesc::Int,
            TypeDesc::Str
        ])])));
    }

    #[test]
    fn test_insert_reports_growth() {
        let mut set = TypeSet::new();
        assert!(set.insert(TypeDesc::Int));
        assert!(!set.insert(TypeDesc::Int));
        assert!(set.insert(TypeDesc::Str));
    }

    #[test]
    fn test_split_generator() {
        let mut set = TypeSet::of(TypeDesc::Generator {
            yields: TypeSet::of(TypeDesc::Int),
            sends: TypeSet::of(TypeDesc::Str),
            returns: TypeSet::of(TypeDesc::None),
        });
        set.insert(TypeDesc::Bool);

        let (protocol, residual) = set.split_generator();
        let (yields, sends, returns) = protocol.expect("generator component");
        assert!(yields.contains(&TypeDesc::Int));
        assert!(sends.contains(&TypeDesc::Str));
        assert!(returns.contains(&TypeDesc::None));
        assert_eq!(residual, TypeSet::of(TypeDesc::Bool));
    }
}
