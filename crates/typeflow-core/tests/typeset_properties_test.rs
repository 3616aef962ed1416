//! Property tests for the type-set union: the solver's determinism rests on
//! union being idempotent, commutative and associative even with container
//! descriptors merging element-wise.

use proptest::prelude::*;

use typeflow_core::types::{TypeDesc, TypeSet};

fn scalar() -> impl Strategy<Value = TypeDesc> + Clone {
    prop_oneof![
        Just(TypeDesc::None),
        Just(TypeDesc::Bool),
        Just(TypeDesc::Int),
        Just(TypeDesc::Float),
        Just(TypeDesc::Str),
        Just(TypeDesc::Bytes),
    ]
}

fn desc() -> impl Strategy<Value = TypeDesc> {
    prop_oneof![
        4 => scalar(),
        1 => prop::collection::vec(scalar(), 0..3)
            .prop_map(|v| TypeDesc::List(TypeSet::from_descs(v))),
        1 => prop::collection::vec(scalar(), 0..3)
            .prop_map(|v| TypeDesc::SetOf(TypeSet::from_descs(v))),
        1 => (
            prop::collection::vec(scalar(), 0..3),
            prop::collection::vec(scalar(), 0..3),
        )
            .prop_map(|(k, v)| TypeDesc::Dict {
                keys: TypeSet::from_descs(k),
                values: TypeSet::from_descs(v),
            }),
        1 => prop::collection::vec(
            prop::collection::vec(scalar(), 0..2).prop_map(TypeSet::from_descs),
            1..3,
        )
        .prop_map(TypeDesc::Tuple),
    ]
}

fn descs() -> impl Strategy<Value = Vec<TypeDesc>> {
    prop::collection::vec(desc(), 0..8)
}

proptest! {
    #[test]
    fn union_is_commutative(a in descs(), b in descs()) {
        let sa = TypeSet::from_descs(a);
        let sb = TypeSet::from_descs(b);
        prop_assert_eq!(sa.union(&sb), sb.union(&sa));
    }

    #[test]
    fn union_is_associative(a in descs(), b in descs(), c in descs()) {
        let sa = TypeSet::from_descs(a);
        let sb = TypeSet::from_descs(b);
        let sc = TypeSet::from_descs(c);
        prop_assert_eq!(sa.union(&sb).union(&sc), sa.union(&sb.union(&sc)));
    }

    #[test]
    fn union_is_idempotent(a in descs()) {
        let sa = TypeSet::from_descs(a);
        prop_assert_eq!(sa.union(&sa), sa);
    }

    #[test]
    fn insertion_order_is_irrelevant(a in descs()) {
        let forward = TypeSet::from_descs(a.clone());
        let mut reversed = a;
        reversed.reverse();
        prop_assert_eq!(forward, TypeSet::from_descs(reversed));
    }

    #[test]
    fn union_in_place_reports_growth_exactly(a in descs(), b in descs()) {
        let mut sa = TypeSet::from_descs(a);
        let before = sa.clone();
        let sb = TypeSet::from_descs(b);
        let grew = sa.union_in_place(&sb);
        prop_assert_eq!(grew, sa != before);
    }
}
