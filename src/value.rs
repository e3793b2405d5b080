// Runtime values (spec.md §3.5). Heap-allocated via `ValueHeap`
// (value_heap.rs); `Value` is a `Copy` handle, same discipline as
// `types::Type`. The packed small-value encoding spec.md §3.5 describes
// (tag/field-count unary-encoded into the pointer's low bits) is a
// pointer-representation optimisation orthogonal to the object model
// implemented here; `Packed` stands in for it so callers can reason
// about "does this read allocate" without this crate committing to
// unsafe pointer tagging.

use crate::bytecode::CodeBlock;
use crate::heap::{Handle, HeapObject, RawId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

pub type Value = Handle<ValueData>;

#[derive(Debug)]
pub enum ValueData {
    Struct { fields: Vec<Value> },
    Union { tag: usize, arg: Value },
    Func(FuncValue),
    /// A recursive-binding forward reference; `None` until `RefDef`
    /// completes it (spec.md §3.4's RefValue/RefDef).
    Ref(Option<Value>),
    /// The runtime encoding of a `Type` erased to a first-class value
    /// (spec.md §3.5; materialised by the `Type` instruction).
    DataType { field_count: usize },
    Link(LinkValue),
    /// A small struct/union packed directly, without a further heap
    /// object for its (also-packed) contents. Reading it never
    /// allocates, matching spec.md §3.5's packed-pointer guarantee.
    Packed(PackedValue),
}

#[derive(Debug)]
pub struct FuncValue {
    pub code: Rc<CodeBlock>,
    /// Monotonic id used purely for profiling-report grouping; the
    /// runtime `Executable` itself lives in `code`.
    pub profile_base: usize,
    pub statics: Vec<Value>,
}

/// FIFO link, shared between every `Get`/`Put` that references it; a
/// `Link` runtime value is a thin handle to this shared state (spec.md
/// §3.5, §4.5's put/get synchronisation).
#[derive(Debug, Default)]
pub struct LinkValue {
    pub queue: RefCell<VecDeque<Value>>,
    /// Thread ids parked on an empty `get`, in arrival order.
    pub waiters: RefCell<VecDeque<u64>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackedValue {
    UnitStruct,
    Union { tag: usize, arg: Box<PackedValue> },
    Struct { fields: Vec<PackedValue> },
}

impl PackedValue {
    pub fn pack_struct(fields: Vec<PackedValue>) -> PackedValue {
        PackedValue::Struct { fields }
    }

    pub fn pack_union(tag: usize, arg: PackedValue) -> PackedValue {
        PackedValue::Union { tag, arg: Box::new(arg) }
    }

    /// `StructAccess` on a packed struct (spec.md §8's packed-value
    /// round-trip property): never allocates, just indexes the tree.
    pub fn struct_access(&self, i: usize) -> &PackedValue {
        match self {
            PackedValue::Struct { fields } => &fields[i],
            other => panic!("struct_access on non-struct packed value: {:?}", other),
        }
    }

    /// `UnionAccess` on a packed union, `None` on a tag mismatch (the
    /// packed analogue of `Instr::UnionAccess`'s abort).
    pub fn union_access(&self, tag: usize) -> Option<&PackedValue> {
        match self {
            PackedValue::Union { tag: t, arg } if *t == tag => Some(arg),
            _ => None,
        }
    }
}

impl HeapObject for ValueData {
    fn visit_refs(&self, visit: &mut dyn FnMut(RawId)) {
        match self {
            ValueData::Struct { fields } => {
                for f in fields {
                    visit(f.index);
                }
            }
            ValueData::Union { arg, .. } => visit(arg.index),
            ValueData::Func(f) => {
                for s in &f.statics {
                    visit(s.index);
                }
            }
            ValueData::Ref(Some(v)) => visit(v.index),
            ValueData::Ref(None) => {}
            ValueData::DataType { .. } => {}
            ValueData::Link(link) => {
                for v in link.queue.borrow().iter() {
                    visit(v.index);
                }
            }
            ValueData::Packed(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn packed_unit_struct_is_a_leaf() {
        let v = PackedValue::UnitStruct;
        assert_eq!(v, PackedValue::UnitStruct);
    }

    fn arb_packed() -> impl Strategy<Value = PackedValue> {
        let leaf = Just(PackedValue::UnitStruct);
        leaf.prop_recursive(3, 12, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(PackedValue::pack_struct),
                (0usize..4, inner).prop_map(|(tag, arg)| PackedValue::pack_union(tag, arg)),
            ]
        })
    }

    proptest! {
        #[test]
        fn packed_struct_access_round_trips(fields in prop::collection::vec(arb_packed(), 0..6)) {
            let packed = PackedValue::pack_struct(fields.clone());
            for (i, field) in fields.iter().enumerate() {
                prop_assert_eq!(packed.struct_access(i), field);
            }
        }

        #[test]
        fn packed_union_access_round_trips(tag in 0usize..8, arg in arb_packed()) {
            let packed = PackedValue::pack_union(tag, arg.clone());
            prop_assert_eq!(packed.union_access(tag), Some(&arg));
            prop_assert_eq!(packed.union_access(tag + 1), None);
        }
    }
}
