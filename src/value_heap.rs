// Runtime value heap (spec.md §4.4): an instantiation of heap.rs's
// generic incremental collector, parallel to types.rs's use of the
// same engine over `TypeData` (see heap.rs's module comment).

use crate::config::Config;
use crate::heap::Heap;
use crate::value::{Value, ValueData};

pub struct ValueHeap {
    heap: Heap<ValueData>,
    /// Invoked when an object is finalised, so a `Func`'s executable
    /// refcount can be dropped (spec.md §4.4: "free-list processing
    /// calls each value's on_free hook").
    on_free: Box<dyn FnMut(&ValueData)>,
}

impl ValueHeap {
    /// `config.gc_generations` caps how many old generations this heap
    /// keeps before a cycle is forced to retraverse all of them (spec.md
    /// §4.4's host-tunable generation cap; see heap.rs's `Heap::new`).
    pub fn new(config: &Config) -> ValueHeap {
        ValueHeap { heap: Heap::new(config.gc_generations), on_free: Box::new(|_| {}) }
    }

    pub fn set_on_free(&mut self, f: impl FnMut(&ValueData) + 'static) {
        self.on_free = Box::new(f);
    }

    pub fn new_value(&mut self, data: ValueData) -> Value {
        let handle = self.heap.allocate(data, &mut *self.on_free);
        let mut children = Vec::new();
        self.heap.get(handle).visit_refs(&mut |id| children.push(id));
        for child_raw in children {
            let child = self.heap.raw_to_handle(child_raw);
            self.heap.add_ref(handle, child);
        }
        handle
    }

    pub fn get(&self, v: Value) -> &ValueData {
        self.heap.get(v)
    }

    pub fn get_mut(&mut self, v: Value) -> &mut ValueData {
        self.heap.get_mut(v)
    }

    pub fn retain(&mut self, v: Value) {
        self.heap.retain(v);
    }

    pub fn release(&mut self, v: Value) {
        self.heap.release(v, &mut *self.on_free);
    }

    pub fn add_ref(&mut self, src: Value, dst: Value) {
        self.heap.add_ref(src, dst);
    }

    /// One unit of incremental work, performed once per `Call`/field
    /// access the way spec.md §4.4 mandates ("GC traverses one pending
    /// object per allocation") — the interpreter's dispatch loop drives
    /// this directly rather than relying solely on `new_value`'s
    /// implicit increment, so long-running threads that allocate
    /// nothing still make sweep progress.
    pub fn gc_increment(&mut self) {
        self.heap.gc_increment(&mut *self.on_free);
    }

    pub fn full_gc(&mut self) {
        self.heap.full_gc(&mut *self.on_free);
    }

    pub fn live_count(&self) -> usize {
        self.heap.live_count()
    }
}

impl Default for ValueHeap {
    fn default() -> Self {
        ValueHeap::new(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueData;

    #[test]
    fn struct_fields_keep_each_other_alive() {
        let mut heap = ValueHeap::new(&Config::default());
        let field = heap.new_value(ValueData::DataType { field_count: 0 });
        let parent = heap.new_value(ValueData::Struct { fields: vec![field] });
        heap.release(field);
        heap.full_gc();
        assert!(matches!(heap.get(parent), ValueData::Struct { .. }));
        assert_eq!(heap.live_count(), 1);
    }
}
