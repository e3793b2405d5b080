// Generic incremental mark/sweep heap core shared by the type heap
// (spec.md §4.1) and the value heap (spec.md §4.4) — the original
// implementation backs both its type heap and its value heap with the
// same heap.c, and this module is grounded directly on its heap.h API
// shape: new(refs, on_free), new_object, retain, release, add_ref,
// full_gc.
//
// Objects live in a slab (`slots`). A `Handle<T>` is a generational index
// into that slab so that a freed-and-reused slot can't be mistaken for
// the object that used to live there.

use std::collections::VecDeque;
use std::marker::PhantomData;

/// Implemented by the payload type stored on a `Heap`. `visit_refs` must
/// call `visit` once for every outgoing reference the object holds,
/// exactly as many times as it holds it (spec.md §4.1's `refs` callback).
pub trait HeapObject {
    fn visit_refs(&self, visit: &mut dyn FnMut(RawId));
}

pub type RawId = usize;

pub struct Handle<T> {
    pub(crate) index: usize,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for Handle<T> {}
impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}
impl<T> std::fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// Which bucket of the GC's bookkeeping an object currently lives in.
/// `Old(g)` is an index into `Heap::generations`; the four special
/// buckets are spec.md §4.1's MARK/GC/SAVE/NEW.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Old(usize),
    Mark,
    Gc,
    Save,
    New,
}

struct Slot<T> {
    data: Option<T>,
    refcount: usize,
    generation: u32,
    location: Location,
    is_root: bool,
}

#[derive(Default)]
struct Generation {
    roots: Vec<RawId>,
    non_roots: Vec<RawId>,
}

/// The five-generation incremental mark/sweep heap of spec.md §4.1,
/// parameterized over the payload type so `type_heap.rs` and
/// `value_heap.rs` can each instantiate it without duplicating the
/// traversal logic.
pub struct Heap<T: HeapObject> {
    slots: Vec<Slot<T>>,
    free_list: Vec<usize>,
    /// Objects swept out of `gc.non_roots` at the end of a cycle, freed
    /// lazily (two per increment) the way spec.md §4.1 amortizes sweep
    /// cost across subsequent allocations.
    pending_free: Vec<RawId>,
    generations: VecDeque<Generation>,
    mark: Generation,
    gc: Generation,
    save: Generation,
    new: Generation,
    /// Oldest generation index included in the next GC cycle.
    next: usize,
    /// Number of old generations kept before a cycle is forced to
    /// retraverse all of them rather than just the newest (spec.md
    /// §4.1/§4.4's host-tunable generation cap).
    max_generations: usize,
}

impl<T: HeapObject> Heap<T> {
    /// `max_generations` is the cap spec.md §4.1/§4.4 describes as a
    /// host-tunable knob: once more than this many old generations have
    /// accumulated, the next cycle is forced to retraverse every
    /// generation (a full collection) instead of only the newest one.
    /// Pass `usize::MAX` for a heap with no such cap.
    pub fn new(max_generations: usize) -> Heap<T> {
        Heap {
            slots: Vec::new(),
            free_list: Vec::new(),
            pending_free: Vec::new(),
            generations: VecDeque::new(),
            mark: Generation::default(),
            gc: Generation::default(),
            save: Generation::default(),
            new: Generation::default(),
            next: 0,
            max_generations,
        }
    }

    fn location_list(&mut self, loc: Location) -> &mut Generation {
        match loc {
            Location::Old(g) => &mut self.generations[g],
            Location::Mark => &mut self.mark,
            Location::Gc => &mut self.gc,
            Location::Save => &mut self.save,
            Location::New => &mut self.new,
        }
    }

    fn move_between(&mut self, id: RawId, from_root: bool) {
        let (loc, is_root) = {
            let slot = &self.slots[id];
            (slot.location, slot.is_root)
        };
        debug_assert_eq!(is_root, from_root);
        let list = self.location_list(loc);
        let src = if from_root { &mut list.roots } else { &mut list.non_roots };
        if let Some(pos) = src.iter().position(|&x| x == id) {
            src.remove(pos);
        }
        let dst = if from_root { &mut list.non_roots } else { &mut list.roots };
        dst.push(id);
        self.slots[id].is_root = !from_root;
    }

    /// Allocate a new, retained object. One GC increment is performed
    /// first, per spec.md §4.1's "Allocate: advance GC by one increment,
    /// then place the new object as a root in NEW".
    pub fn allocate(&mut self, data: T, on_free: &mut impl FnMut(&T)) -> Handle<T> {
        self.gc_increment(on_free);

        let (index, generation) = if let Some(index) = self.free_list.pop() {
            let generation = self.slots[index].generation.wrapping_add(1);
            (index, generation)
        } else {
            self.slots.push(Slot {
                data: None,
                refcount: 0,
                generation: 0,
                location: Location::New,
                is_root: true,
            });
            (self.slots.len() - 1, 0)
        };

        self.slots[index] = Slot {
            data: Some(data),
            refcount: 1,
            generation,
            location: Location::New,
            is_root: true,
        };
        self.new.roots.push(index);

        Handle { index, generation, _marker: PhantomData }
    }

    pub fn get(&self, handle: Handle<T>) -> &T {
        let slot = &self.slots[handle.index];
        assert_eq!(slot.generation, handle.generation, "use of freed heap handle");
        slot.data.as_ref().expect("use of freed heap handle")
    }

    /// Mutable access to an object's payload. Used sparingly, by callers
    /// that need to back-patch a node after allocation (e.g. closing a
    /// recursive type binding) rather than rebuild it — mutating in place
    /// must never change the set of outgoing references without a
    /// matching `add_ref`.
    pub fn get_mut(&mut self, handle: Handle<T>) -> &mut T {
        let slot = &mut self.slots[handle.index];
        assert_eq!(slot.generation, handle.generation, "use of freed heap handle");
        slot.data.as_mut().expect("use of freed heap handle")
    }

    pub fn retain(&mut self, handle: Handle<T>) {
        let id = handle.index;
        let was_zero = self.slots[id].refcount == 0;
        self.slots[id].refcount += 1;
        if was_zero {
            self.move_between(id, false);
        }
    }

    pub fn release(&mut self, handle: Handle<T>, on_free: &mut impl FnMut(&T)) {
        let id = handle.index;
        self.slots[id].refcount -= 1;
        if self.slots[id].refcount == 0 {
            let was_primary_root_of_old = matches!(self.slots[id].location, Location::Old(_));
            self.move_between(id, true);
            if was_primary_root_of_old {
                if let Location::Old(g) = self.slots[id].location {
                    self.next = self.next.min(g);
                }
            }
        }
        // No-op: `on_free` is only invoked from sweep; it is accepted
        // here so callers don't need to special-case immediate release
        // of never-traversed (New) objects whose refcount drops to zero
        // before their first GC increment.
        let _ = on_free;
    }

    /// Record that `src` now holds a reference to `dst` (spec.md §4.1's
    /// add-ref). If `src` has already been traversed this cycle and
    /// `dst` has not, `dst` is escalated into MARK (if within the
    /// planned traversal) or SAVE (if older), and `next` is widened to
    /// cover it.
    pub fn add_ref(&mut self, src: Handle<T>, dst: Handle<T>) {
        let src_traversed = matches!(
            self.slots[src.index].location,
            Location::Gc | Location::Save | Location::Mark
        );
        let dst_traversed = matches!(
            self.slots[dst.index].location,
            Location::Gc | Location::Save | Location::Mark
        );
        if src_traversed && !dst_traversed {
            self.escalate(dst.index);
        }
    }

    fn escalate(&mut self, id: RawId) {
        let (loc, is_root) = {
            let slot = &self.slots[id];
            (slot.location, slot.is_root)
        };
        let target = match loc {
            Location::Old(g) if g >= self.next => Location::Mark,
            Location::Old(g) => {
                self.next = self.next.min(g);
                Location::Save
            }
            Location::New => Location::Mark,
            other => other,
        };
        if target == loc {
            return;
        }
        {
            let list = self.location_list(loc);
            let v = if is_root { &mut list.roots } else { &mut list.non_roots };
            if let Some(pos) = v.iter().position(|&x| x == id) {
                v.remove(pos);
            }
        }
        self.slots[id].location = target;
        let list = self.location_list(target);
        if is_root {
            list.roots.push(id);
        } else {
            list.non_roots.push(id);
        }
    }

    /// Perform one unit of incremental GC work (spec.md §4.1's "GC
    /// increment (called once per allocation)").
    pub fn gc_increment(&mut self, on_free: &mut impl FnMut(&T)) {
        // 1. Amortize sweep: free up to two objects from the free list's
        // pending-free queue (objects already known unreachable from a
        // prior cycle's sweep are freed lazily here).
        for _ in 0..2 {
            if let Some(id) = self.pending_free.pop() {
                self.finalize(id, on_free);
            } else {
                break;
            }
        }

        // 2. Traverse one object, in the documented preference order.
        if let Some(id) = self.next_to_traverse() {
            self.traverse_one(id);
            return;
        }

        // 3. Traversal queue empty: a cycle completes.
        self.complete_cycle(on_free);
    }

    fn next_to_traverse(&mut self) -> Option<RawId> {
        if let Some(&id) = self.mark.non_roots.last() {
            return Some(id);
        }
        if let Some(&id) = self.mark.roots.last() {
            return Some(id);
        }
        while self.next < self.generations.len() {
            let g = &self.generations[self.next];
            if let Some(&id) = g.non_roots.last().or(g.roots.last()) {
                return Some(id);
            }
            self.next += 1;
        }
        if let Some(&id) = self.gc.roots.last() {
            return Some(id);
        }
        if let Some(&id) = self.save.roots.last() {
            return Some(id);
        }
        if let Some(&id) = self.save.non_roots.last() {
            return Some(id);
        }
        None
    }

    fn traverse_one(&mut self, id: RawId) {
        let loc = self.slots[id].location;
        let is_root = self.slots[id].is_root;
        {
            let list = self.location_list(loc);
            let v = if is_root { &mut list.roots } else { &mut list.non_roots };
            if let Some(pos) = v.iter().rposition(|&x| x == id) {
                v.remove(pos);
            }
        }

        let refs: Vec<RawId> = {
            let data = self.slots[id].data.as_ref().expect("traversing freed slot");
            let mut out = Vec::new();
            data.visit_refs(&mut |r| out.push(r));
            out
        };
        for r in refs {
            if matches!(self.slots[r].location, Location::Old(_) | Location::New) {
                self.escalate(r);
            }
        }

        self.slots[id].location = Location::Gc;
        if is_root {
            self.gc.roots.push(id);
        } else {
            self.gc.non_roots.push(id);
        }
    }

    fn complete_cycle(&mut self, on_free: &mut impl FnMut(&T)) {
        crate::trace!("gc cycle complete: {} garbage, {} survivors", self.gc.non_roots.len(), self.gc.roots.len() + self.new.roots.len() + self.new.non_roots.len());
        let garbage: Vec<RawId> = std::mem::take(&mut self.gc.non_roots);
        for id in garbage {
            self.pending_free.push(id);
        }
        let _ = on_free;

        let mut survivors = Generation::default();
        survivors.roots.append(&mut self.gc.roots);
        survivors.roots.append(&mut self.new.roots);
        survivors.non_roots.append(&mut self.new.non_roots);
        for id in survivors.roots.iter().chain(survivors.non_roots.iter()) {
            self.slots[*id].location = Location::Old(self.generations.len());
        }

        self.generations.push_back(survivors);

        self.mark = Generation::default();
        self.gc = Generation::default();
        self.save = Generation::default();
        self.new = Generation::default();
        if self.generations.len() > self.max_generations {
            crate::trace!(
                "generation count {} exceeds cap {}, forcing a full collection",
                self.generations.len(),
                self.max_generations
            );
            self.next = 0;
        } else {
            self.next = self.generations.len();
        }
    }

    fn finalize(&mut self, id: RawId, on_free: &mut impl FnMut(&T)) {
        if let Some(data) = self.slots[id].data.take() {
            on_free(&data);
            self.slots[id].generation = self.slots[id].generation.wrapping_add(1);
            self.free_list.push(id);
        }
    }

    /// Force a complete collection, reclaiming every currently
    /// unreachable object. Used by tests and by `Drop`.
    pub fn full_gc(&mut self, on_free: &mut impl FnMut(&T)) {
        let mut guard = 0;
        loop {
            self.gc_increment(on_free);
            guard += 1;
            let idle = self.mark.non_roots.is_empty()
                && self.mark.roots.is_empty()
                && self.next >= self.generations.len()
                && self.gc.roots.is_empty()
                && self.save.roots.is_empty()
                && self.save.non_roots.is_empty()
                && self.pending_free.is_empty();
            if idle || guard > self.slots.len() * 8 + 64 {
                break;
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.data.is_some()).count()
    }

    /// Reconstruct a typed handle for a raw id obtained from
    /// `HeapObject::visit_refs`. The id must name a currently-live slot.
    pub fn raw_to_handle(&self, id: RawId) -> Handle<T> {
        Handle { index: id, generation: self.slots[id].generation, _marker: PhantomData }
    }
}

impl<T: HeapObject> Default for Heap<T> {
    fn default() -> Self {
        Heap::new(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug)]
    struct Cell(RefCell<Vec<RawId>>);
    impl HeapObject for Cell {
        fn visit_refs(&self, visit: &mut dyn FnMut(RawId)) {
            for &r in self.0.borrow().iter() {
                visit(r);
            }
        }
    }

    #[test]
    fn unretained_garbage_is_freed_by_full_gc() {
        let mut heap: Heap<Cell> = Heap::new(usize::MAX);
        let freed = RefCell::new(Vec::new());
        let mut on_free = |_: &Cell| freed.borrow_mut().push(());

        let leaf = heap.allocate(Cell(RefCell::new(vec![])), &mut on_free);
        let root = heap.allocate(Cell(RefCell::new(vec![leaf.index])), &mut on_free);
        heap.add_ref(root, leaf);
        heap.release(leaf, &mut on_free); // only reachable via root now

        let orphan = heap.allocate(Cell(RefCell::new(vec![])), &mut on_free);
        heap.release(orphan, &mut on_free);

        heap.full_gc(&mut on_free);
        assert_eq!(freed.borrow().len(), 1, "only the orphan should be freed");
        assert_eq!(heap.get(root).0.borrow().len(), 1);
    }

    #[test]
    fn cycle_is_collected_once_root_released() {
        let mut heap: Heap<Cell> = Heap::new(usize::MAX);
        let freed = RefCell::new(0usize);
        let mut on_free = |_: &Cell| *freed.borrow_mut() += 1;

        let a = heap.allocate(Cell(RefCell::new(vec![])), &mut on_free);
        let b = heap.allocate(Cell(RefCell::new(vec![a.index])), &mut on_free);
        heap.add_ref(b, a);
        heap.get(a).0.borrow_mut().push(b.index);
        heap.add_ref(a, b);
        heap.release(a, &mut on_free);

        heap.full_gc(&mut on_free);
        assert_eq!(*freed.borrow(), 0, "b still holds the cycle alive");

        heap.release(b, &mut on_free);
        heap.full_gc(&mut on_free);
        assert_eq!(*freed.borrow(), 2, "both cycle members should now be freed");
    }

    /// A small generation cap forces repeated full retraversals
    /// (`complete_cycle`'s `self.next = 0` branch); liveness accounting
    /// must stay correct across many such forced passes, not just the
    /// single-cycle case the other tests exercise.
    #[test]
    fn generation_cap_forces_full_collections_without_losing_liveness() {
        let mut heap: Heap<Cell> = Heap::new(2);
        let freed = RefCell::new(0usize);
        let mut on_free = |_: &Cell| *freed.borrow_mut() += 1;

        let mut kept = Vec::new();
        let mut total = 0;
        for round in 0..10 {
            let h = heap.allocate(Cell(RefCell::new(vec![])), &mut on_free);
            total += 1;
            if round % 3 == 0 {
                kept.push(h);
            } else {
                heap.release(h, &mut on_free);
            }
            heap.full_gc(&mut on_free);
        }

        assert_eq!(*freed.borrow(), total - kept.len());
        for h in kept {
            assert_eq!(heap.get(h).0.borrow().len(), 0);
        }
    }

    use proptest::prelude::*;

    proptest! {
        // spec.md §8's GC soundness property: after any sequence of
        // allocate/release, an object still holding its initial root
        // reference survives a full collection and stays readable; one
        // whose root was released does not (and is freed exactly once).
        #[test]
        fn full_gc_keeps_exactly_the_still_rooted_objects(keep in prop::collection::vec(any::<bool>(), 1..32)) {
            let mut heap: Heap<Cell> = Heap::new(usize::MAX);
            let freed = RefCell::new(0usize);
            let mut on_free = |_: &Cell| *freed.borrow_mut() += 1;

            let handles: Vec<_> = keep
                .iter()
                .map(|_| heap.allocate(Cell(RefCell::new(vec![])), &mut on_free))
                .collect();
            for (&k, &h) in keep.iter().zip(&handles) {
                if !k {
                    heap.release(h, &mut on_free);
                }
            }

            heap.full_gc(&mut on_free);

            let expected_freed = keep.iter().filter(|k| !**k).count();
            prop_assert_eq!(*freed.borrow(), expected_freed);
            for (&k, &h) in keep.iter().zip(&handles) {
                if k {
                    prop_assert_eq!(heap.get(h).0.borrow().len(), 0);
                }
            }
        }
    }
}
