//! Root discovery and the conservative stack scanner.
//!
//! The collector cannot introspect host types: every word-aligned position
//! in a managed block's interior, and every word-aligned address on the
//! current call stack, is treated as a *potential* pointer and validated by
//! registry membership. False positives (a non-pointer bit pattern that
//! happens to match a live address) merely extend a block's lifetime by one
//! cycle; false negatives would cause use-after-free, so every reachable
//! word must be visited.

use crate::registry::AllocationMap;

const WORD: usize = std::mem::size_of::<usize>();

/// Runs a full mark pass: roots, then the conservative stack scan.
///
/// Always runs to completion regardless of the collector's `paused` flag —
/// marking has no side effects on unmanaged memory, so there is nothing to
/// suppress.
pub fn mark(registry: &mut AllocationMap, bos: *const u8) {
    mark_roots(registry);
    mark_stack(registry, bos);
}

/// Marks every `ROOT`-tagged allocation and, since a root's payload may
/// itself hold managed pointers (e.g. a static table of objects), recurses
/// into its interior exactly as [`mark_alloc`] would for any other
/// discovered pointer.
pub fn mark_roots(registry: &mut AllocationMap) {
    let roots: Vec<*mut u8> = registry
        .iter()
        .filter(|record| record.tag.is_root())
        .map(|record| record.ptr)
        .collect();
    for ptr in roots {
        mark_alloc(registry, ptr);
    }
}

/// Scans every word-aligned address between the current top of stack and
/// `bos` (bottom of stack), treating each as a candidate pointer.
///
/// To maximize coverage, callee-saved registers that might hold the only
/// remaining reference to a live object are spilled onto the stack (inside
/// this frame, so they fall within the scanned range) before the scan
/// begins.
#[inline(never)]
pub fn mark_stack(registry: &mut AllocationMap, bos: *const u8) {
    let register_spill = spill_registers();
    let top = &register_spill as *const _ as usize;
    let bos = bos as usize;

    let (lo, hi) = if top <= bos { (top, bos) } else { (bos, top) };
    // Round the low end up to the next word boundary so every scanned
    // address is aligned (unaligned reads are still safe via
    // `read_unaligned`, but aligning keeps the scan a whole-word walk).
    let mut addr = lo - (lo % WORD);

    while addr + WORD <= hi {
        // SAFETY: [lo, hi] is a sub-range of the collector's own call
        // stack, which is mapped and readable for the lifetime of this
        // call. We only interpret the word's bit pattern; we never
        // dereference it directly — `mark_alloc` validates it against the
        // registry before treating it as a pointer.
        let word = unsafe { std::ptr::read_unaligned(addr as *const usize) };
        mark_alloc(registry, word as *mut u8);
        addr += WORD;
    }

    std::hint::black_box(&register_spill);
}

/// A portable approximation of a full register-file dump: forcing the
/// compiler to materialize this array on the stack flushes any
/// callee-saved registers it was using to hold live values, so they become
/// visible to the scan in `mark_stack`. This must run inside the frame
/// whose stack-top `mark_stack` captures.
#[inline(never)]
fn spill_registers() -> [usize; 16] {
    std::hint::black_box([0usize; 16])
}

/// If `candidate` is exactly the address of some unmarked registry record,
/// marks it and, unless it is tagged `LEAF`, recursively scans its interior
/// for further candidate pointers.
///
/// Marking happens *before* recursing so that cycles terminate: by the time
/// a candidate's interior is scanned, the candidate itself is already
/// marked, so any back-reference found while scanning is rejected by the
/// "not already marked" check.
pub fn mark_alloc(registry: &mut AllocationMap, candidate: *mut u8) {
    if candidate.is_null() {
        return;
    }

    let (size, is_leaf) = match registry.get_mut(candidate) {
        Some(record) if !record.tag.is_marked() => {
            record.tag.set_mark();
            (record.size, record.tag.is_leaf())
        }
        _ => return,
    };

    if is_leaf {
        return;
    }

    let start = candidate as usize;
    let end = start + size;
    let mut addr = start;
    while addr + WORD <= end {
        // SAFETY: [start, end) is exactly the managed block at `candidate`,
        // which the registry guarantees is live and of length `size`.
        let word = unsafe { std::ptr::read_unaligned(addr as *const usize) };
        mark_alloc(registry, word as *mut u8);
        addr += WORD;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AllocationMap;

    #[test]
    fn mark_alloc_ignores_null() {
        let mut am = AllocationMap::new(8, 8, 0.5, 0.2, 0.8);
        mark_alloc(&mut am, std::ptr::null_mut());
        assert_eq!(am.size(), 0);
    }

    #[test]
    fn mark_alloc_marks_exact_match_only() {
        let mut am = AllocationMap::new(8, 8, f64::INFINITY, 0.0, f64::INFINITY);
        let ptr = crate::raw::alloc(8).unwrap();
        am.put(ptr, 8, None);

        // An address one byte off the block start must not match.
        let off_by_one = (ptr as usize + 1) as *mut u8;
        mark_alloc(&mut am, off_by_one);
        assert!(!am.get(ptr).unwrap().tag.is_marked());

        mark_alloc(&mut am, ptr);
        assert!(am.get(ptr).unwrap().tag.is_marked());

        unsafe { crate::raw::dealloc(ptr, 8) };
    }

    #[test]
    fn mark_alloc_follows_interior_pointer_chain() {
        let mut am = AllocationMap::new(8, 8, f64::INFINITY, 0.0, f64::INFINITY);

        let child = crate::raw::alloc(8).unwrap();
        am.put(child, 8, None);

        let parent = crate::raw::alloc(WORD).unwrap();
        unsafe { std::ptr::write(parent as *mut *mut u8, child) };
        am.put(parent, WORD, None);

        mark_alloc(&mut am, parent);

        assert!(am.get(parent).unwrap().tag.is_marked());
        assert!(am.get(child).unwrap().tag.is_marked());

        unsafe {
            crate::raw::dealloc(parent, WORD);
            crate::raw::dealloc(child, 8);
        }
    }

    #[test]
    fn mark_alloc_skips_leaf_interior() {
        let mut am = AllocationMap::new(8, 8, f64::INFINITY, 0.0, f64::INFINITY);

        let child = crate::raw::alloc(8).unwrap();
        am.put(child, 8, None);

        let parent = crate::raw::alloc(WORD).unwrap();
        unsafe { std::ptr::write(parent as *mut *mut u8, child) };
        am.put(parent, WORD, None);
        am.get_mut(parent).unwrap().tag.set_leaf();

        mark_alloc(&mut am, parent);

        assert!(am.get(parent).unwrap().tag.is_marked());
        assert!(!am.get(child).unwrap().tag.is_marked(), "leaf interior must not be scanned");

        unsafe {
            crate::raw::dealloc(parent, WORD);
            crate::raw::dealloc(child, 8);
        }
    }

    #[test]
    fn mark_stack_marks_reachable_local() {
        let mut am = AllocationMap::new(8, 8, f64::INFINITY, 0.0, f64::INFINITY);
        let ptr = crate::raw::alloc(8).unwrap();
        am.put(ptr, 8, None);

        // Keep `ptr` resident in this frame's stack while we capture `bos`
        // one frame below it, then scan back up through it.
        let bos_marker = 0u8;
        let bos = &bos_marker as *const u8;
        let kept_alive = ptr;
        mark_stack(&mut am, bos);
        std::hint::black_box(kept_alive);

        assert!(am.get(ptr).unwrap().tag.is_marked());
        unsafe { crate::raw::dealloc(ptr, 8) };
    }
}
