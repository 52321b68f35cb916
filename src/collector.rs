//! The collector driver: public API, mark/sweep orchestration and the
//! sweep-triggering policy.

use std::ffi::CStr;
use std::ptr::NonNull;

use crate::config::GcConfig;
use crate::prime::next_prime;
use crate::raw;
use crate::record::DtorFn;
use crate::registry::AllocationMap;
use crate::scan;

/// A conservative, stop-the-world, mark-and-sweep garbage collector.
///
/// Embed one per host; every allocation made through it is tracked, and
/// unreachable allocations are reclaimed when the registry's load factor
/// crosses `sweep_factor` or when [`GarbageCollector::run`] is called
/// explicitly.
///
/// # Safety / host ABI contract
/// `bos` must be the lowest address the host's call stack ever reaches
/// after `start`/`start_ext` is invoked — in practice, the address of a
/// stack local near the top of `main`. All pointers returned by the
/// allocator entry points are raw system-heap addresses usable with
/// ordinary pointer arithmetic; destructors and any code reachable from the
/// scanned stack must not call back into the collector (`malloc`/`free`
/// are not re-entrant).
pub struct GarbageCollector {
    registry: AllocationMap,
    paused: bool,
    bos: *const u8,
    min_size: u64,
}

impl GarbageCollector {
    /// Starts a collector with the reference defaults
    /// ([`GcConfig::default`]).
    pub fn start(bos: *const u8) -> Self {
        Self::start_ext(bos, GcConfig::default())
    }

    /// Starts a collector with caller-supplied tuning.
    pub fn start_ext(bos: *const u8, config: GcConfig) -> Self {
        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "gc",
            initial_capacity = config.initial_capacity,
            min_capacity = config.min_capacity,
            sweep_factor = config.sweep_factor,
            "collector starting"
        );

        GarbageCollector {
            registry: AllocationMap::new(
                config.initial_capacity,
                config.min_capacity,
                config.sweep_factor,
                config.downsize_load_factor,
                config.upsize_load_factor,
            ),
            paused: false,
            bos,
            min_size: next_prime(config.min_capacity),
        }
    }

    /// Unroots every allocation, runs one final sweep reclaiming
    /// everything, and resets the registry to an empty, min-sized table.
    /// Returns total bytes reclaimed.
    pub fn stop(&mut self) -> usize {
        self.unroot_roots();
        let reclaimed = self.registry.sweep();

        #[cfg(feature = "gc_logging")]
        tracing::info!(target: "gc", reclaimed, "collector stopped");

        self.registry = AllocationMap::new(self.min_size, self.min_size, 0.5, 0.2, 0.8);
        reclaimed
    }

    /// Suppresses the allocator-site collection trigger. An explicit
    /// [`GarbageCollector::run`] still collects while paused.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Re-enables the allocator-site collection trigger.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Runs an unconditional mark-then-sweep cycle, regardless of
    /// `paused`. Returns bytes reclaimed.
    pub fn run(&mut self) -> usize {
        self.mark();
        let reclaimed = self.registry.sweep();

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "gc",
            reclaimed,
            live = self.registry.size(),
            "collection cycle complete"
        );

        reclaimed
    }

    /// Mark phase only: roots, then the conservative stack scan. Exposed
    /// for hosts and tests that want to drive mark and sweep separately.
    pub fn mark(&mut self) {
        scan::mark(&mut self.registry, self.bos);
    }

    /// Sweep phase only: reclaims every unmarked, non-root record. Exposed
    /// for hosts and tests that want to drive mark and sweep separately.
    pub fn sweep(&mut self) -> usize {
        self.registry.sweep()
    }

    /// Marks every currently `ROOT`-tagged allocation, recursing into each
    /// root's interior exactly as any other discovered pointer would be.
    /// Does not run the stack scan.
    pub fn mark_roots(&mut self) {
        scan::mark_roots(&mut self.registry);
    }

    /// Runs the conservative stack scan only (no root marking).
    pub fn mark_stack(&mut self) {
        scan::mark_stack(&mut self.registry, self.bos);
    }

    /// Clears `ROOT` on every tracked allocation.
    pub fn unroot_roots(&mut self) {
        for record in self.registry.iter_mut() {
            record.tag.clear_root();
        }
    }

    /// Number of live tracked allocations.
    pub fn len(&self) -> usize {
        self.registry.size()
    }

    /// True if no allocations are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.registry.size() == 0
    }

    fn trigger_if_needed(&mut self) {
        if self.paused || self.registry.size() <= self.registry.sweep_limit() {
            return;
        }
        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "gc",
            size = self.registry.size(),
            sweep_limit = self.registry.sweep_limit(),
            "sweep limit crossed, collecting"
        );
        self.run();
    }

    /// Allocates `size` bytes with no destructor. May trigger a collection
    /// before returning. Returns `None` if the raw allocator is out of
    /// memory, in which case nothing is registered.
    pub fn malloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.malloc_ext(size, None)
    }

    /// As [`GarbageCollector::malloc`], with a destructor invoked just
    /// before the block is raw-freed (by `free` or by sweep).
    pub fn malloc_ext(&mut self, size: usize, dtor: Option<DtorFn>) -> Option<NonNull<u8>> {
        let ptr = raw::alloc(size)?;
        self.registry.put(ptr, size, dtor);
        // `ptr` stays live in this local across the trigger check, so the
        // conservative stack scan inside a triggered collection sees it
        // and the block just allocated survives its own allocating call.
        self.trigger_if_needed();
        NonNull::new(ptr)
    }

    /// As [`GarbageCollector::malloc_ext`], additionally tagging the
    /// allocation `ROOT` so it survives every future cycle until explicitly
    /// unrooted.
    pub fn malloc_static(&mut self, size: usize, dtor: Option<DtorFn>) -> Option<NonNull<u8>> {
        let ptr = raw::alloc(size)?;
        self.registry.put(ptr, size, dtor);
        if let Some(record) = self.registry.get_mut(ptr) {
            record.tag.set_root();
        }
        self.trigger_if_needed();
        NonNull::new(ptr)
    }

    /// Allocates `count * size` zero-initialized bytes with no destructor.
    pub fn calloc(&mut self, count: usize, size: usize) -> Option<NonNull<u8>> {
        self.calloc_ext(count, size, None)
    }

    /// As [`GarbageCollector::calloc`], with a destructor.
    pub fn calloc_ext(
        &mut self,
        count: usize,
        size: usize,
        dtor: Option<DtorFn>,
    ) -> Option<NonNull<u8>> {
        let total = count.checked_mul(size)?;
        let ptr = raw::alloc_zeroed(total)?;
        self.registry.put(ptr, total, dtor);
        self.trigger_if_needed();
        NonNull::new(ptr)
    }

    /// Reallocates the managed block at `ptr` to `size` bytes.
    ///
    /// `ptr == null` is treated as `malloc(size)`. A `ptr` not tracked by
    /// this collector is refused (`None`) rather than silently adopted.
    /// On success, the destructor and tag bits (including `ROOT`/`LEAF`)
    /// carry over to the (possibly moved) new block.
    pub fn realloc(&mut self, ptr: *mut u8, size: usize) -> Option<NonNull<u8>> {
        if ptr.is_null() {
            return self.malloc(size);
        }

        let (old_size, dtor, tag) = {
            let record = self.registry.get(ptr)?;
            (record.size, record.dtor, record.tag)
        };

        // SAFETY: `ptr`/`old_size` describe a live allocation made through
        // `crate::raw` and tracked by this registry.
        let new_ptr = unsafe { raw::realloc(ptr, old_size, size) }?;

        if new_ptr == ptr {
            if let Some(record) = self.registry.get_mut(ptr) {
                record.size = size;
            }
        } else {
            // The payload moved; the old record is pure bookkeeping at
            // this point (the raw allocator already freed/reused the old
            // block), so no destructor runs and nothing is raw-freed here.
            self.registry.remove(ptr, false);
            self.registry.put(new_ptr, size, dtor);
            if let Some(record) = self.registry.get_mut(new_ptr) {
                record.tag = tag;
            }
        }

        NonNull::new(new_ptr)
    }

    /// Explicitly frees `ptr`. A no-op if `ptr` is null or not tracked by
    /// this collector (a foreign free is silently tolerated, not an
    /// error).
    pub fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let Some(record) = self.registry.get(ptr) else {
            return;
        };
        let (size, dtor) = (record.size, record.dtor);
        if let Some(dtor) = dtor {
            // SAFETY: dtor was supplied by the host for this exact ptr.
            unsafe { dtor(ptr) };
        }
        // SAFETY: ptr/size describe a live allocation made through
        // `crate::raw`, now being destroyed.
        unsafe { raw::dealloc(ptr, size) };
        self.registry.remove(ptr, true);
    }

    /// Duplicates a C string, including its terminator, tagging the
    /// resulting block `LEAF` (a string body holds no managed pointers, so
    /// marking never needs to scan its interior).
    pub fn strdup(&mut self, s: &CStr) -> Option<NonNull<u8>> {
        let bytes = s.to_bytes_with_nul();
        let ptr = raw::alloc(bytes.len())?;
        // SAFETY: `ptr` is a fresh allocation of exactly `bytes.len()` bytes.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
        self.registry.put(ptr, bytes.len(), None);
        if let Some(record) = self.registry.get_mut(ptr) {
            record.tag.set_leaf();
        }
        self.trigger_if_needed();
        NonNull::new(ptr)
    }

    /// Sets `ROOT` on the record for `ptr`. A no-op if `ptr` is not tracked
    /// by this collector.
    pub fn make_static(&mut self, ptr: *mut u8) {
        if let Some(record) = self.registry.get_mut(ptr) {
            record.tag.set_root();
        }
    }
}
