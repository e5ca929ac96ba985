// Constants for the memory model

/// Default size of the simulated address space (static + stack + heap)
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Share of the address space reserved for the static region, in percent
pub const DEFAULT_STATIC_PERCENT: usize = 10;

/// Gap between the end of the heap and the start of the temporary region
pub const DEFAULT_TEMPORARY_OFFSET: u64 = 100;

/// Initial size of the temporary region
pub const DEFAULT_TEMPORARY_CAPACITY: usize = 100_000;

/// The first bytes of the static region are never handed out, so that a
/// null pointer never refers to an object
pub const STATIC_RESERVED_BYTES: u64 = 4;

/// Initial memory contents are pseudo-random bytes below this bound
pub const GARBAGE_BOUND: u32 = 100;
