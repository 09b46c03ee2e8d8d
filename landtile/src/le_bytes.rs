//! Conversions between native integers and zerocopy's endian-aware wrappers.
//!
//! `bitfield-struct` generates accessors over a native integer; these hooks
//! let the stored representation stay explicitly little-endian so packed
//! fields are portable across hosts.

pub(crate) mod u64le {
    use zerocopy::{LE, U64};
    pub const fn from_inner(n: u64) -> U64<LE> {
        U64::<LE>::new(n)
    }
    pub const fn into_inner(v: U64<LE>) -> u64 {
        v.get()
    }
}

pub(crate) mod u32le {
    use zerocopy::{LE, U32};
    pub const fn from_inner(n: u32) -> U32<LE> {
        U32::<LE>::new(n)
    }
    pub const fn into_inner(v: U32<LE>) -> u32 {
        v.get()
    }
}
