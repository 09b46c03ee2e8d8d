use crate::tiling::TileKey;
use crate::{Access, TILE_FORMAT_VERSION};
use bitfield_struct::bitfield;
use enumset::EnumSet;
use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, Unaligned};

/// Reserved header slots for format growth.
const RESERVED_SLOTS: usize = 2;

#[bitfield(u64,
    repr = U64<LE>,
    from = crate::le_bytes::u64le::from_inner,
    into = crate::le_bytes::u64le::into_inner
)]
#[derive(FromBytes, IntoBytes, Immutable, Unaligned)]
struct CountsBitfield {
    #[bits(21, from = crate::le_bytes::u32le::from_inner, into = crate::le_bytes::u32le::into_inner)]
    node_count: U32<LE>,
    #[bits(21, from = crate::le_bytes::u32le::from_inner, into = crate::le_bytes::u32le::into_inner)]
    edge_count: U32<LE>,
    #[bits(21, from = crate::le_bytes::u32le::from_inner, into = crate::le_bytes::u32le::into_inner)]
    shape_count: U32<LE>,
    #[bits(1)]
    _spare: u8,
}

/// Summary information about a tile blob.
///
/// Contains the tile key, format version, profile mask, record counts,
/// and the sizes of the trailing variable-length sections
/// (polyline pool and checksum).
#[derive(FromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct TileHeader {
    version: U32<LE>,
    z: U16<LE>,
    checksum_len: U16<LE>,
    x: U32<LE>,
    y: U32<LE>,
    profile_mask: U32<LE>,
    counts: CountsBitfield,
    polyline_pool_len: U32<LE>,
    _reserved: [U32<LE>; RESERVED_SLOTS],
}

impl TileHeader {
    pub(crate) fn new(
        key: TileKey,
        profile_mask: EnumSet<Access>,
        node_count: u32,
        edge_count: u32,
        shape_count: u32,
        polyline_pool_len: u32,
        checksum_len: u16,
    ) -> Self {
        Self {
            version: U32::new(TILE_FORMAT_VERSION),
            z: U16::new(u16::from(key.z)),
            checksum_len: U16::new(checksum_len),
            x: U32::new(key.x),
            y: U32::new(key.y),
            profile_mask: U32::new(u32::from(profile_mask.as_repr())),
            counts: CountsBitfield::new()
                .with_node_count(U32::new(node_count))
                .with_edge_count(U32::new(edge_count))
                .with_shape_count(U32::new(shape_count)),
            polyline_pool_len: U32::new(polyline_pool_len),
            _reserved: [U32::new(0); RESERVED_SLOTS],
        }
    }

    /// The blob format version.
    #[inline]
    pub fn version(&self) -> u32 {
        self.version.get()
    }

    /// The tile's zoom level, as stored.
    #[inline]
    pub fn zoom(&self) -> u16 {
        self.z.get()
    }

    /// The tile's key.
    ///
    /// Only meaningful after decode-time validation capped the zoom at 255.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn key(&self) -> TileKey {
        TileKey::new(self.z.get() as u8, self.x.get(), self.y.get())
    }

    /// The union of travel modes served by any edge in the tile.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub fn profile_mask(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.profile_mask.get() as u16)
    }

    #[inline]
    pub fn node_count(&self) -> u32 {
        self.counts.node_count().get()
    }

    #[inline]
    pub fn edge_count(&self) -> u32 {
        self.counts.edge_count().get()
    }

    #[inline]
    pub fn shape_count(&self) -> u32 {
        self.counts.shape_count().get()
    }

    #[inline]
    pub fn polyline_pool_len(&self) -> u32 {
        self.polyline_pool_len.get()
    }

    #[inline]
    pub fn checksum_len(&self) -> u16 {
        self.checksum_len.get()
    }
}
