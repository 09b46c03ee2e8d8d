use crate::{Access, Profile, RoadClass};
use enumset::EnumSet;
use std::ops::Range;
use zerocopy::{F32, LE, U16, U32};
use zerocopy_derive::{Immutable, IntoBytes, TryFromBytes, Unaligned};

/// A directed edge within a tile.
///
/// The geometry is resolved in three steps: an explicit slice into the
/// tile's shape pool, else a polyline5 string in the tile's polyline pool,
/// else the straight segment between the endpoint nodes.
#[derive(TryFromBytes, IntoBytes, Immutable, Unaligned, Copy, Clone, Debug)]
#[repr(C)]
pub struct EdgeRecord {
    from_node: U32<LE>,
    to_node: U32<LE>,
    length_m: F32<LE>,
    speed_mps: F32<LE>,
    foot_speed_mps: F32<LE>,
    oneway: u8,
    road_class: RoadClass,
    access_mask: U16<LE>,
    shape_start: U32<LE>,
    shape_count: U16<LE>,
    polyline_start: U32<LE>,
    polyline_len: U16<LE>,
}

impl EdgeRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        from_node: u32,
        to_node: u32,
        length_m: f32,
        speed_mps: f32,
        foot_speed_mps: f32,
        oneway: bool,
        road_class: RoadClass,
        access: EnumSet<Access>,
        shape_start: u32,
        shape_count: u16,
        polyline_start: u32,
        polyline_len: u16,
    ) -> Self {
        Self {
            from_node: U32::new(from_node),
            to_node: U32::new(to_node),
            length_m: F32::new(length_m),
            speed_mps: F32::new(speed_mps),
            foot_speed_mps: F32::new(foot_speed_mps),
            oneway: u8::from(oneway),
            road_class,
            access_mask: U16::new(access.as_repr()),
            shape_start: U32::new(shape_start),
            shape_count: U16::new(shape_count),
            polyline_start: U32::new(polyline_start),
            polyline_len: U16::new(polyline_len),
        }
    }

    /// Tile-local index of the edge's tail node.
    #[inline]
    pub fn from_node(&self) -> u32 {
        self.from_node.get()
    }

    /// Tile-local index of the edge's head node.
    #[inline]
    pub fn to_node(&self) -> u32 {
        self.to_node.get()
    }

    /// Great-circle length of the full polyline, in meters.
    #[inline]
    pub fn length_m(&self) -> f32 {
        self.length_m.get()
    }

    /// Car travel speed in m/s; zero marks car-inaccessible edges.
    #[inline]
    pub fn speed_mps(&self) -> f32 {
        self.speed_mps.get()
    }

    /// Pedestrian speed in m/s; zero marks foot-inaccessible edges.
    #[inline]
    pub fn foot_speed_mps(&self) -> f32 {
        self.foot_speed_mps.get()
    }

    /// When true, traversal is only permitted from `from_node` to `to_node`.
    #[inline]
    pub fn oneway(&self) -> bool {
        self.oneway != 0
    }

    #[inline]
    pub fn road_class(&self) -> RoadClass {
        self.road_class
    }

    /// The modes permitted on this edge.
    #[inline]
    pub fn access(&self) -> EnumSet<Access> {
        EnumSet::from_repr_truncated(self.access_mask.get())
    }

    /// Whether the profile's access bit is set.
    #[inline]
    pub fn allows(&self, profile: Profile) -> bool {
        self.access().contains(profile.access())
    }

    /// The travel speed the profile uses on this edge.
    #[inline]
    pub fn speed_for(&self, profile: Profile) -> f32 {
        match profile {
            Profile::Car => self.speed_mps.get(),
            Profile::Foot => self.foot_speed_mps.get(),
        }
    }

    /// Traversal time under the profile, or `None` when the edge is
    /// impassable for it (non-positive speed).
    #[inline]
    pub fn traversal_secs(&self, profile: Profile) -> Option<f64> {
        let speed = self.speed_for(profile);
        if speed > 0.0 {
            Some(f64::from(self.length_m.get()) / f64::from(speed))
        } else {
            None
        }
    }

    /// The edge's slice of the tile's shape pool (empty when implicit).
    #[inline]
    pub fn shape_range(&self) -> Range<usize> {
        let start = self.shape_start.get() as usize;
        start..start + self.shape_count.get() as usize
    }

    /// The edge's slice of the tile's polyline pool, if any.
    #[inline]
    pub fn polyline_range(&self) -> Option<Range<usize>> {
        if self.polyline_len.get() == 0 {
            None
        } else {
            let start = self.polyline_start.get() as usize;
            Some(start..start + self.polyline_len.get() as usize)
        }
    }
}
