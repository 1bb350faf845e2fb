//! Sound resource data structures

use crate::{BankError, HookId, MAX_REGIONS, SoundFormat};

/// Catalog rule consulted when playback reaches the end of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpEdge {
    /// Hook id the track must carry for this edge to apply (0 = unconditional)
    pub trigger_hook: HookId,
    /// Region to continue in
    pub target_region: usize,
    /// Hook id the track carries after the jump
    pub target_hook: HookId,
    /// Length of the cross-fade of the outgoing material, in ticks (0 = cut)
    pub fade_ticks: u16,
}

impl JumpEdge {
    pub const fn new(
        trigger_hook: HookId,
        target_region: usize,
        target_hook: HookId,
        fade_ticks: u16,
    ) -> Self {
        Self {
            trigger_hook,
            target_region,
            target_hook,
            fade_ticks,
        }
    }
}

/// Cue point inside a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub id: u32,
    /// Byte offset relative to the region start
    pub offset: usize,
}

/// Contiguous byte range of a resource with its own jump/marker metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Region {
    /// Start offset in the resource's PCM data
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    /// Jump edges in catalog order (first match wins)
    pub jumps: Vec<JumpEdge>,
    /// Markers sorted by offset
    pub markers: Vec<Marker>,
}

impl Region {
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            jumps: Vec::new(),
            markers: Vec::new(),
        }
    }

    /// End offset (exclusive) in the resource's PCM data
    #[inline]
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// A decoded, region-subdivided sound resource
#[derive(Debug, Clone)]
pub struct SoundResource {
    /// Resource name (diagnostics only)
    pub name: String,
    /// Decoded PCM layout
    pub format: SoundFormat,
    /// Region table
    pub regions: Vec<Region>,
    /// Decoded PCM bytes
    pub data: Vec<u8>,
}

impl SoundResource {
    /// Assemble a resource from pre-built parts, validating the catalog
    pub fn from_parts(
        name: impl Into<String>,
        format: SoundFormat,
        mut regions: Vec<Region>,
        data: Vec<u8>,
    ) -> Result<Self, BankError> {
        for region in &mut regions {
            region.markers.sort_by_key(|m| m.offset);
        }
        let resource = Self {
            name: name.into(),
            format,
            regions,
            data,
        };
        resource.validate()?;
        Ok(resource)
    }

    /// Number of regions
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Get a region by index
    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// Jump edges of `region` whose trigger hook equals `hook`, in catalog order
    pub fn jump_edges(&self, region: usize, hook: HookId) -> impl Iterator<Item = &JumpEdge> {
        self.regions
            .get(region)
            .map(|r| r.jumps.as_slice())
            .unwrap_or(&[])
            .iter()
            .filter(move |edge| edge.trigger_hook == hook)
    }

    /// Markers of `region`, sorted by offset
    pub fn markers(&self, region: usize) -> &[Marker] {
        self.regions
            .get(region)
            .map(|r| r.markers.as_slice())
            .unwrap_or(&[])
    }

    /// Borrow up to `max` bytes of `region` starting at `offset_in_region`
    ///
    /// Never crosses the region end. Returns `None` if the region does not
    /// exist or the offset is past its end.
    pub fn region_bytes(&self, region: usize, offset_in_region: usize, max: usize) -> Option<&[u8]> {
        let region = self.regions.get(region)?;
        if offset_in_region > region.length {
            return None;
        }
        let len = max.min(region.length - offset_in_region);
        let start = region.offset + offset_in_region;
        self.data.get(start..start + len)
    }

    /// Check the catalog for consistency
    ///
    /// Regions must be frame-aligned, in order, non-overlapping and inside the
    /// data; jump targets and markers must point inside the catalog.
    pub fn validate(&self) -> Result<(), BankError> {
        self.format.validate()?;
        if self.data.is_empty() {
            return Err(BankError::EmptyResource);
        }
        if self.regions.len() > MAX_REGIONS {
            return Err(BankError::TooManyRegions(self.regions.len()));
        }

        let frame = self.format.frame_size();
        let mut prev_end = 0usize;
        for (idx, region) in self.regions.iter().enumerate() {
            if region.offset % frame != 0 || region.length % frame != 0 {
                return Err(BankError::UnalignedRegion(idx));
            }
            if region.offset < prev_end {
                return Err(BankError::RegionsOverlap(idx));
            }
            if region.end() > self.data.len() {
                return Err(BankError::RegionOutOfBounds(idx));
            }
            prev_end = region.end();

            for edge in &region.jumps {
                if edge.target_region >= self.regions.len() {
                    return Err(BankError::JumpTargetOutOfRange {
                        region: idx,
                        target: edge.target_region,
                    });
                }
            }
            for marker in &region.markers {
                if marker.offset >= region.length.max(1) {
                    return Err(BankError::MarkerOutOfRange {
                        region: idx,
                        marker: marker.id,
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono16() -> SoundFormat {
        SoundFormat::new(22_050, 16, 1)
    }

    fn three_regions() -> SoundResource {
        let mut regions = vec![Region::new(0, 8), Region::new(8, 8), Region::new(16, 8)];
        regions[0].jumps.push(JumpEdge::new(1, 2, 0, 0));
        regions[0].jumps.push(JumpEdge::new(1, 1, 0, 0));
        regions[1].markers.push(Marker { id: 9, offset: 4 });
        regions[1].markers.push(Marker { id: 3, offset: 2 });
        SoundResource::from_parts("test", mono16(), regions, (0..24).collect()).unwrap()
    }

    #[test]
    fn test_jump_edges_keep_catalog_order() {
        let res = three_regions();
        let targets: Vec<usize> = res.jump_edges(0, 1).map(|e| e.target_region).collect();
        assert_eq!(targets, vec![2, 1]);
        assert_eq!(res.jump_edges(0, 5).count(), 0);
        assert_eq!(res.jump_edges(99, 1).count(), 0);
    }

    #[test]
    fn test_markers_are_sorted() {
        let res = three_regions();
        let ids: Vec<u32> = res.markers(1).iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![3, 9]);
        assert!(res.markers(2).is_empty());
    }

    #[test]
    fn test_region_bytes_clamps_to_region_end() {
        let res = three_regions();
        assert_eq!(res.region_bytes(1, 6, 100).unwrap(), &[14, 15]);
        assert_eq!(res.region_bytes(1, 8, 100).unwrap().len(), 0);
        assert!(res.region_bytes(1, 9, 1).is_none());
        assert!(res.region_bytes(3, 0, 1).is_none());
    }

    #[test]
    fn test_validate_rejects_unaligned_region() {
        let regions = vec![Region::new(0, 3)];
        let err = SoundResource::from_parts("bad", mono16(), regions, vec![0; 4]).unwrap_err();
        assert_eq!(err, BankError::UnalignedRegion(0));
    }

    #[test]
    fn test_validate_rejects_overlap_and_bounds() {
        let overlap = vec![Region::new(0, 4), Region::new(2, 2)];
        assert_eq!(
            SoundResource::from_parts("o", mono16(), overlap, vec![0; 8]).unwrap_err(),
            BankError::RegionsOverlap(1)
        );

        let past_end = vec![Region::new(0, 10)];
        assert_eq!(
            SoundResource::from_parts("p", mono16(), past_end, vec![0; 8]).unwrap_err(),
            BankError::RegionOutOfBounds(0)
        );
    }

    #[test]
    fn test_validate_rejects_bad_jump_target() {
        let mut regions = vec![Region::new(0, 4)];
        regions[0].jumps.push(JumpEdge::new(0, 3, 0, 0));
        assert_eq!(
            SoundResource::from_parts("j", mono16(), regions, vec![0; 4]).unwrap_err(),
            BankError::JumpTargetOutOfRange {
                region: 0,
                target: 3
            }
        );
    }
}
