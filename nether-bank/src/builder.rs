//! Incremental construction of sound resources

use crate::{BankError, JumpEdge, Marker, Region, SoundFormat, SoundResource};

/// Builds a [`SoundResource`] region by region
///
/// Regions are laid out back to back in the order they are added. Jump
/// edges and markers may reference regions added later; everything is
/// validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SoundResourceBuilder {
    name: String,
    format: SoundFormat,
    regions: Vec<Region>,
    data: Vec<u8>,
    pending_jumps: Vec<(usize, JumpEdge)>,
    pending_markers: Vec<(usize, Marker)>,
}

impl SoundResourceBuilder {
    pub fn new(name: impl Into<String>, format: SoundFormat) -> Self {
        Self {
            name: name.into(),
            format,
            regions: Vec::new(),
            data: Vec::new(),
            pending_jumps: Vec::new(),
            pending_markers: Vec::new(),
        }
    }

    /// Append a region holding `pcm`
    pub fn region(mut self, pcm: impl AsRef<[u8]>) -> Self {
        let pcm = pcm.as_ref();
        self.regions.push(Region::new(self.data.len(), pcm.len()));
        self.data.extend_from_slice(pcm);
        self
    }

    /// Add a jump edge leaving `from_region`
    pub fn jump(mut self, from_region: usize, edge: JumpEdge) -> Self {
        self.pending_jumps.push((from_region, edge));
        self
    }

    /// Add a marker at `offset` bytes into `region`
    pub fn marker(mut self, region: usize, id: u32, offset: usize) -> Self {
        self.pending_markers.push((region, Marker { id, offset }));
        self
    }

    /// Number of regions added so far
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn build(mut self) -> Result<SoundResource, BankError> {
        for (from, edge) in self.pending_jumps {
            let count = self.regions.len();
            let region = self
                .regions
                .get_mut(from)
                .ok_or(BankError::JumpTargetOutOfRange {
                    region: from,
                    target: count,
                })?;
            region.jumps.push(edge);
        }
        for (idx, marker) in self.pending_markers {
            let region = self
                .regions
                .get_mut(idx)
                .ok_or(BankError::MarkerOutOfRange {
                    region: idx,
                    marker: marker.id,
                })?;
            region.markers.push(marker);
        }
        SoundResource::from_parts(self.name, self.format, self.regions, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_lays_out_regions_back_to_back() {
        let res = SoundResourceBuilder::new("b", SoundFormat::new(11_025, 8, 1))
            .region([1u8; 10])
            .region([2u8; 6])
            .region([3u8; 4])
            .jump(2, JumpEdge::new(0, 1, 0, 0))
            .marker(1, 42, 3)
            .build()
            .unwrap();

        assert_eq!(res.region_count(), 3);
        assert_eq!(res.region(1).unwrap().offset, 10);
        assert_eq!(res.region(2).unwrap().offset, 16);
        assert_eq!(res.data.len(), 20);
        assert_eq!(res.jump_edges(2, 0).count(), 1);
        assert_eq!(res.markers(1)[0].id, 42);
    }

    #[test]
    fn test_builder_rejects_jump_from_missing_region() {
        let err = SoundResourceBuilder::new("b", SoundFormat::new(11_025, 8, 1))
            .region([0u8; 4])
            .jump(5, JumpEdge::new(0, 0, 0, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, BankError::JumpTargetOutOfRange { region: 5, .. }));
    }
}
