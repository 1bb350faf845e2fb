//! Region catalog / decoder boundary
//!
//! The engine never touches container formats or codecs. It queries an
//! implementation of [`SoundBank`] for region bounds, jump edges, markers and
//! decoded bytes. [`MemoryBank`] serves already-decoded [`SoundResource`]s
//! from memory and is what tests and the render CLI use.

use std::sync::Arc;

use hashbrown::HashMap;
use nether_bank::{HookId, JumpEdge, Marker, SoundFormat, SoundId, SoundResource};
use smallvec::SmallVec;

use crate::error::ResourceError;

/// Jump edges matching one `(region, hook)` pair, in catalog order
pub type EdgeList = SmallVec<[JumpEdge; 4]>;

/// Markers of one region, sorted by offset
pub type MarkerList = SmallVec<[Marker; 4]>;

/// Opaque handle to an open resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub u32);

/// Byte range of a region within its resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionBounds {
    pub offset: usize,
    pub length: usize,
}

/// Read-only region catalog plus decoder for sound resources
pub trait SoundBank {
    /// Open a resource for streaming
    fn open_resource(&mut self, sound: SoundId) -> Result<ResourceHandle, ResourceError>;

    /// Decoded PCM layout of an open resource
    fn format(&self, handle: ResourceHandle) -> Result<SoundFormat, ResourceError>;

    /// Number of regions in an open resource
    fn region_count(&self, handle: ResourceHandle) -> Result<usize, ResourceError>;

    /// Byte range of `region`
    fn region_bounds(
        &self,
        handle: ResourceHandle,
        region: usize,
    ) -> Result<RegionBounds, ResourceError>;

    /// Jump edges leaving `region` triggered by `hook`, in catalog order
    fn jump_edges(
        &self,
        handle: ResourceHandle,
        region: usize,
        hook: HookId,
    ) -> Result<EdgeList, ResourceError>;

    /// Markers inside `region`
    fn markers(&self, handle: ResourceHandle, region: usize) -> Result<MarkerList, ResourceError>;

    /// Decode up to `max` bytes of `region` starting at `offset` into `out`
    ///
    /// `out` is cleared first. Never reads past the region end. Returns the
    /// number of bytes written.
    fn read_region_bytes(
        &mut self,
        handle: ResourceHandle,
        region: usize,
        offset: usize,
        max: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize, ResourceError>;

    /// Close a handle (unknown handles are ignored)
    fn close_resource(&mut self, handle: ResourceHandle);
}

/// In-memory bank of decoded resources
#[derive(Debug, Default)]
pub struct MemoryBank {
    /// Available resources by sound id
    sounds: HashMap<SoundId, Arc<SoundResource>>,
    /// Open handles
    open: HashMap<u32, Arc<SoundResource>>,
    /// Next handle to allocate (0 is never handed out)
    next_handle: u32,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self {
            sounds: HashMap::new(),
            open: HashMap::new(),
            next_handle: 1,
        }
    }

    /// Make a resource available under `sound`, returning any resource it replaces
    pub fn insert(&mut self, sound: SoundId, resource: SoundResource) -> Option<Arc<SoundResource>> {
        self.sounds.insert(sound, Arc::new(resource))
    }

    /// Withdraw a resource; handles already open keep their data
    pub fn remove(&mut self, sound: SoundId) -> Option<Arc<SoundResource>> {
        self.sounds.remove(&sound)
    }

    pub fn contains(&self, sound: SoundId) -> bool {
        self.sounds.contains_key(&sound)
    }

    /// Get a resource by sound id
    pub fn get(&self, sound: SoundId) -> Option<&SoundResource> {
        self.sounds.get(&sound).map(|r| r.as_ref())
    }

    /// Number of currently open handles
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    fn resource(&self, handle: ResourceHandle) -> Result<&SoundResource, ResourceError> {
        self.open
            .get(&handle.0)
            .map(|r| r.as_ref())
            .ok_or(ResourceError::InvalidHandle(handle.0))
    }
}

impl SoundBank for MemoryBank {
    fn open_resource(&mut self, sound: SoundId) -> Result<ResourceHandle, ResourceError> {
        let resource = self
            .sounds
            .get(&sound)
            .cloned()
            .ok_or(ResourceError::UnknownSound(sound))?;
        let handle = self.next_handle;
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.open.insert(handle, resource);
        Ok(ResourceHandle(handle))
    }

    fn format(&self, handle: ResourceHandle) -> Result<SoundFormat, ResourceError> {
        Ok(self.resource(handle)?.format)
    }

    fn region_count(&self, handle: ResourceHandle) -> Result<usize, ResourceError> {
        Ok(self.resource(handle)?.region_count())
    }

    fn region_bounds(
        &self,
        handle: ResourceHandle,
        region: usize,
    ) -> Result<RegionBounds, ResourceError> {
        let resource = self.resource(handle)?;
        let r = resource
            .region(region)
            .ok_or(ResourceError::RegionOutOfRange {
                region,
                count: resource.region_count(),
            })?;
        Ok(RegionBounds {
            offset: r.offset,
            length: r.length,
        })
    }

    fn jump_edges(
        &self,
        handle: ResourceHandle,
        region: usize,
        hook: HookId,
    ) -> Result<EdgeList, ResourceError> {
        Ok(self.resource(handle)?.jump_edges(region, hook).copied().collect())
    }

    fn markers(&self, handle: ResourceHandle, region: usize) -> Result<MarkerList, ResourceError> {
        Ok(self.resource(handle)?.markers(region).iter().copied().collect())
    }

    fn read_region_bytes(
        &mut self,
        handle: ResourceHandle,
        region: usize,
        offset: usize,
        max: usize,
        out: &mut Vec<u8>,
    ) -> Result<usize, ResourceError> {
        out.clear();
        let resource = self.resource(handle)?;
        let bytes = resource.region_bytes(region, offset, max).ok_or_else(|| {
            ResourceError::ReadFailed(format!(
                "region {} offset {} outside resource '{}'",
                region, offset, resource.name
            ))
        })?;
        out.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn close_resource(&mut self, handle: ResourceHandle) {
        self.open.remove(&handle.0);
    }
}
