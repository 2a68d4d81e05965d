//! Backing storage for buffer state

use std::ops::{Deref, DerefMut};

use memmap2::MmapMut;

use crate::{
    config::BackingType,
    error::{CdataError, Result},
};

/// Fixed-size byte storage owned by exactly one `BufferState`
#[derive(Debug)]
pub enum BackingStore {
    /// Boxed slice on the heap
    Heap(Box<[u8]>),
    /// Anonymous shared memory map
    Anonymous(MmapMut),
}

impl BackingStore {
    /// Allocate zeroed storage of `capacity` bytes
    pub fn new(backing: BackingType, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CdataError::invalid_parameter(
                "capacity",
                "Backing storage cannot be empty",
            ));
        }

        match backing {
            BackingType::Heap => Ok(Self::Heap(vec![0u8; capacity].into_boxed_slice())),
            BackingType::Anonymous => {
                let map = MmapMut::map_anon(capacity)
                    .map_err(|e| CdataError::from_io(e, "Failed to map anonymous storage"))?;
                Ok(Self::Anonymous(map))
            }
        }
    }

    /// Which kind of memory this is
    pub fn backing_type(&self) -> BackingType {
        match self {
            Self::Heap(_) => BackingType::Heap,
            Self::Anonymous(_) => BackingType::Anonymous,
        }
    }
}

impl Deref for BackingStore {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Anonymous(map) => map,
        }
    }
}

impl DerefMut for BackingStore {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Anonymous(map) => map,
        }
    }
}
