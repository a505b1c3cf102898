use crate::registry::PoolId;
use kernel_memory_addresses::FrameNumber;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FramePoolError {
    #[error("a frame pool must manage at least one frame")]
    EmptyPool,
    #[error("frame count {0} does not fill whole bitmap bytes (4 frames per byte)")]
    Misaligned(u32),
    #[error("bitmap storage at {0} overlaps the pool it describes")]
    InfoFrameInsidePool(FrameNumber),
    #[error("bitmap storage for {frames} frames is not available")]
    StorageUnavailable { frames: u32 },
    #[error("requested zero frames")]
    ZeroFrames,
    #[error("requested {requested} frames but only {free} are free")]
    Exhausted { requested: u32, free: u32 },
    #[error("no contiguous run of {requested} free frames")]
    NoContiguousRun { requested: u32 },
    #[error("frame {0} is not the head of an allocated run")]
    NotHeadFrame(FrameNumber),
    #[error("no frame pool owns frame {0}")]
    NoOwningPool(FrameNumber),
    #[error("frames [{first}, +{count}) are outside the pool")]
    OutOfRange { first: FrameNumber, count: u32 },
    #[error("pool range overlaps pool {0:?}")]
    Overlapping(PoolId),
    #[error("unknown frame pool {0:?}")]
    UnknownPool(PoolId),
}
