//! Plain data exchanged between steps, the pipeline, and callers.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Signal a step returns to the pipeline after `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    Continue,
    Halt,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BuildOutcome {
    /// Every step returned `Continue`.
    Completed,
    /// A step halted; `error` is the first fatal error of the forward pass.
    Halted { error: String },
    /// Cancellation was observed between steps or inside a backend call.
    Cancelled,
}

impl BuildOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Virtual machine generation. Generation 2 boots UEFI and attaches media on
/// SCSI; generation 1 uses IDE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Generation {
    #[default]
    One,
    Two,
}

impl Generation {
    pub fn as_u32(self) -> u32 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u32> for Generation {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("generation must be 1 or 2, got {other}")),
        }
    }
}

impl From<Generation> for u32 {
    fn from(value: Generation) -> Self {
        value.as_u32()
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Kind of install media, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Optical,
    DiskImage,
}

impl MediaKind {
    /// `.vhd` and `.vhdx` (any case) are disk images; anything else is treated
    /// as optical media.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
        match ext.as_deref() {
            Some("vhd") | Some("vhdx") => Self::DiskImage,
            _ => Self::Optical,
        }
    }
}

/// Attachment record for a DVD drive, written by the media-attach step and
/// consumed by its cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DvdControllerProperties {
    pub controller_number: u32,
    pub controller_location: u32,
    /// `true` if the drive pre-dated this session and must only be unmounted.
    pub existing: bool,
}

impl DvdControllerProperties {
    pub fn created(controller_number: u32, controller_location: u32) -> Self {
        Self {
            controller_number,
            controller_location,
            existing: false,
        }
    }
}

/// Virtual switch used by the build and whether this session created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRecord {
    pub name: String,
    pub created: bool,
}
