//! Compute device selection.
//!
//! Only the CPU backend is compiled in. Asking for an accelerator either falls
//! back to the CPU with a warning or, in strict mode, fails.

use anyhow::{bail, Result};
use burn::prelude::Backend;
use std::fmt;
use std::str::FromStr;
use tracing::{info, warn};

/// Requested compute target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceTarget {
    Cpu,
    Cuda,
    Wgpu,
}

impl DeviceTarget {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceTarget::Cpu => "cpu",
            DeviceTarget::Cuda => "cuda",
            DeviceTarget::Wgpu => "wgpu",
        }
    }

    /// Targets this build can run on
    pub fn is_available(&self) -> bool {
        matches!(self, DeviceTarget::Cpu)
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(DeviceTarget::Cpu),
            "cuda" | "gpu" => Ok(DeviceTarget::Cuda),
            "wgpu" => Ok(DeviceTarget::Wgpu),
            other => bail!("Unknown device {:?}; expected cpu, cuda or wgpu", other),
        }
    }
}

/// The device a run actually uses
#[derive(Debug, Clone)]
pub struct ResolvedDevice<B: Backend> {
    pub requested: DeviceTarget,
    pub target: DeviceTarget,
    pub device: B::Device,
    pub fell_back: bool,
}

impl<B: Backend> ResolvedDevice<B> {
    pub fn describe(&self) -> String {
        if self.fell_back {
            format!("{} (requested {})", self.target, self.requested)
        } else {
            self.target.to_string()
        }
    }
}

/// Map a requested target onto an available device
pub fn resolve_device<B: Backend>(requested: DeviceTarget, strict: bool) -> Result<ResolvedDevice<B>> {
    let fell_back = !requested.is_available();
    if fell_back {
        if strict {
            bail!("Device {} is not available in this build", requested);
        }
        warn!("Device {} is not available, falling back to cpu", requested);
    }

    let resolved = ResolvedDevice {
        requested,
        target: DeviceTarget::Cpu,
        device: B::Device::default(),
        fell_back,
    };
    info!("Using device: {}", resolved.describe());
    Ok(resolved)
}
