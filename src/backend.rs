//! Backend abstraction - CUDA (GPU) or NdArray (CPU)
//!
//! The tensor backend is picked at compile time: `cuda` wins when enabled,
//! `ndarray` is the default. GPU presence is probed at runtime only to tell
//! the user when a CPU build is running on a machine that has one.

use burn::backend::Autodiff;
use tracing::{info, warn};

#[cfg(feature = "cuda")]
pub type DefaultBackend = burn::backend::Cuda;

#[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(any(feature = "cuda", feature = "ndarray")))]
compile_error!("At least one backend (cuda or ndarray) must be enabled!");

/// The autodiff backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Device handle of the default backend
pub type DefaultDevice = <DefaultBackend as burn::tensor::backend::Backend>::Device;

/// Get the default device (first GPU for CUDA, the CPU for NdArray)
pub fn default_device() -> DefaultDevice {
    DefaultDevice::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(all(not(feature = "cuda"), feature = "ndarray"))]
    {
        "NdArray (CPU)"
    }
}

/// Pick the device and log what was chosen
pub fn init_device() -> DefaultDevice {
    let device = default_device();
    info!("Using backend {} on {:?}", backend_name(), device);

    if cfg!(not(feature = "cuda")) && has_nvidia_gpu() {
        warn!("An NVIDIA GPU is present but this build is CPU-only; rebuild with --features cuda");
    }

    device
}

/// Check for an NVIDIA GPU (CUDA)
pub fn has_nvidia_gpu() -> bool {
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new("/proc/driver/nvidia/version").exists()
            || std::path::Path::new("/dev/nvidia0").exists()
            || nvidia_smi_succeeds("nvidia-smi")
    }

    #[cfg(target_os = "windows")]
    {
        nvidia_smi_succeeds("nvidia-smi.exe")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        false
    }
}

#[cfg(any(target_os = "linux", target_os = "windows"))]
fn nvidia_smi_succeeds(program: &str) -> bool {
    std::process::Command::new(program)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        assert!(!backend_name().is_empty());
    }

    #[test]
    fn test_gpu_probe_does_not_panic() {
        let _ = has_nvidia_gpu();
    }
}
