//! Hardware capability flags consulted by every kernel.
//!
//! The process-wide value is fixed once: either injected with [`install`] before the
//! first kernel runs, or detected from the host on first use of [`global`].

use std::sync::OnceLock;

/// Which accelerated code paths the kernels may take.
///
/// The flags are immutable once constructed; build a different value with
/// [`HardwareCapabilities::with_simd`] / [`HardwareCapabilities::with_fma`] to force a
/// code path, and pass it to the `*_with` kernel variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareCapabilities {
    simd: bool,
    fma: bool,
}

static CAPABILITIES: OnceLock<HardwareCapabilities> = OnceLock::new();

impl HardwareCapabilities {
    /// Probe the current host.
    ///
    /// On x86-64, SIMD lanes require AVX2 and the fused tile additionally requires FMA.
    /// On aarch64, NEON lanes are always available and the fused tile is not.
    pub fn detect() -> Self {
        let caps = Self {
            simd: host_has_simd(),
            fma: host_has_fma(),
        };
        log::debug!("detected hardware capabilities: {caps:?}");
        caps
    }

    /// Every accelerated path disabled.
    pub const fn scalar() -> Self {
        Self {
            simd: false,
            fma: false,
        }
    }

    /// Enable or disable the SIMD lane path.
    pub fn with_simd(self, enabled: bool) -> Self {
        Self {
            simd: enabled,
            ..self
        }
    }

    /// Enable or disable the fused-multiply-add tile.
    ///
    /// Enabling has no effect on a host without AVX2+FMA.
    pub fn with_fma(self, enabled: bool) -> Self {
        let fma = enabled && host_has_fma();
        if enabled && !fma {
            log::warn!("fma requested but not supported by this host; keeping it disabled");
        }
        Self { fma, ..self }
    }

    /// Whether kernels may use SIMD lanes.
    #[inline]
    pub fn use_simd(&self) -> bool {
        self.simd
    }

    /// Whether kernels may use the fused-multiply-add tile.
    #[inline]
    pub fn use_fma(&self) -> bool {
        self.fma
    }
}

impl Default for HardwareCapabilities {
    fn default() -> Self {
        Self::detect()
    }
}

/// Inject the process-wide capabilities.
///
/// Returns the rejected value if capabilities were already installed or detected.
pub fn install(caps: HardwareCapabilities) -> Result<(), HardwareCapabilities> {
    CAPABILITIES.set(caps)
}

/// The process-wide capabilities, detected on first use when none were installed.
#[inline]
pub fn global() -> HardwareCapabilities {
    *CAPABILITIES.get_or_init(HardwareCapabilities::detect)
}

#[cfg(target_arch = "x86_64")]
fn host_has_simd() -> bool {
    is_x86_feature_detected!("avx2")
}

#[cfg(target_arch = "aarch64")]
fn host_has_simd() -> bool {
    true
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
fn host_has_simd() -> bool {
    false
}

#[cfg(target_arch = "x86_64")]
pub(crate) fn host_has_fma() -> bool {
    is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma")
}

#[cfg(not(target_arch = "x86_64"))]
pub(crate) fn host_has_fma() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_disables_everything() {
        let caps = HardwareCapabilities::scalar();
        assert!(!caps.use_simd());
        assert!(!caps.use_fma());
    }

    #[test]
    fn test_overrides() {
        let caps = HardwareCapabilities::scalar().with_simd(true);
        assert!(caps.use_simd());
        let caps = caps.with_fma(true);
        assert_eq!(caps.use_fma(), host_has_fma());
        assert!(!caps.with_fma(false).use_fma());
    }

    #[test]
    fn test_global_is_stable() {
        let a = global();
        let b = global();
        assert_eq!(a, b);
        // already fixed by the first call
        assert!(install(HardwareCapabilities::scalar()).is_err());
    }
}
