//! Explicit configuration objects threaded through constructors.

/// Instruction set of a core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoreIsa {
    /// RV64IMAFC with machine mode.
    #[default]
    Rv64,
    /// ARMv7 with Thumb-2.
    Armv7,
}

/// Per-core parameters.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Hart index reported in `mhartid` and used for reservations.
    pub hartid: usize,
    /// First fetch address after reset.
    pub reset_vector: u64,
    /// Value seeded into `mimpid`.
    pub impid: u64,
    /// Instruction set.
    pub isa: CoreIsa,
    /// Trace ring-buffer capacity in records.
    pub trace_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            hartid: 0,
            reset_vector: 0x200,
            impid: 0x0001,
            isa: CoreIsa::Rv64,
            trace_depth: 1024,
        }
    }
}

/// Cluster-level parameters.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of harts; each gets a consecutive hartid.
    pub harts: usize,
    /// Shared reset vector.
    pub reset_vector: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            harts: 1,
            reset_vector: 0x200,
        }
    }
}

/// Start-up validation failures. These abort construction; nothing else
/// in the simulator is allowed to refuse to start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A cluster needs at least one hart.
    #[error("cluster configured with zero harts")]
    NoHarts,
    /// The reset vector must be fetchable.
    #[error("reset vector {0:#x} is not 4-byte aligned")]
    MisalignedResetVector(u64),
}

impl ClusterConfig {
    /// Validate before any core is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.harts == 0 {
            return Err(ConfigError::NoHarts);
        }
        if self.reset_vector % 4 != 0 {
            return Err(ConfigError::MisalignedResetVector(self.reset_vector));
        }
        Ok(())
    }
}
