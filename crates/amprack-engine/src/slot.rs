//! Swappable heavyweight resources.
//!
//! A [`ResourceSlot`] owns at most one resource (a model stage or a convolver
//! stage). The reconfiguration worker is the only writer; the audio thread and
//! the real-time helpers are readers.
//!
//! Readers go through [`ResourceSlot::with_resource`], which checks the
//! `ready` flag (acquire) and then `try_lock`s the resource. Neither step can
//! block, so a slot that is being swapped simply reads as absent and the
//! caller passes audio through. The writer clears `ready`, waits for the audio
//! thread's next cycle, takes the lock, swaps, and only then sets `ready`
//! (release). Because the old resource is dropped under the lock, a resource
//! can never be destroyed while a reader is inside `process`.

use crate::stage::{ConvolverStage, ModelStage};
use crate::Error;
use amprack_core::AtomicFlag;
use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// UI text for an empty slot.
pub const NONE_LABEL: &str = "None";

/// The four reloadable slots. Discriminants are the reload bitmask bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlotId {
    ModelA = 1,
    ModelB = 2,
    Ir1 = 4,
    Ir2 = 8,
}

impl SlotId {
    pub const ALL: [SlotId; 4] = [SlotId::ModelA, SlotId::ModelB, SlotId::Ir1, SlotId::Ir2];

    #[inline]
    pub fn bit(self) -> u8 {
        self as u8
    }

    /// Position in [`SlotId::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self.bit().trailing_zeros() as usize
    }

    pub fn is_model(self) -> bool {
        matches!(self, SlotId::ModelA | SlotId::ModelB)
    }

    pub fn name(self) -> &'static str {
        match self {
            SlotId::ModelA => "model A",
            SlotId::ModelB => "model B",
            SlotId::Ir1 => "IR 1",
            SlotId::Ir2 => "IR 2",
        }
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for SlotId {
    type Error = Error;

    fn try_from(bit: u8) -> Result<Self, Self::Error> {
        SlotId::ALL
            .into_iter()
            .find(|slot| slot.bit() == bit)
            .ok_or(Error::UnknownSlot(bit))
    }
}

/// One swappable resource plus its identity.
pub struct ResourceSlot<T> {
    id: SlotId,
    /// False while the writer is swapping. True means "safe to use or skip".
    ready: AtomicFlag,
    /// True when a resource is published. Read without touching the lock.
    occupied: AtomicFlag,
    resource: Mutex<Option<T>>,
    /// What the UI asked for. `None` is the empty sentinel.
    requested: ArcSwapOption<PathBuf>,
    /// What is actually published.
    loaded: ArcSwapOption<PathBuf>,
    latency: AtomicUsize,
    builds: AtomicU64,
}

impl<T: Send> ResourceSlot<T> {
    /// Empty and ready (known-empty, safe to skip).
    pub fn new(id: SlotId) -> Self {
        Self {
            id,
            ready: AtomicFlag::new(true),
            occupied: AtomicFlag::new(false),
            resource: Mutex::new(None),
            requested: ArcSwapOption::empty(),
            loaded: ArcSwapOption::empty(),
            latency: AtomicUsize::new(0),
            builds: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> SlotId {
        self.id
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// A resource is installed, whether or not it is currently usable.
    #[inline]
    pub fn is_occupied(&self) -> bool {
        self.occupied.get()
    }

    /// Ready with a resource published.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.ready.get() && self.occupied.get()
    }

    /// Run `f` on the resource if it is ready and not being swapped.
    ///
    /// RT-safe: never blocks, returns `None` instead.
    #[inline]
    pub fn with_resource<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if !self.ready.get() {
            return None;
        }
        let mut guard = self.resource.try_lock()?;
        guard.as_mut().map(f)
    }

    pub fn requested(&self) -> Option<Arc<PathBuf>> {
        self.requested.load_full()
    }

    pub fn loaded(&self) -> Option<Arc<PathBuf>> {
        self.loaded.load_full()
    }

    /// Record a new requested identity. Returns `false` if it is unchanged.
    pub fn set_requested(&self, path: Option<&Path>) -> bool {
        let current = self.requested.load();
        let unchanged = match (current.as_deref(), path) {
            (None, None) => true,
            (Some(current), Some(path)) => current.as_path() == path,
            _ => false,
        };
        if unchanged {
            return false;
        }
        self.requested.store(path.map(|p| Arc::new(p.to_path_buf())));
        true
    }

    /// Path for display, `"None"` when empty.
    pub fn display_path(&self) -> String {
        match self.loaded.load().as_deref() {
            Some(path) => path.display().to_string(),
            None => NONE_LABEL.to_string(),
        }
    }

    /// Latency measured during the last warm-up, in engine-rate frames.
    pub fn latency(&self) -> usize {
        self.latency.load(Ordering::Acquire)
    }

    /// Resources successfully built for this slot.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    // ---- reconfiguration worker only ----

    /// Stop readers from using the resource.
    pub(crate) fn withdraw(&self) {
        self.ready.set(false);
    }

    /// Remove the current resource. Waits for an in-flight reader to finish.
    pub(crate) fn take(&self) -> Option<T> {
        let taken = self.resource.lock().take();
        self.occupied.set(false);
        taken
    }

    /// Lock the resource for in-place maintenance (capacity changes).
    pub(crate) fn lock(&self) -> parking_lot::MutexGuard<'_, Option<T>> {
        self.resource.lock()
    }

    /// Install `resource` and mark the slot ready.
    pub(crate) fn publish(&self, resource: Option<T>, path: Option<Arc<PathBuf>>, latency: usize) {
        let occupied = resource.is_some();
        if occupied {
            self.builds.fetch_add(1, Ordering::Relaxed);
        }
        *self.resource.lock() = resource;
        self.loaded.store(path);
        self.latency.store(latency, Ordering::Release);
        self.occupied.set(occupied);
        self.ready.set(true);
    }

    /// A failed load falls back to the empty identity, unless the UI has
    /// already asked for something else.
    pub(crate) fn reset_requested(&self, failed: &Path) {
        self.requested.rcu(|current| match current {
            Some(path) if path.as_path() != failed => Some(Arc::clone(path)),
            _ => None,
        });
    }
}

impl<T> fmt::Debug for ResourceSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceSlot")
            .field("id", &self.id)
            .field("ready", &self.ready.get())
            .field("occupied", &self.occupied.get())
            .field("loaded", &self.loaded.load().as_deref())
            .finish()
    }
}

/// Object-safe status view over a slot, independent of its resource type.
pub trait SlotStatus: Send + Sync {
    fn id(&self) -> SlotId;
    fn requested(&self) -> Option<Arc<PathBuf>>;
    fn loaded(&self) -> Option<Arc<PathBuf>>;
    fn set_requested(&self, path: Option<&Path>) -> bool;
    fn display_path(&self) -> String;
    fn latency(&self) -> usize;
    fn is_active(&self) -> bool;
    fn is_occupied(&self) -> bool;
    fn builds(&self) -> u64;
}

impl<T: Send> SlotStatus for ResourceSlot<T> {
    fn id(&self) -> SlotId {
        self.id
    }

    fn requested(&self) -> Option<Arc<PathBuf>> {
        ResourceSlot::requested(self)
    }

    fn loaded(&self) -> Option<Arc<PathBuf>> {
        ResourceSlot::loaded(self)
    }

    fn set_requested(&self, path: Option<&Path>) -> bool {
        ResourceSlot::set_requested(self, path)
    }

    fn display_path(&self) -> String {
        ResourceSlot::display_path(self)
    }

    fn latency(&self) -> usize {
        ResourceSlot::latency(self)
    }

    fn is_active(&self) -> bool {
        ResourceSlot::is_active(self)
    }

    fn is_occupied(&self) -> bool {
        ResourceSlot::is_occupied(self)
    }

    fn builds(&self) -> u64 {
        ResourceSlot::builds(self)
    }
}

/// The engine's four slots.
#[derive(Debug)]
pub struct Slots {
    pub model_a: ResourceSlot<ModelStage>,
    pub model_b: ResourceSlot<ModelStage>,
    pub ir1: ResourceSlot<ConvolverStage>,
    pub ir2: ResourceSlot<ConvolverStage>,
}

impl Default for Slots {
    fn default() -> Self {
        Self {
            model_a: ResourceSlot::new(SlotId::ModelA),
            model_b: ResourceSlot::new(SlotId::ModelB),
            ir1: ResourceSlot::new(SlotId::Ir1),
            ir2: ResourceSlot::new(SlotId::Ir2),
        }
    }
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, id: SlotId) -> &dyn SlotStatus {
        match id {
            SlotId::ModelA => &self.model_a,
            SlotId::ModelB => &self.model_b,
            SlotId::Ir1 => &self.ir1,
            SlotId::Ir2 => &self.ir2,
        }
    }

    /// Bits of the slots that currently hold a resource.
    pub fn occupied_bits(&self, mask: u8) -> u8 {
        SlotId::ALL
            .into_iter()
            .filter(|&id| mask & id.bit() != 0 && self.status(id).is_occupied())
            .fold(0, |bits, id| bits | id.bit())
    }

    /// Bits of the slots with a non-empty requested identity.
    pub fn requested_bits(&self) -> u8 {
        SlotId::ALL
            .into_iter()
            .filter(|&id| self.status(id).requested().is_some())
            .fold(0, |bits, id| bits | id.bit())
    }

    pub fn builds(&self) -> u64 {
        SlotId::ALL
            .into_iter()
            .map(|id| self.status(id).builds())
            .sum()
    }
}
