//! Reconfiguration worker task.
//!
//! Runs on the `amprack-reconfig` thread, the only thread that builds, swaps
//! and drops slot resources. Per slot:
//!
//! 1. withdraw the old resource (`ready = false`) and wait, bounded, for the
//!    audio thread to finish the cycle in flight;
//! 2. drop the old resource;
//! 3. build and warm up the new one;
//! 4. publish it (`ready = true`). A failed build publishes an empty slot and
//!    resets the requested path to `"None"`.

use crate::engine::Shared;
use crate::event::EngineEvent;
use crate::slot::{ResourceSlot, SlotId};
use crate::stage::{BuildContext, Stage};
use crate::state::REALLOCATE;

/// Drain every pending request. Requests that arrive meanwhile are picked up
/// by the next loop iteration.
pub(crate) fn reconfigure(shared: &Shared) {
    loop {
        let (bits, forced) = shared.state.take_pending();
        if bits == 0 {
            if shared.state.finish_reconfiguration() {
                continue;
            }
            break;
        }
        tracing::debug!(bits, forced, "reconfiguring");

        if bits & REALLOCATE != 0 {
            reallocate(shared);
        }

        let ctx = shared.build_context();
        for id in SlotId::ALL {
            if bits & id.bit() == 0 {
                continue;
            }
            let force = forced & id.bit() != 0;
            match id {
                SlotId::ModelA => reload_slot(shared, &shared.slots.model_a, &ctx, force),
                SlotId::ModelB => reload_slot(shared, &shared.slots.model_b, &ctx, force),
                SlotId::Ir1 => reload_slot(shared, &shared.slots.ir1, &ctx, force),
                SlotId::Ir2 => reload_slot(shared, &shared.slots.ir2, &ctx, force),
            }
        }

        shared.state.record_reconfiguration();
    }
}

/// Swap the resource in `slot` for its requested path.
pub(crate) fn reload_slot<T: Stage>(
    shared: &Shared,
    slot: &ResourceSlot<T>,
    ctx: &BuildContext<'_>,
    forced: bool,
) {
    let id = slot.id();
    let requested = slot.requested();

    if !forced && requested == slot.loaded() {
        tracing::debug!(slot = %id, "requested path already loaded");
        return;
    }
    if requested.is_none() && !slot.is_occupied() {
        return;
    }

    if slot.is_occupied() {
        slot.withdraw();
        if !shared
            .rendezvous
            .await_next(shared.config.rendezvous_timeout())
        {
            tracing::debug!(slot = %id, "no audio cycle acknowledged the withdrawal");
        }
        drop(slot.take());
    }

    let (resource, loaded, latency) = match requested {
        None => (None, None, 0),
        Some(path) => match T::build(&path, ctx) {
            Ok(stage) => {
                let latency = stage.latency();
                tracing::info!(slot = %id, path = %path.display(), latency, "resource loaded");
                (Some(stage), Some(path), latency)
            }
            Err(e) => {
                tracing::warn!(slot = %id, path = %path.display(), error = %e, "load failed");
                slot.reset_requested(&path);
                (None, None, 0)
            }
        },
    };

    slot.publish(resource, loaded, latency);
    shared.notifier.send(EngineEvent::SlotChanged {
        slot: id,
        path: slot.display_path(),
    });
}

/// Grow scratch and double buffers to the current host buffer size.
pub(crate) fn reallocate(shared: &Shared) {
    let frames = shared.state.buffer_size().max(shared.state.capacity());

    {
        // Same order as the background task: double buffer, then pipeline.
        // The model stages grow before the pipeline accepts larger buffers.
        let mut buffers = shared.buffers.lock();
        let mut pipeline = shared.pipeline.lock();
        for slot in [&shared.slots.model_a, &shared.slots.model_b] {
            if let Some(stage) = slot.lock().as_mut() {
                stage.ensure_capacity(frames);
            }
        }
        buffers.ensure_capacity(frames);
        pipeline.ensure_capacity(frames);
        shared.state.set_capacity(frames);
    }
    shared.state.set_buffer_ready(true);
    tracing::info!(frames, "buffers reallocated");
    shared
        .notifier
        .send(EngineEvent::BufferReallocated { frames });
}
