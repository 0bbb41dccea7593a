//! Frame ring: pacing CPU recording against GPU execution.
//!
//! The ring owns N [`FrameSlot`]s (N = frames in flight) and the swapchain side of
//! presentation. It lets the CPU prepare frame N+1 while the GPU renders frame N, and
//! blocks only when a slot comes around again before its previous submission finished.
//!
//! ```text
//! Frame 0: [begin] [record] [end: submit+present] ─────────────────────────────►
//!                           [GPU frame 0] ─────────────────────────────────────►
//!
//! Frame 1:          [begin] [record] [end] ────────────────────────────────────►
//!                                    [GPU frame 1] ────────────────────────────►
//!
//! Frame 2:                   [wait fence 0] [record] [end] ────────────────────►
//!                                                    [GPU frame 2] ────────────►
//! ```
//!
//! # Per-frame call sequence
//!
//! ```text
//! prepare_surface ─► begin_frame ─► acquire_presentable_image ─► frame() ─► end_frame
//!   (resize path)     (fence wait)      │                         (record)   (submit,
//!                                       └─ SurfaceStale ─► cancel_frame     present)
//! ```
//!
//! # Semaphores
//!
//! Acquire semaphores form their own pool sized to the swapchain image count and rotate
//! independently of the slots. Render-complete semaphores are indexed by swapchain image.
//! A driver may hand out three images while only two frames are in flight, so neither
//! pool can be tied to the slot index.
//!
//! # Surface invalidation
//!
//! An out-of-date acquire or present, a suboptimal result, or [`FrameRing::notify_resize`]
//! marks the surface for rebuild. The next [`FrameRing::prepare_surface`] waits for the
//! device to go idle, recreates the swapchain, re-wraps its images (state back to
//! undefined), recreates the semaphore pools and lets the owner of same-sized attachments
//! rebuild them through [`SurfaceResources`]. A zero-sized surface skips frames instead.

use super::slot::{FrameSlot, SlotState};
use crate::backend::{
    AcquireOutcome, BackendResult, Extent2d, FenceStatus, GraphicsBackend, ImageDescriptor,
    PresentOutcome, SwapchainInfo, TextureUsage,
};
use crate::error::{RenderError, RenderResult};
use crate::sync::GpuImage;
use std::time::Duration;

/// Attachments whose size follows the surface
pub trait SurfaceResources<B: GraphicsBackend> {
    /// Called with the device idle after the swapchain was recreated
    fn recreate(&mut self, backend: &mut B, extent: Extent2d) -> BackendResult<()>;
}

/// Proof that a slot is recording. Consumed by [`FrameRing::end_frame`] or
/// [`FrameRing::cancel_frame`].
#[derive(Debug, PartialEq, Eq)]
pub struct SlotToken {
    index: usize,
}

impl SlotToken {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// Acquire semaphore, render-complete semaphore and swapchain image for one present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentCycle<S> {
    pub image_index: u32,
    pub acquire: S,
    pub render_complete: S,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire<S> {
    Ready(PresentCycle<S>),
    /// The swapchain must be rebuilt before anything can be presented
    SurfaceStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, but the swapchain will be rebuilt before the next frame
    Suboptimal,
    /// Not presented, the swapchain will be rebuilt before the next frame
    SurfaceStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    Ready,
    /// Zero-sized surface; skip rendering until it has a size again
    Minimized,
}

/// The recording slot and the swapchain image it renders to
pub struct ActiveFrame<'a, B: GraphicsBackend> {
    pub slot: &'a mut FrameSlot<B>,
    pub swap_image: &'a mut GpuImage,
    pub image_index: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    pub frames_in_flight: usize,
    pub fence_timeout: Duration,
    /// Size of each slot's uniform buffer
    pub uniform_size: u64,
}

pub struct FrameRing<B: GraphicsBackend> {
    slots: Vec<FrameSlot<B>>,
    current: usize,
    fence_timeout: Duration,
    acquire_semaphores: Vec<B::Semaphore>,
    render_complete_semaphores: Vec<B::Semaphore>,
    next_acquire: usize,
    swap_images: Vec<GpuImage>,
    surface_extent: Extent2d,
    requested_extent: Extent2d,
    rebuild_pending: bool,
    frame_number: u64,
}

impl<B: GraphicsBackend> FrameRing<B> {
    pub fn new(backend: &mut B, config: &RingConfig) -> RenderResult<Self> {
        assert!(config.frames_in_flight > 0, "frame ring needs at least one slot");

        let slots = (0..config.frames_in_flight)
            .map(|index| FrameSlot::create(backend, index, config.uniform_size))
            .collect::<BackendResult<Vec<_>>>()?;

        let info = backend.swapchain_info();
        let mut ring = Self {
            slots,
            current: 0,
            fence_timeout: config.fence_timeout,
            acquire_semaphores: Vec::new(),
            render_complete_semaphores: Vec::new(),
            next_acquire: 0,
            swap_images: Vec::new(),
            surface_extent: info.extent,
            requested_extent: info.extent,
            rebuild_pending: false,
            frame_number: 0,
        };
        ring.adopt_swapchain(backend, &info)?;

        log::info!(
            "Frame ring: {} frames in flight, {} swapchain images",
            ring.slots.len(),
            ring.swap_images.len()
        );
        Ok(ring)
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn swap_image_count(&self) -> usize {
        self.swap_images.len()
    }

    pub fn acquire_semaphore_count(&self) -> usize {
        self.acquire_semaphores.len()
    }

    pub fn surface_extent(&self) -> Extent2d {
        self.surface_extent
    }

    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.slots[index].state
    }

    pub fn submitted_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.state == SlotState::Submitted)
            .count()
    }

    /// Record a new drawable size from the windowing system
    pub fn notify_resize(&mut self, extent: Extent2d) {
        if extent != self.requested_extent {
            log::debug!("Surface resized to {}x{}", extent.width, extent.height);
        }
        self.requested_extent = extent;
        if !extent.is_empty() && extent != self.surface_extent {
            self.rebuild_pending = true;
        }
    }

    /// Run the rebuild if one is pending. Call before [`begin_frame`](Self::begin_frame).
    pub fn prepare_surface(
        &mut self,
        backend: &mut B,
        resources: &mut dyn SurfaceResources<B>,
    ) -> RenderResult<SurfaceStatus> {
        if self.requested_extent.is_empty() {
            return Ok(SurfaceStatus::Minimized);
        }
        if self.rebuild_pending {
            self.rebuild_surface(backend, resources)?;
        }
        Ok(SurfaceStatus::Ready)
    }

    fn rebuild_surface(
        &mut self,
        backend: &mut B,
        resources: &mut dyn SurfaceResources<B>,
    ) -> RenderResult<()> {
        log::info!(
            "Rebuilding surface at {}x{}",
            self.requested_extent.width,
            self.requested_extent.height
        );
        self.wait_idle(backend)?;

        backend.recreate_swapchain(self.requested_extent)?;
        let info = backend.swapchain_info();
        self.adopt_swapchain(backend, &info)?;
        resources.recreate(backend, info.extent)?;

        self.surface_extent = info.extent;
        self.rebuild_pending = false;
        Ok(())
    }

    /// Wrap the swapchain images and (re)create both semaphore pools
    fn adopt_swapchain(&mut self, backend: &mut B, info: &SwapchainInfo) -> BackendResult<()> {
        for semaphore in self
            .acquire_semaphores
            .drain(..)
            .chain(self.render_complete_semaphores.drain(..))
        {
            backend.destroy_semaphore(semaphore);
        }

        self.swap_images = info
            .images
            .iter()
            .enumerate()
            .map(|(index, id)| {
                GpuImage::wrap(
                    *id,
                    ImageDescriptor::new_2d(
                        &format!("swapchain image {index}"),
                        info.format,
                        info.extent,
                        TextureUsage::RENDER_ATTACHMENT,
                    ),
                )
            })
            .collect();

        // An acquire semaphore is reused after `len` acquisitions; the fence wait in
        // begin_frame covers its previous wait only if len >= frames in flight.
        let acquire_count = self.swap_images.len().max(self.slots.len());
        for _ in 0..acquire_count {
            self.acquire_semaphores.push(backend.create_semaphore()?);
        }
        for _ in 0..self.swap_images.len() {
            self.render_complete_semaphores
                .push(backend.create_semaphore()?);
        }
        self.next_acquire = 0;
        Ok(())
    }

    /// Wait for the next slot's previous submission, then reset it for recording.
    ///
    /// Panics if a slot is already recording.
    pub fn begin_frame(&mut self, backend: &B) -> RenderResult<SlotToken> {
        if let Some(open) = self.slots.iter().find(|s| s.state == SlotState::Recording) {
            panic!(
                "begin_frame while slot {} is still recording; end or cancel it first",
                open.index()
            );
        }

        let index = self.current;
        let slot = &mut self.slots[index];

        if slot.state == SlotState::Submitted {
            log::trace!("Waiting for frame slot {index}");
            match backend.wait_for_fence(&slot.fence, self.fence_timeout)? {
                FenceStatus::Signaled => {}
                FenceStatus::TimedOut => {
                    log::error!(
                        "Frame slot {index} fence not signaled after {:?}",
                        self.fence_timeout
                    );
                    return Err(RenderError::FenceTimeout {
                        slot: index,
                        timeout: self.fence_timeout,
                    });
                }
            }
            slot.state = SlotState::Idle;
        }

        backend.reset_command_buffer(&slot.command_buffer)?;
        slot.state = SlotState::Recording;
        Ok(SlotToken { index })
    }

    /// Ask the swapchain for the next image
    pub fn acquire_presentable_image(
        &mut self,
        backend: &mut B,
    ) -> RenderResult<Acquire<B::Semaphore>> {
        let acquire = self.acquire_semaphores[self.next_acquire];
        match backend.acquire_next_image(acquire, self.fence_timeout)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                self.next_acquire = (self.next_acquire + 1) % self.acquire_semaphores.len();
                if suboptimal {
                    log::debug!("Swapchain suboptimal on acquire");
                    self.rebuild_pending = true;
                }
                let render_complete = self.render_complete_semaphores[image_index as usize];
                Ok(Acquire::Ready(PresentCycle {
                    image_index,
                    acquire,
                    render_complete,
                }))
            }
            AcquireOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on acquire");
                self.rebuild_pending = true;
                Ok(Acquire::SurfaceStale)
            }
        }
    }

    /// Borrow the recording slot and its target image
    pub fn frame(&mut self, token: &SlotToken, cycle: &PresentCycle<B::Semaphore>) -> ActiveFrame<'_, B> {
        let slot = &mut self.slots[token.index];
        assert_eq!(slot.state, SlotState::Recording, "slot {} is not recording", token.index);
        ActiveFrame {
            slot,
            swap_image: &mut self.swap_images[cycle.image_index as usize],
            image_index: cycle.image_index,
        }
    }

    /// Submit the slot's commands and present
    pub fn end_frame(
        &mut self,
        backend: &mut B,
        token: SlotToken,
        cycle: PresentCycle<B::Semaphore>,
    ) -> RenderResult<PresentStatus> {
        let slot = &mut self.slots[token.index];
        assert_eq!(
            slot.state,
            SlotState::Recording,
            "end_frame on slot {} which is not recording",
            token.index
        );

        backend.reset_fence(&slot.fence)?;
        backend.submit(
            &slot.command_buffer,
            cycle.acquire,
            cycle.render_complete,
            &slot.fence,
        )?;
        slot.state = SlotState::Submitted;
        self.current = (self.current + 1) % self.slots.len();
        self.frame_number += 1;

        let status = match backend.present(cycle.image_index, cycle.render_complete)? {
            PresentOutcome::Presented => PresentStatus::Presented,
            PresentOutcome::Suboptimal => {
                log::debug!("Swapchain suboptimal on present");
                self.rebuild_pending = true;
                PresentStatus::Suboptimal
            }
            PresentOutcome::OutOfDate => {
                log::warn!("Swapchain out of date on present");
                self.rebuild_pending = true;
                PresentStatus::SurfaceStale
            }
        };
        Ok(status)
    }

    /// Abandon a recording slot that was never submitted
    pub fn cancel_frame(&mut self, token: SlotToken) {
        let slot = &mut self.slots[token.index];
        assert_eq!(slot.state, SlotState::Recording, "cancel_frame on a slot that is not recording");
        slot.state = SlotState::Idle;
    }

    /// Block until the GPU has finished everything submitted through the ring
    pub fn wait_idle(&mut self, backend: &B) -> BackendResult<()> {
        backend.wait_idle()?;
        for slot in &mut self.slots {
            if slot.state == SlotState::Submitted {
                slot.state = SlotState::Idle;
            }
        }
        Ok(())
    }

    /// Wait for the device and release every slot and semaphore
    pub fn destroy(mut self, backend: &mut B) -> BackendResult<()> {
        self.wait_idle(backend)?;
        for semaphore in self
            .acquire_semaphores
            .drain(..)
            .chain(self.render_complete_semaphores.drain(..))
        {
            backend.destroy_semaphore(semaphore);
        }
        for slot in self.slots.drain(..) {
            slot.destroy(backend);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use rstest::rstest;

    fn ring(backend: &mut DummyBackend, frames_in_flight: usize) -> FrameRing<DummyBackend> {
        let config = RingConfig {
            frames_in_flight,
            fence_timeout: Duration::from_millis(50),
            uniform_size: 256,
        };
        FrameRing::new(backend, &config).unwrap()
    }

    type Semaphore = <DummyBackend as GraphicsBackend>::Semaphore;

    fn ready(acquire: Acquire<Semaphore>) -> PresentCycle<Semaphore> {
        match acquire {
            Acquire::Ready(cycle) => cycle,
            Acquire::SurfaceStale => panic!("surface unexpectedly stale"),
        }
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn test_slot_walks_idle_recording_submitted_idle(#[case] frames_in_flight: usize) {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        backend.set_auto_complete(false);
        let gpu = backend.gpu();
        let mut ring = ring(&mut backend, frames_in_flight);
        assert!((0..frames_in_flight).all(|i| ring.slot_state(i) == SlotState::Idle));

        // One lap fills every slot without waiting
        for index in 0..frames_in_flight {
            let token = ring.begin_frame(&backend).unwrap();
            assert_eq!(token.index(), index);
            assert_eq!(ring.slot_state(index), SlotState::Recording);

            let cycle = ready(ring.acquire_presentable_image(&mut backend).unwrap());
            ring.end_frame(&mut backend, token, cycle).unwrap();
            assert_eq!(ring.slot_state(index), SlotState::Submitted);
        }
        assert_eq!(ring.submitted_count(), frames_in_flight);

        // Coming back to slot 0 waits on its fence and reopens it
        assert!(gpu.complete_next());
        let token = ring.begin_frame(&backend).unwrap();
        assert_eq!(token.index(), 0);
        assert_eq!(ring.slot_state(0), SlotState::Recording);
        assert_eq!(ring.submitted_count(), frames_in_flight - 1);

        ring.cancel_frame(token);
        assert_eq!(ring.slot_state(0), SlotState::Idle);
    }

    #[test]
    fn test_unfinished_slot_times_out() {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        backend.set_auto_complete(false);
        let mut ring = ring(&mut backend, 1);

        let token = ring.begin_frame(&backend).unwrap();
        let cycle = ready(ring.acquire_presentable_image(&mut backend).unwrap());
        ring.end_frame(&mut backend, token, cycle).unwrap();

        let err = ring.begin_frame(&backend).unwrap_err();
        assert!(matches!(err, RenderError::FenceTimeout { slot: 0, .. }));
        assert_eq!(ring.slot_state(0), SlotState::Submitted);
    }

    #[test]
    #[should_panic(expected = "is still recording")]
    fn test_begin_twice_without_end_panics() {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        let mut ring = ring(&mut backend, 2);
        let _open = ring.begin_frame(&backend).unwrap();
        let _ = ring.begin_frame(&backend);
    }

    #[test]
    #[should_panic(expected = "which is not recording")]
    fn test_end_without_begin_panics() {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        let mut ring = ring(&mut backend, 2);
        let cycle = ready(ring.acquire_presentable_image(&mut backend).unwrap());
        let _ = ring.end_frame(&mut backend, SlotToken { index: 0 }, cycle);
    }

    #[test]
    #[should_panic(expected = "cancel_frame on a slot that is not recording")]
    fn test_cancel_without_begin_panics() {
        let mut backend = DummyBackend::new(Extent2d::new(64, 64));
        let mut ring = ring(&mut backend, 2);
        ring.cancel_frame(SlotToken { index: 1 });
    }
}
