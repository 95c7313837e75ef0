// Frame executor
//
// Per-frame cycle: acquire an image, submit the command buffer pre-recorded
// for it, present it. One semaphore pair is shared by every frame and nothing
// fences the submissions, so the CPU may run ahead of the GPU by as many
// frames as the swapchain lets it acquire.
//
// A failed submit leaves the acquired image unreturned and image_available
// signalled with no waiter. The next acquire then signals an already
// signalled semaphore, which validation reports as an error. The loop keeps
// going regardless; there is no recovery path.

use anyhow::Result;
use ash::vk;
use thiserror::Error;

use crate::backend::command::{self, TriangleDraw};
use crate::backend::pipeline;
use crate::backend::sync::FrameSync;
use crate::backend::{DeviceContext, PipelineBundle, SwapchainBundle};
use crate::teardown::TeardownSequencer;

/// Stage at which the submission waits for the acquired image
pub const SUBMIT_WAIT_STAGE: vk::PipelineStageFlags =
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;

/// More images than this and a third acquire can signal a semaphore that the
/// previous submit has not consumed yet
pub const SEMAPHORE_SLACK: usize = 2;

/// Where the current iteration is in the cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording { image_index: u32 },
    Submitted { image_index: u32 },
    Presented { image_index: u32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("failed to acquire swapchain image: {0}")]
    Acquire(vk::Result),
    #[error("failed to submit command buffer for image {image_index}: {result}")]
    Submit { image_index: u32, result: vk::Result },
    #[error("failed to present image {image_index}: {result}")]
    Present { image_index: u32, result: vk::Result },
    #[error("acquired image {0} but only {1} command buffers were recorded")]
    UnknownImage(u32, usize),
}

/// The GPU calls made by one frame.
pub trait FrameOps {
    /// Block until an image is free; `signal` fires once it can be written.
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32, vk::Result>;

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
    ) -> Result<(), vk::Result>;

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<(), vk::Result>;

    fn wait_idle(&mut self) -> Result<(), vk::Result>;
}

/// Objects the per-frame cycle runs against
#[derive(Debug, Clone)]
pub struct FrameResources {
    /// One per swapchain image, same order
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_pool: vk::CommandPool,
    /// One per swapchain image, recorded once against the matching framebuffer
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub sync: FrameSync,
}

impl FrameResources {
    /// Framebuffers, then the command pool and its recorded buffers, then the
    /// semaphore pair.
    pub fn new(
        context: &DeviceContext,
        swapchain: &SwapchainBundle,
        pipeline: &PipelineBundle,
        clear_color: [f32; 4],
        ledger: &mut TeardownSequencer,
    ) -> Result<Self> {
        let device = &context.device;
        log::debug!(
            "Building frame resources for {} swapchain images",
            swapchain.images.len()
        );

        let framebuffers = pipeline::create_framebuffers(
            device,
            &swapchain.image_views,
            pipeline.render_pass,
            swapchain.extent,
            ledger,
        )?;

        let command_pool =
            command::create_command_pool(device, context.queue_families.graphics, ledger)?;
        let command_buffers =
            command::allocate_command_buffers(device, command_pool, framebuffers.len())?;

        let draw = TriangleDraw {
            render_pass: pipeline.render_pass,
            pipeline: pipeline.pipeline,
            extent: swapchain.extent,
            clear_color,
        };
        draw.record_all(device, &command_buffers, &framebuffers)?;

        let sync = FrameSync::new(device, ledger)?;

        Ok(Self {
            framebuffers,
            command_pool,
            command_buffers,
            sync,
        })
    }
}

pub struct FrameExecutor {
    resources: FrameResources,
    state: FrameState,
    frames_presented: u64,
}

impl FrameExecutor {
    pub fn new(resources: FrameResources) -> Self {
        let images = resources.command_buffers.len();
        log::info!(
            "Frame executor: {} framebuffers, {} command buffers from {:?}",
            resources.framebuffers.len(),
            images,
            resources.command_pool
        );
        if images > SEMAPHORE_SLACK {
            log::warn!(
                "Swapchain has {} images but only one semaphore pair; \
                 frames may reuse a semaphore that is still pending",
                images
            );
        }

        Self {
            resources,
            state: FrameState::Idle,
            frames_presented: 0,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Run one acquire, submit, present cycle and return the image index.
    ///
    /// A failed step skips the remaining ones and leaves the executor idle;
    /// the next call starts a fresh cycle.
    pub fn draw_frame<O: FrameOps>(&mut self, ops: &mut O) -> Result<u32, FrameError> {
        self.state = FrameState::Idle;

        match self.cycle(ops) {
            Ok(image_index) => {
                self.frames_presented += 1;
                log::trace!("Presented image {}", image_index);
                Ok(image_index)
            }
            Err(e) => {
                self.state = FrameState::Idle;
                Err(e)
            }
        }
    }

    fn cycle<O: FrameOps>(&mut self, ops: &mut O) -> Result<u32, FrameError> {
        let sync = self.resources.sync;

        let image_index = ops
            .acquire_next_image(sync.image_available)
            .map_err(FrameError::Acquire)?;

        let count = self.resources.command_buffers.len();
        let command_buffer = *self
            .resources
            .command_buffers
            .get(image_index as usize)
            .ok_or(FrameError::UnknownImage(image_index, count))?;
        self.state = FrameState::Recording { image_index };

        ops.submit(
            command_buffer,
            sync.image_available,
            SUBMIT_WAIT_STAGE,
            sync.render_finished,
        )
        .map_err(|result| FrameError::Submit {
            image_index,
            result,
        })?;
        self.state = FrameState::Submitted { image_index };

        ops.present(image_index, sync.render_finished)
            .map_err(|result| FrameError::Present {
                image_index,
                result,
            })?;
        self.state = FrameState::Presented { image_index };

        Ok(image_index)
    }

    /// Drain the device. Must run before any device-level object is destroyed.
    pub fn shutdown<O: FrameOps>(&mut self, ops: &mut O) {
        log::info!("Waiting for device to go idle...");
        if let Err(e) = ops.wait_idle() {
            log::error!("Device wait idle failed: {}", e);
        }
        self.state = FrameState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::teardown::tests::full_ledger;
    use crate::teardown::{Destroyer, TeardownStep};
    use ash::vk::Handle;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Acquire(vk::Semaphore),
        Submit {
            command_buffer: vk::CommandBuffer,
            wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            signal: vk::Semaphore,
        },
        Present {
            image_index: u32,
            wait: vk::Semaphore,
        },
        WaitIdle,
        Destroy(TeardownStep),
    }

    /// Stand-in device: hands out image indices in order and logs every call.
    #[derive(Default)]
    struct MockGpu {
        images: Vec<u32>,
        next: usize,
        fail_acquire: Option<vk::Result>,
        fail_submit: Option<vk::Result>,
        fail_present: Option<vk::Result>,
        events: Vec<Event>,
    }

    impl MockGpu {
        fn cycling(images: &[u32]) -> Self {
            Self {
                images: images.to_vec(),
                ..Default::default()
            }
        }
    }

    impl FrameOps for MockGpu {
        fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32, vk::Result> {
            self.events.push(Event::Acquire(signal));
            if let Some(e) = self.fail_acquire {
                return Err(e);
            }
            let index = self.images[self.next % self.images.len()];
            self.next += 1;
            Ok(index)
        }

        fn submit(
            &mut self,
            command_buffer: vk::CommandBuffer,
            wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            signal: vk::Semaphore,
        ) -> Result<(), vk::Result> {
            self.events.push(Event::Submit {
                command_buffer,
                wait,
                wait_stage,
                signal,
            });
            self.fail_submit.map_or(Ok(()), Err)
        }

        fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<(), vk::Result> {
            self.events.push(Event::Present { image_index, wait });
            self.fail_present.map_or(Ok(()), Err)
        }

        fn wait_idle(&mut self) -> Result<(), vk::Result> {
            self.events.push(Event::WaitIdle);
            Ok(())
        }
    }

    impl Destroyer for MockGpu {
        fn destroy(&mut self, step: TeardownStep) {
            self.events.push(Event::Destroy(step));
        }
    }

    // Handles line up with the synthetic teardown ledger
    fn resources(image_count: u64) -> FrameResources {
        FrameResources {
            framebuffers: (0..image_count)
                .map(|i| vk::Framebuffer::from_raw(200 + i))
                .collect(),
            command_pool: vk::CommandPool::from_raw(7),
            command_buffers: (0..image_count)
                .map(|i| vk::CommandBuffer::from_raw(300 + i))
                .collect(),
            sync: FrameSync {
                image_available: vk::Semaphore::from_raw(8),
                render_finished: vk::Semaphore::from_raw(9),
            },
        }
    }

    #[test]
    fn one_frame_is_one_acquire_submit_present() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut gpu = MockGpu::cycling(&[1]);

        assert_eq!(executor.draw_frame(&mut gpu), Ok(1));

        let sync = executor.resources.sync;
        assert_eq!(
            gpu.events,
            vec![
                Event::Acquire(sync.image_available),
                Event::Submit {
                    command_buffer: vk::CommandBuffer::from_raw(301),
                    wait: sync.image_available,
                    wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    signal: sync.render_finished,
                },
                Event::Present {
                    image_index: 1,
                    wait: sync.render_finished,
                },
            ]
        );
        assert_eq!(executor.state(), FrameState::Presented { image_index: 1 });
        assert_eq!(executor.frames_presented(), 1);
    }

    #[test]
    fn failed_acquire_skips_submit_and_present() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut gpu = MockGpu::cycling(&[0]);
        gpu.fail_acquire = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);

        let err = executor.draw_frame(&mut gpu).unwrap_err();

        assert_eq!(err, FrameError::Acquire(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert_eq!(gpu.events.len(), 1);
        assert_eq!(executor.state(), FrameState::Idle);
        assert_eq!(executor.frames_presented(), 0);
    }

    #[test]
    fn failed_submit_skips_present() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut gpu = MockGpu::cycling(&[1]);
        gpu.fail_submit = Some(vk::Result::ERROR_DEVICE_LOST);

        let err = executor.draw_frame(&mut gpu).unwrap_err();

        assert_eq!(
            err,
            FrameError::Submit {
                image_index: 1,
                result: vk::Result::ERROR_DEVICE_LOST
            }
        );
        assert!(!gpu
            .events
            .iter()
            .any(|e| matches!(e, Event::Present { .. })));
        assert_eq!(executor.state(), FrameState::Idle);
    }

    #[test]
    fn failed_present_is_reported_and_the_next_frame_still_runs() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut gpu = MockGpu::cycling(&[0, 1]);
        gpu.fail_present = Some(vk::Result::SUBOPTIMAL_KHR);

        assert!(matches!(
            executor.draw_frame(&mut gpu),
            Err(FrameError::Present { image_index: 0, .. })
        ));

        gpu.fail_present = None;
        assert_eq!(executor.draw_frame(&mut gpu), Ok(1));
        assert_eq!(executor.frames_presented(), 1);
    }

    #[test]
    fn out_of_range_image_index_is_rejected_before_submit() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut gpu = MockGpu::cycling(&[5]);

        assert_eq!(
            executor.draw_frame(&mut gpu),
            Err(FrameError::UnknownImage(5, 2))
        );
        assert_eq!(gpu.events.len(), 1);
    }

    #[test]
    fn steady_loop_then_drain_then_teardown() {
        let mut executor = FrameExecutor::new(resources(2));
        let mut ledger = full_ledger(2, true);
        let mut gpu = MockGpu::cycling(&[0, 1, 0]);

        for _ in 0..3 {
            executor.draw_frame(&mut gpu).unwrap();
        }
        executor.shutdown(&mut gpu);
        ledger.run(&mut gpu);

        // Each frame is a triple that agrees on the image index
        for (frame, triple) in gpu.events[..9].chunks(3).enumerate() {
            let expected = [0, 1, 0][frame];
            assert!(matches!(triple[0], Event::Acquire(_)));
            match triple[1] {
                Event::Submit { command_buffer, .. } => {
                    assert_eq!(command_buffer, vk::CommandBuffer::from_raw(300 + expected))
                }
                other => panic!("expected submit, got {:?}", other),
            }
            assert_eq!(
                triple[2],
                Event::Present {
                    image_index: expected as u32,
                    wait: vk::Semaphore::from_raw(9),
                }
            );
        }

        assert_eq!(gpu.events[9], Event::WaitIdle);
        assert_eq!(
            gpu.events[10],
            Event::Destroy(TeardownStep::Semaphore(vk::Semaphore::from_raw(9)))
        );
        assert_eq!(
            gpu.events.last(),
            Some(&Event::Destroy(TeardownStep::Instance))
        );
        assert_eq!(executor.frames_presented(), 3);
        assert_eq!(executor.state(), FrameState::Idle);
        assert!(ledger.is_empty());
    }
}
