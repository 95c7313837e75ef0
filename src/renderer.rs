// Renderer - wires the device, swapchain, pipeline and frame executor together
//
// Construction order is the creation ledger's order. Everything built here is
// destroyed by replaying that ledger, never by Drop impls on the parts.

use anyhow::Result;
use ash::vk;
use winit::window::Window;

use crate::backend::device::DeviceRequirements;
use crate::backend::{DeviceContext, PipelineBundle, SwapchainBundle};
use crate::config::Config;
use crate::frame::{FrameError, FrameExecutor, FrameOps, FrameResources};
use crate::teardown::TeardownSequencer;

pub struct Renderer {
    context: DeviceContext,
    swapchain: SwapchainBundle,
    executor: FrameExecutor,
    ledger: TeardownSequencer,
}

impl Renderer {
    pub fn new(config: &Config, window: &Window) -> Result<Self> {
        let mut ledger = TeardownSequencer::default();

        let context = DeviceContext::new(
            &config.window.title,
            window,
            config.diagnostics_enabled(),
            DeviceRequirements::from_config(config),
            &mut ledger,
        )?;

        match Self::build(&context, config, window, &mut ledger) {
            Ok((swapchain, executor)) => {
                log::info!(
                    "Renderer ready on {} ({} objects tracked)",
                    context.device_name(),
                    ledger.len()
                );
                Ok(Self {
                    context,
                    swapchain,
                    executor,
                    ledger,
                })
            }
            Err(e) => {
                ledger.run(&mut context.destroyer());
                Err(e)
            }
        }
    }

    fn build(
        context: &DeviceContext,
        config: &Config,
        window: &Window,
        ledger: &mut TeardownSequencer,
    ) -> Result<(SwapchainBundle, FrameExecutor)> {
        let swapchain = SwapchainBundle::new(context, || framebuffer_size(window), ledger)?;

        let pipeline = PipelineBundle::new(
            &context.device,
            swapchain.format,
            swapchain.extent,
            &config.graphics.vertex_shader,
            &config.graphics.fragment_shader,
            ledger,
        )?;

        let resources = FrameResources::new(
            context,
            &swapchain,
            &pipeline,
            config.graphics.clear_color,
            ledger,
        )?;

        // From here on the pipeline is reached only through the recorded buffers
        Ok((swapchain, FrameExecutor::new(resources)))
    }

    pub fn draw_frame(&mut self) -> Result<u32, FrameError> {
        let mut ops = VulkanFrameOps {
            context: &self.context,
            swapchain: &self.swapchain,
        };
        self.executor.draw_frame(&mut ops)
    }

    /// Drain the device, then destroy everything in reverse creation order.
    /// Safe to call more than once.
    pub fn teardown(&mut self) {
        if self.ledger.is_empty() {
            return;
        }

        let mut ops = VulkanFrameOps {
            context: &self.context,
            swapchain: &self.swapchain,
        };
        log::debug!("Shutting down from {:?}", self.executor.state());
        self.executor.shutdown(&mut ops);
        log::info!("Presented {} frames", self.executor.frames_presented());

        self.ledger.run(&mut self.context.destroyer());
        log::info!("Cleanup complete");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Live window size in pixels
fn framebuffer_size(window: &Window) -> vk::Extent2D {
    let size = window.inner_size();
    vk::Extent2D {
        width: size.width,
        height: size.height,
    }
}

/// Submits to the graphics queue and presents on the present queue
struct VulkanFrameOps<'a> {
    context: &'a DeviceContext,
    swapchain: &'a SwapchainBundle,
}

impl FrameOps for VulkanFrameOps<'_> {
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<u32, vk::Result> {
        let (index, suboptimal) = unsafe {
            self.context.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        }?;
        if suboptimal {
            log::debug!("Acquired image {} from a suboptimal swapchain", index);
        }
        Ok(index)
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
    ) -> Result<(), vk::Result> {
        let wait_semaphores = [wait];
        let wait_stages = [wait_stage];
        let command_buffers = [command_buffer];
        let signal_semaphores = [signal];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context.device.queue_submit(
                self.context.graphics_queue,
                &[submit_info],
                vk::Fence::null(),
            )
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<(), vk::Result> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe {
            self.context
                .swapchain_loader
                .queue_present(self.context.present_queue, &present_info)
        }?;
        if suboptimal {
            log::debug!("Presented image {} to a suboptimal swapchain", image_index);
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), vk::Result> {
        self.context.wait_idle()
    }
}
