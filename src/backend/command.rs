// Command pool and command buffer recording
//
// Every swapchain image gets one primary command buffer, recorded once at
// setup and resubmitted unchanged every time that image comes back.

use anyhow::{Context, Result};
use ash::vk;

use crate::teardown::{TeardownSequencer, TeardownStep};

/// The triangle's vertices are generated in the vertex shader
pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

/// Pool on the graphics family. Buffers are never reset individually.
pub fn create_command_pool(
    device: &ash::Device,
    graphics_family: u32,
    ledger: &mut TeardownSequencer,
) -> Result<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(graphics_family)
        .flags(vk::CommandPoolCreateFlags::empty());

    let pool = unsafe { device.create_command_pool(&pool_info, None) }
        .context("Failed to create command pool")?;
    ledger.record(TeardownStep::CommandPool(pool));
    Ok(pool)
}

/// Freed together with the pool
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count as u32);

    unsafe { device.allocate_command_buffers(&alloc_info) }
        .context("Failed to allocate command buffers")
}

pub fn clear_value(clear_color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    }
}

/// Full-extent render area starting at the origin
pub fn render_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Everything one recorded buffer needs
#[derive(Debug, Clone, Copy)]
pub struct TriangleDraw {
    pub render_pass: vk::RenderPass,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

impl TriangleDraw {
    /// Clear the framebuffer, draw the triangle, close the buffer.
    pub fn record(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
    ) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder();
        let clear_values = [clear_value(self.clear_color)];
        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area(self.extent))
            .clear_values(&clear_values);

        unsafe {
            device
                .begin_command_buffer(cmd, &begin_info)
                .context("Failed to begin command buffer")?;

            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline);
            device.cmd_draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device
                .end_command_buffer(cmd)
                .context("Failed to record command buffer")?;
        }

        Ok(())
    }

    /// Record one buffer per framebuffer, paired by index
    pub fn record_all(
        &self,
        device: &ash::Device,
        command_buffers: &[vk::CommandBuffer],
        framebuffers: &[vk::Framebuffer],
    ) -> Result<()> {
        if command_buffers.len() != framebuffers.len() {
            anyhow::bail!(
                "{} command buffers for {} framebuffers",
                command_buffers.len(),
                framebuffers.len()
            );
        }

        for (i, (&cmd, &framebuffer)) in command_buffers.iter().zip(framebuffers).enumerate() {
            self.record(device, cmd, framebuffer)
                .with_context(|| format!("Recording command buffer {}", i))?;
        }

        log::info!("Recorded {} command buffers", command_buffers.len());
        Ok(())
    }
}
