// Teardown sequencing
//
// Every Vulkan object is recorded here at the moment it is created. Teardown
// replays the ledger backwards, so objects die in reverse creation order, and
// a dependency tier per object kind guarantees that an object never outlives
// something it was built from, even if the ledger was filled out of order.

use ash::extensions::{ext::DebugUtils, khr};
use ash::vk;
use std::cmp::Reverse;

/// One destroyable object owned by the renderer.
///
/// Swapchain images and command buffers are absent on purpose: the swapchain
/// owns its images and the command pool frees its buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownStep {
    Instance,
    Surface(vk::SurfaceKHR),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Device,
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    RenderPass(vk::RenderPass),
    PipelineLayout(vk::PipelineLayout),
    Pipeline(vk::Pipeline),
    Framebuffer(vk::Framebuffer),
    CommandPool(vk::CommandPool),
    Semaphore(vk::Semaphore),
}

impl TeardownStep {
    /// Position in the dependency graph. Higher tiers are destroyed first.
    pub fn tier(&self) -> u8 {
        match self {
            TeardownStep::Instance => 0,
            TeardownStep::Surface(_) => 1,
            TeardownStep::DebugMessenger(_) => 2,
            TeardownStep::Device => 3,
            TeardownStep::Swapchain(_) => 4,
            TeardownStep::ImageView(_) => 5,
            TeardownStep::RenderPass(_) => 6,
            TeardownStep::PipelineLayout(_) => 7,
            TeardownStep::Pipeline(_) => 8,
            TeardownStep::Framebuffer(_) => 9,
            TeardownStep::CommandPool(_) => 10,
            TeardownStep::Semaphore(_) => 11,
        }
    }
}

/// Something that can destroy the objects named by a [`TeardownStep`].
pub trait Destroyer {
    fn destroy(&mut self, step: TeardownStep);
}

/// Creation ledger that doubles as the teardown plan.
#[derive(Debug, Default)]
pub struct TeardownSequencer {
    created: Vec<TeardownStep>,
}

impl TeardownSequencer {
    pub fn record(&mut self, step: TeardownStep) {
        log::trace!("Created {:?}", step);
        self.created.push(step);
    }

    pub fn len(&self) -> usize {
        self.created.len()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
    }

    /// Reverse creation order, stably re-sorted by dependency tier.
    pub fn destruction_order(&self) -> Vec<TeardownStep> {
        let mut steps: Vec<_> = self.created.iter().rev().copied().collect();
        steps.sort_by_key(|step| Reverse(step.tier()));
        steps
    }

    /// Destroy everything recorded so far. The ledger is empty afterwards, so
    /// a second call is a no-op.
    pub fn run<D: Destroyer>(&mut self, destroyer: &mut D) {
        if self.created.is_empty() {
            return;
        }

        let order = self.destruction_order();
        if order.iter().ne(self.created.iter().rev()) {
            log::warn!("Teardown ledger was recorded out of dependency order, reordering");
        }

        log::info!("Destroying {} Vulkan objects...", order.len());
        for step in order {
            log::debug!("Destroying {:?}", step);
            destroyer.destroy(step);
        }
        self.created.clear();
    }
}

/// Destroys real Vulkan objects. Loaders that were never created stay `None`;
/// the ledger can only name objects whose loader existed at creation time.
pub struct VulkanDestroyer<'a> {
    pub instance: &'a ash::Instance,
    pub surface_loader: &'a khr::Surface,
    pub debug_utils: Option<&'a DebugUtils>,
    pub device: Option<&'a ash::Device>,
    pub swapchain_loader: Option<&'a khr::Swapchain>,
}

impl Destroyer for VulkanDestroyer<'_> {
    fn destroy(&mut self, step: TeardownStep) {
        let Some(device) = self.device else {
            unsafe { self.destroy_instance_level(step) };
            return;
        };

        unsafe {
            match step {
                TeardownStep::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
                TeardownStep::CommandPool(pool) => device.destroy_command_pool(pool, None),
                TeardownStep::Framebuffer(framebuffer) => {
                    device.destroy_framebuffer(framebuffer, None)
                }
                TeardownStep::Pipeline(pipeline) => device.destroy_pipeline(pipeline, None),
                TeardownStep::PipelineLayout(layout) => {
                    device.destroy_pipeline_layout(layout, None)
                }
                TeardownStep::RenderPass(render_pass) => {
                    device.destroy_render_pass(render_pass, None)
                }
                TeardownStep::ImageView(view) => device.destroy_image_view(view, None),
                TeardownStep::Swapchain(swapchain) => match self.swapchain_loader {
                    Some(loader) => loader.destroy_swapchain(swapchain, None),
                    None => log::error!("Swapchain recorded without a swapchain loader"),
                },
                TeardownStep::Device => device.destroy_device(None),
                _ => self.destroy_instance_level(step),
            }
        }
    }
}

impl VulkanDestroyer<'_> {
    unsafe fn destroy_instance_level(&self, step: TeardownStep) {
        match step {
            TeardownStep::DebugMessenger(messenger) => match self.debug_utils {
                Some(debug_utils) => debug_utils.destroy_debug_utils_messenger(messenger, None),
                None => log::error!("Debug messenger recorded without debug utils loaded"),
            },
            TeardownStep::Surface(surface) => self.surface_loader.destroy_surface(surface, None),
            TeardownStep::Instance => self.instance.destroy_instance(None),
            other => log::error!("{:?} recorded without a logical device", other),
        }
    }
}
