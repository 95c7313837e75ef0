// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Object lifetimes are not managed here: every
// constructor records what it created in the teardown ledger instead.

pub mod command;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::DeviceContext;
pub use pipeline::PipelineBundle;
pub use swapchain::SwapchainBundle;
