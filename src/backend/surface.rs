// Presentation surface
//
// The platform surface a window presents through, and the per-device
// swapchain support query made against it.

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::prelude::VkResult;
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::c_char;

pub struct PresentationSurface {
    pub loader: khr::Surface,
    pub handle: vk::SurfaceKHR,
}

impl PresentationSurface {
    pub fn new<W>(entry: &Entry, instance: &ash::Instance, window: &W) -> Result<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let loader = khr::Surface::new(entry, instance);
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .context("Failed to create window surface")?;

        Ok(Self { loader, handle })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, queue_family: u32) -> bool {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
        }
        .unwrap_or_else(|e| {
            log::warn!(
                "Presentation support query failed for family {}: {}",
                queue_family,
                e
            );
            false
        })
    }
}

/// Instance extensions the window system needs for surface creation
pub fn required_instance_extensions<W: HasRawDisplayHandle>(
    window: &W,
) -> Result<&'static [*const c_char]> {
    ash_window::enumerate_required_extensions(window.raw_display_handle())
        .context("Window system is not supported by ash-window")
}

/// What a physical device can do with a surface. Queried fresh for every
/// swapchain build, never cached.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        surface: &PresentationSurface,
        physical_device: vk::PhysicalDevice,
    ) -> VkResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface
                    .loader
                    .get_physical_device_surface_capabilities(physical_device, surface.handle)?,
                formats: surface
                    .loader
                    .get_physical_device_surface_formats(physical_device, surface.handle)?,
                present_modes: surface
                    .loader
                    .get_physical_device_surface_present_modes(physical_device, surface.handle)?,
            })
        }
    }

    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}
