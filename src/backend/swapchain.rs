// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// The selection rules are plain functions over the reported support so they
// can be checked without a GPU.

use anyhow::{Context, Result};
use ash::prelude::VkResult;
use ash::vk;

use super::device::{DeviceContext, QueueFamilies};
use super::surface::SwapchainSupport;
use crate::teardown::{TeardownSequencer, TeardownStep};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Prefer BGRA sRGB, otherwise take whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first())
        .copied()
}

/// FIFO (vsync) is the only mode every implementation must support. No
/// adaptive selection.
pub fn choose_present_mode(_available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    vk::PresentModeKHR::FIFO
}

/// Use the surface's current extent, unless it reports the `u32::MAX`
/// sentinel; then ask the window for its framebuffer size and clamp each
/// axis into the supported range.
pub fn choose_extent<F>(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: F,
) -> vk::Extent2D
where
    F: FnOnce() -> vk::Extent2D,
{
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let size = framebuffer_size();
    vk::Extent2D {
        width: size.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: size.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one
/// (`max_image_count == 0` means unbounded)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }
    image_count
}

/// How swapchain images are shared between the graphics and present queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    Concurrent([u32; 2]),
}

impl ImageSharing {
    pub fn for_families(families: &QueueFamilies) -> Self {
        if families.is_shared() {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([families.graphics, families.present])
        }
    }

    pub fn mode(&self) -> vk::SharingMode {
        match self {
            ImageSharing::Exclusive => vk::SharingMode::EXCLUSIVE,
            ImageSharing::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    pub fn queue_family_indices(&self) -> &[u32] {
        match self {
            ImageSharing::Exclusive => &[],
            ImageSharing::Concurrent(indices) => indices,
        }
    }
}

/// Everything picked from the surface support before creation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing: ImageSharing,
}

impl SwapchainSettings {
    pub fn choose<F>(
        support: &SwapchainSupport,
        families: &QueueFamilies,
        framebuffer_size: F,
    ) -> Result<Self>
    where
        F: FnOnce() -> vk::Extent2D,
    {
        let surface_format =
            choose_surface_format(&support.formats).context("No suitable surface format")?;

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
            sharing: ImageSharing::for_families(families),
        })
    }

    pub fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHRBuilder<'_> {
        vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(self.sharing.mode())
            .queue_family_indices(self.sharing.queue_family_indices())
            .pre_transform(self.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
    }
}

/// 2D color view over one swapchain image, identity swizzle, one mip, one layer
pub fn image_view_info(image: vk::Image, format: vk::Format) -> vk::ImageViewCreateInfo {
    vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

/// Exactly one view per image, in image order
pub fn create_image_views<F>(
    images: &[vk::Image],
    format: vk::Format,
    mut create: F,
) -> Result<Vec<vk::ImageView>>
where
    F: FnMut(&vk::ImageViewCreateInfo) -> VkResult<vk::ImageView>,
{
    images
        .iter()
        .enumerate()
        .map(|(i, &image)| {
            create(&image_view_info(image, format))
                .with_context(|| format!("Failed to create image view {}", i))
        })
        .collect()
}

pub struct SwapchainBundle {
    pub handle: vk::SwapchainKHR,
    /// Owned by the swapchain, never destroyed individually
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl SwapchainBundle {
    pub fn new<F>(
        context: &DeviceContext,
        framebuffer_size: F,
        ledger: &mut TeardownSequencer,
    ) -> Result<Self>
    where
        F: FnOnce() -> vk::Extent2D,
    {
        let support = SwapchainSupport::query(&context.surface, context.physical_device)
            .context("Failed to query swapchain support")?;
        let settings =
            SwapchainSettings::choose(&support, &context.queue_families, framebuffer_size)?;

        log::info!(
            "Creating swapchain: {}x{} {:?} {:?}, {} images requested, {:?} sharing",
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.present_mode,
            settings.image_count,
            settings.sharing.mode()
        );

        let handle = unsafe {
            context
                .swapchain_loader
                .create_swapchain(&settings.create_info(context.surface.handle), None)
        }
        .context("Failed to create swapchain")?;
        ledger.record(TeardownStep::Swapchain(handle));

        // The implementation may hand back more images than requested
        let images = unsafe { context.swapchain_loader.get_swapchain_images(handle) }
            .context("Failed to get swapchain images")?;
        log::info!("Created swapchain with {} images", images.len());

        let format = settings.surface_format.format;
        let image_views = create_image_views(&images, format, |info| {
            let view = unsafe { context.device.create_image_view(info, None) }?;
            ledger.record(TeardownStep::ImageView(view));
            Ok(view)
        })?;

        Ok(Self {
            handle,
            images,
            image_views,
            format,
            extent: settings.extent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn variable_extent_caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 200,
                height: 200,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        }
    }

    #[test]
    fn prefers_bgra_srgb() {
        let fallback = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let chosen = choose_surface_format(&[fallback, PREFERRED_SURFACE_FORMAT]).unwrap();

        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn falls_back_to_first_format() {
        let first = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        // Right format, wrong color space
        let p3 = vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT;
        let second = format(vk::Format::B8G8R8A8_SRGB, p3);
        let chosen = choose_surface_format(&[first, second]).unwrap();

        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn present_mode_is_always_fifo() {
        let chosen = choose_present_mode(&[
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
        ]);
        assert_eq!(chosen, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_clamps_each_axis_independently() {
        let chosen = choose_extent(&variable_extent_caps(), || vk::Extent2D {
            width: 50,
            height: 4000,
        });

        assert_eq!(chosen.width, 200);
        assert_eq!(chosen.height, 2000);
    }

    #[test]
    fn fixed_extent_is_used_verbatim_without_asking_the_window() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            ..variable_extent_caps()
        };

        let chosen = choose_extent(&capabilities, || panic!("window size queried"));

        assert_eq!(chosen.width, 1280);
        assert_eq!(chosen.height, 720);
    }

    #[test]
    fn image_count_is_capped_by_max() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 3);

        let tight = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&tight), 3);
    }

    #[test]
    fn image_count_unbounded_when_max_is_zero() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);
    }

    #[test]
    fn split_families_share_images_concurrently() {
        let support = SwapchainSupport {
            capabilities: variable_extent_caps(),
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies {
            graphics: 0,
            present: 1,
        };
        let settings = SwapchainSettings::choose(&support, &families, || vk::Extent2D {
            width: 800,
            height: 600,
        })
        .unwrap();

        let info = settings.create_info(vk::SurfaceKHR::from_raw(1)).build();
        assert_eq!(info.image_sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        let indices = unsafe { std::slice::from_raw_parts(info.p_queue_family_indices, 2) };
        assert_eq!(indices, &[0, 1]);
    }

    #[test]
    fn shared_family_uses_exclusive_images() {
        let support = SwapchainSupport {
            capabilities: variable_extent_caps(),
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let families = QueueFamilies {
            graphics: 2,
            present: 2,
        };
        let settings = SwapchainSettings::choose(&support, &families, || vk::Extent2D {
            width: 800,
            height: 600,
        })
        .unwrap();

        let info = settings.create_info(vk::SurfaceKHR::from_raw(1)).build();
        assert_eq!(info.image_sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);
        assert_eq!(info.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(info.image_extent.width, 800);
    }

    #[test]
    fn one_view_per_image_in_swapchain_format() {
        let images: Vec<vk::Image> = (1..=3).map(vk::Image::from_raw).collect();
        let mut seen = Vec::new();

        let views = create_image_views(&images, vk::Format::B8G8R8A8_SRGB, |info| {
            seen.push((info.image, info.format, info.view_type));
            Ok(vk::ImageView::from_raw(info.image.as_raw() + 100))
        })
        .unwrap();

        assert_eq!(views.len(), images.len());
        assert_eq!(seen.len(), images.len());
        for (i, (image, format, view_type)) in seen.into_iter().enumerate() {
            assert_eq!(image, images[i]);
            assert_eq!(format, vk::Format::B8G8R8A8_SRGB);
            assert_eq!(view_type, vk::ImageViewType::TYPE_2D);
        }
    }

    #[test]
    fn view_covers_single_mip_and_layer() {
        let info = image_view_info(vk::Image::from_raw(7), vk::Format::B8G8R8A8_SRGB);

        assert_eq!(info.components.r, vk::ComponentSwizzle::IDENTITY);
        assert_eq!(info.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
        assert_eq!(info.subresource_range.level_count, 1);
        assert_eq!(info.subresource_range.layer_count, 1);
    }

    #[test]
    fn view_creation_failure_stops_and_reports() {
        let images: Vec<vk::Image> = (1..=3).map(vk::Image::from_raw).collect();
        let mut created = 0;

        let result = create_image_views(&images, vk::Format::B8G8R8A8_SRGB, |_| {
            if created == 1 {
                return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
            }
            created += 1;
            Ok(vk::ImageView::from_raw(created))
        });

        assert!(result.is_err());
        assert_eq!(created, 1);
    }
}
