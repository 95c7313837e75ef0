// Device context - Core GPU interface
//
// Responsibilities:
// - Instance creation, optionally with validation layers and a debug messenger
// - Presentation surface for the window
// - Physical device selection against a suitability predicate
// - Logical device + graphics/presentation queues

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use thiserror::Error;

use super::surface::{self, PresentationSurface, SwapchainSupport};
use crate::config::Config;
use crate::teardown::{TeardownSequencer, TeardownStep, VulkanDestroyer};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device-level extensions every candidate must expose
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

// =============================================================================
// QUEUE FAMILIES
// =============================================================================

/// Result of a queue family scan. Either role may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    /// Scan the families once, keeping the first family with graphics support
    /// and the first one that can present. They are found independently and
    /// may be the same family.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> Self
    where
        F: FnMut(u32) -> bool,
    {
        let mut indices = Self::default();

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
            {
                indices.graphics = Some(index);
            }
            if indices.present.is_none() && supports_present(index) {
                indices.present = Some(index);
            }
            if indices.is_complete() {
                break;
            }
        }

        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Queue families of a usable device; both roles are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first. Vulkan rejects two queue
    /// create infos for the same family.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// One queue create info per unique family, all sharing `priorities`.
pub fn queue_create_infos(
    families: &QueueFamilies,
    priorities: &[f32],
) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|index| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(index)
                .queue_priorities(priorities)
                .build()
        })
        .collect()
}

// =============================================================================
// DEVICE SUITABILITY
// =============================================================================

/// Filters that come from configuration rather than from the surface
#[derive(Debug, Clone, Copy)]
pub struct DeviceRequirements {
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
}

impl DeviceRequirements {
    pub fn from_config(config: &Config) -> Self {
        Self {
            device_type: config.get_device_type(),
            geometry_shader: config.device.require_geometry_shader,
        }
    }
}

/// Why a device was passed over
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Unsuitable {
    #[error("no graphics queue family")]
    NoGraphicsQueue,
    #[error("no queue family can present to the surface")]
    NoPresentQueue,
    #[error("missing device extensions: {0:?}")]
    MissingExtensions(Vec<String>),
    #[error("surface reports no formats or no present modes")]
    InadequateSwapchain,
    #[error("geometry shaders not supported")]
    NoGeometryShader,
    #[error("device type {found:?} is not {wanted:?}")]
    WrongType {
        found: vk::PhysicalDeviceType,
        wanted: vk::PhysicalDeviceType,
    },
}

/// Everything selection needs to know about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub queue_families: QueueFamilyIndices,
    pub missing_extensions: Vec<String>,
    /// Only queried once the swapchain extension is known to be present
    pub swapchain_support: Option<SwapchainSupport>,
}

impl DeviceCandidate {
    /// First failed predicate, or `None` if the device is usable
    pub fn check(&self, requirements: &DeviceRequirements) -> Option<Unsuitable> {
        if self.queue_families.graphics.is_none() {
            return Some(Unsuitable::NoGraphicsQueue);
        }
        if self.queue_families.present.is_none() {
            return Some(Unsuitable::NoPresentQueue);
        }
        if !self.missing_extensions.is_empty() {
            return Some(Unsuitable::MissingExtensions(self.missing_extensions.clone()));
        }
        if !self
            .swapchain_support
            .as_ref()
            .is_some_and(SwapchainSupport::is_adequate)
        {
            return Some(Unsuitable::InadequateSwapchain);
        }
        if requirements.geometry_shader && !self.geometry_shader {
            return Some(Unsuitable::NoGeometryShader);
        }
        if self.device_type != requirements.device_type {
            return Some(Unsuitable::WrongType {
                found: self.device_type,
                wanted: requirements.device_type,
            });
        }
        None
    }

    pub fn is_suitable(&self, requirements: &DeviceRequirements) -> bool {
        self.check(requirements).is_none()
    }
}

/// Index of the first suitable candidate
pub fn select_device(
    candidates: &[DeviceCandidate],
    requirements: &DeviceRequirements,
) -> Option<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.is_suitable(requirements))
}

/// Drop devices whose description failed. A failed query disqualifies only
/// that device, the same as a failed predicate.
pub fn keep_described<T, I>(described: I) -> Vec<(T, DeviceCandidate)>
where
    I: IntoIterator<Item = (T, Result<DeviceCandidate>)>,
{
    described
        .into_iter()
        .enumerate()
        .filter_map(|(i, (device, candidate))| match candidate {
            Ok(candidate) => Some((device, candidate)),
            Err(e) => {
                log::warn!("Skipping GPU {}: {:#}", i, e);
                None
            }
        })
        .collect()
}

/// Names from `required` that `available` does not list
pub fn missing_extensions(
    required: &[&CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<String> {
    required
        .iter()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == **name)
        })
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

pub fn has_layer(available: &[vk::LayerProperties], name: &CStr) -> bool {
    available
        .iter()
        .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == name)
}

fn validation_layer_names(diagnostics: bool) -> Vec<*const c_char> {
    if diagnostics {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        vec![]
    }
}

// =============================================================================
// DEVICE CONTEXT
// =============================================================================

/// Owns the instance, surface and logical device. Nothing here is destroyed on
/// drop; the teardown ledger does that in dependency order.
pub struct DeviceContext {
    _entry: Entry,
    pub instance: ash::Instance,
    pub debug_utils: Option<DebugUtils>,
    pub surface: PresentationSurface,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub swapchain_loader: khr::Swapchain,

    pub queue_families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub properties: vk::PhysicalDeviceProperties,
}

/// Objects created after the instance, before the context exists
struct Opened {
    surface: PresentationSurface,
    physical_device: vk::PhysicalDevice,
    queue_families: QueueFamilies,
    device: ash::Device,
}

impl DeviceContext {
    /// Create the device context
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `diagnostics` - Enable validation layers and the debug messenger
    pub fn new<W>(
        app_name: &str,
        window: &W,
        diagnostics: bool,
        requirements: DeviceRequirements,
        ledger: &mut TeardownSequencer,
    ) -> Result<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Creating Vulkan device context: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        if diagnostics && !Self::validation_layer_available(&entry)? {
            anyhow::bail!(
                "Validation layers requested but {} is not installed",
                VALIDATION_LAYER.to_string_lossy()
            );
        }
        Self::log_instance_extensions(&entry);

        let instance = Self::create_instance(&entry, app_name, window, diagnostics)?;
        ledger.record(TeardownStep::Instance);

        let surface_loader = khr::Surface::new(&entry, &instance);
        let debug_utils = diagnostics.then(|| DebugUtils::new(&entry, &instance));

        let opened = match Self::open(
            &entry,
            &instance,
            debug_utils.as_ref(),
            window,
            diagnostics,
            &requirements,
            ledger,
        ) {
            Ok(opened) => opened,
            Err(e) => {
                ledger.run(&mut VulkanDestroyer {
                    instance: &instance,
                    surface_loader: &surface_loader,
                    debug_utils: debug_utils.as_ref(),
                    device: None,
                    swapchain_loader: None,
                });
                return Err(e);
            }
        };

        let properties =
            unsafe { instance.get_physical_device_properties(opened.physical_device) };
        let families = opened.queue_families;
        let graphics_queue = unsafe { opened.device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { opened.device.get_device_queue(families.present, 0) };
        let swapchain_loader = khr::Swapchain::new(&instance, &opened.device);

        log::info!(
            "Queue families: graphics={} present={}{}",
            families.graphics,
            families.present,
            if families.is_shared() { " (shared)" } else { "" }
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug_utils,
            surface: opened.surface,
            physical_device: opened.physical_device,
            device: opened.device,
            swapchain_loader,
            queue_families: families,
            graphics_queue,
            present_queue,
            properties,
        })
    }

    /// Surface, messenger, device selection and logical device. Everything
    /// created here is in the ledger by the time an error returns.
    fn open<W>(
        entry: &Entry,
        instance: &ash::Instance,
        debug_utils: Option<&DebugUtils>,
        window: &W,
        diagnostics: bool,
        requirements: &DeviceRequirements,
        ledger: &mut TeardownSequencer,
    ) -> Result<Opened>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let surface = PresentationSurface::new(entry, instance, window)?;
        ledger.record(TeardownStep::Surface(surface.handle));

        if let Some(debug_utils) = debug_utils {
            let messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&debug_messenger_info(), None)
            }
            .context("Failed to set up debug messenger")?;
            ledger.record(TeardownStep::DebugMessenger(messenger));
        }

        let (physical_device, queue_families) =
            Self::pick_physical_device(instance, &surface, requirements)?;

        let device =
            Self::create_logical_device(instance, physical_device, &queue_families, diagnostics)?;
        ledger.record(TeardownStep::Device);

        Ok(Opened {
            surface,
            physical_device,
            queue_families,
            device,
        })
    }

    fn validation_layer_available(entry: &Entry) -> Result<bool> {
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .context("Failed to enumerate instance layers")?;
        Ok(has_layer(&layers, VALIDATION_LAYER))
    }

    fn log_instance_extensions(entry: &Entry) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        match unsafe { entry.enumerate_instance_extension_properties(None) } {
            Ok(extensions) => {
                log::debug!("{} instance extensions available:", extensions.len());
                for ext in &extensions {
                    let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
                    log::debug!("  {}", name.to_string_lossy());
                }
            }
            Err(e) => log::debug!("Could not list instance extensions: {}", e),
        }
    }

    fn create_instance<W: HasRawDisplayHandle>(
        entry: &Entry,
        app_name: &str,
        window: &W,
        diagnostics: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let mut extensions = surface::required_instance_extensions(window)?.to_vec();
        if diagnostics {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = validation_layer_names(diagnostics);

        // Chained so instance creation and destruction are covered too
        let mut debug_info = debug_messenger_info();

        let mut create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);
        if diagnostics {
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn describe(
        instance: &ash::Instance,
        surface: &PresentationSurface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<DeviceCandidate> {
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .context("Failed to enumerate device extensions")?;

        let queue_families = QueueFamilyIndices::find(&families, |index| {
            surface.supports_present(physical_device, index)
        });
        let missing_extensions = missing_extensions(&required_device_extensions(), &extensions);

        let swapchain_support = if missing_extensions.is_empty() {
            Some(
                SwapchainSupport::query(surface, physical_device)
                    .context("Failed to query swapchain support")?,
            )
        } else {
            None
        };

        Ok(DeviceCandidate {
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            device_type: props.device_type,
            geometry_shader: features.geometry_shader == vk::TRUE,
            queue_families,
            missing_extensions,
            swapchain_support,
        })
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface: &PresentationSurface,
        requirements: &DeviceRequirements,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .context("Failed to enumerate physical devices")?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let (devices, candidates): (Vec<_>, Vec<_>) = keep_described(
            devices
                .iter()
                .map(|&device| (device, Self::describe(instance, surface, device))),
        )
        .into_iter()
        .unzip();

        for candidate in &candidates {
            if let Some(reason) = candidate.check(requirements) {
                log::info!("Skipping GPU {}: {}", candidate.name, reason);
            }
        }

        let index = select_device(&candidates, requirements)
            .ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))?;
        let chosen = &candidates[index];
        let families = chosen
            .queue_families
            .resolve()
            .context("Suitable GPU without complete queue families")?;

        let props = unsafe { instance.get_physical_device_properties(devices[index]) };
        log::info!("Selected GPU: {}", chosen.name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            vk::api_version_patch(props.api_version)
        );

        Ok((devices[index], families))
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilies,
        diagnostics: bool,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_infos = queue_create_infos(families, &queue_priorities);

        let extensions: Vec<*const c_char> = required_device_extensions()
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device layers are ignored by current loaders, set for older ones
        let layer_names = validation_layer_names(diagnostics);
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        Ok(device)
    }

    pub fn destroyer(&self) -> VulkanDestroyer<'_> {
        VulkanDestroyer {
            instance: &self.instance,
            surface_loader: &self.surface.loader,
            debug_utils: self.debug_utils.as_ref(),
            device: Some(&self.device),
            swapchain_loader: Some(&self.swapchain_loader),
        }
    }

    pub fn device_name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> ash::prelude::VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, &src) in props.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as c_char;
        }
        props
    }

    fn requirements() -> DeviceRequirements {
        DeviceRequirements {
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            geometry_shader: true,
        }
    }

    fn adequate_support() -> SwapchainSupport {
        SwapchainSupport {
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        }
    }

    fn discrete_gpu() -> DeviceCandidate {
        DeviceCandidate {
            name: "Test GPU".to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            geometry_shader: true,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            missing_extensions: vec![],
            swapchain_support: Some(adequate_support()),
        }
    }

    #[test]
    fn finds_first_graphics_and_first_present_independently() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];

        let indices = QueueFamilyIndices::find(&families, |index| index >= 2);

        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn stops_scanning_once_both_roles_are_found() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::GRAPHICS)];
        let mut queried = Vec::new();

        let indices = QueueFamilyIndices::find(&families, |index| {
            queried.push(index);
            true
        });

        assert_eq!(indices.resolve(), Some(QueueFamilies { graphics: 0, present: 0 }));
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn missing_present_family_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = QueueFamilyIndices::find(&families, |_| false);

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, None);
        assert!(indices.resolve().is_none());
    }

    #[test]
    fn queue_create_infos_are_deduplicated() {
        let priorities = [1.0];

        let shared = QueueFamilies { graphics: 2, present: 2 };
        let infos = queue_create_infos(&shared, &priorities);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 2);
        assert_eq!(infos[0].queue_count, 1);

        let split = QueueFamilies { graphics: 0, present: 3 };
        let infos = queue_create_infos(&split, &priorities);
        let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(indices, vec![0, 3]);
    }

    #[test]
    fn complete_discrete_gpu_is_suitable() {
        let candidate = discrete_gpu();
        assert!(candidate.is_suitable(&requirements()));
    }

    #[test]
    fn suitable_implies_queues_and_swapchain_support() {
        let mut variants = Vec::new();
        for graphics in [None, Some(0)] {
            for present in [None, Some(1)] {
                for support in [None, Some(SwapchainSupport::default()), Some(adequate_support())]
                {
                    let mut candidate = discrete_gpu();
                    candidate.queue_families = QueueFamilyIndices { graphics, present };
                    candidate.swapchain_support = support;
                    variants.push(candidate);
                }
            }
        }

        for candidate in variants.iter().filter(|c| c.is_suitable(&requirements())) {
            assert!(candidate.queue_families.graphics.is_some());
            assert!(candidate.queue_families.present.is_some());
            let support = candidate.swapchain_support.as_ref().unwrap();
            assert!(!support.formats.is_empty());
            assert!(!support.present_modes.is_empty());
        }
        assert_eq!(
            variants
                .iter()
                .filter(|c| c.is_suitable(&requirements()))
                .count(),
            1
        );
    }

    #[test]
    fn each_predicate_rejects() {
        let reqs = requirements();

        let mut c = discrete_gpu();
        c.missing_extensions = vec!["VK_KHR_swapchain".to_string()];
        c.swapchain_support = None;
        assert!(matches!(c.check(&reqs), Some(Unsuitable::MissingExtensions(_))));

        let mut c = discrete_gpu();
        c.swapchain_support = Some(SwapchainSupport::default());
        assert_eq!(c.check(&reqs), Some(Unsuitable::InadequateSwapchain));

        let mut c = discrete_gpu();
        c.geometry_shader = false;
        assert_eq!(c.check(&reqs), Some(Unsuitable::NoGeometryShader));

        let mut c = discrete_gpu();
        c.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(matches!(c.check(&reqs), Some(Unsuitable::WrongType { .. })));
    }

    #[test]
    fn geometry_shader_filter_can_be_disabled() {
        let mut c = discrete_gpu();
        c.geometry_shader = false;
        let reqs = DeviceRequirements {
            geometry_shader: false,
            ..requirements()
        };
        assert!(c.is_suitable(&reqs));
    }

    #[test]
    fn selects_first_suitable_device() {
        let mut integrated = discrete_gpu();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let mut second = discrete_gpu();
        second.name = "Second".to_string();

        let candidates = [integrated, discrete_gpu(), second];
        assert_eq!(select_device(&candidates, &requirements()), Some(1));
        assert_eq!(select_device(&candidates[..1], &requirements()), None);
        assert_eq!(select_device(&[], &requirements()), None);
    }

    #[test]
    fn failed_description_skips_only_that_device() {
        let described = vec![
            (0u32, Err(anyhow::anyhow!("Failed to enumerate device extensions"))),
            (1u32, Ok(discrete_gpu())),
        ];

        let kept = keep_described(described);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].0, 1);
        let candidates: Vec<_> = kept.into_iter().map(|(_, c)| c).collect();
        assert_eq!(select_device(&candidates, &requirements()), Some(0));
    }

    #[test]
    fn reports_missing_extensions_by_name() {
        let swapchain = khr::Swapchain::name();
        let available = [extension(c"VK_KHR_other"), extension(swapchain)];

        assert!(missing_extensions(&[swapchain], &available).is_empty());
        assert_eq!(
            missing_extensions(&[swapchain], &available[..1]),
            vec!["VK_KHR_swapchain".to_string()]
        );
    }

    #[test]
    fn layer_lookup_matches_exact_name() {
        let mut layer = vk::LayerProperties::default();
        for (dst, &src) in layer
            .layer_name
            .iter_mut()
            .zip(b"VK_LAYER_KHRONOS_validation")
        {
            *dst = src as c_char;
        }

        assert!(has_layer(&[layer], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
    }
}
