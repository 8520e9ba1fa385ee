//! Vulkan instance creation.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::error::GraphicsError;

use super::debug;

/// Timeline semaphores, descriptor indexing and dynamic rendering are core
/// in 1.3.
pub const REQUIRED_API_VERSION: u32 = vk::API_VERSION_1_3;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"Solstice";

/// The instance with its optional validation messenger.
pub struct InstanceBundle {
    pub instance: ash::Instance,
    pub debug: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

/// Create an instance able to present to `display` when one is given.
pub fn create_instance(
    entry: &ash::Entry,
    validation: bool,
    display: Option<RawDisplayHandle>,
) -> Result<InstanceBundle, GraphicsError> {
    let validation_available = validation && validation_layer_available(entry);
    if validation && !validation_available {
        log::warn!("Vulkan validation requested but VK_LAYER_KHRONOS_validation is missing");
    }

    let app_info = vk::ApplicationInfo::default()
        .application_name(ENGINE_NAME)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(ENGINE_NAME)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions: Vec<*const c_char> = Vec::new();
    if let Some(display) = display {
        let required = ash_window::enumerate_required_extensions(display).map_err(|e| {
            GraphicsError::InitializationFailed(format!(
                "failed to query surface extensions: {e:?}"
            ))
        })?;
        extensions.extend_from_slice(required);
    }
    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[allow(unused_mut)]
    let mut flags = vk::InstanceCreateFlags::empty();
    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
        flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let layers: Vec<*const c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .flags(flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layers);

    // SAFETY: every pointer in create_info outlives the call.
    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("failed to create Vulkan instance: {e:?}"))
    })?;

    let debug = if validation_available {
        let loader = ash::ext::debug_utils::Instance::new(entry, &instance);
        let messenger = debug::create_debug_messenger(&loader)?;
        Some((loader, messenger))
    } else {
        None
    };

    log::debug!(
        "Vulkan instance created ({} extensions, validation: {validation_available})",
        extensions.len()
    );
    Ok(InstanceBundle { instance, debug })
}

fn validation_layer_available(entry: &ash::Entry) -> bool {
    // SAFETY: plain enumeration with no external pointers.
    let Ok(layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };
    layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER_NAME))
}
