use std::ffi::CStr;

use ash::vk;

use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};

use crate::backend::vulkan::Instance;

/// Instance extensions the window system needs for surface creation.
pub fn required_instance_extensions(
    window: &winit::window::Window,
) -> anyhow::Result<Vec<&'static CStr>> {
    let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())?;

    Ok(extensions
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
        .collect())
}

pub struct Surface {
    pub(crate) func_loader: ash::extensions::khr::Surface,
    pub(crate) raw: vk::SurfaceKHR,
}

impl Surface {
    pub fn create_from_window(
        instance: &Instance,
        window: &winit::window::Window,
    ) -> anyhow::Result<Self> {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.raw,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )?
        };

        let func_loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.raw);

        Ok(Self {
            func_loader,
            raw: surface,
        })
    }
}
