use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use ash::extensions::ext;
use ash::vk;

use super::constants;
use super::debug;

pub struct Instance {
    pub(crate) entry: ash::Entry,
    pub raw: ash::Instance,

    pub(crate) debug_utils: ext::DebugUtils,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::default()
    }

    fn new(builder: InstanceBuilder) -> anyhow::Result<Self> {
        // load vulkan dll
        let entry = unsafe { ash::Entry::load()? };

        // if in debug build, check if the validation layer is supported
        if constants::ENABLE_DEBUG
            && !debug::check_validation_layer_support(&entry, &constants::REQUIRED_VALIDATION_LAYERS)
        {
            glog::error!("vulkan validation layer not support, but requested!");
            panic!("vulkan validation layer not support, but requested!");
        }

        let instance = Self::create_instance(&entry, &builder);

        let debug_utils = ext::DebugUtils::new(&entry, &instance);
        let debug_messenger = if constants::ENABLE_DEBUG {
            let create_info = debug::populate_debug_messenger_create_info();
            Some(unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? })
        } else {
            None
        };

        Ok(Self {
            entry,
            raw: instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn required_layers(builder: &InstanceBuilder) -> Vec<CString> {
        let mut layers = Vec::new();
        if builder.enable_debug {
            let raw_layers = constants::REQUIRED_VALIDATION_LAYERS
                .iter()
                .map(|s| CString::new(*s).unwrap());
            layers.extend(raw_layers);
        }
        layers
    }

    fn create_instance(entry: &ash::Entry, builder: &InstanceBuilder) -> ash::Instance {
        let application_name = CString::new(builder.application_name.as_str()).unwrap();
        let engine_name = CString::new("Kestrel Vulkan RenderDevice").unwrap();

        let app_info = vk::ApplicationInfo::builder()
            .api_version(vk::API_VERSION_1_3)
            .application_name(application_name.as_c_str())
            .engine_name(engine_name.as_c_str())
            .build();

        let mut debug_messenger_create_info = debug::populate_debug_messenger_create_info();

        // all required extensions
        let mut extension_names: Vec<*const c_char> = builder
            .required_extensions
            .iter()
            .map(|s| s.as_ptr())
            .collect();
        if constants::ENABLE_DEBUG {
            extension_names.push(ext::DebugUtils::name().as_ptr());
        }

        // all required layers
        let layer_names = Self::required_layers(builder);
        let layer_names: Vec<*const c_char> = layer_names.iter().map(|raw| raw.as_ptr()).collect();

        let mut instance_ci_builder = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);
        if constants::ENABLE_DEBUG {
            instance_ci_builder = instance_ci_builder.push_next(&mut debug_messenger_create_info);
        }
        let create_info = instance_ci_builder.build();

        // create vulkan instance
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .expect("Failed to create vulkan instance!");
        glog::trace!("Vulkan instance created!");

        instance
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(messenger) = self.debug_messenger.take() {
            unsafe {
                self.debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
        }
    }
}

pub struct InstanceBuilder {
    pub application_name: String,
    pub required_extensions: Vec<&'static CStr>,
    pub enable_debug: bool,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        InstanceBuilder {
            application_name: String::from("Kestrel Engine"),
            required_extensions: Vec::new(),
            enable_debug: constants::ENABLE_DEBUG,
        }
    }
}

impl InstanceBuilder {
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn require_extensions(mut self, extensions: Vec<&'static CStr>) -> Self {
        self.required_extensions = extensions;
        self
    }

    #[allow(dead_code)]
    pub fn enable_debug(mut self, enable: bool) -> Self {
        self.enable_debug = enable;
        self
    }

    pub fn build(self) -> anyhow::Result<Arc<Instance>> {
        Ok(Arc::new(Instance::new(self)?))
    }
}
