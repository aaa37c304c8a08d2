//! Renderer configuration

use tilevg_core::CreateFlags;

use crate::error::GpuError;

/// When recorded commands are handed to the device
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitPolicy {
    /// Submit and wait after every call
    #[default]
    PerCall,
    /// One submission per flush, waited on when its command memory is reused
    PerFrame,
}

/// Callback receiving unrecoverable device errors
pub type ErrorHandler = Box<dyn FnMut(&GpuError)>;

/// Logs the error and aborts the process
pub fn abort_on_error() -> ErrorHandler {
    Box::new(|err| {
        tracing::error!(%err, "fatal GPU error");
        std::process::abort();
    })
}

/// Renderer configuration
#[derive(Clone, Debug)]
pub struct RendererConfig {
    /// Fixed view size in pixels
    pub view_size: [f32; 2],
    pub flags: CreateFlags,
    pub submit_policy: SubmitPolicy,
    /// Bytes of command memory per ring slot
    pub cmd_memory_size: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            view_size: [1280.0, 720.0],
            flags: CreateFlags::ANTIALIAS,
            submit_policy: SubmitPolicy::PerCall,
            cmd_memory_size: crate::renderer::DYNAMIC_CMD_SIZE,
        }
    }
}

impl RendererConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self::default().view_size(width as f32, height as f32)
    }

    pub fn view_size(mut self, width: f32, height: f32) -> Self {
        self.view_size = [width, height];
        self
    }

    pub fn flags(mut self, flags: CreateFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn antialias(mut self, enabled: bool) -> Self {
        self.flags.set(CreateFlags::ANTIALIAS, enabled);
        self
    }

    pub fn stencil_strokes(mut self, enabled: bool) -> Self {
        self.flags.set(CreateFlags::STENCIL_STROKES, enabled);
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.flags.set(CreateFlags::DEBUG, enabled);
        self
    }

    pub fn submit_policy(mut self, policy: SubmitPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    pub fn cmd_memory_size(mut self, bytes: usize) -> Self {
        self.cmd_memory_size = bytes;
        self
    }
}
