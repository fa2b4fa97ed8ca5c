use thiserror::Error;

/// Host-side failures raised before or around a draw.
///
/// The shader stages themselves are total; everything here is a boundary
/// violation or a device problem detected by the host.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No GPU adapter matched the request.
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    /// The adapter refused to create a logical device.
    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Mapping the readback buffer failed.
    #[error("failed to map readback buffer: {0}")]
    BufferMap(String),

    /// The color target has a zero dimension.
    #[error("invalid render target size {width}x{height}")]
    InvalidTargetSize { width: u32, height: u32 },

    /// An index refers past the end of the vertex list.
    #[error("index {index} is out of range for {len} vertices")]
    IndexOutOfRange { index: usize, len: usize },

    /// The primitive list does not split into whole triangles.
    #[error("{count} elements do not form whole triangles")]
    IncompleteTriangle { count: usize },

    /// A vertex carries a NaN or infinite component.
    #[error("vertex {index} has a non-finite component")]
    NonFiniteVertex { index: usize },

    /// The camera carries a NaN or infinite component.
    #[error("camera has a non-finite component")]
    NonFiniteCamera,

    /// Encoding the rendered image failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;
