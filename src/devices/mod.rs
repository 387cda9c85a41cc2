// Adapters between the pipeline and the outside world: the serial link to the
// servo controller, frame sources and display surfaces.

#[cfg(feature = "camera")]
pub mod camera;
pub mod headless;
pub mod replay;
pub mod serial;
