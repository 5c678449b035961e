//! Built-in appliers for the nine built-in effects.

pub(crate) mod regions;

mod makeup;
mod surgery;
mod template;

pub use makeup::{MakeupApplier, blend_pixel};
pub use surgery::SurgeryApplier;
pub use template::template_landmarks;
