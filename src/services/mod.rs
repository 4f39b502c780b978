pub mod normalize;
pub mod template;

pub use normalize::{normalize, NormalizeOutcome, NormalizeWarning};
pub use template::{render_prompt, render_template};
