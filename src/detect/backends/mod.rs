pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{standing_pose, StubEngine};

#[cfg(feature = "backend-tract")]
pub use tract::TractEngine;
