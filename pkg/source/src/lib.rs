//! Source handling: format detection, staging of directory contents and
//! dispatch to the plain aggregator or an external renderer.

pub mod detect;
pub mod dispatch;
pub mod files;
pub mod render;

pub use detect::{SourceFormat, detect_format};
pub use dispatch::{Dispatcher, Source};
pub use files::{Collect, FileMap, StagedFiles};
pub use render::{HelmRenderer, KustomizeRenderer, Renderer};
