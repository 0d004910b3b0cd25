//! Principal coordinates analysis and plot-ready annotation.

mod frame;
mod pcoa;

pub use frame::{FrameRecord, GroupBy, OrdinationFrame};
pub use pcoa::{pcoa, OrdinationResult};
