pub mod fs;
pub mod logger;
pub mod profiler;
pub mod timer;

pub use crate::logger::init_logging;
pub use crate::profiler::{PhaseTiming, Profiler};
pub use crate::timer::Stopwatch;
