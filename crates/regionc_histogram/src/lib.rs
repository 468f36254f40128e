//! Call-site invoke histogram: persisted observations of which concrete
//! callee each call site resolved to, and the speculation order derived
//! from them.

pub mod error;
pub mod histogram;
pub mod kind;
pub mod record;
pub mod recorder;
pub mod table;

pub use crate::error::HistogramError;
pub use crate::histogram::{CallSite, HistogramFilter, InvokeHistogram, is_cross_boundary};
pub use crate::kind::InvokeKind;
pub use crate::record::{InvokeKey, InvokeRecord};
pub use crate::recorder::InvokeRecorder;
pub use crate::table::{is_internal, render_table};
