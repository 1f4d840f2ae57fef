//! # Tags
//!
//! Live tag values, the current value table that owns them, and the observer
//! handles through which changes are delivered.

pub mod cvt;
pub mod observer;
pub mod tag;

pub use cvt::{CurrentValueTable, CvtEngine, CvtParameter, CvtReply};
pub use observer::{DeliveryQueue, Notification, PushOutcome, TagObserver};
pub use tag::{DataType, Tag, TagDefinition, TagValue};
