pub mod datamuse;
pub mod dispatch;
pub mod group;
pub mod record;
pub mod render;
pub mod session;

#[cfg(feature = "web")]
pub mod web;

pub use datamuse::{ClientConfig, DatamuseClient, LookupError, WordSource};
pub use dispatch::Dispatcher;
pub use group::{FieldValue, GroupKey, Grouped, KeySelector, group_by, group_by_key, pluralize};
pub use record::{QueryMode, WordRecord};
pub use render::{DisplayItem, Output, QueryView, Section};
pub use session::{SavedWords, Session, SessionRegistry};
