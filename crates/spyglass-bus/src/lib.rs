//! In-process management bus: the registry surface the spyglass bridge
//! dispatches against.
//!
//! - **[`ObjectName`]** — `domain:key=value,...` bean addresses with
//!   wildcard patterns, canonical vs. literal forms.
//! - **[`BusValue`] / [`BusType`]** — dynamic values beans traffic in
//!   (scalars, sequences, maps, composite records, tables, open object
//!   graphs) and the declared types that drive JSON-to-value parsing.
//! - **[`ManagedBean`]** — the trait a host object implements to become
//!   remotely readable/writable/invocable, self-described by
//!   [`BeanInfo`].
//! - **[`BeanRegistry`]** — the catalog: registration, pattern queries,
//!   attribute/operation dispatch, notification emission. The process
//!   [`platform`] registry plus [`register_extra`] side registries form
//!   the discovery surface the bridge scans.
//! - **[`NotificationHub`]** — pull-mode notification buffering with
//!   bounded per-listener queues.

pub mod bean;
pub mod error;
pub mod info;
pub mod name;
pub mod notify;
pub mod registry;
pub mod value;

pub use bean::{no_such_attribute, no_such_operation, ManagedBean};
pub use error::RegistryError;
pub use info::{AttributeInfo, BeanInfo, NotificationInfo, OperationInfo, ParamInfo};
pub use name::ObjectName;
pub use notify::{ListenerId, Notification, NotificationHub};
pub use registry::{extra_registries, platform, register_extra, BeanRegistry};
pub use value::{BusType, BusValue, CompositeSchema, CompositeValue, OpenBean, TableValue};
