pub mod error;
pub mod images;
pub mod mapping;
pub mod model;
pub mod signatures;
pub mod values;

pub use error::ForwardError;
pub use mapping::{FieldMapping, FieldMappings, MappedFields, MappingOverrides};
pub use model::{Acknowledgment, IncomingCallback, ItemType, OutboundRequest};
