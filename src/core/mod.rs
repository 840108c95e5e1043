pub mod dispatcher;
pub mod mapper;
pub mod pipeline;
pub mod template;

pub use crate::domain::model::{Dataset, FieldBinding, Payload, Record, SendResult, Template};
pub use crate::domain::ports::{FieldCatalog, Storage, Transport};
pub use crate::utils::error::Result;
