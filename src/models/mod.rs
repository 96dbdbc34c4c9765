pub mod values;
pub mod zone;

pub use values::{Value, ValueSet};
pub use zone::{ConnectionDescriptor, SslMode, Zone};
