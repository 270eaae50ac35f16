//! Server selection and directory construction: probing candidate bridge
//! servers, and handing out shared working/import directory instances for
//! named locations.

mod factory;
mod server;

pub use factory::{DirectoryContext, MIN_SERVER_VERSION};
pub use server::{ServerProbe, ServerSelector};
