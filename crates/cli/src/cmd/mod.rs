mod bundle;

pub use bundle::{BundleArgs, cmd_bundle};
