use tracing::debug;

use crate::options::{BuildConfig, CliOverrides, ConfigExport, OneOrMany, OutputOptions};

/// Normalizes a user config into an ordered list of build configs.
///
/// Every config gets its `output` position expanded into a list (a missing
/// `output` becomes a single empty output), and the CLI overrides are
/// shallow-merged on top of both the input and each output. CLI values win.
///
/// An empty config list yields an empty result; deciding whether that is fatal
/// is left to the caller.
pub fn expand(config: ConfigExport, overrides: &CliOverrides) -> Vec<BuildConfig> {
  let configs: Vec<BuildConfig> = config
    .into_vec()
    .into_iter()
    .map(|user| {
      let outputs = user
        .output
        .map(OneOrMany::into_vec)
        .unwrap_or_else(|| vec![OutputOptions::default()]);

      BuildConfig {
        input: user.input.merged(&overrides.input),
        output: outputs
          .into_iter()
          .map(|output| output.merged(&overrides.output))
          .collect(),
      }
    })
    .collect();

  debug!(
    configs = configs.len(),
    outputs = configs.iter().map(|c| c.output.len()).sum::<usize>(),
    "expanded config"
  );

  configs
}
