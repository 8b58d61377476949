// ============================================================
// Layer 1: Config Overrides
// ============================================================
// The only configuration keys the command line may change.
// Applied once, right after the file is loaded and before any
// other component reads the config.

use crate::infra::config::EvalConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub batch_size: Option<usize>,
    pub model_name: Option<String>,
}

impl ConfigOverrides {
    /// Given values win; absent ones leave the file value alone.
    pub fn apply(&self, cfg: &mut EvalConfig) {
        if let Some(batch_size) = self.batch_size {
            tracing::debug!("BATCH_SIZE {} overridden to {batch_size}", cfg.batch_size);
            cfg.batch_size = batch_size;
        }
        if let Some(name) = &self.model_name {
            tracing::debug!("MODEL_NAME '{}' overridden to '{name}'", cfg.model_name);
            cfg.model_name = name.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_override() {
        let mut cfg = EvalConfig { batch_size: 32, ..Default::default() };
        ConfigOverrides::default().apply(&mut cfg);
        assert_eq!(cfg.batch_size, 32);

        ConfigOverrides { batch_size: Some(8), ..Default::default() }.apply(&mut cfg);
        assert_eq!(cfg.batch_size, 8);
    }

    #[test]
    fn test_model_name_override() {
        let mut cfg = EvalConfig { model_name: "cifarnet".into(), ..Default::default() };
        ConfigOverrides::default().apply(&mut cfg);
        assert_eq!(cfg.model_name, "cifarnet");

        let overrides = ConfigOverrides { model_name: Some("lenet".into()), ..Default::default() };
        overrides.apply(&mut cfg);
        assert_eq!(cfg.model_name, "lenet");
        assert_eq!(cfg.batch_size, EvalConfig::default().batch_size);
    }
}
