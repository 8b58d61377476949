// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Parses the command line with clap and hands an EvalRequest to
// the application layer. Flag names keep their underscores so
// existing launch scripts work unchanged:
//
//   classifier-eval --tfrecords test-00000 test-00001 \
//       --savedir runs/eval --checkpoint_path runs/train \
//       --config eval.yaml --eval_interval_secs 300
//
// Only --batch_size and --model_name touch the configuration;
// every other flag goes straight to the driver.

pub mod overrides;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::application::eval_use_case::{EvalRequest, EvalUseCase};
use crate::infra::config::EvalConfig;
use overrides::ConfigOverrides;

/// Evaluate an image classifier checkpoint on TFRecord shards.
#[derive(Parser, Debug)]
#[command(name = "classifier-eval", version, about)]
pub struct Cli {
    /// TFRecord shards holding the test examples
    #[arg(long = "tfrecords", required = true, num_args = 1..)]
    pub tfrecords: Vec<PathBuf>,

    /// Directory for the evaluation summary
    #[arg(long = "savedir")]
    pub savedir: PathBuf,

    /// Checkpoint prefix, or a directory to take the latest checkpoint from
    #[arg(long = "checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// YAML configuration file
    #[arg(long = "config")]
    pub config: PathBuf,

    /// Seconds between evaluations; 0 evaluates once and exits
    #[arg(long = "eval_interval_secs", default_value_t = 0)]
    pub eval_interval_secs: u64,

    /// Overrides BATCH_SIZE from the config file
    #[arg(long = "batch_size")]
    pub batch_size: Option<usize>,

    /// Number of batches per evaluation; 0 covers the whole test set
    #[arg(long = "batches", default_value_t = 0)]
    pub batches: usize,

    /// Overrides MODEL_NAME from the config file
    #[arg(long = "model_name")]
    pub model_name: Option<String>,

    /// Stop the evaluation loop after this many checkpoints
    #[arg(long = "max_evaluations")]
    pub max_evaluations: Option<usize>,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            batch_size: self.batch_size,
            model_name: self.model_name.clone(),
        }
    }

    /// Load the config, apply overrides, build the request.
    pub fn into_request(self) -> Result<EvalRequest> {
        let mut config = EvalConfig::from_file(&self.config)?;
        self.overrides().apply(&mut config);

        Ok(EvalRequest {
            tfrecords:          self.tfrecords,
            savedir:            self.savedir,
            checkpoint_path:    self.checkpoint_path,
            max_batches:        self.batches,
            eval_interval_secs: self.eval_interval_secs,
            max_evaluations:    self.max_evaluations,
            config,
        })
    }

    pub fn run(self) -> Result<()> {
        let request = self.into_request()?;
        EvalUseCase::new(request).execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn parse(config: &str, extra: &[&str]) -> Cli {
        let mut args = vec![
            "classifier-eval",
            "--tfrecords", "a.tfrecord", "b.tfrecord",
            "--savedir", "out",
            "--checkpoint_path", "ckpt",
            "--config", config,
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_defaults_and_shard_list() {
        let cli = parse("eval.yaml", &[]);
        assert_eq!(cli.tfrecords.len(), 2);
        assert_eq!(cli.eval_interval_secs, 0);
        assert_eq!(cli.batches, 0);
        assert_eq!(cli.overrides(), ConfigOverrides::default());
        assert_eq!(cli.max_evaluations, None);
    }

    #[test]
    fn test_required_flags() {
        assert!(Cli::try_parse_from(["classifier-eval", "--savedir", "out"]).is_err());
    }

    #[test]
    fn test_overrides_reach_the_request() {
        let dir  = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("eval.yaml");
        fs::write(&yaml, "MODEL_NAME: cifarnet\nBATCH_SIZE: 64\n").unwrap();
        let yaml = yaml.to_string_lossy().into_owned();

        let cli = parse(&yaml, &["--batch_size", "4", "--batches", "3"]);
        let req = cli.into_request().unwrap();
        assert_eq!(req.config.batch_size, 4);
        assert_eq!(req.config.model_name, "cifarnet");
        assert_eq!(req.max_batches, 3);
    }
}
