//! Runtime configuration
//!
//! Flags double as environment variables so the controller can be configured
//! from a Deployment manifest without rewriting its args.

use std::time::Duration;

use clap::{Args, ValueEnum};

use crate::workload::{WorkerConfig, DEFAULT_WORKER_IMAGE};

/// Default number of ImageBuilds reconciled in parallel
pub const DEFAULT_CONCURRENCY: u16 = 4;

/// Default delay before a failed reconcile is retried
pub const DEFAULT_ERROR_REQUEUE_SECS: u64 = 30;

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Controller flags
#[derive(Args, Clone, Debug)]
pub struct ControllerArgs {
    /// Only watch ImageBuilds and pods in this namespace (default: all namespaces)
    #[arg(long, env = "IMG_CONTROLLER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Image for the worker pod's fetch and build containers
    #[arg(long, env = "IMG_CONTROLLER_WORKER_IMAGE", default_value = DEFAULT_WORKER_IMAGE)]
    pub worker_image: String,

    /// Maximum number of ImageBuilds reconciled in parallel (0 = unbounded)
    #[arg(long, env = "IMG_CONTROLLER_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: u16,

    /// Seconds to wait before retrying a failed reconcile
    #[arg(
        long,
        env = "IMG_CONTROLLER_ERROR_REQUEUE_SECS",
        default_value_t = DEFAULT_ERROR_REQUEUE_SECS
    )]
    pub error_requeue_secs: u64,

    /// Do not apply the ImageBuild CRD at startup
    #[arg(long, env = "IMG_CONTROLLER_SKIP_CRD_INSTALL")]
    pub skip_crd_install: bool,

    /// Log output format (verbosity is controlled by RUST_LOG)
    #[arg(long, env = "IMG_CONTROLLER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Settings the reconciler and router run with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Worker pod settings
    pub worker: WorkerConfig,
    /// Maximum parallel reconciles; 0 is unbounded
    pub concurrency: u16,
    /// Delay before a failed reconcile is retried
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            worker: WorkerConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            error_requeue: Duration::from_secs(DEFAULT_ERROR_REQUEUE_SECS),
        }
    }
}

impl From<&ControllerArgs> for ControllerConfig {
    fn from(args: &ControllerArgs) -> Self {
        Self {
            namespace: args.namespace.clone().filter(|ns| !ns.is_empty()),
            worker: WorkerConfig {
                image: args.worker_image.clone(),
            },
            concurrency: args.concurrency,
            error_requeue: Duration::from_secs(args.error_requeue_secs),
        }
    }
}
