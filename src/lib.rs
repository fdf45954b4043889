//! nettune - Network stack tuning for VPN servers
//!
//! Idempotent, reversible configuration of a Linux host for many concurrent
//! VPN clients:
//! - Congestion control (BBR / BBR2 with fair queueing)
//! - Socket, backlog and connection-tracking limits
//! - systemd-resolved DNS policy
//! - Verification of the active kernel and resolver state
//!
//! Every change is a drop-in fragment; files being replaced are first copied
//! into a per-run backup set.

pub mod error;
pub mod config;
pub mod validation;
pub mod system;
pub mod backup;
pub mod fragment;
pub mod probe;
pub mod sysctl;
pub mod congestion;
pub mod tuning;
pub mod dns;
pub mod platform;
pub mod verify;
pub mod intent;
pub mod summary;
pub mod orchestrator;

// Re-export commonly used types
pub use error::{TuneError, TuneResult};
pub use config::{TuneConfig, TunePaths, ToolSettings};
pub use system::{HostSystem, LinuxHost, CommandSpec, CommandOutput, Outcome};
pub use backup::BackupManager;
pub use fragment::{ConfigFragment, FileWriter, FragmentStyle, Preview, WriteOutcome};
pub use probe::CapabilityProber;
pub use congestion::{Algorithm, CongestionConfigurator, CongestionOutcome};
pub use tuning::TuningConfigurator;
pub use dns::{DnsConfigurator, DnsOutcome, DnsPolicy, DnsProvider};
pub use verify::{Report, Verifier};
pub use intent::{IntentFlags, RunIntent};
pub use summary::{RunSummary, Warnings};
pub use orchestrator::Orchestrator;
