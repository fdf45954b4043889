//! Helpers shared by the sysctl.d configurators

use crate::error::{TuneError, TuneResult};
use crate::fragment::ConfigFragment;
use crate::probe::CapabilityProber;
use crate::system::{CommandSpec, HostSystem, Outcome};
use crate::validation;
use tracing::info;

/// Check every entry of a sysctl fragment before it is written
///
/// `sysctl --system` applies all fragments on the host; a broken line in
/// ours must never be what makes that reload fail.
pub fn validate_fragment(fragment: &ConfigFragment) -> TuneResult<()> {
    for entry in &fragment.entries {
        validation::validate_sysctl_key(&entry.key)?;
        let value = entry.value.as_deref().ok_or_else(|| {
            TuneError::InvalidParameter(format!("sysctl key {} has no value", entry.key))
        })?;
        validation::validate_sysctl_value(value)?;
    }
    Ok(())
}

/// Keys of the fragment that this kernel does not expose
pub async fn missing_keys(prober: &CapabilityProber, fragment: &ConfigFragment) -> Vec<String> {
    let mut missing = Vec::new();
    for entry in &fragment.entries {
        if !prober.sysctl_key_exists(&entry.key).await {
            missing.push(entry.key.clone());
        }
    }
    missing
}

/// Re-apply every persisted kernel parameter (`sysctl --system`)
pub async fn reload_system(host: &dyn HostSystem, dry_run: bool) -> Outcome {
    if dry_run {
        info!("Would run sysctl --system");
        return Outcome::Success;
    }

    let out = host.run(&CommandSpec::new("sysctl", &["--system"])).await;
    if out.outcome.is_success() {
        info!("Reloaded kernel parameters");
    }
    out.outcome
}
