//! Input validation and sanitization
//!
//! Everything that ends up in a persisted fragment or on an external command
//! line passes through here first.

use crate::error::{TuneError, TuneResult};
use std::net::IpAddr;

/// Maximum length for sysctl keys
const MAX_SYSCTL_KEY_LEN: usize = 128;

/// Maximum length for configuration values
const MAX_CONFIG_VALUE_LEN: usize = 255;

/// Kernel module names are limited to 55 characters (MODULE_NAME_LEN - 1)
const MAX_MODULE_NAME_LEN: usize = 55;

/// Maximum length for error messages shown to users
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Validate IP address
///
/// Uses Rust's built-in IP address parser to ensure valid format
pub fn validate_ip_address(addr: &str) -> TuneResult<IpAddr> {
    addr.parse::<IpAddr>()
        .map_err(|_| TuneError::InvalidParameter(
            format!("Invalid IP address: {}", addr)
        ))
}

/// Validate a sysctl key such as `net.ipv4.tcp_congestion_control`
pub fn validate_sysctl_key(key: &str) -> TuneResult<()> {
    if key.is_empty() {
        return Err(TuneError::InvalidParameter(
            "sysctl key cannot be empty".to_string()
        ));
    }

    if key.len() > MAX_SYSCTL_KEY_LEN {
        return Err(TuneError::InvalidParameter(
            format!("sysctl key too long (max {} characters)", MAX_SYSCTL_KEY_LEN)
        ));
    }

    for c in key.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '.' && c != '-' {
            return Err(TuneError::InvalidParameter(
                format!("Invalid sysctl key '{}': contains invalid character '{}'", key, c)
            ));
        }
    }

    if key.starts_with('.') || key.ends_with('.') || key.contains("..") {
        return Err(TuneError::InvalidParameter(
            format!("Invalid sysctl key '{}': empty path component", key)
        ));
    }

    Ok(())
}

/// Validate a sysctl value: one line, no comment characters
pub fn validate_sysctl_value(value: &str) -> TuneResult<()> {
    let value = sanitize_config_value(value)?;

    if value.trim().is_empty() {
        return Err(TuneError::InvalidParameter(
            "sysctl value cannot be empty".to_string()
        ));
    }

    if value.contains('#') || value.contains(';') {
        return Err(TuneError::InvalidParameter(
            format!("sysctl value '{}' contains a comment character", value)
        ));
    }

    Ok(())
}

/// Validate a kernel module name before handing it to modprobe
pub fn validate_module_name(name: &str) -> TuneResult<()> {
    if name.is_empty() || name.len() > MAX_MODULE_NAME_LEN {
        return Err(TuneError::InvalidParameter(
            format!("Invalid module name length: '{}'", name)
        ));
    }

    // Don't allow names starting with dash (could be interpreted as option)
    if name.starts_with('-') {
        return Err(TuneError::InvalidParameter(
            "Module name cannot start with dash".to_string()
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(TuneError::InvalidParameter(
            format!("Invalid module name '{}'", name)
        ));
    }

    Ok(())
}

/// Validate a systemd unit or Debian package name
pub fn validate_unit_name(name: &str) -> TuneResult<()> {
    if name.is_empty() || name.starts_with('-') {
        return Err(TuneError::InvalidParameter(
            format!("Invalid unit name '{}'", name)
        ));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || "-_.@+:".contains(c)) {
        return Err(TuneError::InvalidParameter(
            format!("Invalid unit name '{}'", name)
        ));
    }

    Ok(())
}

/// Sanitize configuration values to prevent injection
///
/// Removes or rejects values containing dangerous characters
pub fn sanitize_config_value(value: &str) -> TuneResult<String> {
    // Check for control characters
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(TuneError::InvalidParameter(
            "Configuration value contains invalid control characters".to_string()
        ));
    }

    // Limit length
    if value.len() > MAX_CONFIG_VALUE_LEN {
        return Err(TuneError::InvalidParameter(
            format!("Configuration value too long (max {} characters)", MAX_CONFIG_VALUE_LEN)
        ));
    }

    Ok(value.to_string())
}

/// Sanitize command output before it is surfaced in a warning
pub fn sanitize_error_message(stderr: &str) -> String {
    let mut sanitized = stderr.trim().to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let mut cut = MAX_ERROR_MESSAGE_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
        sanitized.push_str("... (truncated)");
    }

    sanitized
}
