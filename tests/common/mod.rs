//! Shared helpers for integration tests
//!
//! `FakeHost` stands in for the kernel, systemd and apt: it records every
//! command, answers sysctl reads from a table and serves file reads from
//! overrides before falling back to the real filesystem.

#![allow(dead_code)]

use async_trait::async_trait;
use libnettune::{CommandOutput, CommandSpec, HostSystem, TuneConfig};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;

pub struct FakeHost {
    pub root: bool,
    pub sysctl: HashMap<String, String>,
    pub files: HashMap<PathBuf, String>,
    /// Symlink answers that override the real filesystem
    pub symlinks: HashMap<PathBuf, bool>,
    pub services: HashSet<String>,
    pub modules: HashSet<String>,
    /// Command lines that report failure
    pub failing: HashSet<String>,
    pub commands: Mutex<Vec<String>>,
}

impl FakeHost {
    /// A Debian-like root host with bbr (not bbr2) and systemd-resolved
    pub fn new() -> Self {
        let sysctl = [
            ("kernel.osrelease", "6.1.0-25-amd64"),
            ("net.ipv4.tcp_available_congestion_control", "reno cubic bbr"),
            ("net.ipv4.tcp_congestion_control", "bbr"),
            ("net.core.default_qdisc", "fq"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .chain(
            libnettune::tuning::VPN_TUNING
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
        .collect();

        let mut files = HashMap::new();
        files.insert(PathBuf::from("/proc/modules"), "tcp_bbr 20480 3 - Live 0x0\n".to_string());

        Self {
            root: true,
            sysctl,
            files,
            symlinks: HashMap::new(),
            services: ["systemd-resolved".to_string()].into_iter().collect(),
            modules: ["tcp_bbr", "nf_conntrack"].iter().map(|m| m.to_string()).collect(),
            failing: HashSet::new(),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn ran(&self, command_line: &str) -> bool {
        self.commands().iter().any(|c| c == command_line)
    }
}

#[async_trait]
impl HostSystem for FakeHost {
    async fn run(&self, cmd: &CommandSpec) -> CommandOutput {
        let line = cmd.command_line();
        self.commands.lock().unwrap().push(line.clone());

        if self.failing.contains(&line) {
            return CommandOutput::failed(&format!("{} failed", line));
        }

        match (cmd.program.as_str(), cmd.args.first().map(String::as_str)) {
            ("modprobe", Some(module)) if !self.modules.contains(module) => {
                CommandOutput::failed(&format!("modprobe: FATAL: Module {} not found", module))
            }
            ("systemctl", Some("cat")) => {
                let unit = cmd.args.last().cloned().unwrap_or_default();
                if self.services.contains(&unit) {
                    CommandOutput::success("[Unit]\n")
                } else {
                    CommandOutput::failed(&format!("No files found for {}.service", unit))
                }
            }
            ("resolvectl", Some("status")) => CommandOutput::success("Global\n  resolv.conf mode: stub\n"),
            _ => CommandOutput::success(""),
        }
    }

    async fn read_sysctl(&self, key: &str) -> Option<String> {
        self.sysctl.get(key).cloned()
    }

    async fn read_file(&self, path: &Path) -> Option<String> {
        if let Some(content) = self.files.get(path) {
            return Some(content.clone());
        }
        std::fs::read_to_string(path).ok()
    }

    async fn is_symlink(&self, path: &Path) -> Option<bool> {
        if let Some(link) = self.symlinks.get(path) {
            return Some(*link);
        }
        std::fs::symlink_metadata(path)
            .ok()
            .map(|meta| meta.file_type().is_symlink())
    }

    fn is_root(&self) -> bool {
        self.root
    }
}

/// Temp root with a Debian os-release and a config rooted inside it
pub fn staged_config() -> (TempDir, TuneConfig) {
    let tmp = TempDir::new().unwrap();
    let config = TuneConfig::rooted_at(tmp.path());
    std::fs::create_dir_all(config.paths.os_release.parent().unwrap()).unwrap();
    std::fs::write(&config.paths.os_release, "ID=debian\nPRETTY_NAME=\"Debian GNU/Linux 12\"\n").unwrap();
    (tmp, config)
}

/// Every regular file below `dir`, relative paths sorted
pub fn list_files(dir: &Path) -> Vec<PathBuf> {
    fn walk(base: &Path, dir: &Path, out: &mut Vec<PathBuf>) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(base, &path, out);
                } else {
                    out.push(path.strip_prefix(base).unwrap().to_path_buf());
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(dir, dir, &mut out);
    out.sort();
    out
}
