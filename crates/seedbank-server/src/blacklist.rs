//! Shared deny-list of remote IPs.
//!
//! Consulted by the accept loops on the raw TCP connection, before TLS or
//! any HTTP parsing. Inserts are visible to the next accept on any task.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct Blacklist {
    ips: RwLock<HashSet<String>>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load newline-delimited IPs from a file. Blank lines are tolerated.
    /// Returns how many entries were added.
    pub fn load_file(&self, path: &Path) -> io::Result<usize> {
        let content = fs::read_to_string(path)?;
        let mut added = 0;
        for line in content.lines() {
            let ip = line.trim();
            if ip.is_empty() {
                continue;
            }
            self.block_ip(ip);
            added += 1;
        }
        Ok(added)
    }

    pub fn block_ip(&self, ip: &str) {
        self.ips
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip.to_string());
    }

    pub fn is_blocked(&self, ip: &str) -> bool {
        self.ips
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(ip)
    }
}
